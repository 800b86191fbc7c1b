//! Daily drift correction: unstarted chain roots whose forecast start has
//! slipped into the past are moved to today, and their chains follow.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument};

use shopfloor_core::{Operation, PredictionUpdate};
use shopfloor_store::operations::OperationRepo;

use crate::chain::{ChainArena, IntegrityWarning};
use crate::error::SchedulerError;
use crate::rescheduler::{self, RescheduleTrigger};
use crate::Scheduler;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Unstarted roots looked at.
    pub examined: usize,
    /// Roots whose forecast was moved to today.
    pub shifted: usize,
    /// Downstream forecasts rewritten as a consequence.
    pub propagated: usize,
    pub warnings: Vec<IntegrityWarning>,
}

impl Scheduler {
    /// One idempotent pass. Each root is handled in its own transaction, so a
    /// concurrent transition only ever contends for a single chain.
    #[instrument(skip(self))]
    pub fn refresh_stale_predictions(&self) -> Result<SweepReport, SchedulerError> {
        let today = self.now().date_naive();
        let roots = self.database().with_conn(OperationRepo::unstarted_roots)?;
        let mut report = SweepReport {
            examined: roots.len(),
            ..SweepReport::default()
        };

        for root in roots {
            let shifted = self.database().transaction::<_, _, SchedulerError>(|conn| {
                // Re-read: the root may have started or been linked since.
                let op = match OperationRepo::get(conn, &root.id) {
                    Ok(op) => op,
                    Err(shopfloor_store::StoreError::NotFound(_)) => return Ok(None),
                    Err(e) => return Err(SchedulerError::from(e)),
                };
                let Some(anchor) = shift_to_today(&op, today) else {
                    return Ok(None);
                };
                OperationRepo::write_predictions(conn, std::slice::from_ref(&anchor))?;

                let mut arena = ChainArena::new(OperationRepo::list_for_order(conn, &op.order_id)?);
                let downstream =
                    rescheduler::reschedule_for(&mut arena, &op.id, RescheduleTrigger::Refresh);
                OperationRepo::write_predictions(conn, &downstream.updates)?;
                Ok(Some(downstream))
            })?;

            if let Some(downstream) = shifted {
                report.shifted += 1;
                report.propagated += downstream.updates.len();
                report.warnings.extend(downstream.warnings);
            }
        }

        info!(
            examined = report.examined,
            shifted = report.shifted,
            propagated = report.propagated,
            "drift sweep finished"
        );
        Ok(report)
    }
}

/// New forecast for a stale unstarted root: same time of day, today's date,
/// planned duration. `None` if the root is started, linked from upstream,
/// has no forecast, or is not behind.
fn shift_to_today(op: &Operation, today: chrono::NaiveDate) -> Option<PredictionUpdate> {
    if op.actual_start.is_some() || !op.is_root() {
        return None;
    }
    let predict_start = op.predict_start?;
    if predict_start.date_naive() >= today {
        return None;
    }
    let moved = today.and_time(predict_start.time()).and_utc();
    Some(PredictionUpdate {
        operation_id: op.id.clone(),
        predict_start: moved,
        predict_end: moved + op.slot(),
    })
}

/// Run the sweep every `every` until `shutdown` resolves. The first sweep
/// runs immediately. Returns how many sweeps ran; failed sweeps are logged
/// and counted.
///
/// Sweeps run on the blocking pool: they hold the database lock and may
/// sleep between busy retries.
pub async fn run_periodic<F>(scheduler: Arc<Scheduler>, every: StdDuration, shutdown: F) -> u64
where
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut runs = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                runs += 1;
                let sweeper = Arc::clone(&scheduler);
                match tokio::task::spawn_blocking(move || sweeper.refresh_stale_predictions()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => error!(error = %e, kind = e.kind(), "drift sweep failed"),
                    Err(e) => error!(error = %e, "drift sweep task failed"),
                }
            }
        }
    }
    info!(runs, "drift sweeps stopped");
    runs
}
