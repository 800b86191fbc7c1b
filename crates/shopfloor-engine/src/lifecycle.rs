//! Start/end transitions.
//!
//! Each transition runs as one store transaction: the operation's own
//! fields, the downstream forecasts and the deviation entry are committed
//! together or not at all.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use shopfloor_core::ids::{ExecutorId, OperationId, ShopId, UserId};
use shopfloor_core::{Clock, DeviationEntry, Operation, PredictionUpdate, Transition, User};
use shopfloor_store::catalog::CatalogRepo;
use shopfloor_store::deviations::DeviationRepo;
use shopfloor_store::operations::{OperationRepo, StartRecord};
use shopfloor_store::orders::OrderRepo;
use shopfloor_store::users::UserRepo;
use shopfloor_store::{Connection, Database};

use crate::chain::{ChainArena, IntegrityWarning};
use crate::deviation;
use crate::error::SchedulerError;
use crate::rescheduler::{self, RescheduleTrigger};

/// Where and by whom an operation is being started.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartRequest {
    pub shop_id: ShopId,
    pub executor_ids: Vec<ExecutorId>,
}

/// State after a committed transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub operation: Operation,
    pub updates: Vec<PredictionUpdate>,
    pub warnings: Vec<IntegrityWarning>,
    pub deviation: Option<DeviationEntry>,
}

/// Entry point for everything that mutates the schedule.
#[derive(Clone)]
pub struct Scheduler {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// planned → in_progress.
    #[instrument(skip(self, request), fields(operation_id = %operation_id, actor = %actor_id))]
    pub fn start_operation(
        &self,
        actor_id: &UserId,
        operation_id: &OperationId,
        request: &StartRequest,
    ) -> Result<TransitionOutcome, SchedulerError> {
        let outcome = self.db.transaction::<_, _, SchedulerError>(|conn| {
            let actor = UserRepo::get(conn, actor_id)?;
            let op = OperationRepo::get(conn, operation_id)?;
            actor.authorize_transition(&op, Transition::Start)?;
            if op.actual_start.is_some() {
                return Err(SchedulerError::AlreadyStarted(op.id.clone()));
            }
            validate_start(conn, request)?;

            let now = self.clock.now();
            let predict_end = now + op.slot();
            OperationRepo::record_start(
                conn,
                &op.id,
                &StartRecord {
                    actual_start: now,
                    shop_id: &request.shop_id,
                    executors: &request.executor_ids,
                    predict_start: now,
                    predict_end,
                },
            )?;

            self.finish_transition(conn, &actor, &op, Transition::Start, now)
        })?;

        info!(
            updates = outcome.updates.len(),
            deviation = outcome.deviation.as_ref().map(|d| d.kind.to_string()),
            "operation started"
        );
        Ok(outcome)
    }

    /// in_progress → completed.
    #[instrument(skip(self), fields(operation_id = %operation_id, actor = %actor_id))]
    pub fn end_operation(
        &self,
        actor_id: &UserId,
        operation_id: &OperationId,
    ) -> Result<TransitionOutcome, SchedulerError> {
        let outcome = self.db.transaction::<_, _, SchedulerError>(|conn| {
            let actor = UserRepo::get(conn, actor_id)?;
            let op = OperationRepo::get(conn, operation_id)?;
            actor.authorize_transition(&op, Transition::End)?;
            if op.actual_start.is_none() {
                return Err(SchedulerError::NotStarted(op.id.clone()));
            }
            if op.actual_end.is_some() {
                return Err(SchedulerError::AlreadyCompleted(op.id.clone()));
            }

            let now = self.clock.now();
            OperationRepo::record_end(conn, &op.id, &now)?;

            self.finish_transition(conn, &actor, &op, Transition::End, now)
        })?;

        info!(
            updates = outcome.updates.len(),
            deviation = outcome.deviation.as_ref().map(|d| d.kind.to_string()),
            "operation ended"
        );
        Ok(outcome)
    }

    /// Shared tail of both transitions: propagate downstream, log the
    /// deviation, and reload the operation.
    fn finish_transition(
        &self,
        conn: &Connection,
        actor: &User,
        before: &Operation,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, SchedulerError> {
        let (updates, warnings) = if before.next_operation.is_some() {
            let trigger = match transition {
                Transition::Start => RescheduleTrigger::Started,
                Transition::End => RescheduleTrigger::Ended,
            };
            let mut arena = ChainArena::new(OperationRepo::list_for_order(conn, &before.order_id)?);
            let result = rescheduler::reschedule_for(&mut arena, &before.id, trigger);
            OperationRepo::write_predictions(conn, &result.updates)?;
            (result.updates, result.warnings)
        } else {
            (Vec::new(), Vec::new())
        };

        let deviation = if actor.records_deviations() {
            let order = OrderRepo::get(conn, &before.order_id)?;
            let entry = deviation::describe(before, &order.name, actor, transition, now);
            DeviationRepo::append(conn, &entry)?;
            Some(entry)
        } else {
            None
        };

        Ok(TransitionOutcome {
            operation: OperationRepo::get(conn, &before.id)?,
            updates,
            warnings,
            deviation,
        })
    }
}

fn validate_start(conn: &Connection, request: &StartRequest) -> Result<(), SchedulerError> {
    if request.executor_ids.is_empty() {
        return Err(SchedulerError::Validation(
            "at least one executor is required".into(),
        ));
    }
    if !CatalogRepo::shop_exists(conn, &request.shop_id)? {
        return Err(SchedulerError::Validation(format!(
            "unknown shop {}",
            request.shop_id
        )));
    }
    let missing = CatalogRepo::missing_executors(conn, &request.executor_ids)?;
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(ExecutorId::as_str).collect();
        return Err(SchedulerError::Validation(format!(
            "unknown executors: {}",
            names.join(", ")
        )));
    }
    Ok(())
}
