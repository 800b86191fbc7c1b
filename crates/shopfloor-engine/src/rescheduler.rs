use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use shopfloor_core::ids::OperationId;
use shopfloor_core::{Operation, PredictionUpdate};

use crate::chain::{ChainArena, ChainWalk, IntegrityWarning};

/// What caused a propagation, and so which anchor timestamp it starts from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RescheduleTrigger {
    /// Anchor just started; downstream follows its fresh predicted end.
    Started,
    /// Anchor just finished; downstream follows its actual end.
    Ended,
    /// Periodic refresh with no transition involved.
    Refresh,
}

impl RescheduleTrigger {
    pub fn reference(self, anchor: &Operation) -> Option<DateTime<Utc>> {
        match self {
            Self::Started => anchor.predict_end,
            Self::Ended => anchor.actual_end,
            Self::Refresh => reference_end(anchor),
        }
    }
}

/// Best current estimate of when `anchor` finishes: the actual end, else
/// actual start plus planned duration, else the forecast, else the plan.
pub fn reference_end(anchor: &Operation) -> Option<DateTime<Utc>> {
    anchor
        .actual_end
        .or_else(|| anchor.actual_start.map(|start| start + anchor.slot()))
        .or(anchor.predict_end)
        .or(anchor.planned_end)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Reschedule {
    pub updates: Vec<PredictionUpdate>,
    pub warnings: Vec<IntegrityWarning>,
}

/// Push new forecasts down the chain after `anchor`, one hop at a time.
/// Each successor starts when the previous one is forecast to end and
/// keeps its planned duration. The anchor itself is left untouched, and
/// so are actual timestamps. Completed successors are re-forecast too.
pub fn reschedule(
    arena: &mut ChainArena,
    anchor: &OperationId,
    reference: DateTime<Utc>,
) -> Reschedule {
    let mut walk = ChainWalk::new();
    let downstream = walk.forward(arena, anchor);
    let mut updates = Vec::with_capacity(downstream.len());
    let mut cursor = reference;

    for id in downstream {
        let Some(op) = arena.get_mut(&id) else {
            continue;
        };
        let predict_start = cursor;
        let predict_end = predict_start + op.slot();
        op.predict_start = Some(predict_start);
        op.predict_end = Some(predict_end);
        debug!(operation_id = %id, %predict_start, %predict_end, "forecast moved");
        updates.push(PredictionUpdate {
            operation_id: id,
            predict_start,
            predict_end,
        });
        cursor = predict_end;
    }

    Reschedule {
        updates,
        warnings: walk.into_warnings(),
    }
}

/// Reschedule from `anchor` using the reference the trigger calls for.
/// Nothing moves when the anchor is unknown or has no usable timestamp.
pub fn reschedule_for(
    arena: &mut ChainArena,
    anchor: &OperationId,
    trigger: RescheduleTrigger,
) -> Reschedule {
    match arena.get(anchor).and_then(|op| trigger.reference(op)) {
        Some(reference) => reschedule(arena, anchor, reference),
        None => Reschedule::default(),
    }
}
