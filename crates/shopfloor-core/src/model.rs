use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DeviationId, ExecutorId, OperationId, OrderId, ShopId, UserId};

/// Derived execution state of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Planned,
    InProgress,
    Completed,
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planned => write!(f, "planned"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// The two lifecycle events an operation goes through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Start,
    End,
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::End => write!(f, "end"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub name: String,
    pub description: String,
    /// Advisory only. Nothing in the scheduler reads it.
    pub deadline: Option<DateTime<Utc>>,
    pub default_master: Option<UserId>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewOrder {
    pub name: String,
    pub description: String,
    pub deadline: Option<DateTime<Utc>>,
    pub default_master: Option<UserId>,
}

/// The scheduling unit. Chain links are stored as ids, never as references:
/// `next_operation` is owned and settable, `previous_operation` is derived
/// from whichever operation names this one as its next.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub order_id: OrderId,
    pub name: String,
    pub description: Option<String>,
    pub shop_id: Option<ShopId>,
    pub master: Option<UserId>,
    pub executors: Vec<ExecutorId>,
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
    pub predict_start: Option<DateTime<Utc>>,
    pub predict_end: Option<DateTime<Utc>>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    pub next_operation: Option<OperationId>,
    pub previous_operation: Option<OperationId>,
}

impl Operation {
    /// Planned length of the operation. Every projection assumes the
    /// operation takes exactly this long, whenever it starts.
    pub fn duration(&self) -> Option<Duration> {
        match (self.planned_start, self.planned_end) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Length of the slot this operation occupies in a projection. Missing or
    /// negative durations collapse to zero.
    pub fn slot(&self) -> Duration {
        self.duration()
            .filter(|d| *d >= Duration::zero())
            .unwrap_or_else(Duration::zero)
    }

    pub fn status(&self) -> OperationStatus {
        if self.actual_end.is_some() {
            OperationStatus::Completed
        } else if self.actual_start.is_some() {
            OperationStatus::InProgress
        } else {
            OperationStatus::Planned
        }
    }

    pub fn is_root(&self) -> bool {
        self.previous_operation.is_none()
    }

    pub fn is_tail(&self) -> bool {
        self.next_operation.is_none()
    }
}

/// Input for creating an operation. The plan is mandatory here even though
/// stored rows tolerate missing plan timestamps.
#[derive(Clone, Debug)]
pub struct NewOperation {
    pub order_id: OrderId,
    pub name: String,
    pub description: Option<String>,
    pub shop_id: Option<ShopId>,
    pub master: Option<UserId>,
    pub executors: Vec<ExecutorId>,
    pub planned_start: DateTime<Utc>,
    pub planned_end: DateTime<Utc>,
    pub predict_start: Option<DateTime<Utc>>,
    pub predict_end: Option<DateTime<Utc>>,
    pub next_operation: Option<OperationId>,
}

/// A fresh forecast for one operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionUpdate {
    pub operation_id: OperationId,
    pub predict_start: DateTime<Utc>,
    pub predict_end: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationKind {
    LateStart,
    LateStop,
    AheadStart,
    AheadStop,
}

impl DeviationKind {
    pub fn classify(transition: Transition, late: bool) -> Self {
        match (transition, late) {
            (Transition::Start, true) => Self::LateStart,
            (Transition::Start, false) => Self::AheadStart,
            (Transition::End, true) => Self::LateStop,
            (Transition::End, false) => Self::AheadStop,
        }
    }

    pub fn is_late(self) -> bool {
        matches!(self, Self::LateStart | Self::LateStop)
    }
}

impl std::fmt::Display for DeviationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LateStart => write!(f, "late_start"),
            Self::LateStop => write!(f, "late_stop"),
            Self::AheadStart => write!(f, "ahead_start"),
            Self::AheadStop => write!(f, "ahead_stop"),
        }
    }
}

impl std::str::FromStr for DeviationKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "late_start" => Ok(Self::LateStart),
            "late_stop" => Ok(Self::LateStop),
            "ahead_start" => Ok(Self::AheadStart),
            "ahead_stop" => Ok(Self::AheadStop),
            other => Err(format!("unknown deviation kind: {other}")),
        }
    }
}

/// Append-only record of how far a transition strayed from the plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviationEntry {
    pub id: DeviationId,
    pub logged_at: DateTime<Utc>,
    pub actor: UserId,
    pub description: String,
    pub kind: DeviationKind,
    pub operation_id: OperationId,
}
