use shopfloor_core::ids::OperationId;
use shopfloor_core::AccessDenied;
use shopfloor_store::{StoreError, TxError};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("operation {0} already started")]
    AlreadyStarted(OperationId),

    #[error("operation {0} has not started")]
    NotStarted(OperationId),

    #[error("operation {0} already completed")]
    AlreadyCompleted(OperationId),

    #[error("access denied: {0}")]
    Authorization(#[from] AccessDenied),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl SchedulerError {
    /// Stable classification string for callers that map errors onto
    /// status codes or exit codes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_input",
            Self::AlreadyStarted(_) => "already_started",
            Self::NotStarted(_) => "not_started",
            Self::AlreadyCompleted(_) => "already_completed",
            Self::Authorization(AccessDenied::NotAssigned { .. }) => "not_assigned",
            Self::Authorization(AccessDenied::RoleNotPermitted { .. }) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Store(e) if e.is_busy() => "busy",
            Self::Store(_) => "store",
        }
    }

    pub fn is_state_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadyStarted(_) | Self::NotStarted(_) | Self::AlreadyCompleted(_)
        )
    }
}

impl From<StoreError> for SchedulerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(what),
            other => Self::Store(other),
        }
    }
}

impl TxError for SchedulerError {
    fn is_busy(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_busy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopfloor_core::Role;

    #[test]
    fn kinds_are_stable() {
        let id = OperationId::from_raw("op_1");
        assert_eq!(SchedulerError::AlreadyStarted(id.clone()).kind(), "already_started");
        assert_eq!(SchedulerError::NotStarted(id.clone()).kind(), "not_started");
        assert_eq!(SchedulerError::AlreadyCompleted(id).kind(), "already_completed");
        assert_eq!(SchedulerError::Validation("x".into()).kind(), "invalid_input");
        assert_eq!(
            SchedulerError::from(AccessDenied::NotAssigned {
                username: "m".into(),
                operation: "op_1".into(),
            })
            .kind(),
            "not_assigned"
        );
        assert_eq!(
            SchedulerError::from(AccessDenied::RoleNotPermitted {
                role: Role::Observer,
                action: "start operations",
            })
            .kind(),
            "forbidden"
        );
    }

    #[test]
    fn store_not_found_surfaces_as_not_found() {
        let err = SchedulerError::from(StoreError::NotFound("operation op_9".into()));
        assert!(matches!(err, SchedulerError::NotFound(_)));
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn busy_store_errors_are_retryable() {
        let busy = SchedulerError::from(StoreError::Busy("locked".into()));
        assert!(TxError::is_busy(&busy));
        assert_eq!(busy.kind(), "busy");
        assert!(!TxError::is_busy(&SchedulerError::Validation("no".into())));
    }

    #[test]
    fn state_conflicts_are_grouped() {
        assert!(SchedulerError::NotStarted(OperationId::new()).is_state_conflict());
        assert!(!SchedulerError::NotFound("x".into()).is_state_conflict());
    }
}
