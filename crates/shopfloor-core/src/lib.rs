pub mod clock;
pub mod ids;
pub mod model;
pub mod roles;

pub use clock::{Clock, FixedClock, SystemClock};
pub use model::{
    DeviationEntry, DeviationKind, NewOperation, NewOrder, Operation, OperationStatus, Order,
    PredictionUpdate, Transition,
};
pub use roles::{AccessDenied, Role, User};
