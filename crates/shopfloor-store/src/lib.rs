pub mod catalog;
pub mod database;
pub mod deviations;
pub mod error;
pub mod operations;
pub mod orders;
pub mod row_helpers;
pub mod schema;
pub mod users;

pub use database::{Database, TxError};
pub use error::StoreError;
pub use rusqlite::Connection;
