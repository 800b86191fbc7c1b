//! Entity ids for the shop floor.
//!
//! Every id is a `<prefix>_<uuid-v7>` string: `ord_` orders, `op_`
//! operations, `shop_` assembly shops, `exec_` executors, `usr_` actors and
//! `dev_` deviation log entries. UUID v7 is time-ordered, so ids created
//! later compare greater; the sequencer relies on that to break ties
//! between operations planned for the same instant.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Newtype over the id string with a fixed entity prefix. `from_raw` takes
/// stored or user-supplied ids verbatim and does not check the prefix.
macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(OrderId, "ord");
branded_id!(OperationId, "op");
branded_id!(ShopId, "shop");
branded_id!(ExecutorId, "exec");
branded_id!(UserId, "usr");
branded_id!(DeviationId, "dev");
