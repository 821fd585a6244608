//! Convenient imports for typical `pgbatch` usage.
//!
//! ```ignore
//! use pgbatch::prelude::*;
//! ```

pub use crate::{Batch, BatchError, BatchResult, Connection, Expr, QueryBuilder, SortDir, Value};
pub use crate::{Record, SqlField, StructInfo};

#[cfg(feature = "pool")]
pub use crate::PoolClient;
