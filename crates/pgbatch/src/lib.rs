//! # pgbatch
//!
//! A statement-batching SQL client for CockroachDB-flavored Postgres.
//!
//! ## Features
//!
//! - **Record descriptors**: `#[derive(Record)]` maps a struct to an ordered
//!   column schema with per-field codecs
//! - **Statement synthesis**: `INSERT`/`UPSERT` (single and bulk), `UPDATE`
//!   and `DELETE` scoped by primary key, `DELETE` scoped by predicate, and a
//!   SELECT builder with predicates, ordering, pagination and raw templates
//! - **One round trip**: write statements are concatenated and sent as a
//!   single multi-statement text ending each statement with
//!   `RETURNING NOTHING`; read statements run concurrently and scan their
//!   rows back into caller structures
//! - **Literal SQL by design**: values are embedded as bit-exact literals
//!   through one shared formatter table; there are no placeholders on the
//!   wire
//! - **Transaction-friendly**: batches run against a `Client` or a
//!   `Transaction`, and can wrap themselves in `BEGIN; …; COMMIT`
//!
//! ## Example
//!
//! ```ignore
//! use pgbatch::{Batch, Record};
//!
//! #[derive(Record, Default)]
//! struct User {
//!     #[db("primary_key")]
//!     id: i64,
//!     name: String,
//! }
//!
//! let mut b = Batch::new();
//! b.insert(&mut User { id: 1, name: "ada".into() });
//! b.run(&client).await?;
//!
//! let mut user = User::default();
//! let mut b = Batch::new();
//! b.select(b.query().into_one(&mut user).filter_fmt("id = ?", [1]));
//! b.run(&client).await?;
//! ```

// Lets derive-generated `::pgbatch::` paths resolve inside this crate's own
// tests and docs.
extern crate self as pgbatch;

mod batch;
mod bulk;
mod client;
mod error;
mod expr;
mod field;
mod literal;
pub mod prelude;
mod query;
mod read;
mod schema;
mod value;

pub use batch::Batch;
pub use bulk::BulkWriter;
pub use client::Connection;
pub use error::{BatchError, BatchResult, MultiError};
pub use expr::Expr;
pub use field::{FieldCodec, FieldDef, FieldFlags, SqlField};
pub use literal::quote_ident;
pub use query::{QueryBuilder, SortDir};
pub use schema::{CodecResolver, FieldInfo, FieldProbe, Record, StructInfo};
pub use value::Value;

#[cfg(feature = "pool")]
pub use client::PoolClient;

#[cfg(feature = "derive")]
pub use pgbatch_derive::Record;

// Re-export the driver so callers and generated code can name its types.
pub use tokio_postgres;
