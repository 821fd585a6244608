//! Derive macros for pgbatch
//!
//! Provides the `#[derive(Record)]` macro.

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod attrs;
mod record;

/// Derive the `Record` trait for a struct, describing it as a database row.
///
/// Field annotations are carried as a comma separated token list in a string
/// literal, read from the first present of the `db`, `sql` and `gorm`
/// attributes (in that order):
///
/// ```ignore
/// use pgbatch::Record;
/// use chrono::NaiveDateTime;
///
/// #[derive(Record, Default)]
/// struct Account {
///     #[db("primary_key")]
///     id: i64,
///     #[db("column:display_name")]
///     name: String,
///     #[db("created")]
///     created_at: NaiveDateTime,
///     #[db("updated")]
///     updated_at: NaiveDateTime,
///     #[db("-")]
///     cached_score: f64,
/// }
/// ```
///
/// # Recognized tokens
///
/// - `primary_key` - mark the field as part of the primary key
/// - `column:<name>` - override the column name (default: snake-cased field name)
/// - `-` - skip the field entirely
/// - `created` - stamp with the batch time on INSERT/UPSERT; the field type
///   must be a timestamp or nullable timestamp
/// - `updated` - stamp with the batch time on INSERT/UPSERT/UPDATE; same type
///   requirement
/// - `default` - on INSERT, emit `DEFAULT` instead of the field value
/// - `flatten` - splice the fields of a nested `Record` in place
/// - `group:<g>` - with `flatten`, assign the group label to all spliced fields
///
/// Unknown tokens are ignored.
#[proc_macro_derive(Record, attributes(db, sql, gorm))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    record::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
