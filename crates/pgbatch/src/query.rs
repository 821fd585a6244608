//! SELECT query builder.
//!
//! A [`QueryBuilder`] is allocated from a batch with [`Batch::query`]
//! (which counts it as pending) and describes one read: destination, table,
//! predicates, ordering, pagination, and optionally a raw statement
//! template. Submitting it with [`Batch::select`] renders the SQL and
//! registers the read; a builder that is allocated but never submitted
//! makes [`Batch::run`] panic.
//!
//! [`Batch::query`]: crate::Batch::query
//! [`Batch::select`]: crate::Batch::select
//! [`Batch::run`]: crate::Batch::run

use std::fmt::Write as _;
use std::sync::Arc;

use tokio_postgres::types::FromSql;

use crate::error::BatchError;
use crate::expr::Expr;
use crate::literal::{quote_ident, ListWriter};
use crate::read::{ReadDest, ReadSpec};
use crate::schema::{CodecResolver, Record, StructInfo};
use crate::value::Value;

/// ORDER BY direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

/// Builder for one read of a batch.
pub struct QueryBuilder<'a> {
    table: Option<String>,
    fields: Option<Vec<String>>,
    dest: Option<ReadDest<'a>>,
    where_exprs: Vec<Expr>,
    order_by: Vec<(String, SortDir)>,
    limit: Option<i64>,
    offset: Option<i64>,
    prefix: Option<String>,
    raw: Option<Expr>,
    err_slot: Option<&'a mut Option<BatchError>>,
    resolver: Option<Arc<CodecResolver>>,
}

impl<'a> QueryBuilder<'a> {
    pub(crate) fn new(resolver: Option<Arc<CodecResolver>>) -> Self {
        QueryBuilder {
            table: None,
            fields: None,
            dest: None,
            where_exprs: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            prefix: None,
            raw: None,
            err_slot: None,
            resolver,
        }
    }

    /// Set the target table explicitly (quoted here). Without it, the table
    /// derives from the destination record type.
    pub fn table(mut self, name: &str) -> Self {
        self.table = Some(quote_ident(name));
        self
    }

    /// Set the target table from a record type's derived name.
    pub fn table_of<T: Record>(mut self) -> Self {
        let si = StructInfo::resolve::<T>(self.resolver.as_ref());
        self.table = Some(si.quoted_name.clone());
        self
    }

    /// Explicit column projection, written verbatim. Only valid with
    /// primitive destinations, which bind the projected column directly.
    pub fn fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Read the first result row into one record.
    pub fn into_one<T: Record>(mut self, dest: &'a mut T) -> Self {
        let si = StructInfo::resolve::<T>(self.resolver.as_ref());
        self.dest = Some(ReadDest::One { si, target: dest });
        self
    }

    /// Read all result rows into a vector of records.
    pub fn into_many<T: Record + Default>(mut self, dest: &'a mut Vec<T>) -> Self {
        let si = StructInfo::resolve::<T>(self.resolver.as_ref());
        self.dest = Some(ReadDest::Many { si, target: dest });
        self
    }

    /// Read the first column of the first row into a primitive.
    pub fn into_value<P>(mut self, dest: &'a mut P) -> Self
    where
        P: for<'r> FromSql<'r> + Send,
    {
        self.dest = Some(ReadDest::Value { target: dest });
        self
    }

    /// Read the first column of every row into a vector of primitives.
    pub fn into_values<P>(mut self, dest: &'a mut Vec<P>) -> Self
    where
        P: for<'r> FromSql<'r> + Send,
    {
        self.dest = Some(ReadDest::Values { target: dest });
        self
    }

    /// Add a WHERE fragment; fragments are joined with ` AND `.
    pub fn filter(mut self, expr: impl Into<Expr>) -> Self {
        self.where_exprs.push(expr.into());
        self
    }

    /// Shorthand for `filter(Expr::fmt(text, args))`.
    pub fn filter_fmt<V: Into<Value>>(
        self,
        text: &str,
        args: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filter(Expr::fmt(text, args))
    }

    /// Add an ORDER BY entry. Against a record destination the column must
    /// exist in the record's schema.
    pub fn order_by(mut self, column: &str, dir: SortDir) -> Self {
        self.order_by.push((column.to_string(), dir));
        self
    }

    pub fn limit(mut self, v: i64) -> Self {
        self.limit = Some(v);
        self
    }

    pub fn offset(mut self, v: i64) -> Self {
        self.offset = Some(v);
        self
    }

    /// Alias the table (`FROM <table> AS <prefix>`) and prefix every
    /// projected column with it.
    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    /// Replace the rendered statement with a raw template. `:columns:` and
    /// `:table:` expand to the projected column list and the resolved table
    /// name; other `:word:` occurrences are left untouched.
    pub fn raw(mut self, expr: impl Into<Expr>) -> Self {
        self.raw = Some(expr.into());
        self
    }

    /// Shorthand for `raw(Expr::fmt(text, args))`.
    pub fn raw_fmt<V: Into<Value>>(self, text: &str, args: impl IntoIterator<Item = V>) -> Self {
        self.raw(Expr::fmt(text, args))
    }

    /// Provide a slot that receives [`BatchError::NotFound`] when a single
    /// destination matches no rows.
    pub fn with_err(mut self, slot: &'a mut Option<BatchError>) -> Self {
        self.err_slot = Some(slot);
        self
    }

    /// Render the statement and turn the builder into the batch's read spec.
    pub(crate) fn into_read_spec(mut self) -> ReadSpec<'a> {
        let dest = self
            .dest
            .take()
            .expect("query has no destination; call into_one()/into_many()/into_value()/into_values() before submitting it");

        let si = dest.struct_info();
        if dest.is_primitive() {
            assert!(
                self.fields.is_some(),
                "primitive destinations need an explicit column projection; call fields()"
            );
            assert!(
                self.table.is_some(),
                "table must be specified explicitly when using fields()"
            );
        } else {
            assert!(
                self.fields.is_none(),
                "fields() requires a primitive destination; record destinations project the whole schema"
            );
        }

        let mut stmt = String::new();
        if let Some(raw) = &self.raw {
            let mut rendered = String::new();
            raw.write_to(&mut rendered);
            self.expand_raw(&rendered, si, &mut stmt);
        } else {
            // Single destinations default to one row.
            let limit = if dest.is_slice() {
                self.limit
            } else {
                self.limit.or(Some(1))
            };
            stmt.push_str("SELECT ");
            self.write_columns(&mut stmt, si);
            stmt.push_str(" FROM ");
            self.write_table_name(&mut stmt, si);
            self.write_tail_inner(&mut stmt, si, limit);
        }

        ReadSpec {
            stmt,
            dest,
            err_slot: self.err_slot,
        }
    }

    /// The WHERE/ORDER BY/LIMIT/OFFSET tail, as used by predicate DELETE.
    pub(crate) fn write_tail(&self, buf: &mut String, si: Option<&StructInfo>) {
        self.write_tail_inner(buf, si, self.limit);
    }

    pub(crate) fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    fn write_tail_inner(&self, buf: &mut String, si: Option<&StructInfo>, limit: Option<i64>) {
        let live: Vec<&Expr> = self.where_exprs.iter().filter(|e| !e.is_empty()).collect();
        if !live.is_empty() {
            buf.push_str(" WHERE ");
            for (i, w) in live.iter().enumerate() {
                if i != 0 {
                    buf.push_str(" AND ");
                }
                w.write_to(buf);
            }
        }

        if !self.order_by.is_empty() {
            buf.push_str(" ORDER BY ");
            for (i, (column, dir)) in self.order_by.iter().enumerate() {
                if i != 0 {
                    buf.push_str(", ");
                }
                match si {
                    Some(si) => {
                        let field = si.find_field(column).unwrap_or_else(|| {
                            panic!("unknown column: {} (in table: {})", column, si.quoted_name)
                        });
                        buf.push_str(&field.quoted_name);
                    }
                    None => buf.push_str(&quote_ident(column)),
                }
                buf.push_str(match dir {
                    SortDir::Asc => " ASC",
                    SortDir::Desc => " DESC",
                });
            }
        }

        if let Some(limit) = limit {
            let _ = write!(buf, " LIMIT {limit}");
        }
        if let Some(offset) = self.offset {
            let _ = write!(buf, " OFFSET {offset}");
        }
    }

    fn write_columns(&self, buf: &mut String, si: Option<&StructInfo>) {
        let mut lw = ListWriter::new(buf);
        match (&self.fields, si) {
            (Some(fields), _) => {
                for f in fields {
                    let item = lw.item();
                    if let Some(prefix) = &self.prefix {
                        item.push_str(prefix);
                        item.push('.');
                    }
                    item.push_str(f);
                }
            }
            (None, Some(si)) => {
                for f in &si.fields {
                    let item = lw.item();
                    if let Some(prefix) = &self.prefix {
                        item.push_str(prefix);
                        item.push('.');
                    }
                    item.push_str(&f.quoted_name);
                }
            }
            (None, None) => unreachable!("destination shape checked at submit"),
        }
    }

    fn write_table_name(&self, buf: &mut String, si: Option<&StructInfo>) {
        match (&self.table, si) {
            (Some(table), _) => buf.push_str(table),
            (None, Some(si)) => buf.push_str(&si.quoted_name),
            (None, None) => unreachable!("destination shape checked at submit"),
        }
        if let Some(prefix) = &self.prefix {
            buf.push_str(" AS ");
            buf.push_str(prefix);
        }
    }

    /// Expand `:columns:` and `:table:` in a rendered raw template.
    fn expand_raw(&self, rendered: &str, si: Option<&StructInfo>, out: &mut String) {
        let bytes = rendered.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b':' {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j].is_ascii_lowercase() {
                    j += 1;
                }
                if j > i + 1 && j < bytes.len() && bytes[j] == b':' {
                    match &rendered[i + 1..j] {
                        "columns" => self.write_columns(out, si),
                        "table" => self.write_table_name(out, si),
                        // Unrecognized markers pass through untouched.
                        other => {
                            out.push(':');
                            out.push_str(other);
                            out.push(':');
                        }
                    }
                    i = j + 1;
                    continue;
                }
            }
            // Advance one UTF-8 character.
            let ch_len = rendered[i..].chars().next().map_or(1, char::len_utf8);
            out.push_str(&rendered[i..i + ch_len]);
            i += ch_len;
        }
    }
}
