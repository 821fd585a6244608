//! The statement batch.
//!
//! A [`Batch`] accumulates statements and executes them in one round trip.
//! Write statements (INSERT/UPSERT/UPDATE/DELETE/raw) are concatenated with
//! `"; "` and sent as a single multi-statement text through
//! [`Connection::exec`]; read statements are dispatched concurrently, one
//! query per committed [`QueryBuilder`], and their rows scanned back into
//! the caller's destinations. A batch must be all writes or all reads.
//!
//! A batch is one-shot: build it up, then [`run`](Batch::run) consumes it.
//!
//! ```ignore
//! use pgbatch::{Batch, Record};
//!
//! let mut b = Batch::new();
//! b.insert(&mut user).update(&mut account);
//! b.run(&client).await?;
//! ```

use std::any::Any;
use std::cell::Cell;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;

use crate::bulk::BulkWriter;
use crate::client::Connection;
use crate::error::{BatchError, BatchResult, MultiError};
use crate::expr::Expr;
use crate::literal::{quote_ident, ListWriter};
use crate::query::QueryBuilder;
use crate::read::ReadSpec;
use crate::schema::{CodecResolver, Record, StructInfo};
use crate::value::Value;

/// A one-shot accumulator of SQL statements.
#[derive(Default)]
pub struct Batch<'a> {
    transaction: bool,
    stmt_buf: String,
    now_fn: Option<Box<dyn Fn() -> DateTime<Utc> + Send + Sync>>,
    now: Option<DateTime<Utc>>,
    read_specs: Vec<ReadSpec<'a>>,
    resolver: Option<Arc<CodecResolver>>,
    // Cell so query() can hand out builders from a shared borrow while the
    // batch is being composed; batches are single-threaded until run.
    pending_qs: Cell<usize>,
    write_stmts: usize,
}

impl<'a> Batch<'a> {
    pub fn new() -> Self {
        Batch::default()
    }

    /// Use a caller-supplied clock for `created`/`updated` stamping.
    ///
    /// The batch asks the clock once, on the first statement that needs a
    /// stamp, and reuses that instant for the whole batch.
    pub fn set_now_fn(&mut self, f: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> &mut Self {
        self.now_fn = Some(Box::new(f));
        self
    }

    /// Install a codec override hook, consulted before the generated codec
    /// of every field (see [`CodecResolver`]).
    pub fn set_codec_resolver(&mut self, r: Arc<CodecResolver>) -> &mut Self {
        self.resolver = Some(r);
        self
    }

    /// Wrap the rendered write statements in `BEGIN; …; COMMIT`.
    pub fn transaction(&mut self) -> &mut Self {
        self.transaction = true;
        self
    }

    fn now(&mut self) -> DateTime<Utc> {
        if let Some(now) = self.now {
            return now;
        }
        let now = match &self.now_fn {
            Some(f) => f(),
            None => Utc::now(),
        };
        self.now = Some(now);
        now
    }

    pub(crate) fn stamp_time(&mut self) -> DateTime<Utc> {
        self.now()
    }

    pub(crate) fn resolver(&self) -> Option<&Arc<CodecResolver>> {
        self.resolver.as_ref()
    }

    pub(crate) fn track_nested(&self) {
        self.pending_qs.set(self.pending_qs.get() + 1);
    }

    pub(crate) fn untrack_nested(&self) {
        self.pending_qs.set(self.pending_qs.get().saturating_sub(1));
    }

    pub(crate) fn begin_next_stmt(&mut self) -> &mut String {
        self.write_stmts += 1;
        if !self.stmt_buf.is_empty() {
            self.stmt_buf.push_str("; ");
        }
        &mut self.stmt_buf
    }

    /// Append an arbitrary statement as a write.
    pub fn raw(&mut self, expr: impl Into<Expr>) -> &mut Self {
        let expr = expr.into();
        let sb = self.begin_next_stmt();
        expr.write_to(sb);
        self
    }

    /// Shorthand for `raw(Expr::fmt(text, args))`.
    pub fn raw_fmt<V: Into<Value>>(
        &mut self,
        text: &str,
        args: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        self.raw(Expr::fmt(text, args))
    }

    /// `INSERT INTO <record table> (…) VALUES (…) RETURNING NOTHING`.
    ///
    /// `created`/`updated` fields are stamped into the record first;
    /// `default`-tagged fields emit `DEFAULT` instead of their value.
    pub fn insert<T: Record>(&mut self, v: &mut T) -> &mut Self {
        self.sert("INSERT", v, None)
    }

    /// [`insert`](Batch::insert) with an explicit table name.
    pub fn insert_into<T: Record>(&mut self, v: &mut T, table: &str) -> &mut Self {
        self.sert("INSERT", v, Some(table))
    }

    /// `UPSERT INTO … RETURNING NOTHING`. Unlike INSERT, `default`-tagged
    /// fields emit their value.
    pub fn upsert<T: Record>(&mut self, v: &mut T) -> &mut Self {
        self.sert("UPSERT", v, None)
    }

    /// [`upsert`](Batch::upsert) with an explicit table name.
    pub fn upsert_into<T: Record>(&mut self, v: &mut T, table: &str) -> &mut Self {
        self.sert("UPSERT", v, Some(table))
    }

    /// Bulk INSERT: one statement with a VALUES group per record.
    /// An empty slice appends nothing.
    pub fn insert_many<T: Record>(&mut self, vs: &mut [T]) -> &mut Self {
        self.sert_many("INSERT", vs, None)
    }

    /// [`insert_many`](Batch::insert_many) with an explicit table name.
    pub fn insert_many_into<T: Record>(&mut self, vs: &mut [T], table: &str) -> &mut Self {
        self.sert_many("INSERT", vs, Some(table))
    }

    /// Bulk UPSERT.
    pub fn upsert_many<T: Record>(&mut self, vs: &mut [T]) -> &mut Self {
        self.sert_many("UPSERT", vs, None)
    }

    /// [`upsert_many`](Batch::upsert_many) with an explicit table name.
    pub fn upsert_many_into<T: Record>(&mut self, vs: &mut [T], table: &str) -> &mut Self {
        self.sert_many("UPSERT", vs, Some(table))
    }

    fn sert<T: Record>(&mut self, verb: &str, v: &mut T, table: Option<&str>) -> &mut Self {
        let si = StructInfo::resolve::<T>(self.resolver.as_ref());
        let now = self.now();
        let insert = verb == "INSERT";

        let sb = self.begin_next_stmt();
        sb.push_str(verb);
        sb.push_str(" INTO ");
        write_table_name(si, table, sb);
        sb.push_str(" (");
        let mut names = ListWriter::new(sb);
        for f in &si.fields {
            names.push(&f.quoted_name);
        }
        sb.push_str(") VALUES (");
        write_field_values(si, v, sb, now, insert);
        sb.push_str(") RETURNING NOTHING");
        self
    }

    fn sert_many<T: Record>(&mut self, verb: &str, vs: &mut [T], table: Option<&str>) -> &mut Self {
        if vs.is_empty() {
            return self;
        }
        let si = StructInfo::resolve::<T>(self.resolver.as_ref());
        let now = self.now();
        let insert = verb == "INSERT";

        let sb = self.begin_next_stmt();
        sb.push_str(verb);
        sb.push_str(" INTO ");
        write_table_name(si, table, sb);
        sb.push_str(" (");
        let mut names = ListWriter::new(sb);
        for f in &si.fields {
            names.push(&f.quoted_name);
        }
        sb.push_str(") VALUES ");
        for (i, v) in vs.iter_mut().enumerate() {
            if i != 0 {
                sb.push_str(", ");
            }
            sb.push('(');
            write_field_values(si, v, sb, now, insert);
            sb.push(')');
        }
        sb.push_str(" RETURNING NOTHING");
        self
    }

    /// Open an incremental bulk INSERT over records of `T`
    /// (see [`BulkWriter`]).
    pub fn bulk_inserter<T: Record>(&mut self) -> BulkWriter<'_, 'a, T> {
        BulkWriter::new(self, "INSERT")
    }

    /// Open an incremental bulk UPSERT over records of `T`.
    pub fn bulk_upserter<T: Record>(&mut self) -> BulkWriter<'_, 'a, T> {
        BulkWriter::new(self, "UPSERT")
    }

    /// Run a closure against a fresh bulk inserter and commit it.
    pub fn with_bulk_inserter<T: Record>(
        &mut self,
        cb: impl FnOnce(&mut BulkWriter<'_, 'a, T>),
    ) -> &mut Self {
        let mut bulk = self.bulk_inserter::<T>();
        cb(&mut bulk);
        bulk.commit();
        self
    }

    /// Run a closure against a fresh bulk upserter and commit it.
    pub fn with_bulk_upserter<T: Record>(
        &mut self,
        cb: impl FnOnce(&mut BulkWriter<'_, 'a, T>),
    ) -> &mut Self {
        let mut bulk = self.bulk_upserter::<T>();
        cb(&mut bulk);
        bulk.commit();
        self
    }

    /// `UPDATE <table> SET <non-pk fields> WHERE <pk fields> RETURNING
    /// NOTHING`. Panics if the record type has no primary keys.
    pub fn update<T: Record>(&mut self, v: &mut T) -> &mut Self {
        self.update_impl(v, None)
    }

    /// [`update`](Batch::update) with an explicit table name.
    pub fn update_into<T: Record>(&mut self, v: &mut T, table: &str) -> &mut Self {
        self.update_impl(v, Some(table))
    }

    fn update_impl<T: Record>(&mut self, v: &mut T, table: Option<&str>) -> &mut Self {
        let si = StructInfo::resolve::<T>(self.resolver.as_ref());
        assert_has_primary_keys(si);
        let now = self.now();

        let rec: &mut dyn Any = v;
        let sb = self.begin_next_stmt();
        sb.push_str("UPDATE ");
        write_table_name(si, table, sb);
        sb.push_str(" SET ");
        let mut sets = ListWriter::new(sb);
        for f in si.non_primary_keys() {
            if f.is_updated() {
                (f.codec.set)(rec, now);
            }
            let item = sets.item();
            item.push_str(&f.quoted_name);
            item.push_str(" = ");
            (f.codec.emit)(&*rec, item);
        }
        sb.push_str(" WHERE ");
        write_primary_keys_where(si, &*rec, sb);
        sb.push_str(" RETURNING NOTHING");
        self
    }

    /// `DELETE FROM <table> WHERE <pk fields> RETURNING NOTHING`.
    /// Panics if the record type has no primary keys.
    pub fn delete<T: Record>(&mut self, v: &T) -> &mut Self {
        self.delete_impl(v, None)
    }

    /// [`delete`](Batch::delete) with an explicit table name.
    pub fn delete_from<T: Record>(&mut self, v: &T, table: &str) -> &mut Self {
        self.delete_impl(v, Some(table))
    }

    fn delete_impl<T: Record>(&mut self, v: &T, table: Option<&str>) -> &mut Self {
        let si = StructInfo::resolve::<T>(self.resolver.as_ref());
        assert_has_primary_keys(si);

        let rec: &dyn Any = v;
        let sb = self.begin_next_stmt();
        sb.push_str("DELETE FROM ");
        write_table_name(si, table, sb);
        sb.push_str(" WHERE ");
        write_primary_keys_where(si, rec, sb);
        sb.push_str(" RETURNING NOTHING");
        self
    }

    /// `DELETE FROM <table> <tail> RETURNING NOTHING`, with the WHERE/ORDER
    /// BY/LIMIT/OFFSET tail taken from a query builder. The table must be
    /// set on the builder (`table()` / `table_of()`); this commits it.
    pub fn delete_matching(&mut self, q: QueryBuilder<'a>) -> &mut Self {
        self.pending_qs.set(self.pending_qs.get().saturating_sub(1));
        let table = q
            .table_name()
            .expect("delete_matching needs a table; set it on the query builder via table() or table_of()")
            .to_string();

        let sb = self.begin_next_stmt();
        sb.push_str("DELETE FROM ");
        sb.push_str(&table);
        q.write_tail(sb, None);
        sb.push_str(" RETURNING NOTHING");
        self
    }

    /// Allocate a read builder. Every allocated builder must be submitted
    /// back with [`select`](Batch::select) (or
    /// [`delete_matching`](Batch::delete_matching)) before the batch runs.
    pub fn query(&self) -> QueryBuilder<'a> {
        self.pending_qs.set(self.pending_qs.get() + 1);
        QueryBuilder::new(self.resolver.clone())
    }

    /// Commit a read builder: render its statement and register the read.
    pub fn select(&mut self, q: QueryBuilder<'a>) -> &mut Self {
        self.pending_qs.set(self.pending_qs.get().saturating_sub(1));
        let spec = q.into_read_spec();
        self.read_specs.push(spec);
        self
    }

    /// Render the batch as it would go over the wire: writes then reads,
    /// `"; "`-joined, with the optional transaction wrap.
    pub fn render(&self) -> String {
        let mut out = self.stmt_buf.clone();
        for spec in &self.read_specs {
            if !out.is_empty() {
                out.push_str("; ");
            }
            out.push_str(&spec.stmt);
        }
        if self.transaction {
            format!("BEGIN; {out}; COMMIT")
        } else {
            out
        }
    }

    /// Execute the batch, consuming it.
    ///
    /// Panics if the batch mixes reads and writes, or if any query builder
    /// was allocated but never submitted. Write batches go out as one
    /// statement; read batches run their queries concurrently and scan the
    /// results into the destinations. All read-branch errors are collected
    /// into a [`MultiError`].
    pub async fn run<C: Connection>(mut self, conn: &C) -> BatchResult<()> {
        if self.write_stmts > 0 && !self.read_specs.is_empty() {
            panic!(
                "batch contains both reads and writes; a batch must be only \
                 reads or only writes"
            );
        }
        if self.pending_qs.get() > 0 {
            panic!(
                "batch has uncommitted builders; submit every query() with \
                 select() or delete_matching(), and commit() every bulk writer"
            );
        }

        if self.write_stmts > 0 {
            let sql = self.render();
            trace_sql("exec", &sql);
            return conn.exec(&sql).await;
        }

        let specs = std::mem::take(&mut self.read_specs);
        let results = join_all(specs.into_iter().map(|mut spec| async move {
            trace_sql("query", &spec.stmt);
            let rows = conn.query(&spec.stmt).await?;
            spec.consume(rows)
        }))
        .await;

        let errors: Vec<BatchError> = results.into_iter().filter_map(Result::err).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(MultiError { errors }.into())
        }
    }
}

fn assert_has_primary_keys(si: &StructInfo) {
    assert!(
        si.has_primary_keys(),
        "record type {} has no primary key fields",
        si.name
    );
}

fn write_table_name(si: &StructInfo, table: Option<&str>, sb: &mut String) {
    match table {
        Some(table) => sb.push_str(&quote_ident(table)),
        None => sb.push_str(&si.quoted_name),
    }
}

fn write_primary_keys_where(si: &StructInfo, rec: &dyn Any, sb: &mut String) {
    let mut pks = ListWriter::and(sb);
    for f in si.primary_keys() {
        let item = pks.item();
        item.push_str(&f.quoted_name);
        item.push_str(" = ");
        (f.codec.emit)(rec, item);
    }
}

pub(crate) fn write_field_values(
    si: &StructInfo,
    rec: &mut dyn Any,
    sb: &mut String,
    now: DateTime<Utc>,
    insert: bool,
) {
    let mut values = ListWriter::new(sb);
    for f in &si.fields {
        if f.is_created() || f.is_updated() {
            (f.codec.set)(rec, now);
        }
        if insert && f.is_default_on_insert() {
            values.push("DEFAULT");
        } else {
            (f.codec.emit)(&*rec, values.item());
        }
    }
}

fn trace_sql(kind: &str, sql: &str) {
    #[cfg(feature = "tracing")]
    tracing::debug!(target: "pgbatch", kind, sql, "dispatching statement");
    #[cfg(not(feature = "tracing"))]
    let _ = (kind, sql);
}
