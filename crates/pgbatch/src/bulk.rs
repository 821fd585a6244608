//! Incremental bulk INSERT/UPSERT building.
//!
//! [`BulkWriter`] grows one multi-row `VALUES` statement record by record,
//! for callers that produce rows on the fly instead of holding a slice.
//! It borrows the batch exclusively while open and must be committed back:
//!
//! ```ignore
//! let mut bulk = batch.bulk_inserter::<User>();
//! for user in stream {
//!     bulk.add(&mut user);
//! }
//! bulk.commit();
//! ```
//!
//! A writer that is dropped without `commit` contributes nothing and makes
//! `Batch::run` panic, like an unsubmitted query builder. The slice-based
//! [`Batch::insert_many`] family is the one-shot counterpart.
//!
//! [`Batch::insert_many`]: crate::Batch::insert_many

use crate::batch::{write_field_values, Batch};
use crate::literal::ListWriter;
use crate::schema::{Record, StructInfo};

/// An in-progress bulk INSERT or UPSERT over records of type `T`.
pub struct BulkWriter<'b, 'a, T: Record> {
    batch: &'b mut Batch<'a>,
    verb: &'static str,
    si: &'static StructInfo,
    buf: String,
    started: bool,
    _records: std::marker::PhantomData<fn(&mut T)>,
}

impl<'b, 'a, T: Record> BulkWriter<'b, 'a, T> {
    pub(crate) fn new(batch: &'b mut Batch<'a>, verb: &'static str) -> Self {
        let si = StructInfo::resolve::<T>(batch.resolver());
        batch.track_nested();
        BulkWriter {
            batch,
            verb,
            si,
            buf: String::new(),
            started: false,
            _records: std::marker::PhantomData,
        }
    }

    /// Append one record's `VALUES` group, stamping `created`/`updated`
    /// fields with the batch time.
    pub fn add(&mut self, v: &mut T) -> &mut Self {
        let now = self.batch.stamp_time();
        let insert = self.verb == "INSERT";

        if self.started {
            self.buf.push_str(", ");
        } else {
            self.write_header();
            self.started = true;
        }

        self.buf.push('(');
        write_field_values(self.si, v, &mut self.buf, now, insert);
        self.buf.push(')');
        self
    }

    /// Append a `VALUES` group per record of a slice.
    pub fn add_many(&mut self, vs: &mut [T]) -> &mut Self {
        for v in vs {
            self.add(v);
        }
        self
    }

    /// Close the statement and append it to the batch as one write.
    /// A writer with no records added appends nothing.
    pub fn commit(self) {
        self.batch.untrack_nested();
        if self.started {
            let sb = self.batch.begin_next_stmt();
            sb.push_str(&self.buf);
            sb.push_str(" RETURNING NOTHING");
        }
    }

    fn write_header(&mut self) {
        let sb = &mut self.buf;
        sb.push_str(self.verb);
        sb.push_str(" INTO ");
        sb.push_str(&self.si.quoted_name);
        sb.push_str(" (");
        let mut names = ListWriter::new(sb);
        for f in &self.si.fields {
            names.push(&f.quoted_name);
        }
        sb.push_str(") VALUES ");
    }
}
