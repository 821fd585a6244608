//! Read destinations and the row-scan protocol.
//!
//! Committing a query builder produces a [`ReadSpec`]: the rendered SELECT
//! text plus a type-erased destination. At execution time each spec owns its
//! result rows and scans them into the destination it borrowed from the
//! caller; destinations of different specs must not alias.

use std::any::Any;

use tokio_postgres::types::FromSql;
use tokio_postgres::Row;

use crate::error::BatchError;
use crate::schema::{Record, StructInfo};

/// A growable destination of records, one per result row.
pub(crate) trait RecordRows: Send {
    fn clear(&mut self);
    fn push_default(&mut self) -> &mut dyn Any;
}

impl<T: Record + Default> RecordRows for Vec<T> {
    fn clear(&mut self) {
        Vec::clear(self);
    }

    fn push_default(&mut self) -> &mut dyn Any {
        self.push(T::default());
        self.last_mut().expect("just pushed")
    }
}

/// A single primitive destination, bound directly to column 0.
pub(crate) trait ValueSlot: Send {
    fn scan_row(&mut self, row: &Row) -> Result<(), BatchError>;
}

impl<P> ValueSlot for P
where
    P: for<'r> FromSql<'r> + Send,
{
    fn scan_row(&mut self, row: &Row) -> Result<(), BatchError> {
        *self = row.try_get(0)?;
        Ok(())
    }
}

/// A growable destination of primitives, bound to column 0 per row.
pub(crate) trait ValueRows: Send {
    fn clear(&mut self);
    fn scan_push(&mut self, row: &Row) -> Result<(), BatchError>;
}

impl<P> ValueRows for Vec<P>
where
    P: for<'r> FromSql<'r> + Send,
{
    fn clear(&mut self) {
        Vec::clear(self);
    }

    fn scan_push(&mut self, row: &Row) -> Result<(), BatchError> {
        self.push(row.try_get(0)?);
        Ok(())
    }
}

/// Where one read's rows go.
pub(crate) enum ReadDest<'a> {
    /// A single record; scans the first row, drops the rest.
    One {
        si: &'static StructInfo,
        target: &'a mut (dyn Any + Send),
    },
    /// A sequence of records.
    Many {
        si: &'static StructInfo,
        target: &'a mut dyn RecordRows,
    },
    /// A single primitive.
    Value { target: &'a mut dyn ValueSlot },
    /// A sequence of primitives.
    Values { target: &'a mut dyn ValueRows },
}

impl ReadDest<'_> {
    pub fn struct_info(&self) -> Option<&'static StructInfo> {
        match self {
            ReadDest::One { si, .. } | ReadDest::Many { si, .. } => Some(si),
            _ => None,
        }
    }

    pub fn is_slice(&self) -> bool {
        matches!(self, ReadDest::Many { .. } | ReadDest::Values { .. })
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, ReadDest::Value { .. } | ReadDest::Values { .. })
    }
}

/// One pending read of a batch: statement text, destination, and the
/// optional slot that receives the `NotFound` sentinel.
pub(crate) struct ReadSpec<'a> {
    pub stmt: String,
    pub dest: ReadDest<'a>,
    pub err_slot: Option<&'a mut Option<BatchError>>,
}

impl ReadSpec<'_> {
    /// Scan the result rows into the destination.
    ///
    /// Zero rows for a single destination set the error slot to `NotFound`
    /// without failing; zero rows for a sequence just leave it empty.
    pub fn consume(&mut self, rows: Vec<Row>) -> Result<(), BatchError> {
        let err_slot = &mut self.err_slot;
        match &mut self.dest {
            ReadDest::One { si, target } => match rows.first() {
                Some(row) => si.scan_row(&mut **target, row)?,
                None => flag_not_found(err_slot),
            },
            ReadDest::Many { si, target } => {
                target.clear();
                for row in &rows {
                    si.scan_row(target.push_default(), row)?;
                }
            }
            ReadDest::Value { target } => match rows.first() {
                Some(row) => target.scan_row(row)?,
                None => flag_not_found(err_slot),
            },
            ReadDest::Values { target } => {
                target.clear();
                for row in &rows {
                    target.scan_push(row)?;
                }
            }
        }
        Ok(())
    }
}

fn flag_not_found(slot: &mut Option<&mut Option<BatchError>>) {
    if let Some(slot) = slot {
        **slot = Some(BatchError::NotFound);
    }
}
