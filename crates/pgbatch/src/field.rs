//! Per-field codecs.
//!
//! [`SqlField`] is implemented by every type a record field may have. It
//! supplies the literal emitter, the row-scan binding, and (for timestamp
//! kinds) the stamping setter. `#[derive(Record)]` wraps these into
//! type-erased [`FieldCodec`] bundles, one per field, that address the
//! record through `&dyn Any` instead of a raw base pointer.
//!
//! Implement `SqlField` for your own type to make it usable as a field, or
//! install a [`CodecResolver`](crate::CodecResolver) on the batch to
//! override the generated codec of individual fields.

use std::any::Any;

use chrono::{DateTime, NaiveDateTime, Utc};
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::Row;

use crate::literal;
use crate::value::Value;

/// A type usable as a record field.
pub trait SqlField: Sized {
    /// True for the `Option<_>` wrappers; folded into the field's
    /// `null_wrapper` flag.
    const NULLABLE: bool = false;

    /// True for timestamp kinds; `created`/`updated` annotations require it.
    const IS_TIME: bool = false;

    /// Append the SQL literal form of this value.
    fn write_literal(&self, buf: &mut String);

    /// The boxed [`Value`] form of this value.
    fn to_value(&self) -> Value;

    /// Read column `idx` of a result row into a new value.
    fn scan_field(row: &Row, idx: usize) -> Result<Self, tokio_postgres::Error>;

    /// Read column `idx`, mapping SQL `NULL` to `None`.
    fn scan_field_opt(row: &Row, idx: usize) -> Result<Option<Self>, tokio_postgres::Error>;

    /// Overwrite with a stamp time. Only timestamp kinds do anything here;
    /// the batch calls it for `created`/`updated` fields before emission.
    fn set_time(&mut self, _t: DateTime<Utc>) {}
}

// ─── FromSql adapters ───────────────────────────────────────────────────────
//
// tokio-postgres is strict about column types: `i64` only accepts INT8 and
// chrono's `NaiveDateTime` only accepts TIMESTAMP. Records declare one Rust
// type per field, so these adapters accept every column width the field kind
// can represent.

struct AnyInt(i64);

impl<'a> FromSql<'a> for AnyInt {
    fn from_sql(
        ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(AnyInt(if *ty == Type::INT2 {
            i16::from_sql(ty, raw)? as i64
        } else if *ty == Type::INT4 {
            i32::from_sql(ty, raw)? as i64
        } else {
            i64::from_sql(ty, raw)?
        }))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INT2 || *ty == Type::INT4 || *ty == Type::INT8
    }
}

struct AnyFloat(f64);

impl<'a> FromSql<'a> for AnyFloat {
    fn from_sql(
        ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(AnyFloat(if *ty == Type::FLOAT4 {
            f32::from_sql(ty, raw)? as f64
        } else {
            f64::from_sql(ty, raw)?
        }))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::FLOAT4 || *ty == Type::FLOAT8
    }
}

struct AnyTimestamp(NaiveDateTime);

impl<'a> FromSql<'a> for AnyTimestamp {
    fn from_sql(
        ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(AnyTimestamp(if *ty == Type::TIMESTAMPTZ {
            DateTime::<Utc>::from_sql(ty, raw)?.naive_utc()
        } else {
            NaiveDateTime::from_sql(ty, raw)?
        }))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::TIMESTAMP || *ty == Type::TIMESTAMPTZ
    }
}

// ─── Scalar impls ───────────────────────────────────────────────────────────

macro_rules! signed_sql_field {
    ($($t:ty),* $(,)?) => {$(
        impl SqlField for $t {
            fn write_literal(&self, buf: &mut String) {
                literal::write_i64(buf, *self as i64, false);
            }

            fn to_value(&self) -> Value {
                Value::Int(*self as i64)
            }

            fn scan_field(row: &Row, idx: usize) -> Result<Self, tokio_postgres::Error> {
                Ok(row.try_get::<_, AnyInt>(idx)?.0 as $t)
            }

            fn scan_field_opt(row: &Row, idx: usize) -> Result<Option<Self>, tokio_postgres::Error> {
                Ok(row.try_get::<_, Option<AnyInt>>(idx)?.map(|v| v.0 as $t))
            }
        }
    )*};
}

macro_rules! unsigned_sql_field {
    ($($t:ty),* $(,)?) => {$(
        impl SqlField for $t {
            fn write_literal(&self, buf: &mut String) {
                literal::write_u64(buf, *self as u64, false);
            }

            fn to_value(&self) -> Value {
                Value::Uint(*self as u64)
            }

            fn scan_field(row: &Row, idx: usize) -> Result<Self, tokio_postgres::Error> {
                Ok(row.try_get::<_, AnyInt>(idx)?.0 as $t)
            }

            fn scan_field_opt(row: &Row, idx: usize) -> Result<Option<Self>, tokio_postgres::Error> {
                Ok(row.try_get::<_, Option<AnyInt>>(idx)?.map(|v| v.0 as $t))
            }
        }
    )*};
}

signed_sql_field!(i8, i16, i32, i64, isize);
unsigned_sql_field!(u8, u16, u32, u64, usize);

impl SqlField for bool {
    fn write_literal(&self, buf: &mut String) {
        literal::write_bool(buf, *self, false);
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn scan_field(row: &Row, idx: usize) -> Result<Self, tokio_postgres::Error> {
        row.try_get(idx)
    }

    fn scan_field_opt(row: &Row, idx: usize) -> Result<Option<Self>, tokio_postgres::Error> {
        row.try_get(idx)
    }
}

impl SqlField for f32 {
    fn write_literal(&self, buf: &mut String) {
        literal::write_f64(buf, *self as f64, false);
    }

    fn to_value(&self) -> Value {
        Value::Float(*self as f64)
    }

    fn scan_field(row: &Row, idx: usize) -> Result<Self, tokio_postgres::Error> {
        Ok(row.try_get::<_, AnyFloat>(idx)?.0 as f32)
    }

    fn scan_field_opt(row: &Row, idx: usize) -> Result<Option<Self>, tokio_postgres::Error> {
        Ok(row.try_get::<_, Option<AnyFloat>>(idx)?.map(|v| v.0 as f32))
    }
}

impl SqlField for f64 {
    fn write_literal(&self, buf: &mut String) {
        literal::write_f64(buf, *self, false);
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn scan_field(row: &Row, idx: usize) -> Result<Self, tokio_postgres::Error> {
        Ok(row.try_get::<_, AnyFloat>(idx)?.0)
    }

    fn scan_field_opt(row: &Row, idx: usize) -> Result<Option<Self>, tokio_postgres::Error> {
        Ok(row.try_get::<_, Option<AnyFloat>>(idx)?.map(|v| v.0))
    }
}

impl SqlField for String {
    fn write_literal(&self, buf: &mut String) {
        literal::write_str(buf, self, false);
    }

    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }

    fn scan_field(row: &Row, idx: usize) -> Result<Self, tokio_postgres::Error> {
        row.try_get(idx)
    }

    fn scan_field_opt(row: &Row, idx: usize) -> Result<Option<Self>, tokio_postgres::Error> {
        row.try_get(idx)
    }
}

impl SqlField for Vec<u8> {
    fn write_literal(&self, buf: &mut String) {
        literal::write_bytes(buf, self, false);
    }

    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }

    fn scan_field(row: &Row, idx: usize) -> Result<Self, tokio_postgres::Error> {
        row.try_get(idx)
    }

    fn scan_field_opt(row: &Row, idx: usize) -> Result<Option<Self>, tokio_postgres::Error> {
        row.try_get(idx)
    }
}

impl SqlField for NaiveDateTime {
    const IS_TIME: bool = true;

    fn write_literal(&self, buf: &mut String) {
        literal::write_timestamp(buf, *self, false);
    }

    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }

    fn scan_field(row: &Row, idx: usize) -> Result<Self, tokio_postgres::Error> {
        Ok(row.try_get::<_, AnyTimestamp>(idx)?.0)
    }

    fn scan_field_opt(row: &Row, idx: usize) -> Result<Option<Self>, tokio_postgres::Error> {
        Ok(row.try_get::<_, Option<AnyTimestamp>>(idx)?.map(|v| v.0))
    }

    fn set_time(&mut self, t: DateTime<Utc>) {
        *self = t.naive_utc();
    }
}

impl SqlField for DateTime<Utc> {
    const IS_TIME: bool = true;

    fn write_literal(&self, buf: &mut String) {
        literal::write_timestamp(buf, self.naive_utc(), false);
    }

    fn to_value(&self) -> Value {
        Value::Timestamp(self.naive_utc())
    }

    fn scan_field(row: &Row, idx: usize) -> Result<Self, tokio_postgres::Error> {
        Ok(row.try_get::<_, AnyTimestamp>(idx)?.0.and_utc())
    }

    fn scan_field_opt(row: &Row, idx: usize) -> Result<Option<Self>, tokio_postgres::Error> {
        Ok(row.try_get::<_, Option<AnyTimestamp>>(idx)?.map(|v| v.0.and_utc()))
    }

    fn set_time(&mut self, t: DateTime<Utc>) {
        *self = t;
    }
}

impl SqlField for Vec<i64> {
    fn write_literal(&self, buf: &mut String) {
        literal::write_i64_list(buf, self);
    }

    fn to_value(&self) -> Value {
        Value::IntList(self.clone())
    }

    fn scan_field(row: &Row, idx: usize) -> Result<Self, tokio_postgres::Error> {
        row.try_get(idx)
    }

    fn scan_field_opt(row: &Row, idx: usize) -> Result<Option<Self>, tokio_postgres::Error> {
        row.try_get(idx)
    }
}

impl SqlField for Vec<String> {
    fn write_literal(&self, buf: &mut String) {
        literal::write_str_list(buf, self);
    }

    fn to_value(&self) -> Value {
        Value::StrList(self.clone())
    }

    fn scan_field(row: &Row, idx: usize) -> Result<Self, tokio_postgres::Error> {
        row.try_get(idx)
    }

    fn scan_field_opt(row: &Row, idx: usize) -> Result<Option<Self>, tokio_postgres::Error> {
        row.try_get(idx)
    }
}

impl SqlField for Value {
    fn write_literal(&self, buf: &mut String) {
        self.write_sql(buf);
    }

    fn to_value(&self) -> Value {
        self.clone()
    }

    fn scan_field(row: &Row, idx: usize) -> Result<Self, tokio_postgres::Error> {
        row.try_get(idx)
    }

    fn scan_field_opt(row: &Row, idx: usize) -> Result<Option<Self>, tokio_postgres::Error> {
        row.try_get(idx)
    }
}

impl<T: SqlField + Default> SqlField for Option<T> {
    const NULLABLE: bool = true;
    const IS_TIME: bool = T::IS_TIME;

    fn write_literal(&self, buf: &mut String) {
        match self {
            Some(v) => v.write_literal(buf),
            None => buf.push_str("NULL"),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn scan_field(row: &Row, idx: usize) -> Result<Self, tokio_postgres::Error> {
        T::scan_field_opt(row, idx)
    }

    fn scan_field_opt(row: &Row, idx: usize) -> Result<Option<Self>, tokio_postgres::Error> {
        Ok(T::scan_field_opt(row, idx)?.map(Some))
    }

    fn set_time(&mut self, t: DateTime<Utc>) {
        if T::IS_TIME {
            let mut v = T::default();
            v.set_time(t);
            *self = Some(v);
        }
    }
}

// ─── Field descriptors ──────────────────────────────────────────────────────

/// Flags carried by a field (see the tag tokens on `#[derive(Record)]`).
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct FieldFlags(u8);

impl FieldFlags {
    const PRIMARY_KEY: u8 = 1 << 0;
    const CREATED: u8 = 1 << 1;
    const UPDATED: u8 = 1 << 2;
    const NULL_WRAPPER: u8 = 1 << 3;
    const DEFAULT_ON_INSERT: u8 = 1 << 4;

    pub fn new() -> Self {
        Self(0)
    }

    fn with(self, bit: u8, on: bool) -> Self {
        if on {
            Self(self.0 | bit)
        } else {
            Self(self.0 & !bit)
        }
    }

    pub fn primary_key(self, on: bool) -> Self {
        self.with(Self::PRIMARY_KEY, on)
    }

    pub fn created(self, on: bool) -> Self {
        self.with(Self::CREATED, on)
    }

    pub fn updated(self, on: bool) -> Self {
        self.with(Self::UPDATED, on)
    }

    pub fn null_wrapper(self, on: bool) -> Self {
        self.with(Self::NULL_WRAPPER, on)
    }

    pub fn default_on_insert(self, on: bool) -> Self {
        self.with(Self::DEFAULT_ON_INSERT, on)
    }

    pub fn is_primary_key(&self) -> bool {
        self.0 & Self::PRIMARY_KEY != 0
    }

    pub fn is_created(&self) -> bool {
        self.0 & Self::CREATED != 0
    }

    pub fn is_updated(&self) -> bool {
        self.0 & Self::UPDATED != 0
    }

    pub fn is_null_wrapper(&self) -> bool {
        self.0 & Self::NULL_WRAPPER != 0
    }

    pub fn is_default_on_insert(&self) -> bool {
        self.0 & Self::DEFAULT_ON_INSERT != 0
    }
}

/// The type-erased codec bundle of one field.
///
/// `emit` appends the field's SQL literal, `get` reads the field out as a
/// boxed [`Value`], `scan` reads a result-row column into the field, and
/// `set` stamps a timestamp field. All four address the record as
/// `&dyn Any` and are generated by `#[derive(Record)]` (or supplied by a
/// [`CodecResolver`](crate::CodecResolver)).
pub struct FieldCodec {
    pub emit: Box<dyn Fn(&dyn Any, &mut String) + Send + Sync>,
    pub get: Box<dyn Fn(&dyn Any) -> Value + Send + Sync>,
    pub scan:
        Box<dyn Fn(&mut dyn Any, &Row, usize) -> Result<(), tokio_postgres::Error> + Send + Sync>,
    pub set: Box<dyn Fn(&mut dyn Any, DateTime<Utc>) + Send + Sync>,
}

/// The description of one field as generated by `#[derive(Record)]`,
/// before `StructInfo` construction.
pub struct FieldDef {
    /// Column name: the snake-cased field name or its `column:` override.
    pub name: &'static str,
    pub flags: FieldFlags,
    pub group: Option<&'static str>,
    /// The field's Rust type, for diagnostics and resolver dispatch.
    pub type_name: &'static str,
    /// Whether the field type is a timestamp kind (`SqlField::IS_TIME`).
    pub is_time: bool,
    pub codec: FieldCodec,
}

impl FieldDef {
    /// Rebase this definition from an inner record onto an outer one.
    ///
    /// Used by the derive for `flatten` fields: the inner record's codecs
    /// keep working against the outer struct through the given accessors.
    /// A group label of the flattening field applies to fields that do not
    /// already carry one.
    pub fn nest<Outer: Any, Inner: Any>(
        self,
        group: Option<&'static str>,
        get: fn(&Outer) -> &Inner,
        get_mut: fn(&mut Outer) -> &mut Inner,
    ) -> FieldDef {
        let FieldCodec { emit, get: getter, scan, set } = self.codec;
        FieldDef {
            name: self.name,
            flags: self.flags,
            group: self.group.or(group),
            type_name: self.type_name,
            is_time: self.is_time,
            codec: FieldCodec {
                emit: Box::new(move |rec, buf| {
                    let outer = rec.downcast_ref::<Outer>().expect("record type mismatch");
                    emit(get(outer), buf);
                }),
                get: Box::new(move |rec| {
                    let outer = rec.downcast_ref::<Outer>().expect("record type mismatch");
                    getter(get(outer))
                }),
                scan: Box::new(move |rec, row, idx| {
                    let outer = rec.downcast_mut::<Outer>().expect("record type mismatch");
                    scan(get_mut(outer), row, idx)
                }),
                set: Box::new(move |rec, t| {
                    let outer = rec.downcast_mut::<Outer>().expect("record type mismatch");
                    set(get_mut(outer), t);
                }),
            },
        }
    }
}
