//! Dynamically typed SQL values.
//!
//! [`Value`] is the boxed form of every literal kind the library can emit.
//! It backs `?` substitution in expressions (the value is rendered through
//! the same formatters as record fields) and doubles as the dynamic field
//! kind: a record field declared as `Value` is dispatched on its runtime
//! variant when emitted and scanned.

use chrono::{DateTime, NaiveDateTime, Utc};
use tokio_postgres::types::{FromSql, Type};

use crate::literal;

/// A SQL value of one of the supported literal kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The bare `NULL` token.
    Null,
    Bool(bool),
    /// Signed integers, widened to 64 bits.
    Int(i64),
    /// Unsigned integers, widened to 64 bits.
    Uint(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// Interpreted as UTC.
    Timestamp(NaiveDateTime),
    /// Comma-separated list, no surrounding parens (for `x IN (?)`).
    IntList(Vec<i64>),
    /// Comma-separated quoted list, no surrounding parens.
    StrList(Vec<String>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    /// Append the SQL literal form of this value.
    pub fn write_sql(&self, buf: &mut String) {
        match self {
            Value::Null => buf.push_str("NULL"),
            Value::Bool(v) => literal::write_bool(buf, *v, false),
            Value::Int(v) => literal::write_i64(buf, *v, false),
            Value::Uint(v) => literal::write_u64(buf, *v, false),
            Value::Float(v) => literal::write_f64(buf, *v, false),
            Value::Str(v) => literal::write_str(buf, v, false),
            Value::Bytes(v) => literal::write_bytes(buf, v, false),
            Value::Timestamp(v) => literal::write_timestamp(buf, *v, false),
            Value::IntList(v) => literal::write_i64_list(buf, v),
            Value::StrList(v) => literal::write_str_list(buf, v),
        }
    }

    /// Render into a fresh `String`.
    pub fn to_sql_string(&self) -> String {
        let mut buf = String::new();
        self.write_sql(&mut buf);
        buf
    }
}

macro_rules! int_from {
    ($($t:ty),* $(,)?) => {$(
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v as i64)
            }
        }
    )*};
}

macro_rules! uint_from {
    ($($t:ty),* $(,)?) => {$(
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Uint(v as u64)
            }
        }
    )*};
}

int_from!(i8, i16, i32, i64, isize);
uint_from!(u8, u16, u32, u64, usize);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v.naive_utc())
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::IntList(v)
    }
}

impl From<&[i64]> for Value {
    fn from(v: &[i64]) -> Self {
        Value::IntList(v.to_vec())
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::StrList(v)
    }
}

impl From<Vec<&str>> for Value {
    fn from(v: Vec<&str>) -> Self {
        Value::StrList(v.into_iter().map(str::to_string).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(
        ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        let v = if *ty == Type::BOOL {
            Value::Bool(bool::from_sql(ty, raw)?)
        } else if *ty == Type::INT2 {
            Value::Int(i16::from_sql(ty, raw)? as i64)
        } else if *ty == Type::INT4 {
            Value::Int(i32::from_sql(ty, raw)? as i64)
        } else if *ty == Type::INT8 {
            Value::Int(i64::from_sql(ty, raw)?)
        } else if *ty == Type::FLOAT4 {
            Value::Float(f32::from_sql(ty, raw)? as f64)
        } else if *ty == Type::FLOAT8 {
            Value::Float(f64::from_sql(ty, raw)?)
        } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME {
            Value::Str(String::from_sql(ty, raw)?)
        } else if *ty == Type::BYTEA {
            Value::Bytes(Vec::<u8>::from_sql(ty, raw)?)
        } else if *ty == Type::TIMESTAMP {
            Value::Timestamp(NaiveDateTime::from_sql(ty, raw)?)
        } else if *ty == Type::TIMESTAMPTZ {
            Value::Timestamp(DateTime::<Utc>::from_sql(ty, raw)?.naive_utc())
        } else {
            return Err(format!("unsupported column type: {ty}").into());
        };
        Ok(v)
    }

    fn from_sql_null(_: &Type) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(Value::Null)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::BOOL
            || *ty == Type::INT2
            || *ty == Type::INT4
            || *ty == Type::INT8
            || *ty == Type::FLOAT4
            || *ty == Type::FLOAT8
            || *ty == Type::TEXT
            || *ty == Type::VARCHAR
            || *ty == Type::BPCHAR
            || *ty == Type::NAME
            || *ty == Type::BYTEA
            || *ty == Type::TIMESTAMP
            || *ty == Type::TIMESTAMPTZ
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn widening_conversions() {
        assert_eq!(Value::from(7i8), Value::Int(7));
        assert_eq!(Value::from(7u16), Value::Uint(7));
        assert_eq!(Value::from(2.5f32), Value::Float(2.5));
    }

    #[test]
    fn option_maps_to_null() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3i64)), Value::Int(3));
        assert_eq!(Value::from(None::<String>).to_sql_string(), "NULL");
    }

    #[test]
    fn rendering_goes_through_literal_table() {
        assert_eq!(Value::from("o'hare").to_sql_string(), "'o''hare'");
        assert_eq!(Value::from(vec![1u8, 2, 3]).to_sql_string(), r"'\x010203'");
        assert_eq!(Value::from(vec![1i64, 2, 3]).to_sql_string(), "1, 2, 3");
        let t = NaiveDate::from_ymd_opt(2012, 12, 12)
            .unwrap()
            .and_hms_opt(12, 12, 12)
            .unwrap();
        assert_eq!(Value::from(t).to_sql_string(), "'2012-12-12 12:12:12'");
    }
}
