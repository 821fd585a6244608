//! SQL literal and identifier formatting.
//!
//! Every statement builder and the expression layer go through these
//! functions, so the emitted text is identical no matter where a value
//! appears. All writers append to a caller-owned `String`.
//!
//! Nullable kinds pass `is_null = true` to emit the bare token `NULL`.

use std::fmt::Write as _;

use chrono::{NaiveDateTime, Timelike};

/// Append an identifier (table or column name), double-quoted with embedded
/// `"` doubled.
pub fn write_ident(buf: &mut String, name: &str) {
    buf.push('"');
    for ch in name.chars() {
        if ch == '"' {
            buf.push_str("\"\"");
        } else {
            buf.push(ch);
        }
    }
    buf.push('"');
}

/// Quote an identifier into a fresh `String`.
pub fn quote_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    write_ident(&mut out, name);
    out
}

pub fn write_bool(buf: &mut String, v: bool, is_null: bool) {
    if is_null {
        buf.push_str("NULL");
    } else if v {
        buf.push_str("TRUE");
    } else {
        buf.push_str("FALSE");
    }
}

pub fn write_i64(buf: &mut String, v: i64, is_null: bool) {
    if is_null {
        buf.push_str("NULL");
    } else {
        let _ = write!(buf, "{v}");
    }
}

pub fn write_u64(buf: &mut String, v: u64, is_null: bool) {
    if is_null {
        buf.push_str("NULL");
    } else {
        let _ = write!(buf, "{v}");
    }
}

/// Floats use the shortest decimal form that round-trips; non-finite values
/// use the CockroachDB cast spellings.
pub fn write_f64(buf: &mut String, v: f64, is_null: bool) {
    if is_null {
        buf.push_str("NULL");
    } else if v.is_nan() {
        buf.push_str("'NaN'::FLOAT");
    } else if v == f64::INFINITY {
        buf.push_str("'Inf'::FLOAT");
    } else if v == f64::NEG_INFINITY {
        buf.push_str("'-Inf'::FLOAT");
    } else {
        let _ = write!(buf, "{v}");
    }
}

/// Single-quoted string literal. Embedded `'` is doubled; bytes with value 0
/// are dropped (the wire protocol cannot carry them inside text).
pub fn write_str(buf: &mut String, v: &str, is_null: bool) {
    if is_null {
        buf.push_str("NULL");
        return;
    }
    buf.push('\'');
    for ch in v.chars() {
        match ch {
            '\0' => {}
            '\'' => buf.push_str("''"),
            _ => buf.push(ch),
        }
    }
    buf.push('\'');
}

/// Byte-string literal: `'\x` + lowercase hex + `'`.
pub fn write_bytes(buf: &mut String, v: &[u8], is_null: bool) {
    if is_null {
        buf.push_str("NULL");
        return;
    }
    buf.push_str("'\\x");
    for b in v {
        let _ = write!(buf, "{b:02x}");
    }
    buf.push('\'');
}

/// Timestamp literal: `'YYYY-MM-DD HH:MM:SS[.ffffff]'`, UTC, microsecond
/// precision with trailing fraction zeros trimmed.
pub fn write_timestamp(buf: &mut String, t: NaiveDateTime, is_null: bool) {
    if is_null {
        buf.push_str("NULL");
        return;
    }
    buf.push('\'');
    let _ = write!(buf, "{}", t.format("%Y-%m-%d %H:%M:%S"));
    let micros = t.nanosecond() / 1_000;
    if micros != 0 {
        let mut frac = format!(".{micros:06}");
        while frac.ends_with('0') {
            frac.pop();
        }
        buf.push_str(&frac);
    }
    buf.push('\'');
}

/// Comma-separated int list, no surrounding parens.
pub fn write_i64_list(buf: &mut String, vs: &[i64]) {
    let mut lw = ListWriter::new(buf);
    for v in vs {
        write_i64(lw.item(), *v, false);
    }
}

/// Comma-separated string list, no surrounding parens.
pub fn write_str_list(buf: &mut String, vs: &[String]) {
    let mut lw = ListWriter::new(buf);
    for v in vs {
        write_str(lw.item(), v, false);
    }
}

/// Appends `", "` between items: the column-list and SET-list separator.
pub(crate) struct ListWriter<'a> {
    buf: &'a mut String,
    sep: &'static str,
    empty: bool,
}

impl<'a> ListWriter<'a> {
    pub fn new(buf: &'a mut String) -> Self {
        Self { buf, sep: ", ", empty: true }
    }

    /// Appends `" AND "` between items: the primary-key WHERE separator.
    pub fn and(buf: &'a mut String) -> Self {
        Self { buf, sep: " AND ", empty: true }
    }

    /// Start the next item, returning the underlying buffer.
    pub fn item(&mut self) -> &mut String {
        if self.empty {
            self.empty = false;
        } else {
            self.buf.push_str(self.sep);
        }
        self.buf
    }

    pub fn push(&mut self, s: &str) {
        self.item().push_str(s);
    }
}
