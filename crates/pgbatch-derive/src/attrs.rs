//! Field annotation parsing.
//!
//! Annotations are comma separated token lists carried in a string literal,
//! read from the first present of the `db`, `sql` and `gorm` attributes (in
//! that order):
//!
//! ```ignore
//! #[db("column:foo,primary_key")]
//! #[db("-")]
//! #[db("flatten,group:bar")]
//! ```

use syn::{Field, LitStr};

/// Parsed form of one field annotation.
#[derive(Default)]
pub struct TagInfo {
    pub column: Option<String>,
    pub primary_key: bool,
    pub ignore: bool,
    pub flatten: bool,
    pub group: Option<String>,
    pub created: bool,
    pub updated: bool,
    pub default_on_insert: bool,
}

/// Extract the annotation string for a field, honoring the `db` > `sql` >
/// `gorm` precedence, and parse it. A field without any of the three
/// attributes gets the all-default `TagInfo`.
pub fn field_tag(field: &Field) -> syn::Result<TagInfo> {
    for key in ["db", "sql", "gorm"] {
        for attr in &field.attrs {
            if attr.path().is_ident(key) {
                let lit: LitStr = attr.parse_args()?;
                return Ok(parse_tag(&lit.value()));
            }
        }
    }
    Ok(TagInfo::default())
}

/// Parse a comma separated token list. Unknown tokens are ignored.
pub fn parse_tag(raw: &str) -> TagInfo {
    let mut out = TagInfo::default();
    for token in raw.split(',') {
        let (key, value) = match token.split_once(':') {
            Some((k, v)) => (k, Some(v)),
            None => (token, None),
        };
        match key {
            "primary_key" => out.primary_key = true,
            "column" => {
                if let Some(v) = value {
                    out.column = Some(v.to_string());
                }
            }
            "group" => {
                if let Some(v) = value {
                    out.group = Some(v.to_string());
                }
            }
            "-" => out.ignore = true,
            "flatten" => out.flatten = true,
            "created" => out.created = true,
            "updated" => out.updated = true,
            "default" => out.default_on_insert = true,
            _ => {}
        }
    }
    out
}
