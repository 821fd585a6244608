//! Record descriptors and the process-wide schema cache.
//!
//! A [`Record`] (normally produced by `#[derive(Record)]`) describes itself
//! as an ordered list of [`FieldDef`]s. The first time a record type is used
//! the list is turned into a [`StructInfo`] — column names resolved and
//! quoted, duplicates dropped, primary keys partitioned out — and cached for
//! the life of the process.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use tokio_postgres::Row;

use crate::error::BatchError;
use crate::field::{FieldCodec, FieldDef, FieldFlags};
use crate::literal::quote_ident;

/// A type that describes a database row.
///
/// Implemented by `#[derive(Record)]`; the record name is the snake-cased
/// type name and `field_defs` returns the fields in declaration order with
/// `flatten` fields spliced in place.
pub trait Record: Any + Send {
    fn record_name() -> &'static str;
    fn field_defs() -> Vec<FieldDef>;
}

/// What a [`CodecResolver`] gets to look at when deciding whether to
/// override a field's codec.
pub struct FieldProbe<'a> {
    /// Snake-cased record name.
    pub record: &'static str,
    /// Column name of the field.
    pub field: &'a str,
    /// The field's Rust type.
    pub type_name: &'static str,
    /// Position of the field within the flattened field list.
    pub index: usize,
}

/// Caller-supplied codec override hook, consulted for every field before
/// the derive-generated codec is used.
///
/// Note that a record type's `StructInfo` is built once per process: the
/// resolver only participates in that first construction.
pub type CodecResolver = dyn Fn(&FieldProbe<'_>) -> Option<FieldCodec> + Send + Sync;

/// One column of a record type.
pub struct FieldInfo {
    pub name: &'static str,
    pub quoted_name: String,
    pub flags: FieldFlags,
    /// Group label inherited from a `flatten` field's tag.
    pub group: Option<&'static str>,
    pub type_name: &'static str,
    pub(crate) codec: FieldCodec,
}

impl FieldInfo {
    /// Read this field out of a record as a boxed [`Value`].
    ///
    /// [`Value`]: crate::Value
    pub fn value_of(&self, rec: &dyn Any) -> crate::Value {
        (self.codec.get)(rec)
    }

    pub fn is_primary_key(&self) -> bool {
        self.flags.is_primary_key()
    }

    pub fn is_created(&self) -> bool {
        self.flags.is_created()
    }

    pub fn is_updated(&self) -> bool {
        self.flags.is_updated()
    }

    pub fn is_null_wrapper(&self) -> bool {
        self.flags.is_null_wrapper()
    }

    pub fn is_default_on_insert(&self) -> bool {
        self.flags.is_default_on_insert()
    }
}

/// The introspected descriptor of a record type.
pub struct StructInfo {
    /// Snake-cased record name.
    pub name: &'static str,
    pub quoted_name: String,
    /// Fields in declaration order, flattened, duplicates dropped
    /// (first occurrence wins).
    pub fields: Vec<FieldInfo>,
    primary_keys: Vec<usize>,
    non_primary_keys: Vec<usize>,
}

impl StructInfo {
    /// The cached descriptor of `T`, built on first use.
    pub fn of<T: Record>() -> &'static StructInfo {
        Self::resolve::<T>(None)
    }

    pub(crate) fn resolve<T: Record>(resolver: Option<&Arc<CodecResolver>>) -> &'static StructInfo {
        let cache = cache();
        let id = TypeId::of::<T>();

        if let Some(si) = cache.read().expect("schema cache poisoned").get(&id).copied() {
            return si;
        }

        let mut cache = cache.write().expect("schema cache poisoned");
        if let Some(si) = cache.get(&id).copied() {
            return si;
        }
        let si: &'static StructInfo = Box::leak(Box::new(Self::build::<T>(resolver)));
        cache.insert(id, si);
        si
    }

    fn build<T: Record>(resolver: Option<&Arc<CodecResolver>>) -> StructInfo {
        let name = T::record_name();
        let mut fields: Vec<FieldInfo> = Vec::new();

        for (index, mut def) in T::field_defs().into_iter().enumerate() {
            if let Some(resolve) = resolver {
                let probe = FieldProbe {
                    record: name,
                    field: def.name,
                    type_name: def.type_name,
                    index,
                };
                if let Some(codec) = resolve(&probe) {
                    def.codec = codec;
                }
            }

            if (def.flags.is_created() || def.flags.is_updated()) && !def.is_time {
                panic!(
                    "field {}.{}: created/updated requires a timestamp or nullable \
                     timestamp type, got {}",
                    name, def.name, def.type_name
                );
            }

            if fields.iter().any(|f| f.name == def.name) {
                continue;
            }
            fields.push(FieldInfo {
                name: def.name,
                quoted_name: quote_ident(def.name),
                flags: def.flags,
                group: def.group,
                type_name: def.type_name,
                codec: def.codec,
            });
        }

        let primary_keys = partition(&fields, true);
        let non_primary_keys = partition(&fields, false);

        StructInfo {
            name,
            quoted_name: quote_ident(name),
            fields,
            primary_keys,
            non_primary_keys,
        }
    }

    /// Linear lookup by column name.
    pub fn find_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &FieldInfo> {
        self.primary_keys.iter().map(move |i| &self.fields[*i])
    }

    pub fn non_primary_keys(&self) -> impl Iterator<Item = &FieldInfo> {
        self.non_primary_keys.iter().map(move |i| &self.fields[*i])
    }

    pub fn has_primary_keys(&self) -> bool {
        !self.primary_keys.is_empty()
    }

    /// Scan one result row into a record, column per field in order.
    pub(crate) fn scan_row(&self, rec: &mut dyn Any, row: &Row) -> Result<(), BatchError> {
        for (idx, f) in self.fields.iter().enumerate() {
            (f.codec.scan)(rec, row, idx).map_err(|e| BatchError::decode(f.name, e.to_string()))?;
        }
        Ok(())
    }
}

fn partition(fields: &[FieldInfo], primary: bool) -> Vec<usize> {
    fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.is_primary_key() == primary)
        .map(|(i, _)| i)
        .collect()
}

fn cache() -> &'static RwLock<HashMap<TypeId, &'static StructInfo>> {
    static CACHE: OnceLock<RwLock<HashMap<TypeId, &'static StructInfo>>> = OnceLock::new();
    CACHE.get_or_init(Default::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Record;
    use chrono::NaiveDateTime;

    #[derive(Record, Default)]
    struct Inner {
        g_foo: i64,
        g_bar: i64,
    }

    #[derive(Record, Default)]
    struct Shared {
        field_a: String,
        #[db("primary_key")]
        field_c: String,
        bar: f64,
    }

    #[derive(Record, Default)]
    struct FooBar {
        #[db("column:baz,primary_key")]
        foo: i64,
        bar: f64,
        #[db("-")]
        skipped: i64,
        value: Option<String>,
        #[db("flatten")]
        shared: Shared,
        #[db("flatten,group:foo")]
        inner: Inner,
    }

    #[test]
    fn flattened_struct_info() {
        let si = StructInfo::of::<FooBar>();
        assert_eq!(si.name, "foo_bar");
        assert_eq!(si.quoted_name, r#""foo_bar""#);

        let names: Vec<_> = si.fields.iter().map(|f| f.name).collect();
        // "bar" from Shared is a duplicate and dropped; "skipped" is tagged away.
        assert_eq!(
            names,
            ["baz", "bar", "value", "field_a", "field_c", "g_foo", "g_bar"]
        );

        let pks: Vec<_> = si.primary_keys().map(|f| f.name).collect();
        assert_eq!(pks, ["baz", "field_c"]);
        let rest: Vec<_> = si.non_primary_keys().map(|f| f.name).collect();
        assert_eq!(rest, ["bar", "value", "field_a", "g_foo", "g_bar"]);

        assert!(si.find_field("value").unwrap().is_null_wrapper());
        assert_eq!(si.find_field("g_foo").unwrap().group, Some("foo"));
        assert_eq!(si.find_field("field_a").unwrap().group, None);
        assert!(si.find_field("skipped").is_none());
    }

    #[test]
    fn cached_instance_is_shared() {
        let a = StructInfo::of::<FooBar>() as *const StructInfo;
        let b = StructInfo::of::<FooBar>() as *const StructInfo;
        assert_eq!(a, b);
    }

    #[test]
    fn emit_uses_field_codecs() {
        let rec = FooBar {
            foo: 123,
            bar: 1.5,
            skipped: 9,
            value: None,
            shared: Shared {
                field_a: "a".into(),
                field_c: "c'c".into(),
                bar: 2.5,
            },
            inner: Inner { g_foo: 1, g_bar: 2 },
        };
        let si = StructInfo::of::<FooBar>();
        let mut rendered = Vec::new();
        for f in &si.fields {
            let mut buf = String::new();
            (f.codec.emit)(&rec, &mut buf);
            rendered.push(buf);
        }
        assert_eq!(rendered, ["123", "1.5", "NULL", "'a'", "'c''c'", "1", "2"]);

        assert_eq!(
            si.find_field("baz").unwrap().value_of(&rec),
            crate::Value::Int(123)
        );
        assert_eq!(
            si.find_field("g_bar").unwrap().value_of(&rec),
            crate::Value::Int(2)
        );
        assert_eq!(
            si.find_field("value").unwrap().value_of(&rec),
            crate::Value::Null
        );
    }

    #[derive(Record, Default)]
    struct Stamped {
        #[db("primary_key")]
        id: i64,
        #[db("created")]
        created_at: NaiveDateTime,
        #[db("updated")]
        updated_at: Option<NaiveDateTime>,
    }

    #[test]
    fn created_updated_accept_timestamps() {
        let si = StructInfo::of::<Stamped>();
        assert!(si.find_field("created_at").unwrap().is_created());
        assert!(si.find_field("updated_at").unwrap().is_updated());
        assert!(si.find_field("updated_at").unwrap().is_null_wrapper());
    }

    #[derive(Record, Default)]
    struct BadStamp {
        #[db("created")]
        created_at: i64,
    }

    #[test]
    #[should_panic(expected = "created/updated requires a timestamp")]
    fn created_on_non_timestamp_panics() {
        let _ = StructInfo::of::<BadStamp>();
    }
}
