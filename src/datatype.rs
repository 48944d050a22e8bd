// used for binding and reading values through SQLite
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};

// used for timestamps and identifiers
use chrono::NaiveDateTime;
use uuid::Uuid;

// used when serializing rows and indicators back to callers
use serde::ser::{Serialize, SerializeMap, Serializer};

// used to print out the string form of a value
use std::fmt;

/// Textual layout of timestamps, both when displayed and when compared as strings.
pub const TIMESTAMP_DISPLAY: &str = "%Y-%m-%dT%H:%M:%S%.f";
/// Layout used when a timestamp is written to SQLite.
pub const TIMESTAMP_STORAGE: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A loosely typed value flowing through the engine: bound parameters,
/// cells of executed rows and attributes read off domain objects.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(NaiveDateTime),
    Blob(Vec<u8>),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }
    /// Name of the variant, used in log lines next to a bound value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Datum::Null => "Null",
            Datum::Boolean(_) => "Boolean",
            Datum::Integer(_) => "Integer",
            Datum::Real(_) => "Real",
            Datum::Text(_) => "Text",
            Datum::Uuid(_) => "Uuid",
            Datum::Timestamp(_) => "Timestamp",
            Datum::Blob(_) => "Blob",
        }
    }
    /// Converts an untyped JSON value as received over the wire.
    /// Arrays and objects are kept as their compact JSON text.
    pub fn from_json(value: &serde_json::Value) -> Datum {
        match value {
            serde_json::Value::Null => Datum::Null,
            serde_json::Value::Bool(b) => Datum::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Datum::Integer(i),
                None => n.as_f64().map(Datum::Real).unwrap_or(Datum::Null),
            },
            serde_json::Value::String(s) => Datum::Text(s.clone()),
            other => Datum::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "null"),
            Datum::Boolean(b) => write!(f, "{}", b),
            Datum::Integer(i) => write!(f, "{}", i),
            Datum::Real(r) => write!(f, "{}", r),
            Datum::Text(s) => write!(f, "{}", s),
            Datum::Uuid(u) => write!(f, "{}", u.hyphenated()),
            Datum::Timestamp(t) => write!(f, "{}", t.format(TIMESTAMP_DISPLAY)),
            Datum::Blob(bytes) => {
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Datum::Boolean(b)
    }
}
impl From<i64> for Datum {
    fn from(i: i64) -> Self {
        Datum::Integer(i)
    }
}
impl From<f64> for Datum {
    fn from(r: f64) -> Self {
        Datum::Real(r)
    }
}
impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::Text(s.to_owned())
    }
}
impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::Text(s)
    }
}
impl From<Uuid> for Datum {
    fn from(u: Uuid) -> Self {
        Datum::Uuid(u)
    }
}
impl From<NaiveDateTime> for Datum {
    fn from(t: NaiveDateTime) -> Self {
        Datum::Timestamp(t)
    }
}
impl<T: Into<Datum>> From<Option<T>> for Datum {
    fn from(o: Option<T>) -> Self {
        o.map(Into::into).unwrap_or(Datum::Null)
    }
}

impl ToSql for Datum {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Datum::Null => ToSqlOutput::Owned(Value::Null),
            Datum::Boolean(b) => ToSqlOutput::Owned(Value::Integer(*b as i64)),
            Datum::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            Datum::Real(r) => ToSqlOutput::Owned(Value::Real(*r)),
            Datum::Text(s) => ToSqlOutput::from(s.as_str()),
            Datum::Uuid(u) => ToSqlOutput::Owned(Value::Text(u.hyphenated().to_string())),
            Datum::Timestamp(t) => {
                ToSqlOutput::Owned(Value::Text(t.format(TIMESTAMP_STORAGE).to_string()))
            }
            Datum::Blob(bytes) => ToSqlOutput::from(bytes.as_slice()),
        })
    }
}

impl FromSql for Datum {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Datum::Null,
            ValueRef::Integer(i) => Datum::Integer(i),
            ValueRef::Real(r) => Datum::Real(r),
            ValueRef::Text(bytes) => Datum::Text(
                std::str::from_utf8(bytes)
                    .map_err(|e| FromSqlError::Other(Box::new(e)))?
                    .to_owned(),
            ),
            ValueRef::Blob(bytes) => Datum::Blob(bytes.to_vec()),
        })
    }
}

impl Serialize for Datum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Datum::Null => serializer.serialize_none(),
            Datum::Boolean(b) => serializer.serialize_bool(*b),
            Datum::Integer(i) => serializer.serialize_i64(*i),
            Datum::Real(r) => serializer.serialize_f64(*r),
            Datum::Text(s) => serializer.serialize_str(s),
            other => serializer.collect_str(other),
        }
    }
}

// ------------- Record -------------

/// An ordered key to value record, the generic shape of a row handed back to callers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Datum)>,
}

impl Record {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }
    /// Inserts or replaces `key`, keeping the position of an existing key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Datum>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }
    pub fn get(&self, key: &str) -> Option<&Datum> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
    /// Flattens a JSON object one level deep, in the object's own key order.
    pub fn from_json_object(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        object
            .iter()
            .map(|(k, v)| (k.clone(), Datum::from_json(v)))
            .collect()
    }
}

impl FromIterator<(String, Datum)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Datum)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
