//! Tagged field values.

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::Record;

/// A single field value inside a [`Record`].
///
/// The REST backend returns loosely typed JSON; every value is materialized
/// into one of these variants once, so path evaluation never has to guess
/// at runtime types.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// A parsed RFC 3339 instant with the text it was read from. Cells and
    /// key comparisons use the text, so offsets and precision survive export.
    Timestamp(DateTime<Utc>, String),
    Null,
    Record(Record),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts, _) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// The string form used when comparing key fields across entities.
    ///
    /// Integer ids and their string spelling compare equal (`42` and `"42"`).
    /// Nulls and composite values have no key form.
    pub fn key_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Timestamp(_, text) => Some(text.clone()),
            Value::Null | Value::Record(_) | Value::List(_) => None,
        }
    }

    /// Render the value as spreadsheet cell text.
    ///
    /// Composite values are rendered as compact JSON; null renders empty.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Record(_) | Value::List(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
            scalar => scalar.key_string().unwrap_or_default(),
        }
    }

    /// Convert a JSON value, keeping object keys exactly as given.
    pub fn from_json(json: serde_json::Value) -> Self {
        Self::from_json_with(json, &|key| key.to_string())
    }

    pub(crate) fn from_json_with(json: serde_json::Value, rename: &dyn Fn(&str) -> String) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => match parse_timestamp(&s) {
                Some(ts) => Value::Timestamp(ts, s),
                None => Value::String(s),
            },
            serde_json::Value::Array(items) => Value::List(
                items
                    .into_iter()
                    .map(|item| Self::from_json_with(item, rename))
                    .collect(),
            ),
            serde_json::Value::Object(map) => Value::Record(Record::from_map_with(map, rename)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(s) => serializer.serialize_str(s),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Timestamp(_, text) => serializer.serialize_str(text),
            Value::Null => serializer.serialize_unit(),
            Value::Record(record) => {
                let mut map = serializer.serialize_map(Some(record.len()))?;
                for (key, value) in record.iter() {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    // RFC 3339 needs at least "YYYY-MM-DDTHH:MM:SSZ"
    if s.len() < 20 || s.as_bytes().get(10) != Some(&b'T') {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
