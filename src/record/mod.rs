//! Records: the opaque key→value maps produced by the entity fetch port.
//!
//! A [`Record`] is immutable once it has been placed in an entity cache; the
//! only mutation API is used while materializing API responses and by tests.

mod path;
mod value;

pub use path::{evaluate, parse as parse_path, Segment};
pub use value::Value;

use std::collections::BTreeMap;

use inflector::cases::pascalcase::to_pascal_case;
use serde::{Serialize, Serializer};

/// Name of the primary identifier field on every entity.
pub const ID_FIELD: &str = "Id";

/// Free-form maps whose keys are user data, not API field names.
const VERBATIM_KEYS: &[&str] = &["Metadata"];

/// A mapping from field name to [`Value`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON object, keeping keys as given.
    ///
    /// Returns `None` when `json` is not an object.
    pub fn from_json(json: serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Object(map) => Some(Self::from_map_with(map, &|k| k.to_string())),
            _ => None,
        }
    }

    /// Build a record from a REST API payload.
    ///
    /// The backend speaks snake_case (`asset_id`); records use the PascalCase
    /// names the relationship catalog is written against (`AssetId`).
    pub fn from_api_json(json: serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Object(map) => Some(Self::from_map_with(map, &api_key)),
            _ => None,
        }
    }

    pub(crate) fn from_map_with(
        map: serde_json::Map<String, serde_json::Value>,
        rename: &dyn Fn(&str) -> String,
    ) -> Self {
        let fields = map
            .into_iter()
            .map(|(key, value)| {
                let key = rename(&key);
                let value = if VERBATIM_KEYS.contains(&key.as_str()) {
                    Value::from_json(value)
                } else {
                    Value::from_json_with(value, rename)
                };
                (key, value)
            })
            .collect();
        Self { fields }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Look up a single top-level field.
    ///
    /// Exact names win; otherwise the first case-insensitive match is used.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).or_else(|| {
            self.fields
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }

    /// Evaluate a nested dot path (see [`evaluate`]). Null values are absent.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        evaluate(self, path)
    }

    /// The key form of the value at `path`, if present and non-empty.
    pub fn key_at(&self, path: &str) -> Option<String> {
        self.lookup(path)
            .and_then(Value::key_string)
            .filter(|key| !key.is_empty())
    }

    /// The record's primary identifier.
    pub fn id(&self) -> Option<String> {
        self.key_at(ID_FIELD)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

fn api_key(key: &str) -> String {
    if key.contains('_') || key.chars().next().is_some_and(|c| c.is_ascii_lowercase()) {
        to_pascal_case(key)
    } else {
        key.to_string()
    }
}
