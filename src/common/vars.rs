//! JSON variable map used for call variables and tags.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered string-keyed JSON value map.
///
/// Backs `ExecutionContext::variables` and `ExecutionContext::tags`.
/// Values are arbitrary JSON so tags can carry strings, numbers and
/// booleans as the flow language allows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vars(Map<String, Value>);

#[allow(unused)]
impl Vars {
    /// create an empty variable map
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// set a variable, converting any serializable value to JSON
    pub fn set<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) {
        if let Ok(v) = serde_json::to_value(value) {
            self.0.insert(key.into(), v);
        }
    }

    /// builder-style set
    pub fn with<T: Serialize>(
        mut self,
        key: impl Into<String>,
        value: T,
    ) -> Self {
        self.set(key, value);
        self
    }

    /// get a variable, converting from JSON to the requested type
    pub fn get<T: for<'de> Deserialize<'de>>(
        &self,
        key: &str,
    ) -> Option<T> {
        self.0.get(key).cloned().and_then(|v| serde_json::from_value(v).ok())
    }

    /// get the raw JSON value, resolving dotted paths like `caller.number`
    pub fn get_path(
        &self,
        path: &str,
    ) -> Option<Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.0.get(first)?.clone();
        for part in parts {
            current = current.get(part)?.clone();
        }
        Some(current)
    }

    /// merge another map into this one, overwriting existing keys
    pub fn merge(
        &mut self,
        other: &Vars,
    ) {
        for (k, v) in other.0.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// check for a key
    pub fn contains_key(
        &self,
        key: &str,
    ) -> bool {
        self.0.contains_key(key)
    }

    /// number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// true when no entries exist
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// iterate over entries
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Value> for Vars {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::new(),
        }
    }
}

impl From<Vars> for Value {
    fn from(vars: Vars) -> Self {
        Value::Object(vars.0)
    }
}
