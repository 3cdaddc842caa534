//! Free-form option bag supplied once at construction.
//!
//! Every read goes through [`OptionBag::resolve`], which never fails on a
//! missing key: absent keys (and explicit `null`) yield the caller's default.
//! A present value that cannot be read as the requested type is a
//! configuration error naming the key.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config_error;
use crate::errors::BoResult;

/// Immutable mapping from option name to JSON value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionBag {
    entries: Map<String, Value>,
}

impl OptionBag {
    pub fn new() -> Self {
        Self {
            entries: Map::new(),
        }
    }

    /// Parse a bag from a JSON object literal.
    pub fn from_json(text: &str) -> BoResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> BoResult<Self> {
        match value {
            Value::Object(entries) => Ok(Self { entries }),
            other => Err(config_error!(
                "options must be a JSON object, got {}",
                json_kind(&other)
            )),
        }
    }

    /// Builder-style insert used when assembling a bag in code.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read `key` as `T`, falling back to `default` when it is absent.
    pub fn resolve<T: DeserializeOwned>(&self, key: &str, default: T) -> BoResult<T> {
        Ok(self.resolve_optional(key)?.unwrap_or(default))
    }

    /// Read `key` as `T` when present.
    pub fn resolve_optional<T: DeserializeOwned>(&self, key: &str) -> BoResult<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => T::deserialize(value)
                .map(Some)
                .map_err(|e| config_error!("option `{key}` has an invalid value {value}: {e}")),
        }
    }

    /// Copy of the entries whose keys are not in `known`.
    pub fn without(&self, known: &[&str]) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(k, _)| !known.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BoError;
    use serde_json::json;

    #[test]
    fn absent_key_returns_default() {
        let bag = OptionBag::new();
        assert_eq!(bag.resolve("optimize_restarts", 5usize).unwrap(), 5);
        assert_eq!(bag.resolve("acquisition_jitter", 0.01).unwrap(), 0.01);
        assert!(bag.resolve_optional::<String>("kernel").unwrap().is_none());
    }

    #[test]
    fn null_is_treated_as_absent() {
        let bag = OptionBag::from_value(json!({ "acquisition_type": null })).unwrap();
        assert!(!bag.contains("acquisition_type"));
        assert_eq!(
            bag.resolve("acquisition_type", "EI".to_string()).unwrap(),
            "EI"
        );
    }

    #[test]
    fn present_value_wins_over_default() {
        let bag = OptionBag::new().with("max_iters", 250);
        assert_eq!(bag.resolve("max_iters", 1000usize).unwrap(), 250);
    }

    #[test]
    fn wrong_shape_is_a_configuration_error() {
        let bag = OptionBag::new().with("normalize_Y", "yes please");
        match bag.resolve("normalize_Y", true) {
            Err(BoError::Configuration(msg)) => assert!(msg.contains("normalize_Y")),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn resolving_does_not_mutate() {
        let bag = OptionBag::new().with("batch_size", 4);
        let before = bag.clone();
        let _ = bag.resolve("batch_size", 1usize);
        let _ = bag.resolve("num_cores", 1usize);
        assert_eq!(bag, before);
    }

    #[test]
    fn from_json_requires_an_object() {
        assert!(OptionBag::from_json(r#"{"model_type": "GP"}"#).is_ok());
        assert!(matches!(
            OptionBag::from_json("[1, 2]"),
            Err(BoError::Configuration(_))
        ));
        assert!(matches!(
            OptionBag::from_json("{not json"),
            Err(BoError::Serialization(_))
        ));
    }

    #[test]
    fn without_drops_known_keys() {
        let bag = OptionBag::new()
            .with("model_type", "GP")
            .with("simulator_path", "/opt/sim");
        let rest = bag.without(&["model_type"]);
        assert_eq!(rest.keys().collect::<Vec<_>>(), vec!["simulator_path"]);
    }
}
