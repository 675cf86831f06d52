use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::ConfigError;

/// Configuration handed to a component's post construction step.
///
/// A configuration is a JSON object. Merging is shallow, top level keys of the
/// newer configuration replace the older ones.
///
/// # Example
/// ```rust
/// use weave_di::config::ComponentConfig;
/// use serde_json::json;
///
/// let defaults = json!({ "host": "localhost", "port": 80 });
/// let mut config = ComponentConfig::from_value(defaults).unwrap();
/// config.merge(ComponentConfig::from_value(json!({ "port": 8080 })).unwrap());
///
/// assert_eq!(config.get::<u16>("port").unwrap(), Some(8080));
/// assert_eq!(config.get::<String>("host").unwrap().as_deref(), Some("localhost"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentConfig {
    entries: Map<String, Value>,
}

impl ComponentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails if the value is not a JSON object
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Object(entries) => Ok(Self { entries }),
            _ => Err(ConfigError::NotAnObject),
        }
    }

    /// Sets a single entry, returning self for chaining
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Shallow merge - entries of `other` win
    pub fn merge(&mut self, other: ComponentConfig) {
        self.entries.extend(other.entries);
    }

    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Retrieve an entry deserialized into `T`
    ///
    /// Returns `Ok(None)` if the entry does not exist
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.entries
            .get(key)
            .map(|value| {
                T::deserialize(value).map_err(|source| ConfigError::Invalid {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Deserialize the whole configuration into `T`
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        T::deserialize(Value::Object(self.entries.clone())).map_err(|source| ConfigError::Invalid {
            key: String::new(),
            source,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl From<Map<String, Value>> for ComponentConfig {
    fn from(entries: Map<String, Value>) -> Self {
        Self { entries }
    }
}

impl TryFrom<Value> for ComponentConfig {
    type Error = ConfigError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

/// Applies a configuration to an optional existing one
pub(crate) fn apply(current: &mut Option<ComponentConfig>, config: ComponentConfig, merge: bool) {
    match current {
        Some(existing) if merge => existing.merge(config),
        _ => *current = Some(config),
    }
}
