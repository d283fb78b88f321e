//! # parsim-types::params
//!
//! Per-component parameter maps. Parameters are settled at construction and
//! carried as strings; components pull typed values out with [`Params::get`].

use crate::errors::ConfigError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A string-keyed parameter map. Insertion order is preserved so that dumps
/// of the wire-up result are stable.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Params {
    #[serde(flatten)]
    entries: IndexMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|s| s.as_str())
    }

    /// Parses the parameter `key` as a `T`, or returns `default` when the
    /// key is absent.
    pub fn get<T: FromStr>(&self, comp: &str, key: &str, default: T) -> Result<T, ConfigError> {
        match self.entries.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| ConfigError::BadParameter {
                comp: comp.to_string(),
                key: key.to_string(),
                message: format!("cannot parse '{raw}'"),
            }),
        }
    }

    /// Like [`Params::get`] but the parameter must be present.
    pub fn require<T: FromStr>(&self, comp: &str, key: &str) -> Result<T, ConfigError> {
        let raw = self
            .entries
            .get(key)
            .ok_or_else(|| ConfigError::BadParameter {
                comp: comp.to_string(),
                key: key.to_string(),
                message: "missing required parameter".to_string(),
            })?;
        raw.parse().map_err(|_| ConfigError::BadParameter {
            comp: comp.to_string(),
            key: key.to_string(),
            message: format!("cannot parse '{raw}'"),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut p = Params::new();
        for (k, v) in iter {
            p.insert(k, v);
        }
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_get_with_default() {
        let mut p = Params::new();
        p.insert("count", "42");
        assert_eq!(p.get::<u64>("c", "count", 0).unwrap(), 42);
        assert_eq!(p.get::<u64>("c", "missing", 7).unwrap(), 7);
        assert!(p.require::<u64>("c", "missing").is_err());
    }
}
