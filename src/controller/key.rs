//! # Reconcile Keys
//!
//! Keys are `namespace/name` strings. Objects in the empty namespace are keyed by
//! name alone.

use crate::controller::error::KeyError;
use kube::ResourceExt;
use std::fmt;

/// Parsed form of a queue key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReconcileKey {
    pub namespace: String,
    pub name: String,
}

impl ReconcileKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key for any namespaced object
    pub fn for_object<K: ResourceExt>(obj: &K) -> Self {
        Self::new(obj.namespace().unwrap_or_default(), obj.name_any())
    }

    /// Split a `namespace/name` string.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when the key has more than one `/` or an empty name.
    pub fn parse(key: &str) -> Result<Self, KeyError> {
        let (namespace, name) = match key.split_once('/') {
            Some((namespace, name)) => (namespace, name),
            None => ("", key),
        };
        if name.is_empty() || name.contains('/') {
            return Err(KeyError(key.to_string()));
        }
        Ok(Self::new(namespace, name))
    }
}

impl fmt::Display for ReconcileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

impl From<ReconcileKey> for String {
    fn from(key: ReconcileKey) -> Self {
        key.to_string()
    }
}
