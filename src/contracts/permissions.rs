use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema version written into every snapshot produced by this crate.
pub const PERMISSION_SCHEMA_VERSION: u16 = 1;

/// key: entitlement-snapshot -> versioned capability map
///
/// Immutable copy of a plan's capabilities handed across boundaries: embedded in
/// session credentials, returned by the internal permissions endpoint and passed
/// to the quota synchronizer. Capability names are open; consumers pick the keys
/// they understand and ignore the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionSet {
    #[serde(default = "default_version")]
    pub version: u16,
    #[serde(default)]
    pub capabilities: BTreeMap<String, Value>,
}

fn default_version() -> u16 {
    PERMISSION_SCHEMA_VERSION
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl PermissionSet {
    pub fn empty() -> Self {
        Self {
            version: PERMISSION_SCHEMA_VERSION,
            capabilities: BTreeMap::new(),
        }
    }

    pub fn from_capabilities(capabilities: BTreeMap<String, Value>) -> Self {
        Self {
            version: PERMISSION_SCHEMA_VERSION,
            capabilities,
        }
    }

    /// Builds a snapshot from the JSON object stored on a plan row. Anything
    /// other than an object yields an empty set.
    pub fn from_plan_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::from_capabilities(map.into_iter().collect()),
            _ => Self::empty(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.capabilities.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.capabilities.get(key)
    }

    /// Reads a capability as a non-negative whole number. Strings, negative
    /// numbers and fractions are treated as not numeric.
    pub fn numeric(&self, key: &str) -> Option<u64> {
        let value = self.capabilities.get(key)?;
        if let Some(number) = value.as_u64() {
            return Some(number);
        }
        value
            .as_f64()
            .filter(|number| number.is_finite() && *number >= 0.0 && number.fract() == 0.0)
            .map(|number| number as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}
