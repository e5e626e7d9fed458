//! Per-protocol validation and normalization of `protocol_extensions`
//! payloads.
//!
//! Each adapter exposes `validate`, `parse` (payload → normalized form), and
//! `format` (normalized form → payload). Adapters are looked up by protocol
//! token; registering a new protocol never touches the core.

mod a2a;
mod mcp;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::AnsError;

pub use a2a::A2aAdapter;
pub use mcp::McpAdapter;

pub trait ProtocolAdapter: Send + Sync {
    fn protocol(&self) -> &'static str;

    /// Structural validation of a raw payload. Collects every problem
    /// rather than stopping at the first.
    fn validate(&self, payload: &Value) -> Result<(), AnsError>;

    /// Validate and convert to the normalized internal form.
    fn parse(&self, payload: &Value) -> Result<Value, AnsError>;

    /// Convert a normalized form back into the protocol's wire payload.
    fn format(&self, normalized: &Value) -> Result<Value, AnsError>;
}

pub struct AdapterRegistry {
    adapters: HashMap<&'static str, Arc<dyn ProtocolAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        AdapterRegistry {
            adapters: HashMap::new(),
        }
    }

    /// Registry preloaded with the prescribed `a2a` and `mcp` adapters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(A2aAdapter));
        registry.register(Arc::new(McpAdapter));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ProtocolAdapter>) {
        self.adapters.insert(adapter.protocol(), adapter);
    }

    pub fn get(&self, protocol: &str) -> Result<Arc<dyn ProtocolAdapter>, AnsError> {
        self.adapters
            .get(protocol)
            .cloned()
            .ok_or_else(|| AnsError::UnsupportedProtocol(protocol.to_string()))
    }

    pub fn protocols(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.adapters.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ---------------------------------------------------------------------------
// Shared structural checks, accumulating dotted-path reasons
// ---------------------------------------------------------------------------

pub(crate) fn finish(reasons: Vec<String>) -> Result<(), AnsError> {
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(AnsError::ExtensionInvalid { reasons })
    }
}

pub(crate) fn as_object<'a>(
    value: &'a Value,
    path: &str,
    reasons: &mut Vec<String>,
) -> Option<&'a serde_json::Map<String, Value>> {
    match value.as_object() {
        Some(map) => Some(map),
        None => {
            reasons.push(format!("{path} must be an object"));
            None
        }
    }
}

pub(crate) fn require_str<'a>(
    obj: &'a serde_json::Map<String, Value>,
    key: &str,
    path: &str,
    reasons: &mut Vec<String>,
) -> Option<&'a str> {
    match obj.get(key) {
        Some(Value::String(s)) => Some(s),
        Some(_) => {
            reasons.push(format!("{path}.{key} must be a string"));
            None
        }
        None => {
            reasons.push(format!("{path}.{key} is required"));
            None
        }
    }
}

pub(crate) fn require_array<'a>(
    obj: &'a serde_json::Map<String, Value>,
    key: &str,
    path: &str,
    reasons: &mut Vec<String>,
) -> Option<&'a Vec<Value>> {
    match obj.get(key) {
        Some(Value::Array(items)) => Some(items),
        Some(_) => {
            reasons.push(format!("{path}.{key} must be an array"));
            None
        }
        None => {
            reasons.push(format!("{path}.{key} is required"));
            None
        }
    }
}

pub(crate) fn require_object<'a>(
    obj: &'a serde_json::Map<String, Value>,
    key: &str,
    path: &str,
    reasons: &mut Vec<String>,
) -> Option<&'a serde_json::Map<String, Value>> {
    match obj.get(key) {
        Some(Value::Object(map)) => Some(map),
        Some(_) => {
            reasons.push(format!("{path}.{key} must be an object"));
            None
        }
        None => {
            reasons.push(format!("{path}.{key} is required"));
            None
        }
    }
}

pub(crate) fn require_enum(
    obj: &serde_json::Map<String, Value>,
    key: &str,
    allowed: &[&str],
    path: &str,
    reasons: &mut Vec<String>,
) {
    if let Some(value) = require_str(obj, key, path, reasons) {
        if !allowed.contains(&value) {
            reasons.push(format!(
                "{path}.{key} must be one of [{}], got '{value}'",
                allowed.join(", ")
            ));
        }
    }
}

pub(crate) fn optional_object_field(
    obj: &serde_json::Map<String, Value>,
    key: &str,
    path: &str,
    reasons: &mut Vec<String>,
) {
    if let Some(value) = obj.get(key) {
        if !value.is_object() {
            reasons.push(format!("{path}.{key} must be an object"));
        }
    }
}

pub(crate) fn optional_uint_field(
    obj: &serde_json::Map<String, Value>,
    key: &str,
    path: &str,
    reasons: &mut Vec<String>,
) {
    if let Some(value) = obj.get(key) {
        if !value.is_u64() {
            reasons.push(format!("{path}.{key} must be a non-negative integer"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_knows_both_protocols() {
        let registry = AdapterRegistry::with_defaults();
        assert_eq!(registry.protocols(), ["a2a", "mcp"]);
        assert!(registry.get("a2a").is_ok());
        assert!(registry.get("mcp").is_ok());
    }

    #[test]
    fn unknown_protocol_is_unsupported() {
        let registry = AdapterRegistry::with_defaults();
        assert!(matches!(
            registry.get("gopher"),
            Err(AnsError::UnsupportedProtocol(_))
        ));
    }
}
