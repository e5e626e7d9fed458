//! Adapter for the Model Context Protocol (mcp).
//!
//! Required payload shape: `schema_version` and `context_specifications[]`
//! (each with `context_type`/`version`/`description`/`schema` and an
//! optional `max_tokens`), plus optional `document_types[]` and
//! `token_limit`.

use serde_json::{json, Value};

use crate::error::AnsError;

use super::{
    as_object, finish, optional_object_field, optional_uint_field, require_array, require_object,
    require_str, ProtocolAdapter,
};

pub struct McpAdapter;

impl ProtocolAdapter for McpAdapter {
    fn protocol(&self) -> &'static str {
        "mcp"
    }

    fn validate(&self, payload: &Value) -> Result<(), AnsError> {
        let mut reasons = Vec::new();
        let Some(root) = as_object(payload, "protocol_extensions", &mut reasons) else {
            return finish(reasons);
        };

        require_str(root, "schema_version", "protocol_extensions", &mut reasons);

        if let Some(specs) = require_array(
            root,
            "context_specifications",
            "protocol_extensions",
            &mut reasons,
        ) {
            for (i, spec) in specs.iter().enumerate() {
                let path = format!("context_specifications[{i}]");
                let Some(entry) = as_object(spec, &path, &mut reasons) else {
                    continue;
                };
                require_str(entry, "context_type", &path, &mut reasons);
                require_str(entry, "version", &path, &mut reasons);
                require_str(entry, "description", &path, &mut reasons);
                require_object(entry, "schema", &path, &mut reasons);
                optional_uint_field(entry, "max_tokens", &path, &mut reasons);
            }
        }

        if let Some(types) = root.get("document_types") {
            match types.as_array() {
                Some(items) => {
                    for (i, item) in items.iter().enumerate() {
                        if !item.is_string() {
                            reasons.push(format!("document_types[{i}] must be a string"));
                        }
                    }
                }
                None => reasons.push("document_types must be an array".to_string()),
            }
        }

        optional_uint_field(root, "token_limit", "protocol_extensions", &mut reasons);
        optional_object_field(root, "metadata", "protocol_extensions", &mut reasons);

        finish(reasons)
    }

    fn parse(&self, payload: &Value) -> Result<Value, AnsError> {
        self.validate(payload)?;
        let root = payload
            .as_object()
            .ok_or_else(|| AnsError::Internal("validated payload lost object shape".into()))?;

        let mut normalized = json!({
            "protocol": "mcp",
            "schema_version": root.get("schema_version").cloned().unwrap_or(Value::Null),
            "context_specifications": root
                .get("context_specifications")
                .cloned()
                .unwrap_or_else(|| json!([])),
            "document_types": root.get("document_types").cloned().unwrap_or_else(|| json!([])),
            "metadata": root.get("metadata").cloned().unwrap_or_else(|| json!({})),
        });
        if let Some(limit) = root.get("token_limit") {
            normalized["token_limit"] = limit.clone();
        }
        Ok(normalized)
    }

    fn format(&self, normalized: &Value) -> Result<Value, AnsError> {
        let root = normalized.as_object().ok_or_else(|| AnsError::ExtensionInvalid {
            reasons: vec!["normalized form must be an object".into()],
        })?;
        if root.get("protocol").and_then(Value::as_str) != Some("mcp") {
            return Err(AnsError::ExtensionInvalid {
                reasons: vec!["data is not in mcp normalized form".into()],
            });
        }

        let mut payload = json!({
            "schema_version": root.get("schema_version").cloned().unwrap_or_else(|| json!("1.0.0")),
            "context_specifications": root
                .get("context_specifications")
                .cloned()
                .unwrap_or_else(|| json!([])),
            "document_types": root.get("document_types").cloned().unwrap_or_else(|| json!([])),
            "metadata": root.get("metadata").cloned().unwrap_or_else(|| json!({})),
        });
        if let Some(limit) = root.get("token_limit") {
            payload["token_limit"] = limit.clone();
        }
        Ok(payload)
    }
}
