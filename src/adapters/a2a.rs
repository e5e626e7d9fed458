//! Adapter for the agent2agent (a2a) protocol.
//!
//! Required payload shape: `spec_version`, `capabilities[]` (each with
//! `name`/`version`/`description` and an optional
//! `interface.{inputs,outputs}`), `routing.protocol` from {http, grpc,
//! websocket}, and the three `security` selections from their enumerated
//! sets. The normalized form flattens `interface` into
//! `parameters`/`returns`.

use serde_json::{json, Map, Value};

use crate::error::AnsError;

use super::{
    as_object, finish, optional_object_field, require_array, require_enum, require_object,
    require_str, ProtocolAdapter,
};

const ROUTING_PROTOCOLS: &[&str] = &["http", "grpc", "websocket"];
const AUTHENTICATION: &[&str] = &["none", "oauth", "api_key", "jwt"];
const AUTHORIZATION: &[&str] = &["none", "rbac", "capability_based"];
const ENCRYPTION: &[&str] = &["none", "tls", "mtls"];

pub struct A2aAdapter;

impl ProtocolAdapter for A2aAdapter {
    fn protocol(&self) -> &'static str {
        "a2a"
    }

    fn validate(&self, payload: &Value) -> Result<(), AnsError> {
        let mut reasons = Vec::new();
        let Some(root) = as_object(payload, "protocol_extensions", &mut reasons) else {
            return finish(reasons);
        };

        require_str(root, "spec_version", "protocol_extensions", &mut reasons);

        if let Some(capabilities) =
            require_array(root, "capabilities", "protocol_extensions", &mut reasons)
        {
            for (i, capability) in capabilities.iter().enumerate() {
                let path = format!("capabilities[{i}]");
                let Some(entry) = as_object(capability, &path, &mut reasons) else {
                    continue;
                };
                require_str(entry, "name", &path, &mut reasons);
                require_str(entry, "version", &path, &mut reasons);
                require_str(entry, "description", &path, &mut reasons);
                if let Some(Value::Object(interface)) = entry.get("interface") {
                    optional_object_field(interface, "inputs", &format!("{path}.interface"), &mut reasons);
                    optional_object_field(interface, "outputs", &format!("{path}.interface"), &mut reasons);
                } else if entry.contains_key("interface") {
                    reasons.push(format!("{path}.interface must be an object"));
                }
            }
        }

        if let Some(routing) = require_object(root, "routing", "protocol_extensions", &mut reasons)
        {
            require_enum(routing, "protocol", ROUTING_PROTOCOLS, "routing", &mut reasons);
            if let Some(Value::Array(endpoints)) = routing.get("endpoints") {
                for (i, endpoint) in endpoints.iter().enumerate() {
                    let path = format!("routing.endpoints[{i}]");
                    if let Some(entry) = as_object(endpoint, &path, &mut reasons) {
                        require_str(entry, "url", &path, &mut reasons);
                        require_str(entry, "capability", &path, &mut reasons);
                    }
                }
            } else if routing.contains_key("endpoints") {
                reasons.push("routing.endpoints must be an array".to_string());
            }
        }

        if let Some(security) =
            require_object(root, "security", "protocol_extensions", &mut reasons)
        {
            require_enum(security, "authentication", AUTHENTICATION, "security", &mut reasons);
            require_enum(security, "authorization", AUTHORIZATION, "security", &mut reasons);
            require_enum(security, "encryption", ENCRYPTION, "security", &mut reasons);
        }

        optional_object_field(root, "metadata", "protocol_extensions", &mut reasons);

        finish(reasons)
    }

    fn parse(&self, payload: &Value) -> Result<Value, AnsError> {
        self.validate(payload)?;
        let root = payload
            .as_object()
            .ok_or_else(|| AnsError::Internal("validated payload lost object shape".into()))?;

        let capabilities: Vec<Value> = root
            .get("capabilities")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
            .map(|entry| {
                let mut normalized = Map::new();
                for key in ["name", "version", "description"] {
                    if let Some(v) = entry.get(key) {
                        normalized.insert(key.into(), v.clone());
                    }
                }
                if let Some(interface) = entry.get("interface").and_then(Value::as_object) {
                    normalized.insert(
                        "parameters".into(),
                        interface.get("inputs").cloned().unwrap_or_else(|| json!({})),
                    );
                    normalized.insert(
                        "returns".into(),
                        interface.get("outputs").cloned().unwrap_or_else(|| json!({})),
                    );
                }
                Value::Object(normalized)
            })
            .collect();

        Ok(json!({
            "protocol": "a2a",
            "spec_version": root.get("spec_version").cloned().unwrap_or(Value::Null),
            "capabilities": capabilities,
            "routing": root.get("routing").cloned().unwrap_or(Value::Null),
            "security": root.get("security").cloned().unwrap_or(Value::Null),
            "metadata": root.get("metadata").cloned().unwrap_or_else(|| json!({})),
        }))
    }

    fn format(&self, normalized: &Value) -> Result<Value, AnsError> {
        let root = normalized.as_object().ok_or_else(|| AnsError::ExtensionInvalid {
            reasons: vec!["normalized form must be an object".into()],
        })?;
        if root.get("protocol").and_then(Value::as_str) != Some("a2a") {
            return Err(AnsError::ExtensionInvalid {
                reasons: vec!["data is not in a2a normalized form".into()],
            });
        }

        let capabilities: Vec<Value> = root
            .get("capabilities")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|entry| {
                        let mut formatted = Map::new();
                        for key in ["name", "version", "description"] {
                            if let Some(v) = entry.get(key) {
                                formatted.insert(key.into(), v.clone());
                            }
                        }
                        if entry.contains_key("parameters") || entry.contains_key("returns") {
                            let mut interface = Map::new();
                            if let Some(p) = entry.get("parameters") {
                                interface.insert("inputs".into(), p.clone());
                            }
                            if let Some(r) = entry.get("returns") {
                                interface.insert("outputs".into(), r.clone());
                            }
                            formatted.insert("interface".into(), Value::Object(interface));
                        }
                        Value::Object(formatted)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({
            "spec_version": root.get("spec_version").cloned().unwrap_or_else(|| json!("1.0.0")),
            "capabilities": capabilities,
            "routing": root.get("routing").cloned().unwrap_or_else(|| json!({})),
            "security": root.get("security").cloned().unwrap_or_else(|| json!({})),
            "metadata": root.get("metadata").cloned().unwrap_or_else(|| json!({})),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_payload() -> Value {
        json!({
            "spec_version": "1.0.0",
            "capabilities": [{
                "name": "conversation",
                "version": "1.0.0",
                "description": "general chat",
                "interface": {
                    "inputs": {"message": "string"},
                    "outputs": {"reply": "string"}
                }
            }],
            "routing": {
                "protocol": "http",
                "endpoints": [{"url": "https://chat.example.com", "capability": "conversation"}]
            },
            "security": {
                "authentication": "jwt",
                "authorization": "rbac",
                "encryption": "tls"
            }
        })
    }

    #[test]
    fn accepts_well_formed_payloads() {
        A2aAdapter.validate(&valid_payload()).unwrap();
    }

    #[test]
    fn missing_spec_version_is_reported() {
        let mut payload = valid_payload();
        payload.as_object_mut().unwrap().remove("spec_version");
        let err = A2aAdapter.validate(&payload).unwrap_err();
        match err {
            AnsError::ExtensionInvalid { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("spec_version")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_routing_protocol_is_reported() {
        let mut payload = valid_payload();
        payload["routing"]["protocol"] = json!("carrier-pigeon");
        let err = A2aAdapter.validate(&payload).unwrap_err();
        match err {
            AnsError::ExtensionInvalid { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("routing.protocol")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn collects_multiple_reasons() {
        let payload = json!({"capabilities": "nope"});
        match A2aAdapter.validate(&payload).unwrap_err() {
            AnsError::ExtensionInvalid { reasons } => assert!(reasons.len() >= 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parse_flattens_interface() {
        let normalized = A2aAdapter.parse(&valid_payload()).unwrap();
        assert_eq!(normalized["protocol"], "a2a");
        assert_eq!(
            normalized["capabilities"][0]["parameters"]["message"],
            "string"
        );
        assert_eq!(normalized["capabilities"][0]["returns"]["reply"], "string");
    }

    #[test]
    fn format_inverts_parse() {
        let normalized = A2aAdapter.parse(&valid_payload()).unwrap();
        let formatted = A2aAdapter.format(&normalized).unwrap();
        assert_eq!(
            formatted["capabilities"][0]["interface"]["inputs"]["message"],
            "string"
        );
        A2aAdapter.validate(&formatted).unwrap();
    }

    #[test]
    fn format_rejects_foreign_normalized_forms() {
        assert!(A2aAdapter.format(&json!({"protocol": "mcp"})).is_err());
    }
}
