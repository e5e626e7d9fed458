//! Registered-agent record and the signed endpoint record returned from
//! resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ans_name::AnsName;
use crate::error::AnsError;
use crate::version::Version;

/// A registered agent. The name components are stored alongside the
/// canonical `ans_name` string for indexed filtering; the certificate is
/// referenced by serial, never embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub ans_name: String,
    pub protocol: String,
    pub capability: String,
    pub provider: String,
    pub version: Version,
    pub capabilities: Vec<String>,
    pub protocol_extensions: serde_json::Value,
    pub endpoint: String,
    pub certificate_serial: String,
    pub registration_time: DateTime<Utc>,
    pub last_renewal_time: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Agent {
    pub fn new(
        name: &AnsName,
        capabilities: Vec<String>,
        protocol_extensions: serde_json::Value,
        endpoint: String,
        certificate_serial: String,
    ) -> Self {
        Agent {
            agent_id: name.agent_id.clone(),
            ans_name: name.to_string(),
            protocol: name.protocol.clone(),
            capability: name.capability.clone(),
            provider: name.provider.clone(),
            version: name.version,
            capabilities,
            protocol_extensions,
            endpoint,
            certificate_serial,
            registration_time: Utc::now(),
            last_renewal_time: None,
            is_active: true,
        }
    }

    /// Re-parse the stored canonical name. The stored components always match
    /// it; this recovers the structured form.
    pub fn parsed_name(&self) -> Result<AnsName, AnsError> {
        AnsName::parse(&self.ans_name)
    }
}

/// The signed payload of a resolution answer. `data` is canonicalized
/// (lex-sorted keys, no whitespace) and signed with the registry key; the
/// registry certificate rides along so the record verifies offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub data: EndpointRecordData,
    /// Hex-encoded SHA-256/RSA signature over the canonical bytes of `data`.
    pub signature: String,
    /// PEM certificate of the signing registry.
    pub registry_certificate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointRecordData {
    pub agent_id: String,
    pub ans_name: String,
    pub endpoint: String,
    pub capabilities: Vec<String>,
    pub protocol_extensions: serde_json::Value,
    /// The resolved agent's own certificate, PEM-encoded.
    pub certificate: String,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_components_match_parsed_name() {
        let name = AnsName::parse("a2a://chat.conversation.openai.v1.2.3").unwrap();
        let agent = Agent::new(
            &name,
            vec!["conversation".into()],
            json!({"spec_version": "1.0.0"}),
            "https://chat.example.com".into(),
            "1A2B".into(),
        );
        assert_eq!(agent.agent_id, "chat");
        assert_eq!(agent.parsed_name().unwrap(), name);
        assert_eq!(agent.version, name.version);
        assert!(agent.is_active);
        assert!(agent.last_renewal_time.is_none());
    }

    #[test]
    fn agent_serializes_snake_case() {
        let name = AnsName::parse("mcp://ctx.document.anthropic.v0.1.0").unwrap();
        let agent = Agent::new(&name, vec![], json!({}), "https://x".into(), "FF".into());
        let value = serde_json::to_value(&agent).unwrap();
        assert!(value.get("ans_name").is_some());
        assert!(value.get("certificate_serial").is_some());
        assert!(value.get("registration_time").is_some());
    }
}
