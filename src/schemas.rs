//! Wire request/response types for the HTTP surface.
//!
//! Request envelopes use the camelCase field names of the published JSON
//! schemas; agent records and endpoint records serialize snake_case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::Agent;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistrationRequest {
    #[serde(rename = "requestType")]
    pub request_type: String,
    #[serde(rename = "requestingAgent")]
    pub requesting_agent: RequestingAgent,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestingAgent {
    pub protocol: String,
    #[serde(rename = "agentName")]
    pub agent_name: String,
    #[serde(rename = "agentCategory")]
    pub agent_category: String,
    #[serde(rename = "providerName")]
    pub provider_name: String,
    pub version: String,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(rename = "ansName")]
    pub ans_name: String,
    /// Capability list; defaults to the single `agentCategory` value.
    #[serde(rename = "agentCapabilities", default)]
    pub agent_capabilities: Option<Vec<String>>,
    #[serde(rename = "protocolExtensions")]
    pub protocol_extensions: Value,
    #[serde(rename = "agentEndpoint")]
    pub agent_endpoint: String,
    #[serde(rename = "csrPEM")]
    pub csr_pem: String,
    #[serde(rename = "agentDNSName", default)]
    pub agent_dns_name: Option<String>,
    #[serde(rename = "agentDID", default)]
    pub agent_did: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub status: &'static str,
    #[serde(rename = "registeredAgent")]
    pub registered_agent: Agent,
    /// PEM of the freshly issued certificate.
    pub certificate: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenewalRequest {
    #[serde(rename = "requestType")]
    pub request_type: String,
    #[serde(rename = "requestingAgent")]
    pub requesting_agent: RenewingAgent,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenewingAgent {
    #[serde(rename = "agentID")]
    pub agent_id: String,
    #[serde(rename = "ansName")]
    pub ans_name: String,
    pub protocol: String,
    #[serde(rename = "csrPEM")]
    pub csr_pem: String,
    #[serde(rename = "currentCertificate")]
    pub current_certificate: CertificateInfo,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CertificateInfo {
    #[serde(rename = "certificateSerialNumber")]
    pub certificate_serial_number: String,
    #[serde(rename = "certificatePEM")]
    pub certificate_pem: String,
}

#[derive(Debug, Serialize)]
pub struct RenewalResponse {
    pub status: &'static str,
    #[serde(rename = "renewedAgent")]
    pub renewed_agent: Agent,
    pub certificate: String,
    #[serde(rename = "validUntil")]
    pub valid_until: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevocationRequest {
    pub agent_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RevocationResponse {
    pub status: &'static str,
    pub agent_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolutionRequest {
    pub ans_name: String,
    #[serde(default)]
    pub version_range: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AgentListQuery {
    pub protocol: Option<String>,
    pub capability: Option<String>,
    pub provider: Option<String>,
    #[serde(default)]
    pub include_inactive: Option<bool>,
    pub max: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AgentListResponse {
    pub agents: Vec<Agent>,
    pub query: AgentListEcho,
    pub matching_count: usize,
    pub total_count: usize,
}

#[derive(Debug, Serialize)]
pub struct AgentListEcho {
    pub protocol: String,
    pub capability: String,
    pub provider: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcspRequestBody {
    #[serde(default)]
    pub issuer_name_hash: Option<String>,
    pub serial: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcspQuery {
    pub serial: String,
}
