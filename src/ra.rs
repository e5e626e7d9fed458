//! Registration Authority: the policy gate in front of the CA.
//!
//! Every registration passes, in order: request schema checks, ans_name /
//! field consistency, protocol-extension validation, the reserved-name
//! policy, and the CSR common-name check. Only then is the CSR forwarded to
//! the CA for issuance.

use std::sync::Arc;

use serde_json::Value;

use crate::adapters::AdapterRegistry;
use crate::agent::Agent;
use crate::ans_name::AnsName;
use crate::ca::CertificateAuthority;
use crate::certificate::Certificate;
use crate::crypto;
use crate::error::AnsError;
use crate::schemas::{RegistrationRequest, RenewalRequest};
use crate::version::Version;

/// Agent ids that may never be registered.
const RESERVED_AGENT_IDS: &[&str] = &["ans", "registry", "admin"];

/// The outcome of a validated registration: everything the registry needs
/// to persist the agent.
#[derive(Debug)]
pub struct ValidatedRegistration {
    pub name: AnsName,
    pub capabilities: Vec<String>,
    pub protocol_extensions: Value,
    pub endpoint: String,
    pub certificate: Certificate,
}

pub struct RegistrationAuthority {
    ca: Arc<CertificateAuthority>,
    adapters: Arc<AdapterRegistry>,
}

impl RegistrationAuthority {
    pub fn new(ca: Arc<CertificateAuthority>, adapters: Arc<AdapterRegistry>) -> Self {
        RegistrationAuthority { ca, adapters }
    }

    /// Validate a registration request and issue the agent's certificate.
    pub fn process_registration(
        &self,
        request: &RegistrationRequest,
    ) -> Result<ValidatedRegistration, AnsError> {
        self.check_registration_schema(request)?;
        let agent = &request.requesting_agent;

        // The ans_name must agree with every individually supplied field.
        let name = AnsName::parse(&agent.ans_name)?;
        let requested_version = Version::parse(&agent.version)
            .map_err(|e| AnsError::Schema(format!("version: {e}")))?;
        check_field("protocol", &name.protocol, &agent.protocol)?;
        check_field("agent id", &name.agent_id, &agent.agent_name)?;
        check_field("capability", &name.capability, &agent.agent_category)?;
        check_field("provider", &name.provider, &agent.provider_name)?;
        if name.version != requested_version {
            return Err(AnsError::NameMismatch(format!(
                "version '{}' in ans_name does not match request field '{}'",
                name.version, agent.version
            )));
        }
        if let Some(ext) = &agent.extension {
            if name.extension.as_deref() != Some(ext.as_str()) {
                return Err(AnsError::NameMismatch(format!(
                    "extension '{ext}' does not match ans_name"
                )));
            }
        }

        // Unknown protocols are rejected before the payload is inspected.
        let adapter = self.adapters.get(&name.protocol)?;
        adapter.validate(&agent.protocol_extensions)?;

        if RESERVED_AGENT_IDS.contains(&name.agent_id.as_str()) {
            return Err(AnsError::ReservedName(name.agent_id.clone()));
        }

        // The CSR must be issued for the agent itself.
        let (_, csr_cn) = crypto::parse_csr(&agent.csr_pem)?;
        if csr_cn != name.agent_id {
            return Err(AnsError::InvalidCsr(format!(
                "CSR common name '{csr_cn}' must equal agent id '{}'",
                name.agent_id
            )));
        }

        let certificate = self.ca.issue(&agent.csr_pem)?;

        let capabilities = agent
            .agent_capabilities
            .clone()
            .unwrap_or_else(|| vec![agent.agent_category.clone()]);

        Ok(ValidatedRegistration {
            name,
            capabilities,
            protocol_extensions: agent.protocol_extensions.clone(),
            endpoint: agent.agent_endpoint.clone(),
            certificate,
        })
    }

    /// Validate a renewal against the stored agent record and issue a fresh
    /// certificate. The previous certificate is left untouched; it expires
    /// naturally unless explicitly revoked.
    pub fn process_renewal(
        &self,
        request: &RenewalRequest,
        current: &Agent,
    ) -> Result<Certificate, AnsError> {
        if request.request_type != "renewal" {
            return Err(AnsError::Schema(format!(
                "requestType must be 'renewal', got '{}'",
                request.request_type
            )));
        }
        let renewing = &request.requesting_agent;
        require_non_empty("agentID", &renewing.agent_id)?;
        require_non_empty("csrPEM", &renewing.csr_pem)?;

        if renewing.agent_id != current.agent_id {
            return Err(AnsError::NameMismatch(format!(
                "agent id '{}' does not match record '{}'",
                renewing.agent_id, current.agent_id
            )));
        }
        // Renewals must preserve the registered name exactly.
        if renewing.ans_name != current.ans_name {
            return Err(AnsError::NameMismatch(format!(
                "renewal must preserve ans_name '{}'",
                current.ans_name
            )));
        }

        let presented = Certificate::from_pem(&renewing.current_certificate.certificate_pem)?;
        if presented.subject_common_name != current.agent_id {
            return Err(AnsError::NameMismatch(format!(
                "presented certificate belongs to '{}', not '{}'",
                presented.subject_common_name, current.agent_id
            )));
        }
        if presented.serial != current.certificate_serial
            || renewing.current_certificate.certificate_serial_number != current.certificate_serial
        {
            return Err(AnsError::NameMismatch(format!(
                "presented serial does not match the registered certificate for '{}'",
                current.agent_id
            )));
        }
        if self.ca.is_revoked(&presented.serial) {
            return Err(AnsError::CertificateRevoked);
        }
        self.ca.verify_chain(&presented)?;

        let (_, csr_cn) = crypto::parse_csr(&renewing.csr_pem)?;
        if csr_cn != current.agent_id {
            return Err(AnsError::InvalidCsr(format!(
                "CSR common name '{csr_cn}' must equal agent id '{}'",
                current.agent_id
            )));
        }

        self.ca.issue(&renewing.csr_pem)
    }

    fn check_registration_schema(&self, request: &RegistrationRequest) -> Result<(), AnsError> {
        if request.request_type != "registration" {
            return Err(AnsError::Schema(format!(
                "requestType must be 'registration', got '{}'",
                request.request_type
            )));
        }
        let agent = &request.requesting_agent;
        require_non_empty("protocol", &agent.protocol)?;
        require_non_empty("agentName", &agent.agent_name)?;
        require_non_empty("agentCategory", &agent.agent_category)?;
        require_non_empty("providerName", &agent.provider_name)?;
        require_non_empty("version", &agent.version)?;
        require_non_empty("ansName", &agent.ans_name)?;
        require_non_empty("csrPEM", &agent.csr_pem)?;
        require_non_empty("agentEndpoint", &agent.agent_endpoint)?;
        if !agent.agent_endpoint.contains("://") {
            return Err(AnsError::Schema(format!(
                "agentEndpoint '{}' is not a URI",
                agent.agent_endpoint
            )));
        }
        if !agent.protocol_extensions.is_object() {
            return Err(AnsError::Schema(
                "protocolExtensions must be an object".into(),
            ));
        }
        Ok(())
    }
}

fn check_field(what: &str, in_name: &str, in_request: &str) -> Result<(), AnsError> {
    if in_name != in_request {
        return Err(AnsError::NameMismatch(format!(
            "{what} '{in_name}' in ans_name does not match request field '{in_request}'"
        )));
    }
    Ok(())
}

fn require_non_empty(field: &str, value: &str) -> Result<(), AnsError> {
    if value.trim().is_empty() {
        return Err(AnsError::Schema(format!("{field} must not be empty")));
    }
    Ok(())
}
