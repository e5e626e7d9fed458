//! Agent Registry: persistence, filtered listing, and resolution with
//! semantic version negotiation and endpoint-record signing.

use std::sync::Arc;

use chrono::Utc;
use openssl::pkey::{PKey, Private};

use crate::agent::{Agent, EndpointRecord, EndpointRecordData};
use crate::ans_name::AnsNamePattern;
use crate::audit::{AuditEvent, AuditSink};
use crate::ca::CertificateAuthority;
use crate::certificate::Certificate;
use crate::crypto;
use crate::error::AnsError;
use crate::ocsp::{OcspClient, OcspResponder, OcspStatus};
use crate::ra::ValidatedRegistration;
use crate::storage::{AgentFilter, StoragePort};
use crate::version::VersionReq;

pub const LIST_MAX_DEFAULT: usize = 10;
pub const LIST_MAX_CEILING: usize = 100;

pub struct AgentRegistry {
    storage: Arc<dyn StoragePort>,
    ca: Arc<CertificateAuthority>,
    responder: Arc<OcspResponder>,
    /// `None` when OCSP is disabled by configuration; every check then takes
    /// the chain-verification fallback.
    ocsp_client: Option<Arc<OcspClient>>,
    audit: Arc<dyn AuditSink>,
    registry_key: PKey<Private>,
    registry_cert: Certificate,
}

impl AgentRegistry {
    /// Create the registry and obtain its own CA-issued certificate. Must be
    /// initialized after the CA and before the HTTP surface.
    pub fn new(
        common_name: &str,
        ca: Arc<CertificateAuthority>,
        storage: Arc<dyn StoragePort>,
        responder: Arc<OcspResponder>,
        ocsp_client: Option<Arc<OcspClient>>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, AnsError> {
        let registry_key = crypto::generate_keypair(crypto::RSA_KEY_BITS_DEFAULT)?;
        let csr = crypto::build_csr(common_name, &registry_key)?;
        let registry_cert = ca.issue(&csr)?;

        Ok(AgentRegistry {
            storage,
            ca,
            responder,
            ocsp_client,
            audit,
            registry_key,
            registry_cert,
        })
    }

    pub fn registry_certificate(&self) -> &Certificate {
        &self.registry_cert
    }

    /// Persist an agent after RA validation and CA issuance.
    pub fn register(&self, validated: ValidatedRegistration) -> Result<Agent, AnsError> {
        self.ca.verify_chain(&validated.certificate)?;

        let agent = Agent::new(
            &validated.name,
            validated.capabilities,
            validated.protocol_extensions,
            validated.endpoint,
            validated.certificate.serial.clone(),
        );
        self.storage.put_agent(&agent)?;
        self.audit.record(AuditEvent::Registered {
            agent_id: agent.agent_id.clone(),
            ans_name: agent.ans_name.clone(),
        });
        Ok(agent)
    }

    /// Filtered listing, stable in ascending `ans_name` order. `max` is
    /// clamped to [1, 100].
    pub fn list(&self, filter: &AgentFilter, max: usize) -> Result<Vec<Agent>, AnsError> {
        let max = max.clamp(1, LIST_MAX_CEILING);
        self.storage.query(filter, max)
    }

    /// Total number of active agents, for list envelopes.
    pub fn count_all(&self) -> Result<usize, AnsError> {
        Ok(self.storage.query(&AgentFilter::default(), usize::MAX)?.len())
    }

    pub fn get_by_ans_name(&self, ans_name: &str) -> Result<Option<Agent>, AnsError> {
        self.storage.get_by_ans_name(ans_name)
    }

    pub fn get_by_id(&self, agent_id: &str) -> Result<Option<Agent>, AnsError> {
        self.storage.get_by_id(agent_id)
    }

    /// Resolve a name or pattern to a signed endpoint record.
    ///
    /// Candidates are the active agents matching the pattern's fixed fields,
    /// narrowed by the version range (or by the exact version embedded in
    /// the name). The winner is the highest in-range version; ties go to the
    /// newest registration, then the lexicographically smallest agent id.
    /// Candidates whose certificate fails the OCSP + chain gate are skipped.
    pub fn resolve(
        &self,
        input: &str,
        version_range: Option<&str>,
    ) -> Result<EndpointRecord, AnsError> {
        let pattern = AnsNamePattern::parse(input)?;
        let requirement = version_range
            .map(|range| {
                VersionReq::parse(range)
                    .map_err(|e| AnsError::InvalidName(format!("version range: {e}")))
            })
            .transpose()?;

        let filter = AgentFilter {
            protocol: pattern.protocol.clone(),
            capability: pattern.capability.clone(),
            provider: pattern.provider.clone(),
            include_inactive: false,
        };
        let mut candidates: Vec<Agent> = self
            .storage
            .query(&filter, usize::MAX)?
            .into_iter()
            .filter(|a| {
                pattern
                    .agent_id
                    .as_deref()
                    .map_or(true, |id| id == a.agent_id)
            })
            .filter(|a| match (&requirement, &pattern.version) {
                (Some(req), _) => req.matches(&a.version),
                (None, Some(exact)) => a.version == *exact,
                (None, None) => true,
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.version
                .cmp(&a.version)
                .then_with(|| b.registration_time.cmp(&a.registration_time))
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });

        for candidate in candidates {
            let Some(cert) = self.ca.get_certificate(&candidate.certificate_serial) else {
                continue;
            };
            if !self.certificate_trusted(&cert) {
                continue;
            }

            let record = self.sign_endpoint_record(&candidate, &cert)?;
            self.audit.record(AuditEvent::Resolved {
                ans_name: candidate.ans_name.clone(),
                agent_id: candidate.agent_id.clone(),
            });
            return Ok(record);
        }

        Err(AnsError::NotFound(input.to_string()))
    }

    /// OCSP check plus chain verification. OCSP unavailability falls back to
    /// chain verification alone and is reported through the audit sink.
    fn certificate_trusted(&self, cert: &Certificate) -> bool {
        match &self.ocsp_client {
            Some(client) => match client.check(cert) {
                Ok(OcspStatus::Good) => self.ca.verify_chain(cert).is_ok(),
                Ok(_) => false,
                Err(e) => {
                    self.audit.record(AuditEvent::OcspFallback {
                        serial: cert.serial.clone(),
                        reason: e.to_string(),
                    });
                    self.ca.verify_chain(cert).is_ok()
                }
            },
            None => {
                self.audit.record(AuditEvent::OcspFallback {
                    serial: cert.serial.clone(),
                    reason: "ocsp disabled by configuration".into(),
                });
                self.ca.verify_chain(cert).is_ok()
            }
        }
    }

    fn sign_endpoint_record(
        &self,
        agent: &Agent,
        cert: &Certificate,
    ) -> Result<EndpointRecord, AnsError> {
        let data = EndpointRecordData {
            agent_id: agent.agent_id.clone(),
            ans_name: agent.ans_name.clone(),
            endpoint: agent.endpoint.clone(),
            capabilities: agent.capabilities.clone(),
            protocol_extensions: agent.protocol_extensions.clone(),
            certificate: cert.pem().to_string(),
            is_active: agent.is_active,
        };

        let value = serde_json::to_value(&data)
            .map_err(|e| AnsError::Internal(format!("record serialization: {e}")))?;
        let payload = crypto::canonical_json(&value).into_bytes();
        let signature = crypto::sign_data(&self.registry_key, &payload)?;

        Ok(EndpointRecord {
            data,
            signature: hex::encode(signature),
            registry_certificate: self.registry_cert.pem().to_string(),
        })
    }

    /// The client-side contract: canonical re-serialization, signature check
    /// against the embedded registry certificate, chain check of that
    /// certificate, and its OCSP status.
    pub fn verify_endpoint_record(&self, record: &EndpointRecord) -> Result<(), AnsError> {
        let registry_cert = Certificate::from_pem(&record.registry_certificate)?;
        self.ca.verify_chain(&registry_cert)?;

        if let Some(client) = &self.ocsp_client {
            match client.check(&registry_cert) {
                Ok(OcspStatus::Good) => {}
                Ok(OcspStatus::Revoked) => return Err(AnsError::CertificateRevoked),
                Ok(OcspStatus::Unknown) => return Err(AnsError::NotIssuedByThisCa),
                Err(e) => {
                    // Chain verification above already succeeded.
                    self.audit.record(AuditEvent::OcspFallback {
                        serial: registry_cert.serial.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let value = serde_json::to_value(&record.data)
            .map_err(|e| AnsError::Internal(format!("record serialization: {e}")))?;
        let payload = crypto::canonical_json(&value).into_bytes();
        let signature = hex::decode(&record.signature).map_err(|_| AnsError::SignatureInvalid)?;

        if !crypto::verify_data(&registry_cert.public_key()?, &payload, &signature)? {
            self.audit.record(AuditEvent::SignatureFailure {
                subject: record.data.agent_id.clone(),
            });
            return Err(AnsError::SignatureInvalid);
        }
        Ok(())
    }

    /// Store the renewed certificate on the agent record. The previous
    /// certificate is not revoked; it remains valid until expiry.
    pub fn complete_renewal(
        &self,
        agent: &Agent,
        new_cert: &Certificate,
    ) -> Result<Agent, AnsError> {
        let mut updated = agent.clone();
        updated.certificate_serial = new_cert.serial.clone();
        updated.last_renewal_time = Some(Utc::now());
        updated.is_active = true;
        self.storage.update_agent(&updated)?;
        self.audit.record(AuditEvent::Renewed {
            agent_id: updated.agent_id.clone(),
            serial: new_cert.serial.clone(),
        });
        Ok(updated)
    }

    /// Revoke a single certificate by serial: CA revocation plus synchronous
    /// invalidation of cached OCSP `good` answers, so fresh status queries
    /// report `revoked` the moment this returns.
    pub fn revoke_certificate(&self, serial: &str, reason: Option<&str>) -> Result<(), AnsError> {
        self.ca.revoke(serial, reason)?;
        self.responder.invalidate(serial);
        if let Some(client) = &self.ocsp_client {
            client.invalidate(serial);
        }
        Ok(())
    }

    /// Revoke an agent: every record under the agent id is deactivated and
    /// its certificate revoked. Idempotent.
    pub fn revoke_agent(&self, agent_id: &str, reason: Option<&str>) -> Result<(), AnsError> {
        let records = self.storage.list_by_id(agent_id)?;
        if records.is_empty() {
            return Err(AnsError::NotFound(agent_id.to_string()));
        }

        for mut record in records {
            self.revoke_certificate(&record.certificate_serial, reason)?;
            if record.is_active {
                record.is_active = false;
                self.storage.update_agent(&record)?;
            }
            self.audit.record(AuditEvent::Revoked {
                agent_id: record.agent_id.clone(),
                serial: record.certificate_serial.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterRegistry;
    use crate::audit::TracingAuditSink;
    use crate::ocsp::{InProcessTransport, OcspResponder};
    use crate::ra::RegistrationAuthority;
    use crate::schemas::{RegistrationRequest, RequestingAgent};
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use std::time::Duration;

    struct Stack {
        ca: Arc<CertificateAuthority>,
        ra: RegistrationAuthority,
        registry: AgentRegistry,
        responder: Arc<OcspResponder>,
    }

    fn stack() -> Stack {
        let storage: Arc<dyn StoragePort> = Arc::new(MemoryStorage::new());
        let ca = Arc::new(
            CertificateAuthority::new("Test CA", 365, storage.clone()).unwrap(),
        );
        let responder =
            Arc::new(OcspResponder::new(ca.clone(), Duration::from_secs(3600)).unwrap());
        let client = Arc::new(
            OcspClient::new(
                Arc::new(InProcessTransport::new(responder.clone())),
                ca.clone(),
                Duration::from_secs(600),
                Duration::from_secs(2),
            )
            .unwrap(),
        );
        let ra = RegistrationAuthority::new(ca.clone(), Arc::new(AdapterRegistry::with_defaults()));
        let registry = AgentRegistry::new(
            "ans-registry",
            ca.clone(),
            storage,
            responder.clone(),
            Some(client),
            Arc::new(TracingAuditSink),
        )
        .unwrap();
        Stack {
            ca,
            ra,
            registry,
            responder,
        }
    }

    fn a2a_extensions() -> serde_json::Value {
        json!({
            "spec_version": "1.0.0",
            "capabilities": [{
                "name": "conversation",
                "version": "1.0.0",
                "description": "chat"
            }],
            "routing": {"protocol": "http"},
            "security": {
                "authentication": "jwt",
                "authorization": "rbac",
                "encryption": "tls"
            }
        })
    }

    fn register(stack: &Stack, agent_id: &str, version: &str) -> Agent {
        register_with(&stack.ra, &stack.registry, agent_id, version)
    }

    fn register_with(
        ra: &RegistrationAuthority,
        registry: &AgentRegistry,
        agent_id: &str,
        version: &str,
    ) -> Agent {
        let key = crypto::generate_keypair(2048).unwrap();
        let request = RegistrationRequest {
            request_type: "registration".into(),
            requesting_agent: RequestingAgent {
                protocol: "a2a".into(),
                agent_name: agent_id.into(),
                agent_category: "conversation".into(),
                provider_name: "openai".into(),
                version: version.into(),
                extension: None,
                ans_name: format!("a2a://{agent_id}.conversation.openai.v{version}"),
                agent_capabilities: None,
                protocol_extensions: a2a_extensions(),
                agent_endpoint: format!("https://{agent_id}.example.com"),
                csr_pem: crypto::build_csr(agent_id, &key).unwrap(),
                agent_dns_name: None,
                agent_did: None,
            },
        };
        let validated = ra.process_registration(&request).unwrap();
        registry.register(validated).unwrap()
    }

    #[test]
    fn register_then_resolve_yields_verifiable_record() {
        let s = stack();
        register(&s, "chat", "1.2.3");

        let record = s
            .registry
            .resolve("a2a://chat.conversation.openai.v1.2.3", None)
            .unwrap();
        assert_eq!(record.data.agent_id, "chat");
        assert_eq!(record.data.endpoint, "https://chat.example.com");
        assert!(record.data.is_active);
        s.registry.verify_endpoint_record(&record).unwrap();
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let s = stack();
        register(&s, "chat", "1.2.3");

        let key = crypto::generate_keypair(2048).unwrap();
        let request = RegistrationRequest {
            request_type: "registration".into(),
            requesting_agent: RequestingAgent {
                protocol: "a2a".into(),
                agent_name: "chat".into(),
                agent_category: "conversation".into(),
                provider_name: "openai".into(),
                version: "1.2.3".into(),
                extension: None,
                ans_name: "a2a://chat.conversation.openai.v1.2.3".into(),
                agent_capabilities: None,
                protocol_extensions: a2a_extensions(),
                agent_endpoint: "https://chat.example.com".into(),
                csr_pem: crypto::build_csr("chat", &key).unwrap(),
                agent_dns_name: None,
                agent_did: None,
            },
        };
        let validated = s.ra.process_registration(&request).unwrap();
        assert!(matches!(
            s.registry.register(validated),
            Err(AnsError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn version_negotiation_picks_highest_in_range() {
        let s = stack();
        register(&s, "chat", "1.0.0");
        register(&s, "chat", "1.2.3");
        register(&s, "chat", "2.0.0");

        let record = s
            .registry
            .resolve("a2a://chat.conversation.openai.v1.0.0", Some("^1.0.0"))
            .unwrap();
        assert_eq!(record.data.ans_name, "a2a://chat.conversation.openai.v1.2.3");

        let record = s
            .registry
            .resolve("a2a://chat.conversation.openai.v2.0.0", Some("^2.0.0"))
            .unwrap();
        assert_eq!(record.data.ans_name, "a2a://chat.conversation.openai.v2.0.0");

        assert!(matches!(
            s.registry
                .resolve("a2a://chat.conversation.openai.v1.0.0", Some("^3.0.0")),
            Err(AnsError::NotFound(_))
        ));
    }

    #[test]
    fn no_silent_downgrade_outside_the_range() {
        let s = stack();
        register(&s, "chat", "1.0.0");
        assert!(matches!(
            s.registry.resolve("a2a://chat", Some(">=2.0.0")),
            Err(AnsError::NotFound(_))
        ));
    }

    #[test]
    fn pattern_without_version_resolves_highest() {
        let s = stack();
        register(&s, "chat", "1.0.0");
        register(&s, "chat", "2.0.0");

        let record = s.registry.resolve("a2a://chat", None).unwrap();
        assert_eq!(record.data.ans_name, "a2a://chat.conversation.openai.v2.0.0");
    }

    #[test]
    fn revoked_candidate_is_skipped_and_status_flips() {
        let s = stack();
        register(&s, "chat", "1.0.0");
        let newer = register(&s, "chat", "1.2.3");

        s.registry
            .revoke_certificate(&newer.certificate_serial, Some("compromised"))
            .unwrap();

        // Fresh OCSP answers report the revocation immediately.
        let resp = s
            .responder
            .respond(&s.responder.cert_id(&newer.certificate_serial))
            .unwrap();
        assert_eq!(resp.status, OcspStatus::Revoked);

        let record = s
            .registry
            .resolve("a2a://chat.conversation.openai.v1.0.0", Some("^1.0.0"))
            .unwrap();
        assert_eq!(record.data.ans_name, "a2a://chat.conversation.openai.v1.0.0");
    }

    #[test]
    fn tampered_record_fails_verification() {
        let s = stack();
        register(&s, "chat", "1.2.3");

        let mut record = s
            .registry
            .resolve("a2a://chat.conversation.openai.v1.2.3", None)
            .unwrap();
        record.data.endpoint = "https://evil.example.com".into();
        assert!(matches!(
            s.registry.verify_endpoint_record(&record),
            Err(AnsError::SignatureInvalid)
        ));
    }

    #[test]
    fn revoked_agent_no_longer_resolves() {
        let s = stack();
        register(&s, "chat", "1.2.3");
        s.registry.revoke_agent("chat", Some("retired")).unwrap();

        assert!(matches!(
            s.registry.resolve("a2a://chat", None),
            Err(AnsError::NotFound(_))
        ));
        // A second revocation settles on the same state.
        s.registry.revoke_agent("chat", Some("retired")).unwrap();
    }

    #[test]
    fn revoking_unknown_agent_is_not_found() {
        let s = stack();
        assert!(matches!(
            s.registry.revoke_agent("ghost", None),
            Err(AnsError::NotFound(_))
        ));
    }

    #[test]
    fn list_clamps_max_and_filters() {
        let s = stack();
        register(&s, "alpha", "1.0.0");
        register(&s, "beta", "1.0.0");
        register(&s, "gamma", "1.0.0");

        let all = s.registry.list(&AgentFilter::default(), 0).unwrap();
        assert_eq!(all.len(), 1); // clamped up to 1

        let all = s.registry.list(&AgentFilter::default(), 10).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].ans_name <= w[1].ans_name));

        let filter = AgentFilter {
            provider: Some("openai".into()),
            ..Default::default()
        };
        assert_eq!(s.registry.list(&filter, 10).unwrap().len(), 3);

        let filter = AgentFilter {
            provider: Some("anthropic".into()),
            ..Default::default()
        };
        assert!(s.registry.list(&filter, 10).unwrap().is_empty());
    }

    #[test]
    fn tie_break_prefers_newest_registration_then_smallest_id() {
        let s = stack();
        register(&s, "beta", "1.0.0");
        register(&s, "alpha", "1.0.0");

        // Same version and capability/provider; the wildcard id pattern makes
        // both candidates eligible. "alpha" was registered later.
        let record = s.registry.resolve("a2a://*.conversation.openai", None).unwrap();
        assert_eq!(record.data.agent_id, "alpha");
    }

    #[test]
    fn disabled_ocsp_takes_audited_fallback() {
        use crate::audit::test_support::RecordingSink;

        let storage: Arc<dyn StoragePort> = Arc::new(MemoryStorage::new());
        let ca = Arc::new(CertificateAuthority::new("Test CA", 365, storage.clone()).unwrap());
        let responder =
            Arc::new(OcspResponder::new(ca.clone(), Duration::from_secs(3600)).unwrap());
        let ra = RegistrationAuthority::new(ca.clone(), Arc::new(AdapterRegistry::with_defaults()));
        let sink = Arc::new(RecordingSink::default());
        let registry = AgentRegistry::new(
            "ans-registry",
            ca,
            storage,
            responder,
            None,
            sink.clone(),
        )
        .unwrap();
        register_with(&ra, &registry, "chat", "1.0.0");

        registry.resolve("a2a://chat", None).unwrap();
        let events = sink.events.lock();
        assert!(events
            .iter()
            .any(|e| matches!(e, crate::audit::AuditEvent::OcspFallback { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, crate::audit::AuditEvent::Resolved { .. })));
    }

    #[test]
    fn renewal_updates_record_and_keeps_old_cert_valid() {
        let s = stack();
        let agent = register(&s, "chat", "1.2.3");
        let old_serial = agent.certificate_serial.clone();
        let old_cert = s.ca.get_certificate(&old_serial).unwrap();

        let key = crypto::generate_keypair(2048).unwrap();
        let csr = crypto::build_csr("chat", &key).unwrap();
        let new_cert = s.ca.issue(&csr).unwrap();
        let renewed = s.registry.complete_renewal(&agent, &new_cert).unwrap();

        assert_eq!(renewed.certificate_serial, new_cert.serial);
        assert!(renewed.last_renewal_time.is_some());
        assert_eq!(renewed.ans_name, agent.ans_name);

        // The previous certificate is untouched by renewal.
        s.ca.verify_chain(&old_cert).unwrap();
        let resp = s.responder.respond(&s.responder.cert_id(&old_serial)).unwrap();
        assert_eq!(resp.status, OcspStatus::Good);
    }
}
