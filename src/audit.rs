//! Observability collaborator: an abstract sink for audit events.
//!
//! The core only depends on the `AuditSink` trait; the default sink writes
//! structured `tracing` events under the `audit` target.

use tracing::{info, warn};

#[derive(Debug, Clone)]
pub enum AuditEvent {
    Registered {
        agent_id: String,
        ans_name: String,
    },
    Renewed {
        agent_id: String,
        serial: String,
    },
    Revoked {
        agent_id: String,
        serial: String,
    },
    Resolved {
        ans_name: String,
        agent_id: String,
    },
    /// The OCSP path could not be used and chain verification was consulted
    /// directly.
    OcspFallback {
        serial: String,
        reason: String,
    },
    SignatureFailure {
        subject: String,
    },
    /// A request failed at the API boundary.
    ApiFailure {
        request_id: String,
        subject: Option<String>,
        kind: &'static str,
        message: String,
    },
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Emits audit events as structured tracing records.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match event {
            AuditEvent::Registered { agent_id, ans_name } => {
                info!(target: "audit", event = "registered", %agent_id, %ans_name);
            }
            AuditEvent::Renewed { agent_id, serial } => {
                info!(target: "audit", event = "renewed", %agent_id, %serial);
            }
            AuditEvent::Revoked { agent_id, serial } => {
                info!(target: "audit", event = "revoked", %agent_id, %serial);
            }
            AuditEvent::Resolved { ans_name, agent_id } => {
                info!(target: "audit", event = "resolved", %ans_name, %agent_id);
            }
            AuditEvent::OcspFallback { serial, reason } => {
                warn!(target: "audit", event = "ocsp_fallback", %serial, %reason);
            }
            AuditEvent::SignatureFailure { subject } => {
                warn!(target: "audit", event = "signature_failure", %subject);
            }
            AuditEvent::ApiFailure {
                request_id,
                subject,
                kind,
                message,
            } => {
                warn!(
                    target: "audit",
                    event = "api_failure",
                    %request_id,
                    subject = subject.as_deref().unwrap_or("-"),
                    kind,
                    %message
                );
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Collects events for assertions in tests.
    #[derive(Default)]
    pub struct RecordingSink {
        pub events: Arc<Mutex<Vec<AuditEvent>>>,
    }

    impl AuditSink for RecordingSink {
        fn record(&self, event: AuditEvent) {
            self.events.lock().push(event);
        }
    }
}
