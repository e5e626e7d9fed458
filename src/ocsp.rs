//! OCSP responder and client: real-time, signed certificate-status queries
//! with TTL caches on both sides.
//!
//! The responder signs with the CA key (no delegated responder certificate)
//! and caches responses until `next_update`. Revocation invalidates cached
//! `good` entries synchronously. The client caches `good` answers for
//! `min(next_update - now, client_ttl)` and reports transport or signature
//! failures to its caller, which falls back to direct chain verification.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ca::CertificateAuthority;
use crate::certificate::Certificate;
use crate::crypto;
use crate::error::AnsError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CertId {
    /// Hex SHA-256 of the issuer's DER-encoded subject name.
    pub issuer_name_hash: String,
    pub serial: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcspStatus {
    Good,
    Revoked,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcspResponse {
    pub cert_id: CertId,
    pub status: OcspStatus,
    pub produced_at: DateTime<Utc>,
    pub next_update: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<String>,
    /// Hex signature over the canonical bytes of everything above.
    pub signature: String,
    pub responder_certificate: String,
}

/// The canonical signing input: the response minus signature and responder
/// certificate.
fn signed_payload(resp: &OcspResponse) -> Result<Vec<u8>, AnsError> {
    let mut value = serde_json::to_value(resp)
        .map_err(|e| AnsError::Internal(format!("response serialization: {e}")))?;
    if let serde_json::Value::Object(map) = &mut value {
        map.remove("signature");
        map.remove("responder_certificate");
    }
    Ok(crypto::canonical_json(&value).into_bytes())
}

/// Hex SHA-256 over a certificate's DER subject name, used as the issuer
/// component of a `CertId`.
pub fn issuer_name_hash(cert: &Certificate) -> Result<String, AnsError> {
    let der = cert.x509().subject_name().to_der()?;
    Ok(hex::encode(Sha256::digest(der)))
}

/// Verify a response: the responder certificate must chain to the CA and the
/// signature must cover the canonical payload bytes.
pub fn verify_response(resp: &OcspResponse, ca: &CertificateAuthority) -> Result<(), AnsError> {
    let responder_cert = Certificate::from_pem(&resp.responder_certificate)?;
    ca.verify_chain(&responder_cert)?;

    let signature = hex::decode(&resp.signature)
        .map_err(|_| AnsError::SignatureInvalid)?;
    let payload = signed_payload(resp)?;
    if !crypto::verify_data(&responder_cert.public_key()?, &payload, &signature)? {
        return Err(AnsError::SignatureInvalid);
    }
    Ok(())
}

pub struct OcspResponder {
    ca: Arc<CertificateAuthority>,
    ttl: chrono::Duration,
    issuer_hash: String,
    cache: DashMap<CertId, OcspResponse>,
}

impl OcspResponder {
    pub fn new(ca: Arc<CertificateAuthority>, ttl: Duration) -> Result<Self, AnsError> {
        let issuer_hash = issuer_name_hash(ca.certificate())?;
        Ok(OcspResponder {
            ca,
            ttl: chrono::Duration::seconds(ttl.as_secs() as i64),
            issuer_hash,
            cache: DashMap::new(),
        })
    }

    pub fn issuer_hash(&self) -> &str {
        &self.issuer_hash
    }

    pub fn cert_id(&self, serial: &str) -> CertId {
        CertId {
            issuer_name_hash: self.issuer_hash.clone(),
            serial: serial.to_string(),
        }
    }

    /// Produce (or serve from cache) a signed status response.
    pub fn respond(&self, cert_id: &CertId) -> Result<OcspResponse, AnsError> {
        let now = Utc::now();

        if let Some(cached) = self.cache.get(cert_id) {
            // A cached `good` answer must never outlive a revocation.
            let stale = cached.status == OcspStatus::Good && self.ca.is_revoked(&cert_id.serial);
            if cached.next_update > now && !stale {
                return Ok(cached.clone());
            }
        }

        let (status, revocation_time, revocation_reason) =
            if cert_id.issuer_name_hash != self.issuer_hash {
                (OcspStatus::Unknown, None, None)
            } else if let Some(entry) = self.ca.revocation(&cert_id.serial) {
                (OcspStatus::Revoked, Some(entry.revoked_at), entry.reason)
            } else if self.ca.is_issued(&cert_id.serial) {
                (OcspStatus::Good, None, None)
            } else {
                (OcspStatus::Unknown, None, None)
            };

        let mut response = OcspResponse {
            cert_id: cert_id.clone(),
            status,
            produced_at: now,
            next_update: now + self.ttl,
            revocation_time,
            revocation_reason,
            signature: String::new(),
            responder_certificate: self.ca.certificate().pem().to_string(),
        };
        let payload = signed_payload(&response)?;
        response.signature = hex::encode(self.ca.sign(&payload)?);

        self.cache.insert(cert_id.clone(), response.clone());
        Ok(response)
    }

    /// Drop any cached `good` answer for a serial. Called synchronously as
    /// part of revocation, before the revoke operation returns.
    pub fn invalidate(&self, serial: &str) {
        self.cache
            .retain(|id, resp| !(id.serial == serial && resp.status == OcspStatus::Good));
    }
}

/// Transport seam between client and responder. The in-process transport is
/// the reference implementation; a networked one would honor the timeout.
pub trait OcspTransport: Send + Sync {
    fn fetch(&self, cert_id: &CertId, timeout: Duration) -> Result<OcspResponse, AnsError>;
}

pub struct InProcessTransport {
    responder: Arc<OcspResponder>,
}

impl InProcessTransport {
    pub fn new(responder: Arc<OcspResponder>) -> Self {
        InProcessTransport { responder }
    }
}

impl OcspTransport for InProcessTransport {
    fn fetch(&self, cert_id: &CertId, _timeout: Duration) -> Result<OcspResponse, AnsError> {
        self.responder.respond(cert_id)
    }
}

struct CachedStatus {
    status: OcspStatus,
    expires: DateTime<Utc>,
}

pub struct OcspClient {
    transport: Arc<dyn OcspTransport>,
    ca: Arc<CertificateAuthority>,
    ttl: chrono::Duration,
    timeout: Duration,
    issuer_hash: String,
    cache: DashMap<String, CachedStatus>,
}

impl OcspClient {
    pub fn new(
        transport: Arc<dyn OcspTransport>,
        ca: Arc<CertificateAuthority>,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Self, AnsError> {
        let issuer_hash = issuer_name_hash(ca.certificate())?;
        Ok(OcspClient {
            transport,
            ca,
            ttl: chrono::Duration::seconds(ttl.as_secs() as i64),
            timeout,
            issuer_hash,
            cache: DashMap::new(),
        })
    }

    /// Query the certificate's status. `Err` means the responder could not
    /// be consulted (transport or signature failure) and the caller should
    /// take the direct chain-verification fallback.
    pub fn check(&self, cert: &Certificate) -> Result<OcspStatus, AnsError> {
        let now = Utc::now();
        if let Some(cached) = self.cache.get(&cert.serial) {
            if cached.expires > now {
                return Ok(cached.status);
            }
        }

        let cert_id = CertId {
            issuer_name_hash: self.issuer_hash.clone(),
            serial: cert.serial.clone(),
        };
        let response = self
            .transport
            .fetch(&cert_id, self.timeout)
            .map_err(|e| AnsError::OcspUnavailable(e.to_string()))?;

        if response.cert_id.serial != cert.serial {
            return Err(AnsError::OcspUnavailable(
                "response is for a different serial".into(),
            ));
        }
        verify_response(&response, &self.ca)
            .map_err(|e| AnsError::OcspUnavailable(format!("response rejected: {e}")))?;

        if response.status == OcspStatus::Good {
            let expires = std::cmp::min(response.next_update, now + self.ttl);
            self.cache.insert(
                cert.serial.clone(),
                CachedStatus {
                    status: OcspStatus::Good,
                    expires,
                },
            );
        }
        Ok(response.status)
    }

    /// Drop the cached status for a serial, called synchronously on revoke.
    pub fn invalidate(&self, serial: &str) {
        self.cache.remove(serial);
    }
}
