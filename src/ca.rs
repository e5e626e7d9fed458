//! Certificate Authority: issues agent certificates from CSRs, tracks
//! revocations, and verifies certificate chains.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private, Public};
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509Name, X509};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::ans_name::is_token;
use crate::certificate::Certificate;
use crate::crypto;
use crate::error::AnsError;
use crate::storage::StoragePort;

// X.509 version 3 is encoded as 2.
const X509_VERSION_3: i32 = 2;

/// Immutable record of a revocation, persisted through the storage port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationEntry {
    pub serial: String,
    pub revoked_at: DateTime<Utc>,
    pub reason: Option<String>,
}

struct CaState {
    issued: HashMap<String, Certificate>,
    revoked: HashMap<String, RevocationEntry>,
    serial_counter: u64,
}

pub struct CertificateAuthority {
    key: PKey<Private>,
    public_key: PKey<Public>,
    cert: Certificate,
    cert_validity_days: u32,
    storage: Arc<dyn StoragePort>,
    state: RwLock<CaState>,
}

impl CertificateAuthority {
    /// Create a CA with a fresh 2048-bit key and self-signed certificate.
    /// Previously persisted revocations are loaded back into memory.
    pub fn new(
        common_name: &str,
        cert_validity_days: u32,
        storage: Arc<dyn StoragePort>,
    ) -> Result<Self, AnsError> {
        let key = crypto::generate_keypair(crypto::RSA_KEY_BITS_DEFAULT)?;
        let cert = build_self_signed(common_name, &key, cert_validity_days)?;
        let public_key = PKey::public_key_from_pem(&key.public_key_to_pem()?)?;

        let mut revoked = HashMap::new();
        for entry in storage.list_revocations()? {
            revoked.insert(entry.serial.clone(), entry);
        }

        Ok(CertificateAuthority {
            key,
            public_key,
            cert,
            cert_validity_days,
            storage,
            state: RwLock::new(CaState {
                issued: HashMap::new(),
                revoked,
                serial_counter: 0,
            }),
        })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.cert
    }

    /// Sign bytes with the CA key. Used by the OCSP responder, which runs
    /// without a delegated responder certificate.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, AnsError> {
        crypto::sign_data(&self.key, data)
    }

    /// Issue a certificate from a PEM CSR. The CSR must carry a valid
    /// self-signature and a CN that satisfies the agent-id token rules.
    pub fn issue(&self, csr_pem: &str) -> Result<Certificate, AnsError> {
        let (req, cn) = crypto::parse_csr(csr_pem)?;
        if !is_token(&cn) {
            return Err(AnsError::InvalidCsr(format!(
                "common name '{cn}' is not a valid agent id token"
            )));
        }

        let serial_hex = {
            let mut state = self.state.write();
            state.serial_counter += 1;
            // Monotonic high half, random low half: unique within this CA and
            // collision-resistant across restarts.
            format!("{:016X}{:016X}", state.serial_counter, rand::random::<u64>())
        };

        let mut builder = X509::builder()?;
        builder.set_version(X509_VERSION_3)?;

        let serial_bn = BigNum::from_hex_str(&serial_hex)?;
        let serial_asn1 = serial_bn.to_asn1_integer()?;
        builder.set_serial_number(&serial_asn1)?;

        builder.set_subject_name(req.subject_name())?;
        builder.set_issuer_name(self.cert.x509().subject_name())?;
        let req_pubkey = req.public_key()?;
        builder.set_pubkey(&req_pubkey)?;

        let not_before = Asn1Time::days_from_now(0)?;
        builder.set_not_before(&not_before)?;
        let not_after = Asn1Time::days_from_now(self.cert_validity_days)?;
        builder.set_not_after(&not_after)?;

        // End-entity certificate: CA=false, signing and encipherment usages.
        let mut bc = BasicConstraints::new();
        bc.critical();
        builder.append_extension(bc.build()?)?;

        let mut ku = KeyUsage::new();
        ku.critical();
        ku.digital_signature();
        ku.non_repudiation();
        ku.key_encipherment();
        ku.data_encipherment();
        builder.append_extension(ku.build()?)?;

        builder.sign(&self.key, MessageDigest::sha256())?;

        let cert = Certificate::from_x509(builder.build())?;
        self.state
            .write()
            .issued
            .insert(cert.serial.clone(), cert.clone());
        Ok(cert)
    }

    /// Look up an issued certificate (including the CA's own) by serial.
    pub fn get_certificate(&self, serial: &str) -> Option<Certificate> {
        if serial == self.cert.serial {
            return Some(self.cert.clone());
        }
        self.state.read().issued.get(serial).cloned()
    }

    pub fn is_issued(&self, serial: &str) -> bool {
        serial == self.cert.serial || self.state.read().issued.contains_key(serial)
    }

    /// Revoke a certificate by serial. Idempotent: a second revocation
    /// returns the existing entry and does not overwrite the reason.
    pub fn revoke(&self, serial: &str, reason: Option<&str>) -> Result<RevocationEntry, AnsError> {
        let mut state = self.state.write();
        if let Some(existing) = state.revoked.get(serial) {
            return Ok(existing.clone());
        }

        let entry = RevocationEntry {
            serial: serial.to_string(),
            revoked_at: Utc::now(),
            reason: reason.map(str::to_string),
        };
        self.storage.put_revocation(&entry)?;
        state.revoked.insert(serial.to_string(), entry.clone());
        Ok(entry)
    }

    pub fn is_revoked(&self, serial: &str) -> bool {
        self.state.read().revoked.contains_key(serial)
    }

    pub fn revocation(&self, serial: &str) -> Option<RevocationEntry> {
        self.state.read().revoked.get(serial).cloned()
    }

    /// Verify a certificate against this CA. Revocation is consulted first
    /// so revoked certificates fail fast, then issuer signature, then the
    /// validity window against the CA's clock.
    pub fn verify_chain(&self, cert: &Certificate) -> Result<(), AnsError> {
        if self.is_revoked(&cert.serial) {
            return Err(AnsError::CertificateRevoked);
        }
        if cert == &self.cert {
            return Ok(());
        }
        if !cert.verify_signed_by(&self.public_key)? {
            return Err(AnsError::NotIssuedByThisCa);
        }
        if !cert.is_currently_valid() {
            return Err(AnsError::CertificateExpired);
        }
        Ok(())
    }
}

fn build_self_signed(
    common_name: &str,
    key: &PKey<Private>,
    validity_days: u32,
) -> Result<Certificate, AnsError> {
    let mut name = X509Name::builder()?;
    name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
    let name = name.build();

    let mut builder = X509::builder()?;
    builder.set_version(X509_VERSION_3)?;

    let mut serial = BigNum::new()?;
    serial.rand(
        128,
        openssl::bn::MsbOption::MAYBE_ZERO,
        false,
    )?;
    let serial_asn1 = serial.to_asn1_integer()?;
    builder.set_serial_number(&serial_asn1)?;

    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_pubkey(key)?;
    let not_before = Asn1Time::days_from_now(0)?;
    builder.set_not_before(&not_before)?;
    let not_after = Asn1Time::days_from_now(validity_days)?;
    builder.set_not_after(&not_after)?;

    let mut bc = BasicConstraints::new();
    bc.critical().ca().pathlen(0);
    builder.append_extension(bc.build()?)?;

    let mut ku = KeyUsage::new();
    ku.critical();
    ku.key_cert_sign();
    ku.crl_sign();
    ku.digital_signature();
    builder.append_extension(ku.build()?)?;

    builder.sign(key, MessageDigest::sha256())?;
    Certificate::from_x509(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn test_ca() -> CertificateAuthority {
        CertificateAuthority::new("Test CA", 365, Arc::new(MemoryStorage::new())).unwrap()
    }

    fn csr_for(cn: &str) -> String {
        let key = crypto::generate_keypair(2048).unwrap();
        crypto::build_csr(cn, &key).unwrap()
    }

    #[test]
    fn issues_and_verifies() {
        let ca = test_ca();
        let cert = ca.issue(&csr_for("chat")).unwrap();
        assert_eq!(cert.subject_common_name, "chat");
        assert_eq!(cert.issuer_common_name, "Test CA");
        assert!(ca.is_issued(&cert.serial));
        ca.verify_chain(&cert).unwrap();
    }

    #[test]
    fn serials_are_unique() {
        let ca = test_ca();
        let a = ca.issue(&csr_for("one")).unwrap();
        let b = ca.issue(&csr_for("two")).unwrap();
        assert_ne!(a.serial, b.serial);
    }

    #[test]
    fn rejects_bad_common_names() {
        let ca = test_ca();
        assert!(matches!(
            ca.issue(&csr_for("not a token")),
            Err(AnsError::InvalidCsr(_))
        ));
    }

    #[test]
    fn revocation_fails_chain_verification() {
        let ca = test_ca();
        let cert = ca.issue(&csr_for("doomed")).unwrap();
        ca.verify_chain(&cert).unwrap();

        ca.revoke(&cert.serial, Some("key compromise")).unwrap();
        assert!(matches!(
            ca.verify_chain(&cert),
            Err(AnsError::CertificateRevoked)
        ));
    }

    #[test]
    fn revoke_is_idempotent_and_keeps_first_reason() {
        let ca = test_ca();
        let cert = ca.issue(&csr_for("twice")).unwrap();

        let first = ca.revoke(&cert.serial, Some("first")).unwrap();
        let second = ca.revoke(&cert.serial, Some("second")).unwrap();
        assert_eq!(first.reason.as_deref(), Some("first"));
        assert_eq!(second.reason.as_deref(), Some("first"));
        assert_eq!(first.revoked_at, second.revoked_at);
    }

    #[test]
    fn revocations_are_persisted() {
        let storage = Arc::new(MemoryStorage::new());
        let ca = CertificateAuthority::new("Test CA", 365, storage.clone()).unwrap();
        let cert = ca.issue(&csr_for("persisted")).unwrap();
        ca.revoke(&cert.serial, None).unwrap();

        let stored = storage.get_revocation(&cert.serial).unwrap();
        assert!(stored.is_some());
    }

    #[test]
    fn foreign_certificates_are_rejected() {
        let ca = test_ca();
        let other = test_ca();
        let cert = other.issue(&csr_for("stranger")).unwrap();
        assert!(matches!(
            ca.verify_chain(&cert),
            Err(AnsError::NotIssuedByThisCa)
        ));
    }

    #[test]
    fn ca_certificate_verifies_against_itself() {
        let ca = test_ca();
        ca.verify_chain(ca.certificate()).unwrap();
    }
}
