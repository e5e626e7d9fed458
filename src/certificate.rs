//! A parsed X.509 certificate with the metadata the registry exposes on the
//! wire: subject/issuer common names, hex serial, validity window, algorithm
//! names, and the PEM form.

use chrono::{DateTime, Duration, TimeZone, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, Public};
use openssl::x509::{X509NameRef, X509};

use crate::error::AnsError;

#[derive(Debug, Clone)]
pub struct Certificate {
    x509: X509,
    pem: String,
    pub subject_common_name: String,
    pub issuer_common_name: String,
    /// Uppercase hex, no leading zeros, as produced by `BigNum::to_hex_str`.
    pub serial: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub signature_algorithm: String,
    pub public_key_algorithm: String,
}

impl Certificate {
    pub fn from_pem(pem: &str) -> Result<Self, AnsError> {
        let x509 = X509::from_pem(pem.as_bytes())
            .map_err(|e| AnsError::Schema(format!("not a PEM certificate: {e}")))?;
        Self::from_x509(x509)
    }

    pub fn from_x509(x509: X509) -> Result<Self, AnsError> {
        let pem_bytes = x509.to_pem()?;
        let pem = String::from_utf8(pem_bytes)
            .map_err(|e| AnsError::Internal(format!("certificate PEM is not UTF-8: {e}")))?;

        let subject_common_name = common_name(x509.subject_name())
            .ok_or_else(|| AnsError::Schema("certificate subject has no Common Name".into()))?;
        let issuer_common_name = common_name(x509.issuer_name())
            .ok_or_else(|| AnsError::Schema("certificate issuer has no Common Name".into()))?;

        let serial = x509
            .serial_number()
            .to_bn()?
            .to_hex_str()?
            .to_string();

        let not_before = asn1_to_datetime(x509.not_before())?;
        let not_after = asn1_to_datetime(x509.not_after())?;

        let signature_algorithm = x509.signature_algorithm().object().to_string();
        let public_key_algorithm = match x509.public_key()?.id() {
            Id::RSA => "RSA".to_string(),
            Id::EC => "EC".to_string(),
            Id::ED25519 => "Ed25519".to_string(),
            other => format!("{other:?}"),
        };

        Ok(Certificate {
            x509,
            pem,
            subject_common_name,
            issuer_common_name,
            serial,
            not_before,
            not_after,
            signature_algorithm,
            public_key_algorithm,
        })
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn x509(&self) -> &X509 {
        &self.x509
    }

    pub fn public_key(&self) -> Result<PKey<Public>, AnsError> {
        Ok(self.x509.public_key()?)
    }

    /// True when `now` falls inside the certificate's validity window.
    pub fn is_currently_valid(&self) -> bool {
        let now = Utc::now();
        self.not_before <= now && now <= self.not_after
    }

    /// Verify that this certificate carries a signature made by `issuer`'s
    /// key.
    pub fn verify_signed_by(&self, issuer: &PKey<Public>) -> Result<bool, AnsError> {
        Ok(self.x509.verify(issuer)?)
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.pem == other.pem
    }
}

impl Eq for Certificate {}

fn common_name(name: &X509NameRef) -> Option<String> {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|e| e.data().as_utf8().ok())
        .map(|d| d.to_string())
}

/// openssl exposes ASN.1 times only as opaque refs; diffing against the Unix
/// epoch recovers an absolute timestamp.
fn asn1_to_datetime(t: &Asn1TimeRef) -> Result<DateTime<Utc>, AnsError> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(t)?;
    let offset = Duration::days(diff.days as i64) + Duration::seconds(diff.secs as i64);
    Utc.timestamp_opt(0, 0)
        .single()
        .map(|e| e + offset)
        .ok_or_else(|| AnsError::Internal("epoch construction failed".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;
    use openssl::hash::MessageDigest;
    use openssl::x509::X509Name;

    fn self_signed(cn: &str) -> (PKey<openssl::pkey::Private>, X509) {
        let key = crypto::generate_keypair(2048).unwrap();
        let mut name = X509Name::builder().unwrap();
        name.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(30).unwrap())
            .unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        (key, builder.build())
    }

    #[test]
    fn extracts_metadata() {
        let (_, x509) = self_signed("test-subject");
        let cert = Certificate::from_x509(x509).unwrap();
        assert_eq!(cert.subject_common_name, "test-subject");
        assert_eq!(cert.issuer_common_name, "test-subject");
        assert_eq!(cert.public_key_algorithm, "RSA");
        assert!(cert.is_currently_valid());
        assert!(!cert.serial.is_empty());
    }

    #[test]
    fn pem_round_trip() {
        let (_, x509) = self_signed("round-trip");
        let cert = Certificate::from_x509(x509).unwrap();
        let again = Certificate::from_pem(cert.pem()).unwrap();
        assert_eq!(cert, again);
    }

    #[test]
    fn signature_check_distinguishes_issuers() {
        let (key, x509) = self_signed("signed");
        let cert = Certificate::from_x509(x509).unwrap();

        let own_public =
            PKey::public_key_from_pem(&key.public_key_to_pem().unwrap()).unwrap();
        assert!(cert.verify_signed_by(&own_public).unwrap());

        let (other_key, _) = self_signed("other");
        let other_public =
            PKey::public_key_from_pem(&other_key.public_key_to_pem().unwrap()).unwrap();
        assert!(!cert.verify_signed_by(&other_public).unwrap());
    }
}
