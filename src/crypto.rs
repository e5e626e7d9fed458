//! Crypto primitives: RSA keys, CSRs, detached signatures, and the canonical
//! JSON form that is the sole input to endpoint-record and OCSP signing.

use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private, Public};
use openssl::rsa::Rsa;
use openssl::sign::{Signer, Verifier};
use openssl::x509::{X509Name, X509Req};

use crate::error::AnsError;

pub const RSA_KEY_BITS_DEFAULT: u32 = 2048;

/// Generate an RSA private key (2048-bit by default).
pub fn generate_keypair(bits: u32) -> Result<PKey<Private>, AnsError> {
    let rsa = Rsa::generate(bits)?;
    Ok(PKey::from_rsa(rsa)?)
}

/// Build a PEM-encoded CSR with a CN-only subject, self-signed with SHA-256.
pub fn build_csr(common_name: &str, key: &PKey<Private>) -> Result<String, AnsError> {
    let mut name = X509Name::builder()?;
    name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
    let name = name.build();

    let mut req = X509Req::builder()?;
    req.set_subject_name(&name)?;
    req.set_pubkey(key)?;
    req.sign(key, MessageDigest::sha256())?;

    let pem = req.build().to_pem()?;
    String::from_utf8(pem).map_err(|e| AnsError::Internal(format!("CSR PEM is not UTF-8: {e}")))
}

/// Parse a PEM CSR and verify its self-signature. Returns the request and
/// its subject CN.
pub fn parse_csr(pem: &str) -> Result<(X509Req, String), AnsError> {
    let req = X509Req::from_pem(pem.as_bytes())
        .map_err(|e| AnsError::InvalidCsr(format!("not parseable as PEM CSR: {e}")))?;

    let public_key = req
        .public_key()
        .map_err(|e| AnsError::InvalidCsr(format!("no public key: {e}")))?;
    let self_signed = req
        .verify(&public_key)
        .map_err(|e| AnsError::InvalidCsr(format!("signature check failed: {e}")))?;
    if !self_signed {
        return Err(AnsError::InvalidCsr("self-signature does not verify".into()));
    }

    let cn = req
        .subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|e| e.data().as_utf8().ok())
        .map(|d| d.to_string())
        .ok_or_else(|| AnsError::InvalidCsr("subject has no Common Name".into()))?;

    Ok((req, cn))
}

/// Sign bytes with SHA-256 + RSA.
pub fn sign_data(key: &PKey<Private>, data: &[u8]) -> Result<Vec<u8>, AnsError> {
    let mut signer = Signer::new(MessageDigest::sha256(), key)?;
    signer.update(data)?;
    Ok(signer.sign_to_vec()?)
}

/// Verify an SHA-256 + RSA signature against a public key.
pub fn verify_data(key: &PKey<Public>, data: &[u8], signature: &[u8]) -> Result<bool, AnsError> {
    let mut verifier = Verifier::new(MessageDigest::sha256(), key)?;
    verifier.update(data)?;
    Ok(verifier.verify(signature)?)
}

/// Canonical JSON: object keys in lexicographic order, no insignificant
/// whitespace, UTF-8. Two canonicalizations of the same value are
/// byte-identical, which makes the output usable as a signature input.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        // Scalars already have a single serialization.
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sign_verify_round_trip() {
        let key = generate_keypair(RSA_KEY_BITS_DEFAULT).unwrap();
        let data = b"endpoint record bytes";
        let sig = sign_data(&key, data).unwrap();

        let public_pem = key.public_key_to_pem().unwrap();
        let public = PKey::public_key_from_pem(&public_pem).unwrap();
        assert!(verify_data(&public, data, &sig).unwrap());
        assert!(!verify_data(&public, b"tampered", &sig).unwrap());
    }

    #[test]
    fn csr_round_trip_preserves_cn() {
        let key = generate_keypair(RSA_KEY_BITS_DEFAULT).unwrap();
        let pem = build_csr("chat", &key).unwrap();
        let (_, cn) = parse_csr(&pem).unwrap();
        assert_eq!(cn, "chat");
    }

    #[test]
    fn garbage_csr_is_rejected() {
        assert!(matches!(
            parse_csr("-----BEGIN CERTIFICATE REQUEST-----\nnope\n-----END CERTIFICATE REQUEST-----"),
            Err(AnsError::InvalidCsr(_))
        ));
    }

    #[test]
    fn canonical_json_sorts_keys_and_strips_whitespace() {
        let value = json!({
            "endpoint": "https://agent.example.com",
            "agent_id": "chat",
            "capabilities": ["conversation", "summarization"],
            "nested": {"z": 1, "a": {"y": true, "b": null}}
        });
        assert_eq!(
            canonical_json(&value),
            r#"{"agent_id":"chat","capabilities":["conversation","summarization"],"endpoint":"https://agent.example.com","nested":{"a":{"b":null,"y":true},"z":1}}"#
        );
    }

    #[test]
    fn canonical_json_is_idempotent() {
        let value = json!({"b": [1, 2, {"d": "x", "c": "y"}], "a": 0.5});
        let once = canonical_json(&value);
        let reparsed: serde_json::Value = serde_json::from_str(&once).unwrap();
        assert_eq!(once, canonical_json(&reparsed));
    }

    #[test]
    fn canonical_json_escapes_strings() {
        let value = json!({"k": "line\nbreak \"quoted\""});
        assert_eq!(canonical_json(&value), r#"{"k":"line\nbreak \"quoted\""}"#);
    }
}
