//! Error taxonomy for the Agent Name Service.
//!
//! Every failure that crosses a component boundary is one of these kinds.
//! The HTTP layer maps them onto status codes; the core never panics on a
//! request path.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnsError {
    #[error("invalid ANS name: {0}")]
    InvalidName(String),

    #[error("request schema violation: {0}")]
    Schema(String),

    #[error("name mismatch: {0}")]
    NameMismatch(String),

    #[error("protocol extensions invalid: {}", reasons.join("; "))]
    ExtensionInvalid { reasons: Vec<String> },

    #[error("unsupported protocol '{0}'")]
    UnsupportedProtocol(String),

    #[error("agent id '{0}' is reserved")]
    ReservedName(String),

    #[error("invalid CSR: {0}")]
    InvalidCsr(String),

    #[error("already registered: {0}")]
    AlreadyRegistered(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("ambiguous resolution; candidate versions: {}", versions.join(", "))]
    Ambiguous { versions: Vec<String> },

    #[error("certificate expired")]
    CertificateExpired,

    #[error("certificate revoked")]
    CertificateRevoked,

    #[error("certificate was not issued by this CA")]
    NotIssuedByThisCa,

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("OCSP responder unavailable: {0}")]
    OcspUnavailable(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AnsError {
    /// Stable machine-readable kind label, used in audit events.
    pub fn kind(&self) -> &'static str {
        match self {
            AnsError::InvalidName(_) => "invalid_name",
            AnsError::Schema(_) => "schema_error",
            AnsError::NameMismatch(_) => "name_mismatch",
            AnsError::ExtensionInvalid { .. } => "extension_invalid",
            AnsError::UnsupportedProtocol(_) => "unsupported_protocol",
            AnsError::ReservedName(_) => "reserved_name",
            AnsError::InvalidCsr(_) => "invalid_csr",
            AnsError::AlreadyRegistered(_) => "already_registered",
            AnsError::NotFound(_) => "not_found",
            AnsError::Ambiguous { .. } => "ambiguous",
            AnsError::CertificateExpired => "certificate_expired",
            AnsError::CertificateRevoked => "certificate_revoked",
            AnsError::NotIssuedByThisCa => "not_issued_by_this_ca",
            AnsError::SignatureInvalid => "signature_invalid",
            AnsError::OcspUnavailable(_) => "ocsp_unavailable",
            AnsError::Storage(_) => "storage_error",
            AnsError::Internal(_) => "internal_error",
        }
    }
}

impl From<openssl::error::ErrorStack> for AnsError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        AnsError::Internal(format!("openssl: {e}"))
    }
}

impl From<serde_json::Error> for AnsError {
    fn from(e: serde_json::Error) -> Self {
        AnsError::Schema(e.to_string())
    }
}

pub type Result<T, E = AnsError> = std::result::Result<T, E>;
