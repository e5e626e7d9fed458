//! HTTP surface for the Agent Name Service.
//!
//! Routes: `/register`, `/renew`, `/revoke`, `/resolve`, `/agents`, `/ocsp`,
//! and `/health`. The handlers translate the error taxonomy into status
//! codes and emit an audit event for every failed request.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::adapters::AdapterRegistry;
use crate::audit::{AuditEvent, AuditSink, TracingAuditSink};
use crate::ca::CertificateAuthority;
use crate::configs::AppConfig;
use crate::error::AnsError;
use crate::ocsp::{CertId, InProcessTransport, OcspClient, OcspResponder};
use crate::ra::RegistrationAuthority;
use crate::registry::{AgentRegistry, LIST_MAX_DEFAULT};
use crate::schemas::{
    AgentListEcho, AgentListQuery, AgentListResponse, OcspQuery, OcspRequestBody,
    RegistrationRequest, RegistrationResponse, RenewalRequest, RenewalResponse,
    ResolutionRequest, RevocationRequest, RevocationResponse,
};
use crate::storage::{AgentFilter, MemoryStorage, StoragePort};

pub struct AppContext {
    pub config: AppConfig,
    pub ra: RegistrationAuthority,
    pub registry: AgentRegistry,
    pub responder: Arc<OcspResponder>,
    pub audit: Arc<dyn AuditSink>,
}

pub type AppState = Arc<AppContext>;

/// Wire up the whole service in dependency order: storage, CA, OCSP
/// responder and client, RA, registry. Nothing here is lazy; a failure
/// aborts startup.
pub fn build_context(config: AppConfig) -> Result<AppContext, AnsError> {
    let storage: Arc<dyn StoragePort> = Arc::new(MemoryStorage::new());
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);

    let ca = Arc::new(CertificateAuthority::new(
        &config.ca.common_name,
        config.ca.cert_validity_days,
        storage.clone(),
    )?);
    info!(serial = %ca.certificate().serial, "certificate authority initialized");

    let responder = Arc::new(OcspResponder::new(
        ca.clone(),
        Duration::from_secs(config.ocsp.responder_ttl_secs),
    )?);

    let ocsp_client = if config.ocsp.enabled {
        Some(Arc::new(OcspClient::new(
            Arc::new(InProcessTransport::new(responder.clone())),
            ca.clone(),
            Duration::from_secs(config.ocsp.client_ttl_secs),
            Duration::from_millis(config.ocsp.transport_timeout_ms),
        )?))
    } else {
        None
    };

    let ra = RegistrationAuthority::new(ca.clone(), Arc::new(AdapterRegistry::with_defaults()));

    let registry = AgentRegistry::new(
        &config.registry.common_name,
        ca,
        storage,
        responder.clone(),
        ocsp_client,
        audit.clone(),
    )?;
    info!(
        serial = %registry.registry_certificate().serial,
        "registry certificate issued"
    );

    Ok(AppContext {
        config,
        ra,
        registry,
        responder,
        audit,
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/renew", post(renew))
        .route("/revoke", post(revoke))
        .route("/resolve", post(resolve))
        .route("/agents", get(list_agents))
        .route("/ocsp", get(ocsp_get).post(ocsp_post))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        state.config.server.host, state.config.server.port
    )
    .parse()?;

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Agent Name Service listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Error translation
// ============================================================================

fn status_for(err: &AnsError) -> StatusCode {
    match err {
        AnsError::InvalidName(_)
        | AnsError::Schema(_)
        | AnsError::NameMismatch(_)
        | AnsError::ExtensionInvalid { .. }
        | AnsError::UnsupportedProtocol(_)
        | AnsError::ReservedName(_)
        | AnsError::InvalidCsr(_) => StatusCode::BAD_REQUEST,
        AnsError::AlreadyRegistered(_) | AnsError::Ambiguous { .. } => StatusCode::CONFLICT,
        AnsError::NotFound(_) => StatusCode::NOT_FOUND,
        AnsError::CertificateExpired
        | AnsError::CertificateRevoked
        | AnsError::NotIssuedByThisCa
        | AnsError::SignatureInvalid => StatusCode::FORBIDDEN,
        AnsError::OcspUnavailable(_) | AnsError::Storage(_) | AnsError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Audit the failure and produce the `{status: "failure", error}` body.
fn failure(state: &AppContext, subject: Option<String>, err: AnsError) -> Response {
    let request_id = Uuid::new_v4().to_string();
    state.audit.record(AuditEvent::ApiFailure {
        request_id,
        subject,
        kind: err.kind(),
        message: err.to_string(),
    });
    (
        status_for(&err),
        Json(json!({"status": "failure", "error": err.to_string()})),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegistrationRequest>,
) -> Response {
    let subject = request.requesting_agent.agent_name.clone();
    match process_registration(&state, &request) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => failure(&state, Some(subject), e),
    }
}

fn process_registration(
    state: &AppContext,
    request: &RegistrationRequest,
) -> Result<RegistrationResponse, AnsError> {
    let validated = state.ra.process_registration(request)?;
    let certificate = validated.certificate.pem().to_string();
    let agent = state.registry.register(validated)?;
    Ok(RegistrationResponse {
        status: "success",
        registered_agent: agent,
        certificate,
    })
}

async fn renew(State(state): State<AppState>, Json(request): Json<RenewalRequest>) -> Response {
    let subject = request.requesting_agent.agent_id.clone();
    match process_renewal(&state, &request) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => failure(&state, Some(subject), e),
    }
}

fn process_renewal(
    state: &AppContext,
    request: &RenewalRequest,
) -> Result<RenewalResponse, AnsError> {
    let current = state
        .registry
        .get_by_ans_name(&request.requesting_agent.ans_name)?
        .ok_or_else(|| AnsError::NotFound(request.requesting_agent.ans_name.clone()))?;

    let certificate = state.ra.process_renewal(request, &current)?;
    let renewed = state.registry.complete_renewal(&current, &certificate)?;
    Ok(RenewalResponse {
        status: "success",
        valid_until: certificate.not_after,
        certificate: certificate.pem().to_string(),
        renewed_agent: renewed,
    })
}

async fn revoke(State(state): State<AppState>, Json(request): Json<RevocationRequest>) -> Response {
    match state
        .registry
        .revoke_agent(&request.agent_id, request.reason.as_deref())
    {
        Ok(()) => (
            StatusCode::OK,
            Json(RevocationResponse {
                status: "success",
                agent_id: request.agent_id,
            }),
        )
            .into_response(),
        Err(e) => failure(&state, Some(request.agent_id), e),
    }
}

async fn resolve(
    State(state): State<AppState>,
    Json(request): Json<ResolutionRequest>,
) -> Response {
    match state
        .registry
        .resolve(&request.ans_name, request.version_range.as_deref())
    {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => failure(&state, Some(request.ans_name), e),
    }
}

async fn list_agents(
    State(state): State<AppState>,
    Query(query): Query<AgentListQuery>,
) -> Response {
    let filter = AgentFilter {
        protocol: query.protocol.clone(),
        capability: query.capability.clone(),
        provider: query.provider.clone(),
        include_inactive: query.include_inactive.unwrap_or(false),
    };
    let max = query.max.unwrap_or(LIST_MAX_DEFAULT);

    let result = state
        .registry
        .list(&filter, max)
        .and_then(|agents| Ok((agents, state.registry.count_all()?)));
    match result {
        Ok((agents, total_count)) => {
            let response = AgentListResponse {
                matching_count: agents.len(),
                total_count,
                query: AgentListEcho {
                    protocol: query.protocol.unwrap_or_else(|| "*".into()),
                    capability: query.capability.unwrap_or_else(|| "*".into()),
                    provider: query.provider.unwrap_or_else(|| "*".into()),
                },
                agents,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => failure(&state, None, e),
    }
}

async fn ocsp_get(State(state): State<AppState>, Query(query): Query<OcspQuery>) -> Response {
    let cert_id = state.responder.cert_id(&query.serial);
    respond_ocsp(&state, &cert_id)
}

async fn ocsp_post(
    State(state): State<AppState>,
    Json(request): Json<OcspRequestBody>,
) -> Response {
    let cert_id = match request.issuer_name_hash {
        Some(hash) => CertId {
            issuer_name_hash: hash,
            serial: request.serial,
        },
        None => state.responder.cert_id(&request.serial),
    };
    respond_ocsp(&state, &cert_id)
}

fn respond_ocsp(state: &AppContext, cert_id: &CertId) -> Response {
    match state.responder.respond(cert_id) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => failure(state, Some(cert_id.serial.clone()), e),
    }
}

async fn health() -> Response {
    (StatusCode::OK, Json(json!({"status": "healthy"}))).into_response()
}
