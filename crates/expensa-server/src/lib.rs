//! Expensa Web Server
//!
//! Axum-based REST API for the Expensa expense-reimbursement workflow.
//!
//! Security features:
//! - API key authentication for the gateway hop (secure by default, use --no-auth for local dev)
//! - Actor identity taken from headers set by the upstream token verifier
//! - Restrictive CORS policy
//! - Full audit logging for all API access (reads and writes)
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use expensa_core::models::{ActorKind, ActorRef};
use expensa_core::{ApprovalEngine, Database, ExpenseLedger, PolicyConfig, ReportAggregator};

mod handlers;

/// Maximum JSON request body size (64 KB)
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Actor kind set by the upstream verifier (`user` or `admin`)
pub const ACTOR_KIND_HEADER: &str = "x-actor-kind";

/// Actor id set by the upstream verifier
pub const ACTOR_ID_HEADER: &str = "x-actor-id";

/// Role id set by the upstream verifier (recorded, not interpreted)
pub const ROLE_ID_HEADER: &str = "x-role-id";

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether a gateway API key is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// API keys accepted from the gateway
    /// Format: "Bearer <key>" in Authorization header
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub policy: PolicyConfig,
}

impl AppState {
    pub fn ledger(&self) -> ExpenseLedger<'_> {
        ExpenseLedger::new(&self.db, &self.policy)
    }

    pub fn aggregator(&self) -> ReportAggregator<'_> {
        ReportAggregator::new(&self.db, &self.db, &self.policy)
    }

    pub fn approvals(&self) -> ApprovalEngine<'_> {
        ApprovalEngine::new(&self.db, &self.db, &self.policy)
    }
}

/// The verified caller, attached to every `/api` request by `auth_middleware`
#[derive(Debug, Clone)]
pub struct Identity {
    pub actor: ActorRef,
    pub role_id: Option<String>,
}

impl Identity {
    /// Caller id, refusing admins
    pub fn user_id(&self) -> Result<i64, AppError> {
        match self.actor.kind {
            ActorKind::User => Ok(self.actor.id),
            ActorKind::Admin => Err(AppError::forbidden("Only users can access this resource")),
        }
    }

    /// Caller id, refusing users
    pub fn admin_id(&self) -> Result<i64, AppError> {
        match self.actor.kind {
            ActorKind::Admin => Ok(self.actor.id),
            ActorKind::User => Err(AppError::forbidden("Only admins can access this resource")),
        }
    }

    /// Actor string for the audit log
    pub fn audit_name(&self) -> String {
        match &self.role_id {
            Some(role) => format!("{} (role {})", self.actor, role),
            None => self.actor.to_string(),
        }
    }
}

/// Read the caller's identity from the verifier headers
pub fn identity_from_headers(headers: &HeaderMap) -> Option<Identity> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let kind: ActorKind = header(ACTOR_KIND_HEADER)?.parse().ok()?;
    let id: i64 = header(ACTOR_ID_HEADER)?.parse().ok()?;
    Some(Identity {
        actor: ActorRef { kind, id },
        role_id: header(ROLE_ID_HEADER).map(str::to_string),
    })
}

/// Authentication middleware - validates the gateway API key and attaches the caller identity
///
/// # Security Notes
///
/// **API keys**: Compared using constant-time comparison to prevent timing attacks.
/// Skipped entirely when `require_auth` is off (local development).
///
/// **Identity headers**: `x-actor-kind` / `x-actor-id` are trusted as set by the
/// upstream token verifier. They must never be reachable from clients directly,
/// which is what the API key on the gateway hop enforces.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if state.config.require_auth {
        // Check for API key in Authorization header (Bearer token)
        let api_key_valid = request
            .headers()
            .get(AUTHORIZATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|auth| auth.strip_prefix("Bearer "))
            .map(|key| validate_api_key(key, &state.config.api_keys))
            .unwrap_or(false);

        if !api_key_valid {
            warn!(path = %request.uri().path(), "Unauthorized request - no valid API key");
            return AppError::unauthorized("Authentication required").into_response();
        }
    }

    match identity_from_headers(request.headers()) {
        Some(identity) => {
            tracing::debug!(actor = %identity.actor, path = %request.uri().path(), "Authenticated");
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        None => {
            warn!(path = %request.uri().path(), "Unauthorized request - missing actor identity");
            AppError::unauthorized("No token provided").into_response()
        }
    }
}

/// Validate an API key against the configured keys using constant-time comparison
/// to prevent timing attacks.
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    for key in valid_keys {
        let key_bytes = key.as_bytes();
        // Only compare if lengths match (constant-time for same-length keys)
        if provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes))
        {
            return true;
        }
    }
    false
}

/// Parse a comma-separated list of API keys, dropping blanks
pub fn parse_api_keys(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Response Envelope
// ============================================================================

/// `{status, message, data}` envelope used by every response
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub message: String,
    pub data: Option<T>,
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

/// Wrap a successful payload
pub fn respond<T: Serialize>(message: impl Into<String>, data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse {
        status: StatusCode::OK.as_u16(),
        message: message.into(),
        data: Some(data),
    }))
}

/// Decode a JSON request body, answering malformed input with a 400 envelope
pub fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(bytes)
        .map_err(|e| AppError::bad_request(&format!("Invalid JSON: {}", e)))
}

/// Create the application router
pub fn create_router(db: Database, config: ServerConfig, policy: PolicyConfig) -> Router {
    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        policy,
    });

    let api_routes = Router::new()
        // Expenses
        .route("/user/expense", post(handlers::create_expense))
        .route("/user/expense/:id", get(handlers::get_expense))
        // Reports
        .route("/user/report", post(handlers::submit_report))
        .route(
            "/user/report/:id",
            get(handlers::get_report).put(handlers::update_report),
        )
        // Listings and wallet
        .route("/user/list", get(handlers::list_for_user))
        .route("/user/category", get(handlers::list_categories))
        .route("/user/wallet-used", get(handlers::wallet_used))
        // Approvals (user approvers)
        .route("/user/approval/:id", get(handlers::get_user_approval))
        .route("/user/approval/:id/:action", put(handlers::decide_as_user))
        .route("/user/finance/:id", get(handlers::get_finance_as_user))
        .route("/user/reimburse/:id", put(handlers::reimburse_as_user))
        // Approvals and finance (admins)
        .route("/admin/approval/:id", get(handlers::get_admin_approval))
        .route("/admin/approval/:id/:action", put(handlers::decide_as_admin))
        .route("/admin/finance/:id", get(handlers::get_finance_as_admin))
        .route("/admin/reimburse/:id", put(handlers::reimburse_as_admin))
        // Directory
        .route("/admin/approvers", get(handlers::list_approvers))
        .route("/admin/users/:id/reports", get(handlers::list_user_reports))
        // Audit log
        .route("/admin/audit", get(handlers::list_audit_log));

    let methods = [Method::GET, Method::POST, Method::PUT, Method::OPTIONS];
    let headers = [
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        header::HeaderName::from_static(ACTOR_KIND_HEADER),
        header::HeaderName::from_static(ACTOR_ID_HEADER),
        header::HeaderName::from_static(ROLE_ID_HEADER),
    ];

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new().allow_methods(methods).allow_headers(headers)
    } else {
        // Allow specified origins
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
    };

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    config: ServerConfig,
    policy: PolicyConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    }

    let app = create_router(db, config, policy);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    fn with_status(status: StatusCode, msg: &str) -> Self {
        Self {
            status,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn bad_request(msg: &str) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: &str) -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn forbidden(msg: &str) -> Self {
        Self::with_status(StatusCode::FORBIDDEN, msg)
    }

    pub fn not_found(msg: &str) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, msg)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Map a core error onto the HTTP taxonomy
    fn from_core(err: expensa_core::Error) -> Self {
        use expensa_core::Error;

        match err {
            Error::Validation(msg) => Self::bad_request(&msg),
            Error::Policy(violation) => Self::bad_request(&violation.to_string()),
            Error::Conflict(conflict) => Self::bad_request(&conflict.to_string()),
            Error::NotFound(msg) => Self::not_found(&msg),
            Error::Unauthorized(msg) => Self::forbidden(&msg),
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                // Return generic message to client
                message: "An internal error occurred".to_string(),
                // Keep full error for logging
                internal: Some(other.into()),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(ApiResponse::<()> {
            status: self.status.as_u16(),
            message: self.message,
            data: None,
        });

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        match err.into().downcast::<expensa_core::Error>() {
            Ok(core) => Self::from_core(core),
            Err(err) => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "An internal error occurred".to_string(),
                internal: Some(err),
            },
        }
    }
}
