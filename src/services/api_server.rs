// src/services/api_server.rs
//! API Server for the certificate registry
//!
//! This module provides the REST API used by registry front ends:
//! - Operator login, logout, session lookup and password change
//! - Account provisioning for administrators
//! - Certificate issuance, verification, listing and revocation
//! - The `/api/certificates` mirror endpoint holding a full ledger copy
//!
//! Every request builds its own [`SessionContext`] from the
//! `Authorization: Bearer <token>` header; there is no process-wide session.

use crate::error::RegistryError;
use crate::models::certificate::{Certificate, NewCertificate};
use crate::models::credential::{MaskedCredential, Role, Session, SessionContext};
use crate::services::certificate_store::CertificateStore;
use crate::services::credential_store::CredentialStore;
use crate::services::session_tokens::TokenIssuer;
use crate::storage::kv_store::KeyValueStore;
use crate::utils::serialization::{deserialize, serialize_pretty};
use axum::{
    async_trait,
    extract::{FromRequestParts, Json, Path, Query, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

/// Certificate store over whichever backend was configured.
pub type Registry = CertificateStore<Box<dyn KeyValueStore>>;

/// Key under which the mirror endpoint keeps its copy.
pub const MIRROR_KEY: &str = "certificates";

// API request and response structures

/// Request payload for operator login
#[derive(Serialize, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

/// Response containing the session token
#[derive(Serialize, Deserialize)]
struct LoginResponse {
    token: String,
    session: Session,
}

/// Request payload for changing the logged-in operator's password
#[derive(Serialize, Deserialize)]
struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

/// Request payload for provisioning an account
#[derive(Serialize, Deserialize)]
struct AddAccountRequest {
    username: String,
    password: String,
    role: Role,
    #[serde(default)]
    institution: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct AccountsResponse {
    accounts: Vec<MaskedCredential>,
}

#[derive(Serialize, Deserialize)]
struct CertificatesResponse {
    certificates: Vec<Certificate>,
}

#[derive(Deserialize)]
struct ListQuery {
    institution: Option<String>,
}

/// Error returned by handlers as `{ "error": message }`.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Authentication required. Please login again.")
    }

    fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "Only administrators can do this")
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        log::error!("request failed: {}", e);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal error. Please try again.")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Session context extracted from the bearer token of a request.
///
/// Missing, malformed, expired and revoked tokens all yield an anonymous
/// context; handlers decide whether that is acceptable.
pub struct RequestSession {
    context: SessionContext,
    token: Option<String>,
}

#[async_trait]
impl FromRequestParts<Arc<ApiServer>> for RequestSession {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ApiServer>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string());

        let context = token
            .as_deref()
            .and_then(|t| state.tokens.decode(t))
            .map(SessionContext::with_session)
            .unwrap_or_else(SessionContext::anonymous);

        Ok(Self { context, token })
    }
}

/// API server state containing all service dependencies
pub struct ApiServer {
    /// Operator accounts
    credentials: RwLock<CredentialStore>,

    /// Issued certificates
    certificates: RwLock<Registry>,

    /// Session token signing and revocation
    tokens: TokenIssuer,

    /// Backing store of the mirror endpoint
    mirror_store: Box<dyn KeyValueStore>,
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `credentials` - Operator account store
    /// * `certificates` - Certificate store, with its mirror already attached
    /// * `tokens` - Session token issuer
    /// * `mirror_store` - Storage for the `/api/certificates` endpoint
    pub fn new(
        credentials: CredentialStore,
        certificates: Registry,
        tokens: TokenIssuer,
        mirror_store: Box<dyn KeyValueStore>,
    ) -> Self {
        ApiServer {
            credentials: RwLock::new(credentials),
            certificates: RwLock::new(certificates),
            tokens,
            mirror_store,
        }
    }

    /// Builds the router with every endpoint.
    pub fn router(self) -> Router {
        Router::new()
            .route("/health", get(Self::health_handler))
            .route("/login", post(Self::login_handler))
            .route("/logout", post(Self::logout_handler))
            .route("/session", get(Self::session_handler))
            .route("/change-password", post(Self::change_password_handler))
            .route(
                "/accounts",
                get(Self::list_accounts_handler).post(Self::add_account_handler),
            )
            .route("/universities", get(Self::list_universities_handler))
            .route(
                "/certificates",
                get(Self::list_certificates_handler).post(Self::issue_certificate_handler),
            )
            .route("/certificates/:student_id", get(Self::verify_certificate_handler))
            .route(
                "/certificates/:student_id/revoke",
                post(Self::revoke_certificate_handler),
            )
            .route(
                "/api/certificates",
                get(Self::load_mirror_handler).post(Self::save_mirror_handler),
            )
            .layer(CorsLayer::permissive())
            .with_state(Arc::new(self))
    }

    /// Starts the API server and serves requests until the process exits.
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "127.0.0.1:3000")
    pub async fn run(self, addr: SocketAddr) -> Result<(), RegistryError> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(RegistryError::Server)?;
        log::info!("API server listening on http://{}", addr);
        axum::serve(listener, self.router())
            .await
            .map_err(RegistryError::Server)
    }

    async fn health_handler() -> Json<Value> {
        Json(json!({ "status": "ok" }))
    }

    // =====================
    // Session Handlers
    // =====================

    /// Authenticates an operator and returns a session token
    ///
    /// # Endpoint
    /// POST /login
    ///
    /// # Responses
    /// - 200 OK: Returns token and session
    /// - 401 Unauthorized: Invalid credentials
    async fn login_handler(
        State(state): State<Arc<ApiServer>>,
        session: RequestSession,
        Json(payload): Json<LoginRequest>,
    ) -> ApiResult<Json<LoginResponse>> {
        let mut ctx = session.context;
        let credentials = state.credentials.read().await;
        if !credentials.login(&mut ctx, &payload.username, &payload.password) {
            return Err(ApiError::new(
                StatusCode::UNAUTHORIZED,
                "Invalid username or password",
            ));
        }
        let session = credentials
            .current_session(&ctx)
            .ok_or_else(ApiError::unauthorized)?;
        let token = state.tokens.issue(&session)?;
        Ok(Json(LoginResponse { token, session }))
    }

    /// Ends the session carried by the request's token
    ///
    /// # Endpoint
    /// POST /logout
    async fn logout_handler(
        State(state): State<Arc<ApiServer>>,
        session: RequestSession,
    ) -> Json<Value> {
        let mut ctx = session.context;
        if let Some(token) = &session.token {
            state.tokens.revoke(token);
        }
        state.credentials.read().await.logout(&mut ctx);
        Json(json!({ "status": "logged_out" }))
    }

    /// Returns the current session
    ///
    /// # Endpoint
    /// GET /session
    async fn session_handler(
        State(state): State<Arc<ApiServer>>,
        session: RequestSession,
    ) -> ApiResult<Json<Session>> {
        state
            .credentials
            .read()
            .await
            .current_session(&session.context)
            .map(Json)
            .ok_or_else(ApiError::unauthorized)
    }

    /// Changes the logged-in operator's password
    ///
    /// # Endpoint
    /// POST /change-password
    ///
    /// # Responses
    /// - 200 OK: Password changed
    /// - 400 Bad Request: Current password is incorrect
    /// - 401 Unauthorized: No session
    async fn change_password_handler(
        State(state): State<Arc<ApiServer>>,
        session: RequestSession,
        Json(payload): Json<ChangePasswordRequest>,
    ) -> ApiResult<Json<Value>> {
        let mut credentials = state.credentials.write().await;
        if !credentials.is_authenticated(&session.context) {
            return Err(ApiError::unauthorized());
        }
        if !credentials.change_password(
            &session.context,
            &payload.current_password,
            &payload.new_password,
        ) {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "Current password is incorrect",
            ));
        }
        Ok(Json(json!({ "status": "password_changed" })))
    }

    // =====================
    // Account Handlers
    // =====================

    fn require_admin(credentials: &CredentialStore, ctx: &SessionContext) -> ApiResult<()> {
        if !credentials.is_authenticated(ctx) {
            return Err(ApiError::unauthorized());
        }
        if !credentials.can_manage_admins(ctx) {
            return Err(ApiError::forbidden());
        }
        Ok(())
    }

    /// Lists every account with passwords masked
    ///
    /// # Endpoint
    /// GET /accounts
    async fn list_accounts_handler(
        State(state): State<Arc<ApiServer>>,
        session: RequestSession,
    ) -> ApiResult<Json<AccountsResponse>> {
        let credentials = state.credentials.read().await;
        Self::require_admin(&credentials, &session.context)?;
        Ok(Json(AccountsResponse {
            accounts: credentials.list_all(),
        }))
    }

    /// Lists university accounts with passwords masked
    ///
    /// # Endpoint
    /// GET /universities
    async fn list_universities_handler(
        State(state): State<Arc<ApiServer>>,
        session: RequestSession,
    ) -> ApiResult<Json<AccountsResponse>> {
        let credentials = state.credentials.read().await;
        Self::require_admin(&credentials, &session.context)?;
        Ok(Json(AccountsResponse {
            accounts: credentials.list_universities(),
        }))
    }

    /// Adds an admin or university account
    ///
    /// # Endpoint
    /// POST /accounts
    ///
    /// # Responses
    /// - 201 Created: Account added
    /// - 400 Bad Request: University account without institution
    /// - 403 Forbidden: Session is not an administrator
    /// - 409 Conflict: Username already exists
    async fn add_account_handler(
        State(state): State<Arc<ApiServer>>,
        session: RequestSession,
        Json(payload): Json<AddAccountRequest>,
    ) -> ApiResult<(StatusCode, Json<Value>)> {
        let mut credentials = state.credentials.write().await;
        Self::require_admin(&credentials, &session.context)?;

        let institution = payload
            .institution
            .as_deref()
            .map(str::trim)
            .filter(|i| !i.is_empty());
        let added = match (payload.role, institution) {
            (Role::Admin, _) => {
                credentials.add_admin(&session.context, &payload.username, &payload.password)
            }
            (Role::University, Some(institution)) => credentials.add_university(
                &session.context,
                &payload.username,
                &payload.password,
                institution,
            ),
            (Role::University, None) => {
                return Err(ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "University accounts need an institution",
                ));
            }
        };

        if !added {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                "Username already exists. Please choose a different username.",
            ));
        }
        Ok((
            StatusCode::CREATED,
            Json(json!({ "username": payload.username, "role": payload.role })),
        ))
    }

    // =====================
    // Certificate Handlers
    // =====================

    /// Issues a certificate
    ///
    /// # Endpoint
    /// POST /certificates
    ///
    /// # Responses
    /// - 201 Created: Returns the stored certificate
    /// - 400 Bad Request: Missing student id
    /// - 401 Unauthorized: No session
    /// - 409 Conflict: A certificate already exists for the student id
    async fn issue_certificate_handler(
        State(state): State<Arc<ApiServer>>,
        session: RequestSession,
        Json(payload): Json<NewCertificate>,
    ) -> ApiResult<(StatusCode, Json<Certificate>)> {
        if session.context.session().is_none() {
            return Err(ApiError::unauthorized());
        }
        if payload.student_id.trim().is_empty() {
            return Err(ApiError::new(StatusCode::BAD_REQUEST, "Student ID is required"));
        }

        let mut certificates = state.certificates.write().await;
        if certificates.contains(&payload.student_id) {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                "Certificate already exists for this Student ID",
            ));
        }
        let issued = certificates.issue(payload)?;
        Ok((StatusCode::CREATED, Json(issued)))
    }

    /// Lists certificates visible to the session
    ///
    /// # Endpoint
    /// GET /certificates[?institution=...]
    ///
    /// Administrators see every certificate, optionally filtered by
    /// institution. University operators only see their own institution.
    async fn list_certificates_handler(
        State(state): State<Arc<ApiServer>>,
        session: RequestSession,
        Query(query): Query<ListQuery>,
    ) -> ApiResult<Json<CertificatesResponse>> {
        let current = session.context.session().ok_or_else(ApiError::unauthorized)?;
        let certificates = state.certificates.read().await;

        let listed = match (current.role, &current.institution, &query.institution) {
            (Role::Admin, _, Some(institution)) => certificates.get_by_institution(institution),
            (Role::Admin, _, None) => certificates.get_all(),
            (Role::University, Some(own), _) => certificates.get_by_institution(own),
            (Role::University, None, _) => Vec::new(),
        };
        Ok(Json(CertificatesResponse { certificates: listed }))
    }

    /// Verifies a certificate by student id
    ///
    /// # Endpoint
    /// GET /certificates/:student_id
    ///
    /// # Responses
    /// - 200 OK: Returns the certificate, including its revocation flag
    /// - 404 Not Found: No certificate for the student id
    async fn verify_certificate_handler(
        State(state): State<Arc<ApiServer>>,
        Path(student_id): Path<String>,
    ) -> ApiResult<Json<Certificate>> {
        state
            .certificates
            .read()
            .await
            .verify(&student_id)
            .map(Json)
            .ok_or_else(|| {
                ApiError::new(
                    StatusCode::NOT_FOUND,
                    "Certificate not found for this Student ID",
                )
            })
    }

    /// Revokes a certificate
    ///
    /// # Endpoint
    /// POST /certificates/:student_id/revoke
    ///
    /// # Responses
    /// - 200 OK: Returns the revoked certificate
    /// - 401 Unauthorized: No session
    /// - 404 Not Found: No certificate for the student id
    async fn revoke_certificate_handler(
        State(state): State<Arc<ApiServer>>,
        session: RequestSession,
        Path(student_id): Path<String>,
    ) -> ApiResult<Json<Certificate>> {
        if session.context.session().is_none() {
            return Err(ApiError::unauthorized());
        }
        let mut certificates = state.certificates.write().await;
        if !certificates.revoke(&student_id)? {
            return Err(ApiError::new(
                StatusCode::NOT_FOUND,
                "Certificate not found for this Student ID",
            ));
        }
        certificates
            .verify(&student_id)
            .map(Json)
            .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Certificate not found"))
    }

    // =====================
    // Mirror Endpoint
    // =====================

    /// Returns the last saved ledger copy, or `{}`
    ///
    /// # Endpoint
    /// GET /api/certificates
    async fn load_mirror_handler(State(state): State<Arc<ApiServer>>) -> Response {
        let loaded = state
            .mirror_store
            .get(MIRROR_KEY)
            .and_then(|saved| match saved {
                Some(raw) => Ok(deserialize::<Value>(&raw)?),
                None => Ok(json!({})),
            });
        match loaded {
            Ok(value) => (StatusCode::OK, Json(value)).into_response(),
            Err(e) => {
                log::error!("could not load mirrored certificates: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "success": false, "error": "Failed to load data" })),
                )
                    .into_response()
            }
        }
    }

    /// Replaces the saved ledger copy
    ///
    /// # Endpoint
    /// POST /api/certificates
    ///
    /// # Responses
    /// - 200 OK: Copy saved
    /// - 400 Bad Request: Body is not a JSON object
    /// - 500 Internal Server Error: Write failed
    async fn save_mirror_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<Value>,
    ) -> Response {
        if !payload.is_object() {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": "Expected a JSON object" })),
            )
                .into_response();
        }
        let saved = serialize_pretty(&payload)
            .map_err(RegistryError::from)
            .and_then(|pretty| state.mirror_store.set(MIRROR_KEY, &pretty));
        match saved {
            Ok(()) => (
                StatusCode::OK,
                Json(json!({ "success": true, "message": "Data saved to file" })),
            )
                .into_response(),
            Err(e) => {
                log::error!("could not save mirrored certificates: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "success": false, "error": "Failed to save data" })),
                )
                    .into_response()
            }
        }
    }
}
