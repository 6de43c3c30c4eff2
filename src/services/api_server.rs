// src/services/api_server.rs
//! API Server for the Decentralized Identity System
//!
//! JSON-over-HTTP front end for the [`IdentityRegistry`]. Handlers only
//! translate between wire types and registry calls; every identity rule lives
//! in the registry.
//!
//! Endpoints:
//! - `POST /api/register_did` create a DID
//! - `GET  /api/get_did/:did` resolve a DID document
//! - `POST /api/create_challenge` issue an authentication challenge
//! - `POST /api/authenticate` submit a signed challenge
//! - `POST /api/sign_challenge` sign a challenge with a caller-held key
//! - `GET  /api/blockchain_info` ledger summary
//! - `GET  /api/health` liveness and active signature scheme
//!
//! Binary values (keys, signatures) travel as standard base64.

use crate::error::{CryptoError, RegistryError};
use crate::models::did::UserInfo;
use crate::services::identity_registry::IdentityRegistry;
use crate::utils::serialization::{decode_bytes, encode_bytes};
use axum::{
    extract::{rejection::JsonRejection, Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use log::{error, info};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

// API request structures. Field names are camelCase on the wire; the
// snake_case spellings are accepted as well.

/// Request payload for registering a new DID
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterDidRequest {
    #[serde(default, alias = "user_info")]
    user_info: Option<UserInfo>,
}

/// Request payload for issuing a challenge
#[derive(Deserialize)]
struct CreateChallengeRequest {
    #[serde(default)]
    did: Option<String>,
}

/// Request payload for submitting a signed challenge
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticateRequest {
    #[serde(default, alias = "challenge_id")]
    challenge_id: Option<String>,
    #[serde(default)]
    signature: Option<String>,
}

/// Request payload for the signing helper
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignChallengeRequest {
    #[serde(default)]
    challenge: Option<String>,
    #[serde(default, alias = "private_key")]
    private_key: Option<String>,
}

/// Error returned by every handler, rendered as `{"success": false, "error": ...}`.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or unreadable request fields
    BadRequest(String),
    /// A failure reported by the registry
    Registry(RegistryError),
    /// The blocking worker running a registry call died
    Internal(String),
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::Registry(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Registry(err) => match err {
                RegistryError::DidNotFound(_) | RegistryError::ChallengeNotFound(_) => StatusCode::NOT_FOUND,
                RegistryError::Duplicate { .. } => StatusCode::CONFLICT,
                RegistryError::Validation(_)
                | RegistryError::Crypto(_)
                | RegistryError::ChallengeReused(_) => StatusCode::BAD_REQUEST,
                RegistryError::ChainIntegrity(_)
                | RegistryError::Persistence(_)
                | RegistryError::LedgerAppendFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) | ApiError::Internal(msg) => msg.clone(),
            ApiError::Registry(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.message());
        }
        (status, Json(json!({ "success": false, "error": self.message() }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

/// API server state
#[derive(Clone)]
pub struct ApiServer {
    /// Registry every handler delegates to
    registry: Arc<IdentityRegistry>,
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `registry` - Opened identity registry shared by all handlers
    pub fn new(registry: Arc<IdentityRegistry>) -> Self {
        ApiServer { registry }
    }

    /// Builds the router with all routes and a permissive CORS layer.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/register_did", post(Self::register_did_handler))
            .route("/api/get_did/:did", get(Self::get_did_handler))
            .route("/api/create_challenge", post(Self::create_challenge_handler))
            .route("/api/authenticate", post(Self::authenticate_handler))
            .route("/api/sign_challenge", post(Self::sign_challenge_handler))
            .route("/api/blockchain_info", get(Self::blockchain_info_handler))
            .route("/api/health", get(Self::health_handler))
            .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
            .with_state(Arc::new(self.clone()))
    }

    /// Starts the API server and serves until the listener fails
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "127.0.0.1:5000")
    ///
    /// # Errors
    /// I/O errors from binding or accepting connections.
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("API server running at http://{}", addr);
        info!("Signature scheme: {}", self.registry.active_scheme());
        axum::serve(listener, app).await
    }

    /// Runs a registry call on the blocking pool; storage and signing may
    /// block.
    async fn blocking<T, F>(state: &ApiServer, call: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&IdentityRegistry) -> Result<T, RegistryError> + Send + 'static,
    {
        let registry = Arc::clone(&state.registry);
        tokio::task::spawn_blocking(move || call(&registry))
            .await
            .map_err(|e| ApiError::Internal(format!("worker failed: {}", e)))?
            .map_err(ApiError::from)
    }

    // =====================
    // Identity Handlers
    // =====================

    /// Creates a new DID
    ///
    /// # Endpoint
    /// POST /api/register_did
    ///
    /// # Responses
    /// - 200 OK: DID, document, and the base64 private key (returned once)
    /// - 400 Bad Request: missing or empty `userInfo`
    /// - 409 Conflict: no unique identifier could be minted
    async fn register_did_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<RegisterDidRequest>, JsonRejection>,
    ) -> ApiResult {
        let Json(payload) = payload?;
        let user_info = payload
            .user_info
            .filter(|info| !info.is_empty())
            .ok_or_else(|| ApiError::BadRequest("User information required".into()))?;

        let created = Self::blocking(&state, move |registry| registry.create_identity(user_info)).await?;

        Ok(Json(json!({
            "success": true,
            "did": created.did,
            "document": created.document,
            "privateKey": encode_bytes(created.key_pair.private_key()),
            "publicKey": encode_bytes(created.key_pair.public_key()),
            "message": "DID created successfully",
        })))
    }

    /// Resolves a DID to its document
    ///
    /// # Endpoint
    /// GET /api/get_did/:did
    ///
    /// # Responses
    /// - 200 OK: the DID document
    /// - 404 Not Found: unknown DID
    async fn get_did_handler(State(state): State<Arc<ApiServer>>, Path(did): Path<String>) -> ApiResult {
        let lookup = did.clone();
        let document = Self::blocking(&state, move |registry| registry.get_document(&lookup)).await?;

        Ok(Json(json!({
            "success": true,
            "did": did,
            "document": document,
        })))
    }

    // =====================
    // Authentication Handlers
    // =====================

    /// Issues a single-use challenge for a registered DID
    ///
    /// # Endpoint
    /// POST /api/create_challenge
    ///
    /// # Responses
    /// - 200 OK: challenge id and value to sign
    /// - 400 Bad Request: missing `did`
    /// - 404 Not Found: unknown DID
    async fn create_challenge_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<CreateChallengeRequest>, JsonRejection>,
    ) -> ApiResult {
        let Json(payload) = payload?;
        let did = payload
            .did
            .filter(|did| !did.is_empty())
            .ok_or_else(|| ApiError::BadRequest("DID required".into()))?;

        let challenge = Self::blocking(&state, move |registry| registry.issue_challenge(&did)).await?;

        Ok(Json(json!({
            "success": true,
            "challengeId": challenge.id,
            "challenge": challenge.value,
        })))
    }

    /// Verifies a signed challenge
    ///
    /// # Endpoint
    /// POST /api/authenticate
    ///
    /// # Responses
    /// - 200 OK: `authenticated` is true or false
    /// - 400 Bad Request: missing fields, malformed signature, or reused challenge
    /// - 404 Not Found: unknown or expired challenge
    async fn authenticate_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<AuthenticateRequest>, JsonRejection>,
    ) -> ApiResult {
        let Json(payload) = payload?;
        let (challenge_id, signature) = match (payload.challenge_id, payload.signature) {
            (Some(id), Some(sig)) if !id.is_empty() && !sig.is_empty() => (id, sig),
            _ => return Err(ApiError::BadRequest("Challenge ID and signature required".into())),
        };
        let signature = decode_bytes(&signature).map_err(|e| {
            RegistryError::from(CryptoError::DecodeError(format!("signature: {}", e)))
        })?;

        let outcome =
            Self::blocking(&state, move |registry| registry.verify_challenge(&challenge_id, &signature)).await?;

        let message = if outcome.authenticated {
            "Authentication successful"
        } else {
            "Authentication failed"
        };
        Ok(Json(json!({
            "success": true,
            "authenticated": outcome.authenticated,
            "did": outcome.did,
            "message": message,
        })))
    }

    /// Signs a challenge with a caller-supplied private key
    ///
    /// # Endpoint
    /// POST /api/sign_challenge
    ///
    /// # Responses
    /// - 200 OK: base64 signature
    /// - 400 Bad Request: missing fields or malformed key
    async fn sign_challenge_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<SignChallengeRequest>, JsonRejection>,
    ) -> ApiResult {
        let Json(payload) = payload?;
        let (challenge, private_key) = match (payload.challenge, payload.private_key) {
            (Some(c), Some(k)) if !c.is_empty() && !k.is_empty() => (c, k),
            _ => return Err(ApiError::BadRequest("Challenge and private key required".into())),
        };
        let private_key = decode_bytes(&private_key).map_err(|e| {
            RegistryError::from(CryptoError::MalformedKey(format!("private key: {}", e)))
        })?;

        let signature = Self::blocking(&state, move |registry| {
            registry.sign_challenge(challenge.as_bytes(), &private_key)
        })
        .await?;

        Ok(Json(json!({
            "success": true,
            "signature": encode_bytes(&signature),
        })))
    }

    // =====================
    // Ledger Handlers
    // =====================

    /// Returns length, validity and contents of the ledger
    ///
    /// # Endpoint
    /// GET /api/blockchain_info
    async fn blockchain_info_handler(State(state): State<Arc<ApiServer>>) -> ApiResult {
        let summary = Self::blocking(&state, |registry| Ok(registry.get_ledger_summary())).await?;

        Ok(Json(json!({
            "success": true,
            "blockchainInfo": summary,
        })))
    }

    /// Liveness check reporting the active signature scheme
    ///
    /// # Endpoint
    /// GET /api/health
    async fn health_handler(State(state): State<Arc<ApiServer>>) -> ApiResult {
        let scheme = state.registry.active_scheme();
        let (length, pending) = Self::blocking(&state, |registry| {
            Ok((registry.get_ledger_summary().length, registry.pending_challenges()))
        })
        .await?;

        Ok(Json(json!({
            "success": true,
            "status": "ok",
            "signatureScheme": scheme.name(),
            "postQuantum": scheme.is_post_quantum(),
            "ledgerLength": length,
            "pendingChallenges": pending,
        })))
    }
}
