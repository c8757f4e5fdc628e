//! Authentication API Endpoints
//! Mission: Provide login and caller identity endpoints

use crate::auth::{
    credentials::CredentialStore,
    jwt::TokenService,
    models::{Identity, LoginRequest, LoginResponse, UserSummary},
};
use crate::error::ApiError;
use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub credentials: Arc<CredentialStore>,
    pub tokens: Arc<TokenService>,
}

impl AuthState {
    pub fn new(credentials: Arc<CredentialStore>, tokens: Arc<TokenService>) -> Self {
        Self {
            credentials,
            tokens,
        }
    }
}

/// Login endpoint - POST /login
pub async fn login(
    State(state): State<AuthState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(payload) =
        payload.map_err(|_| ApiError::BadRequest("Invalid request body".to_string()))?;

    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Username and password are required".to_string(),
        ));
    }

    info!("🔐 Login attempt: {}", payload.username);

    let identity = state
        .credentials
        .authenticate(&payload.username, &payload.password)
        .map_err(|err| {
            warn!("❌ Failed login attempt: {}", payload.username);
            err
        })?;

    let issued = state.tokens.issue(&identity.username, identity.role)?;

    info!("✅ Login successful: {} ({})", identity.username, identity.role);

    Ok(Json(LoginResponse {
        token: issued.token,
        username: identity.username,
        role: identity.role,
        message: "Login successful".to_string(),
        expires_in: issued.expires_in,
    }))
}

/// Current caller - GET /me
pub async fn me(Extension(identity): Extension<Identity>) -> Json<Identity> {
    Json(identity)
}

/// Configured accounts without passwords - GET /users
pub async fn list_users(State(state): State<AuthState>) -> Json<Vec<UserSummary>> {
    Json(state.credentials.users())
}
