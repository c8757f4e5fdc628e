//! Authentication Middleware
//! Mission: Protect API endpoints with JWT validation and role checks
//!
//! Both stages answer the call themselves on failure, so nothing inside them
//! runs for a rejected request.

use crate::auth::{jwt::TokenService, models::Identity, policy};
use crate::error::ApiError;
use crate::middleware::{Next, Stage};
use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, HeaderMap},
    response::{IntoResponse, Response},
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use std::sync::Arc;
use tracing::debug;

/// Auth error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingHeader,
    InvalidFormat,
    InvalidToken,
    MissingIdentity,
    ReadOnly,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingHeader => {
                ApiError::Unauthorized("Authorization header missing".to_string())
            }
            AuthError::InvalidFormat => ApiError::Unauthorized(
                "Invalid authorization format. Use: Bearer <token>".to_string(),
            ),
            AuthError::InvalidToken => ApiError::Unauthorized("Invalid or expired token".to_string()),
            AuthError::MissingIdentity => {
                ApiError::Unauthorized("Role not found in context".to_string())
            }
            AuthError::ReadOnly => {
                ApiError::Forbidden("Read-only access. Only GET requests allowed".to_string())
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// Verifies the bearer token and stores the caller's [`Identity`] in request extensions.
pub struct Authenticate {
    tokens: Arc<TokenService>,
}

impl Authenticate {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }

    fn identify(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        if !headers.contains_key(AUTHORIZATION) {
            return Err(AuthError::MissingHeader);
        }

        let Authorization(bearer) = headers
            .typed_get::<Authorization<Bearer>>()
            .ok_or(AuthError::InvalidFormat)?;

        self.tokens
            .verify(bearer.token())
            .map_err(|_| AuthError::InvalidToken)
    }
}

#[async_trait]
impl Stage for Authenticate {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    async fn handle(&self, mut req: Request, next: Next<'_>) -> Response {
        match self.identify(req.headers()) {
            Ok(identity) => {
                debug!("Authenticated {} ({})", identity.username, identity.role);
                req.extensions_mut().insert(identity);
                next.run(req).await
            }
            Err(err) => err.into_response(),
        }
    }
}

/// Applies the role policy to the identity placed by [`Authenticate`].
#[derive(Default)]
pub struct Authorize;

#[async_trait]
impl Stage for Authorize {
    fn name(&self) -> &'static str {
        "authorize"
    }

    async fn handle(&self, req: Request, next: Next<'_>) -> Response {
        let Some(identity) = extract_identity(&req) else {
            return AuthError::MissingIdentity.into_response();
        };

        if !policy::permits(identity.role, req.method()) {
            debug!("{} denied {} {}", identity.username, req.method(), req.uri().path());
            return AuthError::ReadOnly.into_response();
        }

        next.run(req).await
    }
}

/// Extract identity from request (use after the authentication stage)
pub fn extract_identity(req: &Request) -> Option<&Identity> {
    req.extensions().get::<Identity>()
}
