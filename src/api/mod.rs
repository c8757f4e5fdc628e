//! HTTP API
//!
//! Public routes run behind the logging stage only. Record routes and `/me`
//! run behind logging, authentication and authorization, in that order.

pub mod public;
pub mod routes;

use crate::auth::{api as auth_api, AuthState, Authenticate, Authorize};
use crate::middleware::{enter, AccessLog, Pipeline, RequestLogging};
use crate::models::{Appointment, Doctor, Patient};
use crate::storage::RecordStore;
use axum::{
    extract::FromRef,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub auth: AuthState,
    pub access_log: Option<Arc<AccessLog>>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for Arc<dyn RecordStore> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl AppState {
    pub fn public_pipeline(&self) -> Pipeline {
        Pipeline::builder()
            .stage(RequestLogging::new(self.access_log.clone()))
            .build()
    }

    pub fn protected_pipeline(&self) -> Pipeline {
        Pipeline::builder()
            .stage(RequestLogging::new(self.access_log.clone()))
            .stage(Authenticate::new(self.auth.tokens.clone()))
            .stage(Authorize)
            .build()
    }
}

/// Create the API router
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .route("/login", post(auth_api::login))
        .route("/users", get(auth_api::list_users))
        .fallback(public::not_found)
        .layer(middleware::from_fn_with_state(state.public_pipeline(), enter));

    let protected_routes = Router::new()
        .merge(routes::resource::<Patient>("/patients"))
        .merge(routes::resource::<Doctor>("/doctors"))
        .merge(routes::resource::<Appointment>("/appointments"))
        .route("/me", get(auth_api::me))
        .layer(middleware::from_fn_with_state(
            state.protected_pipeline(),
            enter,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
