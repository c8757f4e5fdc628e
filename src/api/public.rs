//! Unauthenticated informational endpoints.

use crate::error::ApiError;
use crate::storage::RecordStore;
use axum::{extract::State, response::Json};
use serde_json::{json, Value};
use std::sync::Arc;

/// Service info - GET /
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "Hospital Records API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /login": "Exchange username and password for a bearer token",
            "GET /users": "List configured accounts and their roles",
            "GET /health": "Liveness and storage backend",
            "GET /me": "Identity behind the presented token",
            "GET /patients": "List patients (first_name, last_name, diagnosis, age, min_age, max_age)",
            "POST /patients": "Create a patient (admin)",
            "GET|PUT|DELETE /patients/:id": "Fetch, replace or delete a patient",
            "GET /doctors": "List doctors (first_name, last_name, specialization, experience, min_experience)",
            "POST /doctors": "Create a doctor (admin)",
            "GET|PUT|DELETE /doctors/:id": "Fetch, replace or delete a doctor",
            "GET /appointments": "List appointments (patient_id, doctor_id, date, date_from, date_to, status)",
            "POST /appointments": "Create an appointment (admin)",
            "GET|PUT|DELETE /appointments/:id": "Fetch, replace or delete an appointment",
        }
    }))
}

/// Health check - GET /health
pub async fn health(State(store): State<Arc<dyn RecordStore>>) -> Json<Value> {
    Json(json!({ "status": "ok", "storage": store.backend() }))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".to_string())
}
