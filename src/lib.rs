//! Hospital Records Backend Library
//!
//! Patients, doctors and appointments behind JWT authentication and
//! role-based authorization. Exposes every module for the binary and tests.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod storage;

pub use api::{router, AppState};
pub use config::Config;
pub use error::ApiError;
