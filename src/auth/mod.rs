//! Authentication Module
//! Mission: Secure API access with JWT tokens and role-based authorization

pub mod api;
pub mod credentials;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod policy;

pub use api::AuthState;
pub use credentials::{CredentialStore, InvalidCredentials};
pub use jwt::{IssuedToken, TokenError, TokenService};
pub use middleware::{Authenticate, Authorize};
pub use models::{Identity, Role};
