//! Credential Store
//! Mission: Resolve username + password to a role from a fixed account table

use crate::auth::models::{Credential, Identity, Role, UserSummary};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Unknown username or wrong password; the two are not distinguished.
#[derive(Debug, Error)]
#[error("invalid username or password")]
pub struct InvalidCredentials;

#[derive(Debug, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    users: Vec<Credential>,
}

/// Immutable account table, built once at startup.
#[derive(Debug)]
pub struct CredentialStore {
    credentials: Vec<Credential>,
}

impl CredentialStore {
    pub fn new(credentials: Vec<Credential>) -> Result<Self> {
        let mut seen = HashSet::new();
        for credential in &credentials {
            if credential.username.trim().is_empty() {
                bail!("credential with blank username");
            }
            if !seen.insert(credential.username.as_str()) {
                bail!("duplicate username: {}", credential.username);
            }
        }

        Ok(Self { credentials })
    }

    /// The four built-in development accounts.
    pub fn builtin() -> Self {
        Self {
            credentials: vec![
                Credential::new("admin", "admin123", Role::Admin),
                Credential::new("reader", "reader123", Role::Reader),
                Credential::new("doctor", "doctor123", Role::Admin),
                Credential::new("viewer", "viewer123", Role::Reader),
            ],
        }
    }

    /// Load `[[users]]` entries (username, password, role) from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read credentials file {}", path.display()))?;
        let file: CredentialFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse credentials file {}", path.display()))?;

        let store = Self::new(file.users)?;
        info!(
            "🔐 Loaded {} credentials from {}",
            store.len(),
            path.display()
        );
        Ok(store)
    }

    /// Case-sensitive username lookup followed by an exact password comparison.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Identity, InvalidCredentials> {
        let credential = self
            .credentials
            .iter()
            .find(|c| c.username == username)
            .filter(|c| c.password == password)
            .ok_or(InvalidCredentials)?;

        debug!("Authenticated {} as {}", credential.username, credential.role);
        Ok(Identity {
            username: credential.username.clone(),
            role: credential.role,
        })
    }

    pub fn users(&self) -> Vec<UserSummary> {
        self.credentials
            .iter()
            .map(|c| UserSummary {
                username: c.username.clone(),
                role: c.role,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}
