use anyhow::{Context, Result};
use async_trait::async_trait;
use basecamp_core::auth::{bearer_headers, AuthResolver};
use keyring::Entry;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::APP_NAME;

/// Overrides the keychain token when set
pub const TOKEN_ENV: &str = "BASECAMP_TOKEN";

pub struct CredentialStore;

impl CredentialStore {
    /// Store an API token in the OS keychain
    pub fn store(username: &str, token: &str) -> Result<()> {
        let entry = Entry::new(APP_NAME, username).context("Failed to create keyring entry")?;
        entry
            .set_password(token)
            .context("Failed to store token in keychain")?;
        Ok(())
    }

    /// Retrieve the API token for a username from the OS keychain
    pub fn get_token(username: &str) -> Result<String> {
        let entry = Entry::new(APP_NAME, username).context("Failed to create keyring entry")?;
        entry
            .get_password()
            .context("Failed to retrieve token from keychain")
    }

    /// Delete the stored token for a username
    pub fn delete(username: &str) -> Result<()> {
        let entry = Entry::new(APP_NAME, username).context("Failed to create keyring entry")?;
        entry
            .delete_credential()
            .context("Failed to delete credential from keychain")?;
        Ok(())
    }

    pub fn has_credentials(username: &str) -> bool {
        Self::get_token(username).is_ok()
    }
}

/// Resolves the bearer token on every call, so a `login` made while writes
/// were queued is picked up by the next sync.
pub struct KeyringAuth {
    username: Option<String>,
    env_token: Option<String>,
}

impl KeyringAuth {
    pub fn new(username: Option<String>, env_token: Option<String>) -> Self {
        Self {
            username,
            env_token: env_token.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn token(&self) -> Option<String> {
        if let Some(token) = &self.env_token {
            return Some(token.clone());
        }
        let username = self.username.as_deref()?;
        match CredentialStore::get_token(username) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(username, error = %e, "No usable token, sending without credentials");
                None
            }
        }
    }
}

#[async_trait]
impl AuthResolver for KeyringAuth {
    async fn headers(&self) -> HashMap<String, String> {
        match self.token() {
            Some(token) => {
                debug!("Resolved bearer token");
                bearer_headers(&token)
            }
            None => HashMap::new(),
        }
    }
}
