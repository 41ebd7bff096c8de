use crate::credential_store::CredentialStore;
use crate::errors::StoreError;
use crate::models::UserProfile;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";
/// Copy of `UserProfile::is_auto_reference` kept beside the profile so
/// readers don't have to parse the whole record.
pub const AUTO_REFERENCE_KEY: &str = "isAutoReference";

/// Typed access to the session held in a [`CredentialStore`].
///
/// A session is valid iff a non-empty token is stored. The profile is only
/// trusted while the token is present.
pub struct SessionManager<S> {
    store: Arc<S>,
}

impl<S> Clone for SessionManager<S> {
    fn clone(&self) -> Self {
        SessionManager {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: CredentialStore> SessionManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        SessionManager { store }
    }

    /// Same as [`is_valid`](Self::is_valid) but surfaces storage failures.
    pub async fn check(&self) -> Result<bool, StoreError> {
        Ok(self.token().await?.is_some())
    }

    /// Storage failures count as "not logged in".
    pub async fn is_valid(&self) -> bool {
        match self.check().await {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!("Failed to read session token, treating as logged out: {}", e);
                false
            }
        }
    }

    pub async fn token(&self) -> Result<Option<SecretString>, StoreError> {
        let token = self.store.read(TOKEN_KEY).await?;
        Ok(token.filter(|t| !t.is_empty()).map(SecretString::new))
    }

    /// Writes token, profile and the auto-reference flag, in that order.
    ///
    /// Each write completes before the next starts, but the sequence is not
    /// atomic: a concurrent reader can observe the token without the profile.
    pub async fn establish(&self, token: &SecretString, user: &UserProfile) -> Result<(), StoreError> {
        let profile = serde_json::to_string(user)?;
        let flag = serde_json::to_string(&user.is_auto_reference)?;

        self.store.write(TOKEN_KEY, token.expose_secret()).await?;
        self.store.write(USER_KEY, &profile).await?;
        self.store.write(AUTO_REFERENCE_KEY, &flag).await?;

        tracing::info!("Session established");
        Ok(())
    }

    /// Removes every session key. Safe to call on an empty session.
    ///
    /// All deletes are attempted; the first failure is returned.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut first_error = None;
        // Token first so the session stops being valid as early as possible
        for key in [TOKEN_KEY, USER_KEY, AUTO_REFERENCE_KEY] {
            if let Err(e) = self.store.delete(key).await {
                tracing::warn!("Failed to delete {} from credential store: {}", key, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                tracing::info!("Session cleared");
                Ok(())
            }
        }
    }

    pub async fn user_profile(&self) -> Result<Option<UserProfile>, StoreError> {
        if !self.check().await? {
            return Ok(None);
        }
        match self.store.read(USER_KEY).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Cached flag; `false` without a valid session or before the flag is written.
    pub async fn is_auto_reference(&self) -> Result<bool, StoreError> {
        if !self.check().await? {
            return Ok(false);
        }
        match self.store.read(AUTO_REFERENCE_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(false),
        }
    }
}
