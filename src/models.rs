use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Profile record returned by the login endpoint and cached under the `user` key.
///
/// Only `is_auto_reference` is read by the core; every other field is kept
/// as-is so the cached record round-trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub is_auto_reference: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    pub fn new(is_auto_reference: bool) -> Self {
        UserProfile {
            is_auto_reference,
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginCredentials {
    pub email: String,
    #[serde(serialize_with = "serialize_secret")]
    pub password: SecretString,
}

impl LoginCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        LoginCredentials {
            email: email.into(),
            password: SecretString::new(password.into()),
        }
    }
}

/// Wire shape of the login request body.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub site_engineer: &'a LoginCredentials,
}

/// Successful login: the opaque token plus the profile.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub token: SecretString,
    pub user: UserProfile,
}

// Custom serialization for SecretString
pub fn serialize_secret<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::ser::Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}
