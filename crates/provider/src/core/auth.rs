//! The authentication contract.
//!
//! Token issuance is delegated to the chosen backend; this interface only
//! describes the surface the application consumes. Providers without
//! managed auth return `None` from `DatabaseProvider::auth`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderResult;

/// An authenticated user as reported by the auth backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    /// Backend-assigned user id.
    pub id: String,
    /// Primary email address.
    pub email: String,
    /// Vendor-specific user metadata.
    #[serde(default)]
    pub metadata: Value,
}

/// An authenticated session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    /// Bearer token for subsequent requests.
    pub access_token: String,
    /// Token used to obtain a fresh session.
    pub refresh_token: Option<String>,
    /// Access-token expiry, if the backend reports one.
    pub expires_at: Option<DateTime<Utc>>,
    /// The authenticated user.
    pub user: AuthUser,
}

/// Password credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Email address.
    pub email: String,
    /// Plaintext password, forwarded to the backend over TLS only.
    pub password: String,
}

/// Authentication operations delegated to the backend vendor.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Exchanges credentials for a session.
    async fn sign_in(&self, credentials: &Credentials) -> ProviderResult<AuthSession>;

    /// Invalidates the session behind an access token.
    async fn sign_out(&self, access_token: &str) -> ProviderResult<()>;

    /// Resolves an access token to its user.
    async fn get_user(&self, access_token: &str) -> ProviderResult<AuthUser>;

    /// Exchanges a refresh token for a fresh session.
    async fn refresh_session(&self, refresh_token: &str) -> ProviderResult<AuthSession>;
}
