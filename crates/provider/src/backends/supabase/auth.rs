//! Authentication delegated to the vendor's GoTrue surface.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;

use crate::core::{AuthProvider, AuthSession, AuthUser, Credentials};
use crate::error::{BackendError, ProviderError, ProviderResult};

use super::rest::{SupabaseRest, check_status};

/// GoTrue-backed auth provider.
pub struct SupabaseAuth {
    rest: Arc<SupabaseRest>,
}

impl SupabaseAuth {
    pub(crate) fn new(rest: Arc<SupabaseRest>) -> Self {
        Self { rest }
    }

    fn user_from_json(value: &Value) -> ProviderResult<AuthUser> {
        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| missing("user.id"))?
            .to_string();
        let email = value
            .get("email")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let metadata = value.get("user_metadata").cloned().unwrap_or(Value::Null);
        Ok(AuthUser {
            id,
            email,
            metadata,
        })
    }

    fn session_from_json(value: &Value) -> ProviderResult<AuthSession> {
        let access_token = value
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| missing("access_token"))?
            .to_string();
        let refresh_token = value
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let expires_at = value
            .get("expires_in")
            .and_then(|v| v.as_i64())
            .map(|secs| Utc::now() + ChronoDuration::seconds(secs));
        let user = Self::user_from_json(value.get("user").unwrap_or(&Value::Null))?;
        Ok(AuthSession {
            access_token,
            refresh_token,
            expires_at,
            user,
        })
    }

    async fn token_request(&self, grant_type: &str, body: Value) -> ProviderResult<AuthSession> {
        let response = self
            .rest
            .http()
            .post(self.rest.auth_url(&format!("token?grant_type={grant_type}")))
            .json(&body)
            .send()
            .await?;
        let response = check_status("auth", grant_type, response).await?;
        let value: Value = response.json().await?;
        Self::session_from_json(&value)
    }
}

fn missing(field: &str) -> ProviderError {
    ProviderError::Backend(BackendError::Serialization {
        message: format!("auth response missing '{field}'"),
    })
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn sign_in(&self, credentials: &Credentials) -> ProviderResult<AuthSession> {
        self.token_request(
            "password",
            serde_json::json!({
                "email": credentials.email,
                "password": credentials.password,
            }),
        )
        .await
    }

    async fn sign_out(&self, access_token: &str) -> ProviderResult<()> {
        let response = self
            .rest
            .http()
            .post(self.rest.auth_url("logout"))
            .bearer_auth(access_token)
            .send()
            .await?;
        check_status("auth", "logout", response).await?;
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> ProviderResult<AuthUser> {
        let response = self
            .rest
            .http()
            .get(self.rest.auth_url("user"))
            .bearer_auth(access_token)
            .send()
            .await?;
        let response = check_status("auth", "get_user", response).await?;
        let value: Value = response.json().await?;
        Self::user_from_json(&value)
    }

    async fn refresh_session(&self, refresh_token: &str) -> ProviderResult<AuthSession> {
        self.token_request(
            "refresh_token",
            serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_parsing() {
        let body = json!({
            "access_token": "jwt",
            "refresh_token": "refresh",
            "expires_in": 3600,
            "user": {"id": "u1", "email": "chef@example.com", "user_metadata": {"name": "Chef"}}
        });
        let session = SupabaseAuth::session_from_json(&body).unwrap();
        assert_eq!(session.access_token, "jwt");
        assert_eq!(session.refresh_token.as_deref(), Some("refresh"));
        assert!(session.expires_at.is_some());
        assert_eq!(session.user.id, "u1");
        assert_eq!(session.user.metadata["name"], "Chef");
    }

    #[test]
    fn test_session_parsing_requires_token() {
        let body = json!({"user": {"id": "u1"}});
        assert!(SupabaseAuth::session_from_json(&body).is_err());
    }

    #[test]
    fn test_user_parsing_requires_id() {
        assert!(SupabaseAuth::user_from_json(&json!({"email": "x@y.z"})).is_err());
    }
}
