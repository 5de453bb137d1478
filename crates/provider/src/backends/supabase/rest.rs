//! HTTP plumbing for the Supabase backend: request construction, header
//! handling, and mapping of PostgREST error responses into the provider
//! taxonomy.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;

use crate::config::SupabaseConfig;
use crate::error::{
    BackendError, ConfigError, IntegrityError, ProviderError, ProviderResult, TransientError,
};

/// Shared REST client for the PostgREST, GoTrue, and storage surfaces.
/// The service key rides along as default headers on every request.
pub(crate) struct SupabaseRest {
    http: reqwest::Client,
    base: String,
}

impl SupabaseRest {
    pub(crate) fn new(config: &SupabaseConfig) -> ProviderResult<Self> {
        config.validate()?;
        url::Url::parse(&config.url).map_err(|e| {
            ProviderError::Config(ConfigError::InvalidValue {
                field: "url".to_string(),
                message: e.to_string(),
            })
        })?;

        let mut headers = HeaderMap::new();
        let key_value = HeaderValue::from_str(&config.service_key).map_err(|_| {
            ProviderError::Config(ConfigError::InvalidValue {
                field: "service_key".to_string(),
                message: "key contains invalid header characters".to_string(),
            })
        })?;
        headers.insert("apikey", key_value.clone());
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_key))
            .map_err(|_| {
                ProviderError::Config(ConfigError::InvalidValue {
                    field: "service_key".to_string(),
                    message: "key contains invalid header characters".to_string(),
                })
            })?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);
        if config.schema != "public" {
            headers.insert(
                "Accept-Profile",
                HeaderValue::from_str(&config.schema).map_err(|_| {
                    ProviderError::Config(ConfigError::InvalidValue {
                        field: "schema".to_string(),
                        message: "schema contains invalid header characters".to_string(),
                    })
                })?,
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.options.timeout_ms))
            .build()
            .map_err(|e| {
                ProviderError::Config(ConfigError::InvalidValue {
                    field: "http_client".to_string(),
                    message: e.to_string(),
                })
            })?;

        Ok(Self {
            http,
            base: config.url.trim_end_matches('/').to_string(),
        })
    }

    pub(crate) fn base(&self) -> &str {
        &self.base
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base, table)
    }

    pub(crate) fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base, path)
    }

    pub(crate) fn storage_url(&self, path: &str) -> String {
        format!("{}/storage/v1/{}", self.base, path)
    }

    /// Probes the REST surface.
    pub(crate) async fn ping(&self) -> ProviderResult<()> {
        let response = self.http.get(format!("{}/rest/v1/", self.base)).send().await?;
        check_status("rest", "ping", response).await?;
        Ok(())
    }

    pub(crate) async fn select(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> ProviderResult<Vec<Value>> {
        let mut query: Vec<(&str, String)> = vec![("select", "*".to_string())];
        query.extend_from_slice(filters);
        let response = self
            .http
            .get(self.table_url(table))
            .query(&query)
            .send()
            .await?;
        let response = check_status(table, "select", response).await?;
        Ok(response.json::<Vec<Value>>().await?)
    }

    pub(crate) async fn insert(&self, table: &str, row: &Value) -> ProviderResult<Value> {
        let response = self
            .http
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;
        let response = check_status(table, "insert", response).await?;
        let mut rows: Vec<Value> = response.json().await?;
        rows.pop().ok_or_else(|| {
            ProviderError::Backend(BackendError::Http {
                provider: "supabase".to_string(),
                status: 200,
                message: format!("insert into '{table}' returned no representation"),
            })
        })
    }

    pub(crate) async fn update(
        &self,
        table: &str,
        filters: &[(&str, String)],
        patch: &Value,
    ) -> ProviderResult<Vec<Value>> {
        let response = self
            .http
            .patch(self.table_url(table))
            .query(filters)
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await?;
        let response = check_status(table, "update", response).await?;
        Ok(response.json::<Vec<Value>>().await?)
    }

    pub(crate) async fn delete(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> ProviderResult<()> {
        let response = self
            .http
            .delete(self.table_url(table))
            .query(filters)
            .send()
            .await?;
        check_status(table, "delete", response).await?;
        Ok(())
    }
}

impl std::fmt::Debug for SupabaseRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseRest")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

/// Maps a non-success response to the provider taxonomy. PostgREST error
/// bodies carry the underlying SQLSTATE in `code`, which lets constraint
/// violations surface uniformly with the raw-SQL provider.
pub(crate) async fn check_status(
    table: &str,
    operation: &str,
    response: reqwest::Response,
) -> ProviderResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: Value = response.json().await.unwrap_or(Value::Null);
    let code = body.get("code").and_then(|v| v.as_str()).unwrap_or("");
    let message = body
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("request failed")
        .to_string();

    let err = match code {
        "23503" => ProviderError::Integrity(IntegrityError::ForeignKey {
            table: table.to_string(),
            message,
        }),
        "23505" => ProviderError::Integrity(IntegrityError::Unique {
            table: table.to_string(),
            message,
        }),
        "23502" | "23514" => ProviderError::Integrity(IntegrityError::Constraint {
            table: table.to_string(),
            message,
        }),
        _ => match status.as_u16() {
            408 | 429 | 502 | 503 | 504 => ProviderError::Transient(TransientError::Network {
                operation: format!("{operation} {table}"),
                message: format!("HTTP {status}: {message}"),
            }),
            other => ProviderError::Backend(BackendError::Http {
                provider: "supabase".to_string(),
                status: other,
                message,
            }),
        },
    };
    Err(err)
}
