//! Typed repositories over the provider row surface, plus the row helpers
//! shared by backend implementations.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{BackendError, ConfigError, ProviderError, ProviderResult};

use super::database::DatabaseProvider;

/// Tables not scoped by a `client_id` column: `users` and `clients` are the
/// tenancy roots themselves, and `audit_log` spans tenants. Everything else
/// is tenant-scoped.
pub const GLOBAL_TABLES: &[&str] = &["users", "clients", "audit_log"];

/// Returns whether the table is exempt from tenant scoping.
pub fn is_global_table(table: &str) -> bool {
    GLOBAL_TABLES.contains(&table)
}

/// Extracts the string `id` field of a row, generating a UUID when absent.
pub fn row_id(row: &Value) -> String {
    row.get("id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Extracts a required string field from a row.
pub fn require_str_field(table: &str, row: &Value, field: &str) -> ProviderResult<String> {
    row.get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            ProviderError::Config(ConfigError::InvalidValue {
                field: format!("{table}.{field}"),
                message: "required string field is missing or empty".to_string(),
            })
        })
}

/// Validates that a row destined for a tenant-scoped table carries a
/// non-empty `client_id`.
pub fn require_client_scope(table: &str, row: &Value) -> ProviderResult<Option<String>> {
    if is_global_table(table) {
        return Ok(None);
    }
    require_str_field(table, row, "client_id").map(Some)
}

/// Shallow-merges `patch` into `base`. Top-level keys in the patch replace
/// keys in the base; the `id` and `client_id` fields are never overwritten.
pub fn merge_row_patch(base: &Value, patch: &Value) -> Value {
    let mut merged = base.clone();
    if let (Some(target), Some(source)) = (merged.as_object_mut(), patch.as_object()) {
        for (key, value) in source {
            if key == "id" || key == "client_id" {
                continue;
            }
            target.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// A persistable business entity.
///
/// Implementors declare their table and expose the id pair used for
/// tenant-scoped addressing.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Table the entity persists to.
    const TABLE: &'static str;

    /// Row id.
    fn id(&self) -> &str;

    /// Owning client id.
    fn client_id(&self) -> &str;
}

/// A typed repository over any [`DatabaseProvider`].
///
/// Providers are substitutable underneath this type: the repository only
/// uses the tenant-scoped row surface, so the same calling code works
/// against postgres, the hosted BaaS, or the memory backend.
pub struct Repository<T: Entity> {
    provider: Arc<dyn DatabaseProvider>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Repository<T> {
    /// Creates a repository bound to a provider.
    pub fn new(provider: Arc<dyn DatabaseProvider>) -> Self {
        Self {
            provider,
            _entity: PhantomData,
        }
    }

    /// Inserts the entity and returns the stored copy.
    pub async fn insert(&self, entity: &T) -> ProviderResult<T> {
        let row = serde_json::to_value(entity)?;
        let stored = self.provider.insert_row(T::TABLE, row).await?;
        Self::decode(stored)
    }

    /// Fetches one entity by client and id.
    pub async fn find_by_id(&self, client_id: &str, id: &str) -> ProviderResult<Option<T>> {
        match self.provider.fetch_row(T::TABLE, client_id, id).await? {
            Some(row) => Self::decode(row).map(Some),
            None => Ok(None),
        }
    }

    /// Lists all entities belonging to a client.
    pub async fn list_for_client(&self, client_id: &str) -> ProviderResult<Vec<T>> {
        let rows = self.provider.list_rows(T::TABLE, client_id).await?;
        rows.into_iter().map(Self::decode).collect()
    }

    /// Persists the entity's current state and returns the stored copy.
    pub async fn update(&self, entity: &T) -> ProviderResult<T> {
        let patch = serde_json::to_value(entity)?;
        let stored = self
            .provider
            .update_row(T::TABLE, entity.client_id(), entity.id(), patch)
            .await?;
        Self::decode(stored)
    }

    /// Deletes one entity by client and id.
    pub async fn delete(&self, client_id: &str, id: &str) -> ProviderResult<()> {
        self.provider.delete_row(T::TABLE, client_id, id).await
    }

    fn decode(row: Value) -> ProviderResult<T> {
        serde_json::from_value(row).map_err(|e| {
            ProviderError::Backend(BackendError::Serialization {
                message: format!("row in '{}' does not match entity shape: {e}", T::TABLE),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_global_tables() {
        assert!(is_global_table("users"));
        assert!(is_global_table("clients"));
        assert!(is_global_table("audit_log"));
        assert!(!is_global_table("deliveries"));
        assert!(!is_global_table("client_users"));
    }

    #[test]
    fn test_row_id_generates_uuid_when_missing() {
        let with_id = json!({"id": "d-1"});
        assert_eq!(row_id(&with_id), "d-1");

        let without = json!({});
        let generated = row_id(&without);
        assert!(uuid::Uuid::parse_str(&generated).is_ok());
    }

    #[test]
    fn test_require_client_scope() {
        let row = json!({"id": "d-1", "client_id": "c-1"});
        assert_eq!(
            require_client_scope("deliveries", &row).unwrap(),
            Some("c-1".to_string())
        );

        let global = json!({"id": "u-1"});
        assert_eq!(require_client_scope("users", &global).unwrap(), None);

        let missing = json!({"id": "d-2"});
        assert!(require_client_scope("deliveries", &missing).is_err());
    }

    #[test]
    fn test_merge_row_patch_preserves_identity() {
        let base = json!({"id": "d-1", "client_id": "c-1", "vendor": "acme", "total": 10});
        let patch = json!({"id": "evil", "client_id": "other", "total": 25});
        let merged = merge_row_patch(&base, &patch);

        assert_eq!(merged["id"], "d-1");
        assert_eq!(merged["client_id"], "c-1");
        assert_eq!(merged["total"], 25);
        assert_eq!(merged["vendor"], "acme");
    }
}
