//! Object storage delegated to the vendor's storage API.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{StorageProvider, StoredObject};
use crate::error::ProviderResult;

use super::rest::{SupabaseRest, check_status};

/// Vendor-managed object storage.
pub struct SupabaseStorage {
    rest: Arc<SupabaseRest>,
}

impl SupabaseStorage {
    pub(crate) fn new(rest: Arc<SupabaseRest>) -> Self {
        Self { rest }
    }

    fn object_path(bucket: &str, path: &str) -> String {
        format!("object/{bucket}/{path}")
    }
}

#[async_trait]
impl StorageProvider for SupabaseStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> ProviderResult<StoredObject> {
        let size = bytes.len() as u64;
        let mut request = self
            .rest
            .http()
            .post(self.rest.storage_url(&Self::object_path(bucket, path)))
            .header("x-upsert", "true")
            .body(bytes);
        if let Some(content_type) = content_type {
            request = request.header("Content-Type", content_type);
        }
        let response = request.send().await?;
        check_status(bucket, "upload", response).await?;
        Ok(StoredObject {
            bucket: bucket.to_string(),
            path: path.to_string(),
            content_type: content_type.map(|c| c.to_string()),
            size: Some(size),
        })
    }

    async fn download(&self, bucket: &str, path: &str) -> ProviderResult<Vec<u8>> {
        let response = self
            .rest
            .http()
            .get(self.rest.storage_url(&Self::object_path(bucket, path)))
            .send()
            .await?;
        let response = check_status(bucket, "download", response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn delete_object(&self, bucket: &str, path: &str) -> ProviderResult<()> {
        let response = self
            .rest
            .http()
            .delete(self.rest.storage_url(&Self::object_path(bucket, path)))
            .send()
            .await?;
        check_status(bucket, "delete", response).await?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> ProviderResult<Vec<StoredObject>> {
        let response = self
            .rest
            .http()
            .post(self.rest.storage_url(&format!("object/list/{bucket}")))
            .json(&serde_json::json!({ "prefix": prefix }))
            .send()
            .await?;
        let response = check_status(bucket, "list", response).await?;
        let entries: Vec<Value> = response.json().await?;
        Ok(entries
            .iter()
            .filter_map(|entry| {
                let name = entry.get("name")?.as_str()?;
                let metadata = entry.get("metadata");
                Some(StoredObject {
                    bucket: bucket.to_string(),
                    path: name.to_string(),
                    content_type: metadata
                        .and_then(|m| m.get("mimetype"))
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string()),
                    size: metadata
                        .and_then(|m| m.get("size"))
                        .and_then(|v| v.as_u64()),
                })
            })
            .collect())
    }

    fn public_url(&self, bucket: &str, path: &str) -> Option<String> {
        Some(format!(
            "{}/storage/v1/object/public/{bucket}/{path}",
            self.rest.base()
        ))
    }
}
