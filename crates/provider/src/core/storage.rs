//! The object-storage contract.
//!
//! Upload mechanics (multipart, resumable uploads) are the vendor's
//! concern; this surface covers what the back-office application needs:
//! menu photos, vendor invoices, and export files.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;

/// Metadata for a stored object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredObject {
    /// Bucket the object lives in.
    pub bucket: String,
    /// Object path within the bucket.
    pub path: String,
    /// MIME type, if known.
    pub content_type: Option<String>,
    /// Object size in bytes, if known.
    pub size: Option<u64>,
}

/// Object-storage operations delegated to the backend vendor.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Uploads an object, replacing any existing object at the path.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> ProviderResult<StoredObject>;

    /// Downloads an object's bytes.
    async fn download(&self, bucket: &str, path: &str) -> ProviderResult<Vec<u8>>;

    /// Deletes an object.
    async fn delete_object(&self, bucket: &str, path: &str) -> ProviderResult<()>;

    /// Lists objects under a prefix.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> ProviderResult<Vec<StoredObject>>;

    /// Returns a public URL for the object, when the bucket is public.
    fn public_url(&self, bucket: &str, path: &str) -> Option<String>;
}
