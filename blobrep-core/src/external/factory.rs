use super::{ExternalBucket, ExternalStore};
use crate::{BlobError, Result};
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ExternalStoreBuilder {
    backend: Option<String>,
    bucket_prefix: Option<String>,
    buckets: Vec<String>,
    s3_endpoint: Option<String>,
    s3_region: Option<String>,
    s3_access_key_id: Option<String>,
    s3_secret_access_key: Option<String>,
    s3_allow_http: bool,
}

impl ExternalStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn bucket_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.bucket_prefix = Some(prefix.into());
        self
    }

    pub fn buckets(mut self, buckets: Vec<String>) -> Self {
        self.buckets = buckets;
        self
    }

    pub fn s3_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.s3_endpoint = Some(endpoint.into());
        self
    }

    pub fn s3_region(mut self, region: impl Into<String>) -> Self {
        self.s3_region = Some(region.into());
        self
    }

    pub fn s3_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.s3_access_key_id = Some(access_key_id.into());
        self.s3_secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn s3_allow_http(mut self, allow_http: bool) -> Self {
        self.s3_allow_http = allow_http;
        self
    }

    fn resolve_backend(&self) -> Result<String> {
        let backend = self
            .backend
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if backend.is_empty() {
            return Err(BlobError::Config(
                "external store backend cannot be empty".to_string(),
            ));
        }

        Ok(backend)
    }

    fn resolve_buckets(&self) -> Result<Vec<String>> {
        let buckets: Vec<String> = self
            .buckets
            .iter()
            .map(|bucket| bucket.trim().to_string())
            .filter(|bucket| !bucket.is_empty())
            .collect();

        if buckets.is_empty() {
            return Err(BlobError::Config(
                "at least one bucket is required for the external store".to_string(),
            ));
        }

        Ok(buckets)
    }

    /// External bucket name for a local bucket: `{prefix}-{bucket}`.
    pub fn external_name(&self, bucket: &str) -> String {
        match self.bucket_prefix.as_deref().map(str::trim) {
            Some(prefix) if !prefix.is_empty() => format!("{}-{}", prefix, bucket),
            _ => bucket.to_string(),
        }
    }

    pub fn build(&self) -> Result<ExternalStore> {
        let backend = self.resolve_backend()?;
        let buckets = self.resolve_buckets()?;

        let mut external = HashMap::new();
        for bucket in buckets {
            let name = self.external_name(&bucket);
            let client: Arc<dyn ObjectStore> = match backend.as_str() {
                "memory" => Arc::new(InMemory::new()),
                "s3" => Arc::new(self.build_s3(&name)?),
                other => {
                    return Err(BlobError::Config(format!(
                        "unsupported external store backend '{}': expected s3 | memory",
                        other
                    )));
                }
            };

            tracing::info!(
                "external bucket ready backend={} local={} external={}",
                backend,
                bucket,
                name
            );
            external.insert(bucket, ExternalBucket::new(name, client));
        }

        Ok(ExternalStore::new(external))
    }

    fn build_s3(&self, bucket_name: &str) -> Result<object_store::aws::AmazonS3> {
        let region = self.s3_region.as_deref().unwrap_or_default().trim();
        if region.is_empty() {
            return Err(BlobError::Config(
                "s3 region is required for s3 backend".to_string(),
            ));
        }

        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket_name)
            .with_region(region)
            .with_allow_http(self.s3_allow_http);

        if let Some(endpoint) = self
            .s3_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            builder = builder.with_endpoint(endpoint);
        }

        match (&self.s3_access_key_id, &self.s3_secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => {
                builder = builder
                    .with_access_key_id(access_key_id)
                    .with_secret_access_key(secret_access_key);
            }
            (None, None) => {}
            _ => {
                return Err(BlobError::Config(
                    "s3 access_key_id and secret_access_key must be set together".to_string(),
                ));
            }
        }

        builder
            .build()
            .map_err(|e| BlobError::Config(format!("failed to build s3 client: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_maps_bucket_names() {
        let store = ExternalStoreBuilder::new()
            .backend(" Memory ")
            .bucket_prefix("staging")
            .buckets(vec!["draft".to_string(), "rfc".to_string(), " ".to_string()])
            .build()
            .unwrap();

        assert_eq!(store.bucket("draft").unwrap().name(), "staging-draft");
        assert_eq!(store.bucket("rfc").unwrap().name(), "staging-rfc");
        assert_eq!(store.buckets().count(), 2);
        assert!(store.bucket("photo").is_err());
    }

    #[test]
    fn test_external_name_without_prefix() {
        let builder = ExternalStoreBuilder::new().bucket_prefix("  ");
        assert_eq!(builder.external_name("draft"), "draft");
    }

    #[test]
    fn test_rejects_bad_configuration() {
        let unknown = ExternalStoreBuilder::new()
            .backend("gcs")
            .buckets(vec!["draft".to_string()])
            .build();
        assert!(matches!(unknown, Err(BlobError::Config(_))));

        let no_backend = ExternalStoreBuilder::new().buckets(vec!["draft".to_string()]).build();
        assert!(matches!(no_backend, Err(BlobError::Config(_))));

        let no_buckets = ExternalStoreBuilder::new().backend("memory").build();
        assert!(matches!(no_buckets, Err(BlobError::Config(_))));

        let no_region = ExternalStoreBuilder::new()
            .backend("s3")
            .buckets(vec!["draft".to_string()])
            .build();
        assert!(matches!(no_region, Err(BlobError::Config(_))));
    }

    #[test]
    fn test_s3_backend_builds_with_endpoint() {
        let store = ExternalStoreBuilder::new()
            .backend("s3")
            .bucket_prefix("blobrep")
            .buckets(vec!["draft".to_string()])
            .s3_region("us-east-1")
            .s3_endpoint("http://127.0.0.1:9000")
            .s3_credentials("minio", "minio-secret")
            .s3_allow_http(true)
            .build()
            .unwrap();
        assert_eq!(store.bucket("draft").unwrap().name(), "blobrep-draft");
    }
}
