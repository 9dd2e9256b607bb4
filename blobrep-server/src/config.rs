use blobrep_core::{BlobError, ReplicationConfig, Result, ServerMode, StorageConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageSettings,
    #[serde(default)]
    pub replication: ReplicationConfig,
    #[serde(default)]
    pub external: Option<ExternalConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub mode: ServerMode,
    pub database_path: PathBuf,
    pub kinds: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalConfig {
    pub backend: ExternalBackend,
    pub s3: Option<S3Config>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalBackend {
    S3,
    Memory,
}

impl ExternalBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default)]
    pub endpoint: Option<String>,
    pub region: String,
    #[serde(default)]
    pub allow_http: bool,
    #[serde(default)]
    pub credentials: Option<S3Credentials>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(::config::Environment::with_prefix("BLOBREP").separator("__"))
            .build()
            .map_err(|e| BlobError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| BlobError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.kinds.iter().all(|kind| kind.trim().is_empty()) {
            return Err(BlobError::Config(
                "storage.kinds must name at least one kind".to_string(),
            ));
        }

        if self.replication.enabled {
            let external = self.external.as_ref().ok_or_else(|| {
                BlobError::Config(
                    "external configuration is required when replication is enabled".to_string(),
                )
            })?;

            if external.backend == ExternalBackend::S3 && external.s3.is_none() {
                return Err(BlobError::Config(
                    "s3 configuration is required for s3 backend".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            enabled: self.storage.enabled,
            mode: self.storage.mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> String {
        let path = dir.path().join("blobrep.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn test_load_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
storage:
  mode: development
  database_path: /var/lib/blobrep/blobs.db
  kinds: [draft, rfc]
replication:
  bucket_prefix: staging
  partitions: 8
external:
  backend: s3
  s3:
    endpoint: http://127.0.0.1:9000
    region: us-east-1
    allow_http: true
    credentials:
      access_key_id: minio
      secret_access_key: minio-secret
"#,
        );

        let config = Config::from_file(&path).unwrap();
        assert!(config.storage.enabled);
        assert_eq!(config.storage.mode, ServerMode::Development);
        assert_eq!(config.storage.kinds, vec!["draft", "rfc"]);
        assert_eq!(config.replication.bucket_prefix, "staging");
        assert_eq!(config.replication.partitions, 8);
        assert_eq!(config.replication.max_backoff_ms, ReplicationConfig::default().max_backoff_ms);

        let external = config.external.unwrap();
        assert_eq!(external.backend, ExternalBackend::S3);
        assert_eq!(external.s3.unwrap().credentials.unwrap().access_key_id, "minio");
    }

    #[test]
    fn test_replication_requires_external_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
storage:
  database_path: blobs.db
  kinds: [draft]
"#,
        );
        assert!(matches!(Config::from_file(&path), Err(BlobError::Config(_))));

        let path = write_config(
            &dir,
            r#"
storage:
  database_path: blobs.db
  kinds: [draft]
replication:
  enabled: false
"#,
        );
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.storage_config().mode, ServerMode::Production);
    }

    #[test]
    fn test_requires_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
storage:
  database_path: blobs.db
  kinds: []
replication:
  enabled: false
"#,
        );
        assert!(Config::from_file(&path).is_err());
    }
}
