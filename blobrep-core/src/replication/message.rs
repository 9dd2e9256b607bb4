use crate::{BlobError, Result};
use serde::{Deserialize, Serialize};

/// Replication notification: the key only, never the content. Workers re-read
/// the current row when the message is processed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplicationMessage {
    pub bucket: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bucket: Option<String>,
    name: String,
}

impl ReplicationMessage {
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.bucket, self.name)
    }

    /// `{"bucket": .., "name": ..}`
    pub fn encode(&self) -> Result<Vec<u8>> {
        let wire = WireMessage {
            bucket: Some(self.bucket.clone()),
            name: self.name.clone(),
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    /// `{"name": ..}` for consumers already bound to the bucket.
    pub fn encode_bound(&self) -> Result<Vec<u8>> {
        let wire = WireMessage {
            bucket: None,
            name: self.name.clone(),
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    pub fn decode(payload: &[u8], bound_bucket: Option<&str>) -> Result<Self> {
        let wire: WireMessage = serde_json::from_slice(payload)?;

        let bucket = match (wire.bucket, bound_bucket) {
            (Some(bucket), Some(bound)) if bucket != bound => {
                return Err(BlobError::InvalidRequest(format!(
                    "message bucket '{}' does not match bound bucket '{}'",
                    bucket, bound
                )));
            }
            (Some(bucket), _) => bucket,
            (None, Some(bound)) => bound.to_string(),
            (None, None) => {
                return Err(BlobError::InvalidRequest(
                    "replication message has no bucket".to_string(),
                ));
            }
        };

        if bucket.is_empty() || wire.name.is_empty() {
            return Err(BlobError::InvalidRequest(
                "replication message bucket and name cannot be empty".to_string(),
            ));
        }

        Ok(Self::new(bucket, wire.name))
    }
}
