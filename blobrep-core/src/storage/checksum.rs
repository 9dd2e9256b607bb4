use crate::{BlobError, Result};
use sha2::{Digest, Sha384};

/// Hex length of a SHA-384 digest.
pub const SHA384_HEX_LEN: usize = 96;

/// Compute the lowercase hex SHA-384 digest of data
pub fn compute_sha384(data: &[u8]) -> String {
    let mut hasher = Sha384::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Verify that data matches the expected digest
pub fn verify_sha384(key: &str, data: &[u8], expected: &str) -> Result<()> {
    let actual = compute_sha384(data);
    if actual != expected {
        return Err(BlobError::IntegrityMismatch {
            key: key.to_string(),
            detail: format!("sha384 expected {} actual {}", expected, actual),
        });
    }
    Ok(())
}
