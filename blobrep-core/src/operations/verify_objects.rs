use crate::storage::{BlobStat, StorageKinds, verify_sha384};
use crate::{BlobError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Read-only audit of blob rows against the stored-object ledger.
#[derive(Clone)]
pub struct VerifyObjectsOperation {
    kinds: Arc<StorageKinds>,
}

#[derive(Debug, Clone, Default)]
pub struct VerifyObjectsOperationRequest {
    /// Kinds to check; all configured kinds when empty.
    pub kinds: Vec<String>,
    /// Also re-hash every blob's content against its stored checksum.
    pub deep: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftedObject {
    pub name: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindReport {
    pub kind: String,
    pub checked: usize,
    /// Live tracking row without a blob.
    pub missing: Vec<String>,
    /// Blob without a live tracking row.
    pub untracked: Vec<String>,
    pub drifted: Vec<DriftedObject>,
}

impl KindReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.untracked.is_empty() && self.drifted.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyObjectsOperationResult {
    pub reports: Vec<KindReport>,
}

impl VerifyObjectsOperationResult {
    pub fn is_clean(&self) -> bool {
        self.reports.iter().all(KindReport::is_clean)
    }
}

impl VerifyObjectsOperation {
    pub fn new(kinds: Arc<StorageKinds>) -> Self {
        Self { kinds }
    }

    pub fn run(&self, request: VerifyObjectsOperationRequest) -> Result<VerifyObjectsOperationResult> {
        let kinds: Vec<String> = if request.kinds.is_empty() {
            self.kinds.names().map(str::to_string).collect()
        } else {
            request.kinds
        };

        let mut reports = Vec::with_capacity(kinds.len());
        for kind in kinds {
            // unknown kinds are a configuration error
            self.kinds.get(&kind)?;
            let report = self.verify_kind(&kind, request.deep)?;
            if report.is_clean() {
                tracing::info!("verify kind={} checked={} clean", kind, report.checked);
            } else {
                tracing::warn!(
                    "verify kind={} checked={} missing={} untracked={} drifted={}",
                    kind,
                    report.checked,
                    report.missing.len(),
                    report.untracked.len(),
                    report.drifted.len()
                );
            }
            reports.push(report);
        }

        Ok(VerifyObjectsOperationResult { reports })
    }

    fn verify_kind(&self, kind: &str, deep: bool) -> Result<KindReport> {
        let blob_store = self.kinds.blob_store();
        let stats: BTreeMap<String, BlobStat> = blob_store
            .list_stats(kind)?
            .into_iter()
            .map(|stat| (stat.name.clone(), stat))
            .collect();
        let live = self.kinds.tracker().list_live(kind)?;

        let mut report = KindReport {
            kind: kind.to_string(),
            checked: stats.len(),
            ..Default::default()
        };

        let mut tracked = BTreeSet::new();
        for object in live {
            tracked.insert(object.name.clone());
            let Some(stat) = stats.get(&object.name) else {
                report.missing.push(object.name);
                continue;
            };

            if stat.size != object.len {
                report.drifted.push(DriftedObject {
                    name: object.name,
                    detail: format!("len tracked {} stored {}", object.len, stat.size),
                });
            } else if stat.checksum != object.sha384 {
                report.drifted.push(DriftedObject {
                    name: object.name,
                    detail: format!("sha384 tracked {} stored {}", object.sha384, stat.checksum),
                });
            }
        }

        for (name, stat) in &stats {
            if !tracked.contains(name) {
                report.untracked.push(name.clone());
            }

            if deep {
                let blob = blob_store.get(kind, name)?;
                match verify_sha384(&blob.key(), &blob.content, &stat.checksum) {
                    Ok(()) => {}
                    Err(BlobError::IntegrityMismatch { detail, .. }) => {
                        report.drifted.push(DriftedObject {
                            name: name.clone(),
                            detail: format!("content {}", detail),
                        });
                    }
                    Err(error) => return Err(error),
                }
            }
        }

        Ok(report)
    }
}
