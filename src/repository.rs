//! Scan persistence - one JSON document per stored scan

use crate::types::ScanOutput;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredScan {
    pub id: String,
    pub org_id: String,
    pub instance_url: String,
    pub created_at: DateTime<Utc>,
    pub scan: ScanOutput,
}

impl StoredScan {
    pub fn new(id: impl Into<String>, instance_url: impl Into<String>, scan: ScanOutput) -> Self {
        let org_id = if scan.org_info.id.is_empty() {
            "unknown".to_string()
        } else {
            scan.org_info.id.clone()
        };
        Self {
            id: id.into(),
            org_id,
            instance_url: instance_url.into(),
            created_at: Utc::now(),
            scan,
        }
    }
}

/// Listing entry for a stored scan, without the scan body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub id: String,
    pub org_id: String,
    pub created_at: DateTime<Utc>,
    pub has_data: bool,
}

impl From<&StoredScan> for ScanSummary {
    fn from(stored: &StoredScan) -> Self {
        let scan = &stored.scan;
        Self {
            id: stored.id.clone(),
            org_id: stored.org_id.clone(),
            created_at: stored.created_at,
            has_data: !scan.scanned_at.is_empty() || !scan.org_info.id.is_empty() || !scan.objects.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub total_scans: usize,
    pub kept: usize,
    pub deleted: usize,
    pub kept_scan_ids: Vec<String>,
}

#[async_trait]
pub trait ScanRepository: Send + Sync {
    async fn save(&self, scan: &StoredScan) -> anyhow::Result<()>;
    async fn get(&self, id: &str) -> anyhow::Result<Option<StoredScan>>;
    /// All stored scans, newest first.
    async fn list(&self) -> anyhow::Result<Vec<StoredScan>>;

    async fn latest(&self) -> anyhow::Result<Option<StoredScan>> {
        Ok(self.list().await?.into_iter().next())
    }

    /// Keep the `keep` newest scans and delete the rest.
    async fn prune(&self, keep: usize) -> anyhow::Result<PruneReport>;
}

/// Stores each scan as `<dir>/<id>.json`.
pub struct JsonScanRepository {
    dir: PathBuf,
}

impl JsonScanRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `None` for ids that cannot name a file inside the directory.
    fn path_for(&self, id: &str) -> Option<PathBuf> {
        is_storable_id(id).then(|| self.dir.join(format!("{id}.json")))
    }
}

/// Scan ids come from clients; only `[A-Za-z0-9_-]` is accepted.
fn is_storable_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

#[async_trait]
impl ScanRepository for JsonScanRepository {
    async fn save(&self, scan: &StoredScan) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let raw = serde_json::to_string_pretty(scan)?;
        let Some(path) = self.path_for(&scan.id) else {
            anyhow::bail!("invalid scan id {:?}", scan.id);
        };
        fs::write(path, raw).await?;
        tracing::info!(scan_id = %scan.id, org_id = %scan.org_id, "Scan stored");
        Ok(())
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<StoredScan>> {
        let Some(path) = self.path_for(id) else {
            return Ok(None);
        };
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn list(&self) -> anyhow::Result<Vec<StoredScan>> {
        if !fs::try_exists(&self.dir).await? {
            return Ok(Vec::new());
        }

        let mut scans = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path).await?;
            match serde_json::from_str::<StoredScan>(&raw) {
                Ok(scan) => scans.push(scan),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable scan file"),
            }
        }

        scans.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(scans)
    }

    async fn prune(&self, keep: usize) -> anyhow::Result<PruneReport> {
        let scans = self.list().await?;
        let total_scans = scans.len();
        let kept_scan_ids: Vec<String> = scans.iter().take(keep).map(|s| s.id.clone()).collect();

        let mut deleted = 0;
        for scan in scans.iter().skip(keep) {
            let Some(path) = self.path_for(&scan.id) else {
                tracing::warn!(scan_id = %scan.id, "Skipping scan with invalid id");
                continue;
            };
            match fs::remove_file(path).await {
                Ok(()) => deleted += 1,
                Err(e) => tracing::error!(scan_id = %scan.id, error = %e, "Failed to delete scan"),
            }
        }

        tracing::info!(total_scans, kept = kept_scan_ids.len(), deleted, "Pruned stored scans");
        Ok(PruneReport {
            total_scans,
            kept: kept_scan_ids.len(),
            deleted,
            kept_scan_ids,
        })
    }
}
