//! Scan service - starts scans under an id, stops them, streams their progress

use crate::compare::{compare_scans, ScanComparison};
use crate::compose::{compose_scan, start_scan, ScanOptions};
use crate::config::AppConfig;
use crate::error::{ScanError, ScanResult};
use crate::inventory::{org, CollectorContext};
use crate::progress::{self, ProgressEvent};
use crate::registry::{ActiveScan, ProgressLog, ScanCompletion, ScanStore};
use crate::repository::{PruneReport, ScanRepository, ScanSummary, StoredScan};
use crate::salesforce::{SalesforceAuth, SalesforceClient};
use crate::security::SecurityOverview;
use crate::types::{OrgInfo, ScanOutput, ScanProgress};
use futures::{FutureExt, Stream};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Entries returned by `history`.
pub const SCAN_HISTORY_LIMIT: usize = 50;

pub struct ScanService {
    store: Arc<dyn ScanStore>,
    repository: Arc<dyn ScanRepository>,
    config: Arc<AppConfig>,
}

impl ScanService {
    pub fn new(store: Arc<dyn ScanStore>, repository: Arc<dyn ScanRepository>, config: AppConfig) -> Self {
        Self {
            store,
            repository,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ScanStore> {
        &self.store
    }

    /// Start a scan of the org behind `auth` in the background and return its id.
    pub fn start(&self, auth: SalesforceAuth) -> String {
        let instance_url = auth.instance_url.clone();
        let config = self.config.clone();
        self.launch(instance_url, move |options| async move { start_scan(auth, &config, options).await })
    }

    pub fn start_with_client(&self, client: SalesforceClient, instance_url: String) -> String {
        self.launch(instance_url, move |options| async move { compose_scan(&client, &options).await })
    }

    fn launch<F, Fut>(&self, instance_url: String, scan: F) -> String
    where
        F: FnOnce(ScanOptions) -> Fut,
        Fut: Future<Output = ScanResult<ScanOutput>> + Send + 'static,
    {
        let scan_id = new_scan_id();
        let cancel = CancellationToken::new();
        let progress = ProgressLog::new();

        let log = progress.clone();
        let options = ScanOptions::new(cancel.clone())
            .with_limits(self.config.limits)
            .with_progress(Arc::new(move |p: ScanProgress| log.push(p)));
        let scan = scan(options);

        let repository = self.repository.clone();
        let id = scan_id.clone();
        let task = async move {
            let output = scan.await?;
            let stored = StoredScan::new(id, instance_url, output);
            repository
                .save(&stored)
                .await
                .map_err(|e| ScanError::Storage(e.to_string()))?;
            Ok::<_, ScanError>(Arc::new(stored))
        }
        .instrument(tracing::info_span!("scan", scan_id = %scan_id));

        // Spawned so the scan runs whether or not anyone is subscribed.
        let store = self.store.clone();
        let linger = self.config.registry_linger;
        let id = scan_id.clone();
        let handle = tokio::spawn(async move {
            let outcome = task.await;
            forget_after(store, id, linger);
            outcome
        });

        let completion = async move {
            let outcome: ScanCompletion = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(ScanError::Task(e.to_string())),
            };
            if let Err(error) = &outcome {
                if *error != ScanError::Cancelled {
                    tracing::error!(error = %error, "Scan failed");
                }
            }
            outcome
        }
        .boxed()
        .shared();

        self.store.set(
            &scan_id,
            ActiveScan {
                cancel,
                progress,
                completion,
            },
        );
        tracing::info!(scan_id = %scan_id, "Scan started");
        scan_id
    }

    /// Cancel a scan and wait briefly for it to unwind. `false` if unknown.
    pub async fn stop(&self, scan_id: &str) -> bool {
        let Some(active) = self.store.get(scan_id) else {
            return false;
        };

        active.cancel.cancel();
        tracing::info!(scan_id, "Scan stopped by user - cancellation requested");

        match tokio::time::timeout(self.config.stop_grace, active.completion.clone()).await {
            Ok(Err(ScanError::Cancelled)) => tracing::info!(scan_id, "Scan unwound after cancellation"),
            Ok(Err(error)) => tracing::warn!(scan_id, error = %error, "Scan ended with unexpected error"),
            Ok(Ok(_)) => tracing::info!(scan_id, "Scan finished before cancellation took effect"),
            Err(_) => tracing::warn!(scan_id, "Scan did not stop within grace period"),
        }

        // The progress stream may have removed it already.
        self.store.delete(scan_id);
        true
    }

    pub fn subscribe(
        &self,
        scan_id: &str,
        resume_from: usize,
    ) -> Option<impl Stream<Item = ProgressEvent> + Send + 'static> {
        progress::subscribe(self.store.clone(), scan_id, self.config.progress_poll, resume_from)
    }

    pub async fn latest(&self) -> anyhow::Result<Option<StoredScan>> {
        self.repository.latest().await
    }

    /// Stored scans, newest first, at most `SCAN_HISTORY_LIMIT`.
    pub async fn history(&self) -> anyhow::Result<Vec<ScanSummary>> {
        let scans = self.repository.list().await?;
        Ok(scans.iter().take(SCAN_HISTORY_LIMIT).map(ScanSummary::from).collect())
    }

    /// Access-control view of the latest stored scan.
    pub async fn security(&self) -> anyhow::Result<Option<SecurityOverview>> {
        Ok(self
            .repository
            .latest()
            .await?
            .map(|stored| SecurityOverview::from_scan(&stored.scan)))
    }

    /// Run the org info collector on its own, outside any registered scan.
    pub async fn org_info(&self, auth: SalesforceAuth) -> ScanResult<OrgInfo> {
        let client = SalesforceClient::connect(auth, &self.config.api_version, self.config.http_timeout)
            .map_err(|e| ScanError::NonRecoverable(e.to_string()))?;
        let cancel = CancellationToken::new();
        let ctx = CollectorContext::new(&client, &cancel, self.config.limits);
        org::scan_org_info(&ctx).await
    }

    /// `None` if either scan is not stored.
    pub async fn compare(&self, first_id: &str, second_id: &str) -> anyhow::Result<Option<ScanComparison>> {
        let (first, second) = tokio::try_join!(self.repository.get(first_id), self.repository.get(second_id))?;
        Ok(match (first, second) {
            (Some(first), Some(second)) => Some(compare_scans(&first.scan, &second.scan)),
            _ => None,
        })
    }

    pub async fn cleanup(&self) -> anyhow::Result<PruneReport> {
        self.repository.prune(self.config.scan_retention).await
    }
}

/// Drop a finished scan from the registry once late subscribers have had `linger` to attach.
fn forget_after(store: Arc<dyn ScanStore>, scan_id: String, linger: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(linger).await;
        if store.delete(&scan_id) {
            tracing::debug!(scan_id = %scan_id, "Unclaimed scan removed from registry");
        }
    });
}

/// `scan-<unix millis>-<9 hex chars>`
pub fn new_scan_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("scan-{}-{}", chrono::Utc::now().timestamp_millis(), &suffix[..9])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, ApiResult};
    use crate::registry::InMemoryScanStore;
    use crate::repository::JsonScanRepository;
    use crate::salesforce::testing::healthy_org;
    use crate::salesforce::{ApiRequest, Transport};
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::Value;

    /// Never answers; returns only once the scan is cancelled.
    struct StallingTransport;

    #[async_trait]
    impl Transport for StallingTransport {
        async fn send(&self, _request: ApiRequest, cancel: &CancellationToken) -> ApiResult<Value> {
            cancel.cancelled().await;
            Err(ApiError::Cancelled)
        }
    }

    fn test_config() -> AppConfig {
        AppConfig {
            progress_poll: Duration::from_millis(5),
            stop_grace: Duration::from_secs(2),
            scan_retention: 1,
            ..AppConfig::default()
        }
    }

    fn service_with(dir: &std::path::Path, config: AppConfig) -> ScanService {
        ScanService::new(
            Arc::new(InMemoryScanStore::new()),
            Arc::new(JsonScanRepository::new(dir)),
            config,
        )
    }

    fn service(dir: &std::path::Path) -> ScanService {
        service_with(dir, test_config())
    }

    #[test]
    fn scan_ids_have_expected_shape() {
        let id = new_scan_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "scan");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert_ne!(new_scan_id(), id);
    }

    #[tokio::test]
    async fn completed_scan_is_streamed_stored_and_forgotten() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service(tmp.path());
        let client = Arc::new(healthy_org()).client();

        let scan_id = service.start_with_client(client, "https://acme.my.salesforce.com".into());
        let events: Vec<ProgressEvent> = service.subscribe(&scan_id, 0).unwrap().collect().await;

        let Some(ProgressEvent::Complete { result }) = events.last() else {
            panic!("expected a complete event, got {:?}", events.last());
        };
        assert_eq!(result.id, scan_id);
        assert_eq!(result.org_id, "00D000000000001");
        assert!(events.iter().any(|e| matches!(e, ProgressEvent::Progress { progress, .. } if progress.percent == 100)));

        assert!(service.store().get(&scan_id).is_none());
        assert_eq!(service.latest().await.unwrap().unwrap().id, scan_id);
    }

    #[tokio::test]
    async fn stop_cancels_and_removes_the_scan() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service(tmp.path());
        let client = SalesforceClient::new(Arc::new(StallingTransport), "v60.0");

        let scan_id = service.start_with_client(client, "https://acme.my.salesforce.com".into());
        let active = service.store().get(&scan_id).unwrap();

        assert!(service.stop(&scan_id).await);
        assert_eq!(active.completion.await, Err(ScanError::Cancelled));
        assert!(service.store().get(&scan_id).is_none());
        assert!(!service.stop(&scan_id).await);
        assert_eq!(service.latest().await.unwrap(), None);
    }

    #[tokio::test]
    async fn unclaimed_scan_leaves_registry_after_linger() {
        let tmp = tempfile::tempdir().unwrap();
        let config = AppConfig {
            registry_linger: Duration::from_millis(150),
            ..test_config()
        };
        let service = service_with(tmp.path(), config);
        let client = Arc::new(healthy_org()).client();

        let scan_id = service.start_with_client(client, "https://acme.my.salesforce.com".into());
        let active = service.store().get(&scan_id).unwrap();
        assert!(active.completion.await.is_ok());
        assert!(service.store().get(&scan_id).is_some());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(service.store().get(&scan_id).is_none());
        assert_eq!(service.latest().await.unwrap().unwrap().id, scan_id);
    }

    #[tokio::test]
    async fn unreachable_org_ends_in_error_event() {
        let tmp = tempfile::tempdir().unwrap();
        let config = AppConfig {
            http_timeout: Duration::from_secs(5),
            ..test_config()
        };
        let service = service_with(tmp.path(), config);

        let scan_id = service.start(SalesforceAuth::new("token", "http://127.0.0.1:9"));
        let events: Vec<ProgressEvent> = service.subscribe(&scan_id, 0).unwrap().collect().await;

        assert!(matches!(events.last(), Some(ProgressEvent::Error { .. })));
        assert!(service.store().get(&scan_id).is_none());
        assert_eq!(service.latest().await.unwrap(), None);
    }

    #[tokio::test]
    async fn history_is_newest_first_and_capped() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service(tmp.path());
        let repo = JsonScanRepository::new(tmp.path());
        for i in 0..(SCAN_HISTORY_LIMIT + 2) {
            let mut stored = StoredScan::new(format!("scan-{i:03}"), "https://x", Default::default());
            stored.created_at = chrono::Utc::now() - chrono::Duration::minutes(100 - i as i64);
            repo.save(&stored).await.unwrap();
        }

        let history = service.history().await.unwrap();

        assert_eq!(history.len(), SCAN_HISTORY_LIMIT);
        assert_eq!(history[0].id, format!("scan-{:03}", SCAN_HISTORY_LIMIT + 1));
        assert!(!history[0].has_data);
        assert_eq!(service.security().await.unwrap().unwrap().stats.total_roles, 0);
    }

    #[tokio::test]
    async fn compare_requires_both_scans() {
        let tmp = tempfile::tempdir().unwrap();
        let service = service(tmp.path());
        let repo = JsonScanRepository::new(tmp.path());
        repo.save(&StoredScan::new("a", "https://x", Default::default())).await.unwrap();
        repo.save(&StoredScan::new("b", "https://x", Default::default())).await.unwrap();

        assert!(service.compare("a", "b").await.unwrap().is_some());
        assert!(service.compare("a", "missing").await.unwrap().is_none());

        let report = service.cleanup().await.unwrap();
        assert_eq!(report.deleted, 1);
    }
}
