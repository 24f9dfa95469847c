//! Background-refreshed metadata cache
//!
//! The cache holds two atomically swapped handles: the [`SourceConfig`] describing where and
//! how far back to look, and the current [`MetadataSnapshot`]. A refresh reads the source
//! once, talks to Prometheus without holding any lock, and swaps the new snapshot in whole.
//! A failed refresh leaves the previous snapshot in place.

use crate::error::MetadataError;
use crate::prometheus::{HttpPrometheusClient, PrometheusClient, TimeRange};
use promql_analysis::{CancellationToken, MetadataSnapshot, SnapshotBuilder};
use promql_config::DEFAULT_INTERVAL;
use reqwest::Url;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Selects every series that has a metric name.
pub const ALL_SERIES: &str = r#"{__name__=~".+"}"#;

/// Builds a client for a newly configured endpoint.
pub type Connector =
    Arc<dyn Fn(&Url) -> Result<Arc<dyn PrometheusClient>, MetadataError> + Send + Sync>;

/// Where metadata comes from. Replaced as a whole, never mutated.
#[derive(Clone)]
pub struct SourceConfig {
    pub url: Option<Url>,
    pub client: Option<Arc<dyn PrometheusClient>>,
    pub lookback: Duration,
    pub refresh_interval: Duration,
}

impl SourceConfig {
    pub fn empty() -> Self {
        Self {
            url: None,
            client: None,
            lookback: DEFAULT_INTERVAL,
            refresh_interval: DEFAULT_INTERVAL,
        }
    }
}

/// Notified after every refresh attempt that was not cancelled.
pub trait RefreshObserver: Send + Sync {
    fn refreshed(&self, _snapshot: &MetadataSnapshot) {}
    fn failed(&self, error: &MetadataError);
}

/// Observer that only logs, used when no editor is attached.
pub struct LogObserver;

impl RefreshObserver for LogObserver {
    fn failed(&self, error: &MetadataError) {
        warn!(%error, "metadata refresh failed");
    }
}

pub struct MetadataService {
    source: RwLock<Arc<SourceConfig>>,
    snapshot: RwLock<Arc<MetadataSnapshot>>,
    observer: RwLock<Arc<dyn RefreshObserver>>,
    connector: Connector,
}

impl MetadataService {
    /// A service that connects to endpoints over HTTP.
    pub fn new(lookback: Duration, refresh_interval: Duration) -> Self {
        Self::with_connector(lookback, refresh_interval, Arc::new(http_connector))
    }

    pub fn with_connector(
        lookback: Duration,
        refresh_interval: Duration,
        connector: Connector,
    ) -> Self {
        let source = SourceConfig {
            lookback,
            refresh_interval,
            ..SourceConfig::empty()
        };
        Self {
            source: RwLock::new(Arc::new(source)),
            snapshot: RwLock::new(Arc::new(MetadataSnapshot::empty())),
            observer: RwLock::new(Arc::new(LogObserver)),
            connector,
        }
    }

    pub fn set_observer(&self, observer: Arc<dyn RefreshObserver>) {
        *self.observer.write().unwrap_or_else(PoisonError::into_inner) = observer;
    }

    pub fn source(&self) -> Arc<SourceConfig> {
        self.source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The current snapshot. Never waits for a refresh in progress.
    pub fn snapshot(&self) -> Arc<MetadataSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_source(&self, update: impl FnOnce(&mut SourceConfig)) {
        let mut guard = self.source.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = SourceConfig::clone(&guard);
        update(&mut next);
        *guard = Arc::new(next);
    }

    /// Point the cache at a new endpoint without refreshing. An empty `url` clears the source
    /// and the snapshot.
    pub fn set_source(&self, url: &str) -> Result<(), MetadataError> {
        let url = promql_config::parse_prometheus_url(url)
            .map_err(|err| MetadataError::InvalidUrl(err.to_string()))?;
        let client = url.as_ref().map(|url| (self.connector)(url)).transpose()?;
        info!(
            url = url.as_ref().map(Url::as_str).unwrap_or("<none>"),
            "metadata source changed"
        );
        let cleared = client.is_none();
        let mut guard = self.source.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = SourceConfig::clone(&guard);
        next.url = url;
        next.client = client;
        *guard = Arc::new(next);
        if cleared {
            self.swap(MetadataSnapshot::empty());
        }
        Ok(())
    }

    /// Point the cache at a new endpoint and refresh from it right away.
    ///
    /// The new endpoint is kept even when this first refresh fails, so later cycles retry it.
    pub async fn change_source(&self, url: &str) -> Result<(), MetadataError> {
        self.set_source(url)?;
        self.refresh(&CancellationToken::new()).await
    }

    /// Change the lookback window used from the next refresh on.
    pub fn set_lookback(&self, lookback: Duration) {
        self.update_source(|source| source.lookback = lookback);
    }

    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<(), MetadataError> {
        let source = self.source();
        let Some(client) = source.client.clone() else {
            debug!("no metadata source configured, skipping refresh");
            return Ok(());
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MetadataError::Cancelled),
            result = fetch(client.as_ref(), source.lookback) => result,
        };
        let observer = self
            .observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match result {
            Ok(snapshot) => {
                debug!(
                    metrics = snapshot.metric_names().count(),
                    "metadata snapshot refreshed"
                );
                let Some(snapshot) = self.swap_if_current(&source, snapshot) else {
                    debug!("metadata source changed during refresh, discarding result");
                    return Err(MetadataError::Superseded);
                };
                observer.refreshed(&snapshot);
                Ok(())
            }
            Err(MetadataError::Cancelled) => {
                debug!("metadata refresh cancelled");
                Err(MetadataError::Cancelled)
            }
            Err(error) if !self.is_current(&source) => {
                debug!(%error, "refresh from a replaced metadata source failed");
                Err(MetadataError::Superseded)
            }
            Err(error) => {
                observer.failed(&error);
                Err(error)
            }
        }
    }

    /// Store a snapshot fetched from `fetched_from` unless the endpoint has been replaced since.
    /// The source lock is held across the store so a concurrent `set_source` cannot interleave.
    fn swap_if_current(
        &self,
        fetched_from: &SourceConfig,
        snapshot: MetadataSnapshot,
    ) -> Option<Arc<MetadataSnapshot>> {
        let current = self.source.read().unwrap_or_else(PoisonError::into_inner);
        if !same_client(&current.client, &fetched_from.client) {
            return None;
        }
        Some(self.swap(snapshot))
    }

    fn is_current(&self, source: &SourceConfig) -> bool {
        let current = self.source.read().unwrap_or_else(PoisonError::into_inner);
        same_client(&current.client, &source.client)
    }

    fn swap(&self, snapshot: MetadataSnapshot) -> Arc<MetadataSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
        snapshot
    }

    /// Refresh now and then once per refresh interval until `shutdown` fires.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            // Failures are reported to the observer; the loop keeps going.
            let _ = self.refresh(&shutdown).await;
            let interval = self.source().refresh_interval;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        debug!("metadata refresh loop stopped");
    }
}

fn same_client(
    a: &Option<Arc<dyn PrometheusClient>>,
    b: &Option<Arc<dyn PrometheusClient>>,
) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

fn http_connector(url: &Url) -> Result<Arc<dyn PrometheusClient>, MetadataError> {
    Ok(Arc::new(HttpPrometheusClient::new(url.clone())?))
}

async fn fetch(
    client: &dyn PrometheusClient,
    lookback: Duration,
) -> Result<MetadataSnapshot, MetadataError> {
    let now = SystemTime::now();
    let range = TimeRange::lookback(now, lookback);
    let (metric_names, metadata, label_names, series) = tokio::try_join!(
        client.label_values("__name__", range),
        client.metadata(),
        client.label_names(range),
        client.series(&[ALL_SERIES], range),
    )?;

    let mut builder = SnapshotBuilder::new();
    for name in metric_names {
        builder.metric_name(name);
    }
    for (metric, entries) in metadata {
        if let Some(first) = entries.into_iter().next() {
            builder.metadata(metric, first);
        }
    }
    for label in label_names {
        builder.label_name(label);
    }
    for labels in &series {
        builder.series(labels);
    }
    Ok(builder.build(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use promql_analysis::MetricMetadata;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tower_lsp::async_trait;

    #[derive(Default)]
    struct FakeClient {
        fail: AtomicBool,
        calls: AtomicUsize,
        delay: Duration,
        extra_metric: &'static str,
    }

    #[async_trait]
    impl PrometheusClient for FakeClient {
        async fn label_values(
            &self,
            _label: &str,
            _range: TimeRange,
        ) -> Result<Vec<String>, MetadataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(MetadataError::SourceUnreachable {
                    url: "http://fake".into(),
                    message: "connection refused".into(),
                });
            }
            let mut names = vec!["up".to_string(), "http_requests_total".to_string()];
            if !self.extra_metric.is_empty() {
                names.push(self.extra_metric.to_string());
            }
            Ok(names)
        }

        async fn label_names(&self, _range: TimeRange) -> Result<Vec<String>, MetadataError> {
            Ok(vec!["job".into()])
        }

        async fn metadata(
            &self,
        ) -> Result<HashMap<String, Vec<MetricMetadata>>, MetadataError> {
            Ok(HashMap::from([(
                "up".to_string(),
                vec![MetricMetadata {
                    metric_type: "gauge".into(),
                    help: "Target health.".into(),
                    unit: String::new(),
                }],
            )]))
        }

        async fn series(
            &self,
            _matchers: &[&str],
            _range: TimeRange,
        ) -> Result<Vec<HashMap<String, String>>, MetadataError> {
            Ok(vec![HashMap::from([
                ("__name__".to_string(), "up".to_string()),
                ("job".to_string(), "api".to_string()),
            ])])
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        refreshed: AtomicUsize,
        failures: Mutex<Vec<MetadataError>>,
    }

    impl RefreshObserver for RecordingObserver {
        fn refreshed(&self, _snapshot: &MetadataSnapshot) {
            self.refreshed.fetch_add(1, Ordering::SeqCst);
        }

        fn failed(&self, error: &MetadataError) {
            self.failures.lock().expect("lock").push(error.clone());
        }
    }

    fn service(client: Arc<FakeClient>) -> MetadataService {
        let connector: Connector = Arc::new(
            move |_url: &Url| -> Result<Arc<dyn PrometheusClient>, MetadataError> {
                Ok(client.clone())
            },
        );
        MetadataService::with_connector(DEFAULT_INTERVAL, DEFAULT_INTERVAL, connector)
    }

    #[tokio::test]
    async fn refresh_without_source_is_a_no_op() {
        let service = service(Arc::new(FakeClient::default()));
        service
            .refresh(&CancellationToken::new())
            .await
            .expect("no-op refresh");
        assert!(!service.snapshot().is_loaded());
    }

    #[tokio::test]
    async fn change_source_refreshes_immediately() {
        let client = Arc::new(FakeClient::default());
        let service = service(client.clone());
        let observer = Arc::new(RecordingObserver::default());
        service.set_observer(observer.clone());

        service
            .change_source("http://prometheus:9090")
            .await
            .expect("refreshed");
        let snapshot = service.snapshot();
        assert!(snapshot.is_loaded());
        assert!(snapshot.has_metric("http_requests_total"));
        assert_eq!(snapshot.label_values(Some("up"), "job"), vec!["api"]);
        assert_eq!(
            snapshot.metadata("up").map(|m| m.metric_type.as_str()),
            Some("gauge")
        );
        assert_eq!(observer.refreshed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let client = Arc::new(FakeClient::default());
        let service = service(client.clone());
        let observer = Arc::new(RecordingObserver::default());
        service.set_observer(observer.clone());
        service
            .change_source("http://prometheus:9090")
            .await
            .expect("refreshed");
        let before = service.snapshot();

        client.fail.store(true, Ordering::SeqCst);
        let err = service
            .refresh(&CancellationToken::new())
            .await
            .expect_err("refresh fails");
        assert!(matches!(err, MetadataError::SourceUnreachable { .. }));
        assert!(Arc::ptr_eq(&before, &service.snapshot()));
        assert_eq!(observer.failures.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn unreachable_new_source_is_kept_for_later_cycles() {
        let client = Arc::new(FakeClient::default());
        client.fail.store(true, Ordering::SeqCst);
        let service = service(client.clone());

        let result = service.change_source("http://elsewhere:9090").await;
        assert!(result.is_err());
        assert_eq!(
            service.source().url.as_ref().map(Url::as_str),
            Some("http://elsewhere:9090/")
        );

        client.fail.store(false, Ordering::SeqCst);
        service
            .refresh(&CancellationToken::new())
            .await
            .expect("recovered");
        assert!(service.snapshot().is_loaded());
    }

    /// A service whose connector hands out `old` for host `old` and `new` for anything else.
    fn two_source_service(old: Arc<FakeClient>, new: Arc<FakeClient>) -> Arc<MetadataService> {
        let connector: Connector = Arc::new(
            move |url: &Url| -> Result<Arc<dyn PrometheusClient>, MetadataError> {
                if url.host_str() == Some("old") {
                    Ok(old.clone())
                } else {
                    Ok(new.clone())
                }
            },
        );
        Arc::new(MetadataService::with_connector(
            DEFAULT_INTERVAL,
            DEFAULT_INTERVAL,
            connector,
        ))
    }

    #[tokio::test]
    async fn refresh_from_a_replaced_source_is_discarded() {
        let old = Arc::new(FakeClient {
            delay: Duration::from_millis(200),
            extra_metric: "old_metric",
            ..FakeClient::default()
        });
        let new = Arc::new(FakeClient {
            extra_metric: "new_metric",
            ..FakeClient::default()
        });
        let service = two_source_service(old, new);
        service.set_source("http://old:9090").expect("valid url");

        let stale = {
            let service = service.clone();
            tokio::spawn(async move { service.refresh(&CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        service
            .change_source("http://new:9090")
            .await
            .expect("refreshed");
        assert!(service.snapshot().has_metric("new_metric"));

        let result = stale.await.expect("task finished");
        assert_eq!(result, Err(MetadataError::Superseded));
        let snapshot = service.snapshot();
        assert!(snapshot.has_metric("new_metric"));
        assert!(!snapshot.has_metric("old_metric"));
    }

    #[tokio::test]
    async fn refresh_finishing_after_clear_keeps_snapshot_empty() {
        let old = Arc::new(FakeClient {
            delay: Duration::from_millis(200),
            ..FakeClient::default()
        });
        let service = two_source_service(old, Arc::new(FakeClient::default()));
        service.set_source("http://old:9090").expect("valid url");

        let stale = {
            let service = service.clone();
            tokio::spawn(async move { service.refresh(&CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        service.set_source("").expect("clearing is allowed");

        let result = stale.await.expect("task finished");
        assert_eq!(result, Err(MetadataError::Superseded));
        assert!(!service.snapshot().is_loaded());
        assert!(service.source().url.is_none());
    }

    #[tokio::test]
    async fn lookback_change_during_refresh_keeps_the_result() {
        let client = Arc::new(FakeClient {
            delay: Duration::from_millis(100),
            ..FakeClient::default()
        });
        let service = two_source_service(client.clone(), client);
        service.set_source("http://old:9090").expect("valid url");

        let refresh = {
            let service = service.clone();
            tokio::spawn(async move { service.refresh(&CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        service.set_lookback(Duration::from_secs(60));

        refresh
            .await
            .expect("task finished")
            .expect("same endpoint");
        assert!(service.snapshot().is_loaded());
    }

    #[tokio::test]
    async fn invalid_urls_are_rejected_without_touching_the_source() {
        let service = service(Arc::new(FakeClient::default()));
        let err = service
            .change_source("ftp://nope")
            .await
            .expect_err("invalid scheme");
        assert!(matches!(err, MetadataError::InvalidUrl(_)));
        assert!(service.source().url.is_none());
    }

    #[tokio::test]
    async fn cancelled_refresh_reports_cancelled() {
        let service = service(Arc::new(FakeClient::default()));
        service.update_source(|source| {
            source.client = Some(Arc::new(FakeClient::default()));
        });
        let token = CancellationToken::new();
        token.cancel();
        let err = service.refresh(&token).await.expect_err("cancelled");
        assert_eq!(err, MetadataError::Cancelled);
        assert!(!service.snapshot().is_loaded());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn readers_see_whole_snapshots_during_refresh() {
        let service = Arc::new(service(Arc::new(FakeClient::default())));
        service.set_source("http://prometheus:9090").expect("valid url");

        let reader = {
            let service = service.clone();
            tokio::spawn(async move {
                for _ in 0..1000 {
                    let snapshot = service.snapshot();
                    if snapshot.is_loaded() {
                        assert!(snapshot.has_metric("up"));
                        assert!(snapshot.has_metric("http_requests_total"));
                        assert_eq!(snapshot.label_values(Some("up"), "job"), vec!["api"]);
                    } else {
                        assert_eq!(snapshot.metric_names().count(), 0);
                    }
                    tokio::task::yield_now().await;
                }
            })
        };
        for _ in 0..20 {
            service
                .refresh(&CancellationToken::new())
                .await
                .expect("refreshed");
        }
        reader.await.expect("reader saw consistent snapshots");
    }

    #[tokio::test]
    async fn set_lookback_swaps_the_source() {
        let service = service(Arc::new(FakeClient::default()));
        let before = service.source();
        service.set_lookback(Duration::from_secs(60));
        assert_eq!(service.source().lookback, Duration::from_secs(60));
        assert_eq!(before.lookback, DEFAULT_INTERVAL);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let service = Arc::new(service(Arc::new(FakeClient::default())));
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(service.clone().run(shutdown.clone()));
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("loop stops")
            .expect("task finished");
    }
}
