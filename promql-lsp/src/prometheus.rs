//! Client for the Prometheus HTTP API
//!
//! Only the read-only metadata endpoints are used; queries are never evaluated.

use crate::error::MetadataError;
use promql_analysis::MetricMetadata;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tower_lsp::async_trait;

/// Inclusive time window for label and series lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: SystemTime,
    pub end: SystemTime,
}

impl TimeRange {
    /// The window of length `lookback` ending at `end`.
    pub fn lookback(end: SystemTime, lookback: Duration) -> Self {
        let start = end.checked_sub(lookback).unwrap_or(UNIX_EPOCH);
        Self { start, end }
    }

    fn query(&self) -> [(&'static str, String); 2] {
        [
            ("start", unix_seconds(self.start)),
            ("end", unix_seconds(self.end)),
        ]
    }
}

fn unix_seconds(time: SystemTime) -> String {
    let seconds = time
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs_f64())
        .unwrap_or(0.0);
    format!("{seconds:.3}")
}

#[async_trait]
pub trait PrometheusClient: Send + Sync {
    /// Values of `label` across all series in `range`.
    async fn label_values(&self, label: &str, range: TimeRange)
        -> Result<Vec<String>, MetadataError>;

    async fn label_names(&self, range: TimeRange) -> Result<Vec<String>, MetadataError>;

    /// Metadata per metric name. Prometheus may report several entries for one metric.
    async fn metadata(&self) -> Result<HashMap<String, Vec<MetricMetadata>>, MetadataError>;

    /// Label sets of the series matching any of `matchers` in `range`.
    async fn series(
        &self,
        matchers: &[&str],
        range: TimeRange,
    ) -> Result<Vec<HashMap<String, String>>, MetadataError>;
}

/// `{"status": "success", "data": ...}` or `{"status": "error", "error": ...}`
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    status: String,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MetadataEntry {
    #[serde(rename = "type", default)]
    metric_type: String,
    #[serde(default)]
    help: String,
    #[serde(default)]
    unit: String,
}

pub struct HttpPrometheusClient {
    http: reqwest::Client,
    base: Url,
}

impl HttpPrometheusClient {
    pub const TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(base: Url) -> Result<Self, MetadataError> {
        let http = reqwest::Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|err| MetadataError::SourceUnreachable {
                url: base.to_string(),
                message: err.to_string(),
            })?;
        Ok(Self::with_http(http, base))
    }

    pub fn with_http(http: reqwest::Client, mut base: Url) -> Self {
        // `Url::join` replaces the last path segment unless the base ends in a slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { http, base }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, MetadataError> {
        let url = self
            .base
            .join(path)
            .map_err(|err| MetadataError::InvalidUrl(err.to_string()))?;
        let source_error = |message: String| MetadataError::SourceUnreachable {
            url: self.base.to_string(),
            message,
        };
        let decode = |message: String| MetadataError::Decode {
            endpoint: path.to_string(),
            message,
        };

        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|err| source_error(err.to_string()))?;
        let status = response.status();
        let body: ApiResponse<T> = response.json().await.map_err(|err| {
            if status.is_success() {
                decode(err.to_string())
            } else {
                source_error(format!("HTTP {status}"))
            }
        })?;

        match (body.status.as_str(), body.data) {
            ("success", Some(data)) => Ok(data),
            ("success", None) => Err(decode("response has no data".to_string())),
            (_, _) => Err(source_error(
                body.error.unwrap_or_else(|| format!("HTTP {status}")),
            )),
        }
    }
}

#[async_trait]
impl PrometheusClient for HttpPrometheusClient {
    async fn label_values(
        &self,
        label: &str,
        range: TimeRange,
    ) -> Result<Vec<String>, MetadataError> {
        self.get(&format!("api/v1/label/{label}/values"), &range.query())
            .await
    }

    async fn label_names(&self, range: TimeRange) -> Result<Vec<String>, MetadataError> {
        self.get("api/v1/labels", &range.query()).await
    }

    async fn metadata(&self) -> Result<HashMap<String, Vec<MetricMetadata>>, MetadataError> {
        let raw: HashMap<String, Vec<MetadataEntry>> = self.get("api/v1/metadata", &[]).await?;
        Ok(raw
            .into_iter()
            .map(|(metric, entries)| {
                let entries = entries
                    .into_iter()
                    .map(|entry| MetricMetadata {
                        metric_type: entry.metric_type,
                        help: entry.help,
                        unit: entry.unit,
                    })
                    .collect();
                (metric, entries)
            })
            .collect())
    }

    async fn series(
        &self,
        matchers: &[&str],
        range: TimeRange,
    ) -> Result<Vec<HashMap<String, String>>, MetadataError> {
        let mut query: Vec<(&str, String)> = range.query().into();
        query.extend(matchers.iter().map(|matcher| ("match[]", matcher.to_string())));
        self.get("api/v1/series", &query).await
    }
}
