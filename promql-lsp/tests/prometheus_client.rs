mod common;

use promql_lsp::prometheus::{HttpPrometheusClient, PrometheusClient, TimeRange};
use promql_lsp::MetadataError;
use reqwest::Url;
use std::time::{Duration, SystemTime};

async fn client() -> HttpPrometheusClient {
    let base = Url::parse(&common::fake_prometheus().await).expect("valid url");
    HttpPrometheusClient::new(base).expect("client")
}

fn last_hour() -> TimeRange {
    TimeRange::lookback(SystemTime::now(), Duration::from_secs(3600))
}

#[tokio::test]
async fn fetches_every_metadata_endpoint() {
    let client = client().await;

    let names = client
        .label_values("__name__", last_hour())
        .await
        .expect("metric names");
    assert_eq!(names, vec!["up", "http_requests_total"]);

    let labels = client.label_names(last_hour()).await.expect("label names");
    assert!(labels.contains(&"job".to_string()));

    let metadata = client.metadata().await.expect("metadata");
    assert_eq!(metadata["http_requests_total"].len(), 2);
    assert_eq!(metadata["up"][0].metric_type, "gauge");

    let series = client
        .series(&[r#"{__name__=~".+"}"#], last_hour())
        .await
        .expect("series");
    assert_eq!(series.len(), 3);
    assert_eq!(series[2]["code"], "200");
}

#[tokio::test]
async fn error_envelopes_become_source_errors() {
    let client = client().await;
    let err = client
        .label_values("job", last_hour())
        .await
        .expect_err("fake rejects other labels");
    match err {
        MetadataError::SourceUnreachable { message, .. } => assert_eq!(message, "unknown label"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_servers_are_reported() {
    // Bind and drop a listener to find a port nobody is serving.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let base = Url::parse(&format!("http://{addr}")).expect("valid url");
    let client = HttpPrometheusClient::new(base).expect("client");
    let err = client.label_names(last_hour()).await.expect_err("nothing listening");
    assert!(matches!(err, MetadataError::SourceUnreachable { .. }));
}

#[tokio::test]
async fn metadata_service_loads_from_the_server() {
    let metadata = common::metadata_service();
    metadata
        .change_source(&common::fake_prometheus().await)
        .await
        .expect("refreshed");

    let snapshot = metadata.snapshot();
    assert!(snapshot.has_metric("up"));
    assert_eq!(
        snapshot.label_values(Some("up"), "instance"),
        vec!["localhost:9090", "localhost:9100"]
    );
    assert_eq!(
        snapshot.metadata("http_requests_total").map(|m| m.help.as_str()),
        Some("Total HTTP requests.")
    );
}
