//! In-process stand-ins for a Prometheus server and the HTTP adapter.

#![allow(dead_code)]

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use promql_config::DEFAULT_INTERVAL;
use promql_lsp::rest::{router, RestState};
use promql_lsp::{LanguageService, MetadataService};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await });
    addr
}

fn success(data: Value) -> Json<Value> {
    Json(json!({ "status": "success", "data": data }))
}

async fn label_values(Path(label): Path<String>) -> (StatusCode, Json<Value>) {
    if label == "__name__" {
        (StatusCode::OK, success(json!(["up", "http_requests_total"])))
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "errorType": "bad_data", "error": "unknown label" })),
        )
    }
}

async fn series(Query(params): Query<Vec<(String, String)>>) -> (StatusCode, Json<Value>) {
    if !params.iter().any(|(key, _)| key == "match[]") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "error", "error": "no match[] parameter provided" })),
        );
    }
    (
        StatusCode::OK,
        success(json!([
            { "__name__": "up", "job": "prometheus", "instance": "localhost:9090" },
            { "__name__": "up", "job": "node", "instance": "localhost:9100" },
            { "__name__": "http_requests_total", "job": "api", "code": "200" },
        ])),
    )
}

/// A fake Prometheus answering the metadata endpoints. Returns its base URL.
pub async fn fake_prometheus() -> String {
    let app = Router::new()
        .route("/api/v1/label/:label/values", get(label_values))
        .route(
            "/api/v1/labels",
            get(|| async { success(json!(["__name__", "code", "instance", "job"])) }),
        )
        .route(
            "/api/v1/metadata",
            get(|| async {
                success(json!({
                    "up": [{ "type": "gauge", "help": "Whether the target is up.", "unit": "" }],
                    "http_requests_total": [
                        { "type": "counter", "help": "Total HTTP requests.", "unit": "" },
                        { "type": "counter", "help": "Older help text.", "unit": "" }
                    ]
                }))
            }),
        )
        .route("/api/v1/series", get(series));
    format!("http://{}", spawn(app).await)
}

/// The HTTP adapter backed by `metadata`. Returns its base URL.
pub async fn http_api(metadata: Arc<MetadataService>) -> String {
    let service = Arc::new(LanguageService::new(metadata));
    let addr = spawn(router(RestState::new(service))).await;
    format!("http://{addr}")
}

pub fn metadata_service() -> Arc<MetadataService> {
    Arc::new(MetadataService::new(DEFAULT_INTERVAL, DEFAULT_INTERVAL))
}
