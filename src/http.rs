use crate::metrics::Metrics;
use crate::poller::SnapshotStore;
use crate::state::{DiskIo, FleetSnapshot, HostSnapshot, MemoryUsage, NetworkIo};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use std::sync::Arc;

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub store: SnapshotStore,
    pub refresh_interval_secs: u64,
}

// Serialized field names are the contract with the table frontend; percent
// fields are 0..100, byte counters are non-negative integers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ApiFleet {
    pub generated_at_unix: i64,
    pub refresh_interval_secs: u64,
    pub hosts: Vec<ApiHost>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ApiHost {
    pub name: String,
    pub host: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub collected_at_unix: i64,
    pub cpu_percent: Option<f64>,
    pub memory: Option<MemoryUsage>,
    pub load_1m: Option<f64>,
    pub disk_io: Option<DiskIo>,
    pub network_io: Option<NetworkIo>,
}

impl From<&HostSnapshot> for ApiHost {
    fn from(value: &HostSnapshot) -> Self {
        Self {
            name: value.server.name.clone(),
            host: value.server.host.clone(),
            status: if value.status.is_ok() { "ok" } else { "error" },
            error: value.status.error_message().map(str::to_string),
            collected_at_unix: value.collected_at_unix,
            cpu_percent: value.metrics.cpu_percent,
            memory: value.metrics.memory,
            load_1m: value.metrics.load_1m,
            disk_io: value.metrics.disk_io,
            network_io: value.metrics.network_io,
        }
    }
}

fn api_fleet(snapshot: &FleetSnapshot, refresh_interval_secs: u64) -> ApiFleet {
    ApiFleet {
        generated_at_unix: snapshot.generated_at_unix,
        refresh_interval_secs,
        hosts: snapshot.hosts.values().map(ApiHost::from).collect(),
    }
}

pub fn build_router(
    metrics: Arc<Metrics>,
    store: SnapshotStore,
    refresh_interval_secs: u64,
) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/api/fleet", get(fleet_handler))
        .with_state(HttpAppState {
            metrics,
            store,
            refresh_interval_secs,
        })
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_scrape_count();
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}

async fn fleet_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    let snapshot = state.store.current();
    Json(api_fleet(&snapshot, state.refresh_interval_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{HostMetrics, HostStatus, ServerSpec};
    use axum::body::to_bytes;
    use axum::http::Request;
    use std::collections::BTreeMap;
    use tower::ServiceExt;

    fn populated_store() -> SnapshotStore {
        let mut hosts = BTreeMap::new();
        hosts.insert(
            "web1".to_string(),
            HostSnapshot {
                server: ServerSpec {
                    name: "web1".to_string(),
                    host: "10.0.0.5".to_string(),
                    user: "ubuntu".to_string(),
                },
                metrics: HostMetrics {
                    cpu_percent: Some(14.4),
                    memory: MemoryUsage::from_mb(1800, 2048),
                    load_1m: Some(0.52),
                    disk_io: None,
                    network_io: None,
                },
                status: HostStatus::Ok,
                collected_at_unix: 100,
            },
        );
        hosts.insert(
            "db1".to_string(),
            HostSnapshot::failed(
                ServerSpec {
                    name: "db1".to_string(),
                    host: "10.0.0.6".to_string(),
                    user: "ubuntu".to_string(),
                },
                "timed out after 10s".to_string(),
                100,
            ),
        );

        let store = SnapshotStore::new();
        store.publish(FleetSnapshot {
            hosts,
            generated_at_unix: 101,
        });
        store
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let metrics = Metrics::new().expect("metrics init");
        let app = build_router(metrics, SnapshotStore::new(), 60);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), b"ok");
    }

    #[tokio::test]
    async fn metrics_contains_fleet_gauges() {
        let metrics = Metrics::new().expect("metrics init");
        metrics.update_from_snapshot(&populated_store().current());
        let app = build_router(metrics, SnapshotStore::new(), 60);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("fleet_hosts_configured"));
        assert!(text.contains("fleet_host_up"));
    }

    #[tokio::test]
    async fn api_fleet_returns_one_row_per_host() {
        let metrics = Metrics::new().expect("metrics init");
        let app = build_router(metrics, populated_store(), 60);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/fleet")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(payload["refresh_interval_secs"], 60);
        assert_eq!(payload["generated_at_unix"], 101);
        let rows = payload["hosts"].as_array().expect("hosts array");
        assert_eq!(rows.len(), 2);
        // BTreeMap keys keep rows sorted by name.
        assert_eq!(rows[0]["name"], "db1");
        assert_eq!(rows[0]["status"], "error");
        assert_eq!(rows[0]["error"], "timed out after 10s");
        assert_eq!(rows[1]["name"], "web1");
        assert_eq!(rows[1]["status"], "ok");
        assert_eq!(rows[1]["cpu_percent"], 14.4);
        assert_eq!(rows[1]["memory"]["percent"], 87.9);
        assert!(rows[1].get("error").is_none());
    }
}
