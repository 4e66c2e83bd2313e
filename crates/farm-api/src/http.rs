use std::{sync::Arc, time::SystemTime};

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post, put},
};
use farm_model::{FarmLimits, FarmSnapshot, WorkerInfo};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{error::ApiError, handler::ApiHandler};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Build axum router with mounted endpoints.
    ///
    /// Routes:
    /// - GET /api/v1/farm - Farm snapshot
    /// - PUT /api/v1/farm/limits - Set min/max workers
    /// - POST /api/v1/farm/shutdown - Stop the farm
    /// - GET /metrics - Prometheus exposition
    pub fn router(self) -> Router {
        Router::new()
            .route("/api/v1/farm", get(farm_status::<H>))
            .route("/api/v1/farm/limits", put(set_limits::<H>))
            .route("/api/v1/farm/shutdown", post(shutdown::<H>))
            .route("/metrics", get(metrics::<H>))
            .with_state(self.handler)
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerView {
    pub worker_id: String,
    pub pid: u32,
    pub active_tasks: usize,
    pub last_heartbeat_age_s: f64,
    pub uptime_s: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FarmStatusResponse {
    pub manager_id: String,
    pub workers: Vec<WorkerView>,
    pub pending: usize,
    pub limits: FarmLimits,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<u32>,
    pub capacity: usize,
    pub shutdown_requested: bool,
}

impl FarmStatusResponse {
    fn from_snapshot(snap: FarmSnapshot, now: SystemTime) -> Self {
        let age = |t: SystemTime| now.duration_since(t).unwrap_or_default().as_secs_f64();
        Self {
            workers: snap
                .workers
                .iter()
                .map(|w: &WorkerInfo| WorkerView {
                    worker_id: w.worker_id.clone(),
                    pid: w.pid,
                    active_tasks: w.active_tasks,
                    last_heartbeat_age_s: age(w.last_heartbeat),
                    uptime_s: age(w.started_at),
                })
                .collect(),
            manager_id: snap.manager_id,
            pending: snap.pending,
            limits: snap.limits,
            queue_depth: snap.queue_depth,
            capacity: snap.capacity,
            shutdown_requested: snap.shutdown_requested,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LimitsRequest {
    min_workers: usize,
    max_workers: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/farm
async fn farm_status<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let snap = handler.farm_status().await?;
    debug!(workers = snap.workers.len(), pending = snap.pending, "farm status");
    Ok(Json(FarmStatusResponse::from_snapshot(snap, SystemTime::now())))
}

/// PUT /api/v1/farm/limits
async fn set_limits<H>(
    State(handler): State<Arc<H>>,
    Json(req): Json<LimitsRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let limits = FarmLimits {
        min_workers: req.min_workers,
        max_workers: req.max_workers,
    };
    limits.validate().map_err(ApiError::InvalidRequest)?;
    let applied = handler.set_limits(limits).await?;
    info!(min_workers = applied.min_workers, max_workers = applied.max_workers, "limits set from dashboard");
    Ok(Json(applied))
}

/// POST /api/v1/farm/shutdown
async fn shutdown<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    handler.request_shutdown().await?;
    info!("farm shutdown requested from dashboard");
    Ok(StatusCode::ACCEPTED)
}

/// GET /metrics
async fn metrics<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let text = handler.metrics_text().await?;
    Ok(([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], text))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::Request,
    };
    use farm_core::{FarmConfig, MetricsBackend, MetricsHandle};
    use farm_runtime::{ExeSpawner, Supervisor, SupervisorHandle};
    use tower::ServiceExt;

    use super::*;
    use crate::SupervisorApiAdapter;

    struct FixedMetrics;

    impl MetricsBackend for FixedMetrics {
        fn export_text(&self) -> Option<String> {
            Some("farm_workers 2\n".into())
        }
    }

    fn supervisor(metrics: MetricsHandle) -> SupervisorHandle {
        let cfg = FarmConfig {
            min_workers: 1,
            max_workers: 4,
            manager_id: Some("manager_1_1".into()),
            ..FarmConfig::default()
        };
        let spawner = Arc::new(ExeSpawner::new("farmd", ["worker"]));
        Supervisor::new(cfg, spawner, metrics).unwrap().handle()
    }

    fn router(handle: &SupervisorHandle) -> Router {
        HttpApi::new(Arc::new(SupervisorApiAdapter::new(handle.clone()))).router()
    }

    async fn body_json(res: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn status_reports_the_farm() {
        let handle = supervisor(farm_core::noop_metrics());
        let res = router(&handle)
            .oneshot(Request::get("/api/v1/farm").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body = body_json(res).await;
        assert_eq!(body["manager_id"], "manager_1_1");
        assert_eq!(body["limits"]["max_workers"], 4);
        assert_eq!(body["shutdown_requested"], false);
        assert!(body.get("queue_depth").is_none());
    }

    #[tokio::test]
    async fn limits_are_validated_and_applied() {
        let handle = supervisor(farm_core::noop_metrics());

        let bad = Request::put("/api/v1/farm/limits")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"min_workers":5,"max_workers":2}"#))
            .unwrap();
        let res = router(&handle).oneshot(bad).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(res).await["error"].as_str().unwrap().contains("min_workers"));

        let zero = Request::put("/api/v1/farm/limits")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"min_workers":0,"max_workers":0}"#))
            .unwrap();
        let res = router(&handle).oneshot(zero).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let good = Request::put("/api/v1/farm/limits")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"min_workers":2,"max_workers":6}"#))
            .unwrap();
        let res = router(&handle).oneshot(good).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(handle.limits(), FarmLimits { min_workers: 2, max_workers: 6 });
    }

    #[tokio::test]
    async fn shutdown_flags_the_supervisor() {
        let handle = supervisor(farm_core::noop_metrics());
        let res = router(&handle)
            .oneshot(Request::post("/api/v1/farm/shutdown").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert!(handle.is_shutdown_requested());
        assert!(handle.shutdown_token().is_cancelled());
    }

    #[tokio::test]
    async fn metrics_use_the_configured_backend() {
        let handle = supervisor(Arc::new(FixedMetrics));
        let res = router(&handle)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], PROMETHEUS_CONTENT_TYPE);
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"farm_workers 2\n");

        let res = router(&supervisor(farm_core::noop_metrics()))
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn worker_ages_are_relative_to_now() {
        let now = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000);
        let snap = FarmSnapshot {
            manager_id: "m".into(),
            workers: vec![WorkerInfo {
                worker_id: "w".into(),
                pid: 7,
                active_tasks: 1,
                last_heartbeat: SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(998),
                started_at: SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(900),
            }],
            pending: 0,
            limits: FarmLimits { min_workers: 1, max_workers: 2 },
            queue_depth: Some(3),
            capacity: 10,
            shutdown_requested: false,
        };
        let view = FarmStatusResponse::from_snapshot(snap, now);
        assert_eq!(view.workers[0].last_heartbeat_age_s, 2.0);
        assert_eq!(view.workers[0].uptime_s, 100.0);
    }
}
