//! ---
//! prov_section: "05-networking-external-interfaces"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "REST surface over the provisioning orchestrator."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---

use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use prov_common::config::Mode;
use prov_common::model::ProjectRecord;
use prov_core::{
    CreateProjectRequest, DeletionReport, ProvisionError, ProvisioningOrchestrator,
    UpdateProjectRequest,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared API state exposed to handlers.
pub struct ApiState {
    orchestrator: ProvisioningOrchestrator,
    mode: Mode,
    start: Instant,
}

impl ApiState {
    pub fn new(orchestrator: ProvisioningOrchestrator, mode: Mode) -> Self {
        Self {
            orchestrator,
            mode,
            start: Instant::now(),
        }
    }

    pub fn orchestrator(&self) -> &ProvisioningOrchestrator {
        &self.orchestrator
    }

    fn status(&self) -> Result<StatusResponse, ProvisionError> {
        Ok(StatusResponse {
            mode: self.mode,
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds: self.start.elapsed().as_secs(),
            project_count: self.orchestrator.list_projects()?.len(),
            cleanup_allowed: self.orchestrator.config().cleanup_allowed,
        })
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Routes of the v2 project API.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route(
            "/api/v2/project",
            get(list_projects)
                .post(create_project)
                .put(update_project)
                .delete(delete_components),
        )
        .route(
            "/api/v2/project/:key",
            get(get_project).delete(delete_project),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve the API until [`ApiServer::shutdown`].
pub fn spawn_api_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<ApiServer> {
    let router = router(state);

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let addr = listener
        .local_addr()
        .context("failed to resolve API listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    mode: Mode,
    version: &'static str,
    uptime_seconds: u64,
    project_count: usize,
    cleanup_allowed: bool,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        let status = match &err {
            ProvisionError::NotFound(_) => StatusCode::NOT_FOUND,
            ProvisionError::AlreadyExists(_) => StatusCode::CONFLICT,
            ProvisionError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProvisionError::Transport(_)
            | ProvisionError::DomainRejection(_)
            | ProvisionError::Cleanup(_)
            | ProvisionError::ConfigurationDenied(_)
            | ProvisionError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %err, "request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

async fn get_status(State(state): State<Arc<ApiState>>) -> Result<Json<StatusResponse>, ApiError> {
    Ok(Json(state.status()?))
}

async fn create_project(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> Result<Json<ProjectRecord>, ApiError> {
    let Json(request) = payload?;
    let record = state.orchestrator.create_project(request).await?;
    Ok(Json(record))
}

async fn list_projects(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<ProjectRecord>>, ApiError> {
    Ok(Json(state.orchestrator.list_projects()?))
}

async fn get_project(
    State(state): State<Arc<ApiState>>,
    Path(key): Path<String>,
) -> Result<Json<ProjectRecord>, ApiError> {
    Ok(Json(state.orchestrator.get_project(&key)?))
}

async fn update_project(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<UpdateProjectRequest>, JsonRejection>,
) -> Result<Json<ProjectRecord>, ApiError> {
    let Json(request) = payload?;
    let record = state.orchestrator.update_project(request).await?;
    Ok(Json(record))
}

async fn delete_project(
    State(state): State<Arc<ApiState>>,
    Path(key): Path<String>,
) -> Result<Json<DeletionReport>, ApiError> {
    let report = state.orchestrator.delete_project(&key).await?;
    Ok(Json(report))
}

async fn delete_components() -> ApiError {
    ApiError::new(
        StatusCode::NOT_IMPLEMENTED,
        "deleting individual components is not supported",
    )
}
