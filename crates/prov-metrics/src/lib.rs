//! ---
//! prov_section: "03-persistence-logging"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Metrics collection and export utilities."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let local_addr = std_listener
        .local_addr()
        .with_context(|| "failed to read metrics listener address")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %local_addr, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr: local_addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        ),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain"),
                )],
                String::from("metrics encoding error"),
            )
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Return the bound address for convenience.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    registry: SharedRegistry,
    starts_total: IntCounter,
    config_load_seconds: Histogram,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "provd_starts_total",
            "Total number of times the provisioning daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "provd_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        Ok(Self {
            registry,
            starts_total,
            config_load_seconds,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }
}

/// Counters describing provisioning runs and their rollbacks.
#[derive(Clone)]
pub struct ProvisioningMetrics {
    registry: SharedRegistry,
    runs: IntCounterVec,
    compensations: IntCounterVec,
    projects_deleted: IntCounter,
}

impl ProvisioningMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let runs = IntCounterVec::new(
            Opts::new(
                "prov_runs_total",
                "Provisioning runs by operation (create/update/delete) and outcome",
            ),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(runs.clone()))?;

        let compensations = IntCounterVec::new(
            Opts::new(
                "prov_compensations_total",
                "Compensating deletes issued during rollback, by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(compensations.clone()))?;

        let projects_deleted = IntCounter::with_opts(Opts::new(
            "prov_projects_deleted_total",
            "Projects removed through the delete workflow",
        ))?;
        registry.register(Box::new(projects_deleted.clone()))?;

        Ok(Self {
            registry,
            runs,
            compensations,
            projects_deleted,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_run(&self, operation: &str, outcome: &str) {
        self.runs.with_label_values(&[operation, outcome]).inc();
    }

    pub fn record_compensations(&self, undone: usize, failed: usize) {
        self.compensations
            .with_label_values(&["undone"])
            .inc_by(undone as u64);
        self.compensations
            .with_label_values(&["failed"])
            .inc_by(failed as u64);
    }

    pub fn record_project_deleted(&self) {
        self.projects_deleted.inc();
    }
}

impl std::fmt::Debug for ProvisioningMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningMetrics").finish_non_exhaustive()
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_value(registry: &Registry, name: &str, labels: &[(&str, &str)]) -> u64 {
        registry
            .gather()
            .iter()
            .find(|family| family.get_name() == name)
            .and_then(|family| {
                family.get_metric().iter().find(|metric| {
                    labels.iter().all(|(key, value)| {
                        metric
                            .get_label()
                            .iter()
                            .any(|pair| pair.get_name() == *key && pair.get_value() == *value)
                    })
                })
            })
            .map(|metric| metric.get_counter().get_value() as u64)
            .unwrap_or_default()
    }

    #[test]
    fn provisioning_metrics_count_runs_and_compensations() {
        let registry = new_registry();
        let metrics = ProvisioningMetrics::new(registry.clone()).unwrap();

        metrics.record_run("create", "failed");
        metrics.record_run("create", "succeeded");
        metrics.record_run("create", "succeeded");
        metrics.record_compensations(5, 1);
        metrics.record_project_deleted();

        assert_eq!(
            counter_value(&registry, "prov_runs_total", &[("operation", "create"), ("outcome", "succeeded")]),
            2
        );
        assert_eq!(
            counter_value(&registry, "prov_compensations_total", &[("outcome", "undone")]),
            5
        );
        assert_eq!(
            counter_value(&registry, "prov_compensations_total", &[("outcome", "failed")]),
            1
        );
        assert_eq!(counter_value(&registry, "prov_projects_deleted_total", &[]), 1);
    }

    #[test]
    fn registering_twice_on_one_registry_fails() {
        let registry = new_registry();
        ProvisioningMetrics::new(registry.clone()).unwrap();
        assert!(ProvisioningMetrics::new(registry).is_err());
    }
}
