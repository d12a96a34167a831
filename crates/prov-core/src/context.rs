//! ---
//! prov_section: "01-core-functionality"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "State shared by the orchestrator and the quickstarter manager."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
use std::sync::Arc;

use prov_common::config::ProvisioningConfig;
use prov_metrics::ProvisioningMetrics;
use prov_persistence::ProjectStore;
use tracing::{error, warn};

use crate::adapters::Adapters;
use crate::error::{Operation, ProvisionError, RunFailure, StepError};
use crate::jobs::JobPathBuilder;
use crate::ledger::{CleanupOutcome, Ledger};
use crate::locks::ProjectLocks;

pub(crate) struct RunContext {
    pub adapters: Adapters,
    pub store: Arc<dyn ProjectStore>,
    pub config: ProvisioningConfig,
    pub jobs: JobPathBuilder,
    pub locks: ProjectLocks,
    pub metrics: Option<ProvisioningMetrics>,
}

impl RunContext {
    pub fn new(
        config: ProvisioningConfig,
        adapters: Adapters,
        store: Arc<dyn ProjectStore>,
        metrics: Option<ProvisioningMetrics>,
    ) -> Self {
        Self {
            jobs: JobPathBuilder::from_config(&config),
            adapters,
            store,
            config,
            locks: ProjectLocks::new(),
            metrics,
        }
    }

    pub fn record_run(&self, operation: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_run(operation, outcome);
        }
    }

    /// Roll back (or keep) what the failed run created and build the error.
    pub async fn abort(
        &self,
        operation: Operation,
        project_key: &str,
        cause: StepError,
        ledger: Ledger,
    ) -> ProvisionError {
        warn!(
            project_key,
            operation = operation.as_str(),
            created = ledger.len(),
            error = %cause,
            "step failed, aborting run"
        );
        let cleanup = ledger
            .roll_back(&self.adapters, self.config.cleanup_allowed)
            .await;
        if let Some(metrics) = &self.metrics {
            match &cleanup {
                CleanupOutcome::Complete { undone } => metrics.record_compensations(*undone, 0),
                CleanupOutcome::Partial {
                    undone, failures, ..
                } => metrics.record_compensations(*undone, failures.len()),
                CleanupOutcome::NotAllowed { .. } => {}
            }
        }

        let err = RunFailure {
            operation,
            project_key: project_key.to_owned(),
            cause,
            cleanup,
        }
        .into_error();
        let outcome = match &err {
            ProvisionError::DomainRejection(_) => "domain_rejection",
            ProvisionError::Cleanup(_) => "cleanup_failure",
            ProvisionError::ConfigurationDenied(_) => "configuration_denied",
            _ => "transport",
        };
        self.record_run(operation.as_str(), outcome);
        error!(project_key, error = %err, "provisioning run aborted");
        err
    }
}
