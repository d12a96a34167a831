//! ---
//! prov_section: "01-core-functionality"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Project create, update and delete sagas."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Instant;

use prov_common::config::ProvisioningConfig;
use prov_common::logging::run_span;
use prov_common::model::{ExecutionJob, ProjectRecord, RepositoryRecord};
use prov_metrics::ProvisioningMetrics;
use prov_persistence::ProjectStore;
use serde::Serialize;
use tracing::{debug, info, warn, Instrument};

use crate::adapters::{
    Adapters, BuildRequest, PermissionSchemeSpec, RepoHostProjectSpec, RepositorySpec,
    TrackerProjectSpec, WikiSpaceSpec,
};
use crate::context::RunContext;
use crate::error::{AdapterError, AdapterResult, Operation, ProvisionError, Result, StepError};
use crate::jobs::ProjectAction;
use crate::ledger::{CompensationEntry, Ledger};
use crate::quickstarter::QuickstarterManager;
use crate::request::{normalise_key, validate_descriptor, CreateProjectRequest, UpdateProjectRequest};

/// Repositories every project receives, in creation order.
pub const AUXILIARY_REPOSITORIES: [&str; 2] = ["occonfig-artifacts", "design"];

/// What a delete run removed and what it could not.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport {
    pub project_key: String,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown_job: Option<ExecutionJob>,
}

impl DeletionReport {
    fn track(&mut self, resource: String, result: AdapterResult<()>) {
        match result {
            Ok(()) => {
                debug!(resource = %resource, "removed");
                self.removed.push(resource);
            }
            Err(err) => {
                warn!(resource = %resource, error = %err, "delete failed");
                self.failed.push(format!("{resource} ({err})"));
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Entry point for project provisioning.
///
/// Each run records every created resource in its own ledger; a failing step
/// rolls the ledger back (unless cleanup is disabled) and surfaces a
/// [`ProvisionError`]. Runs on the same project key are serialised.
#[derive(Clone)]
pub struct ProvisioningOrchestrator {
    ctx: Arc<RunContext>,
    quickstarters: QuickstarterManager,
}

impl ProvisioningOrchestrator {
    pub fn new(config: ProvisioningConfig, adapters: Adapters, store: Arc<dyn ProjectStore>) -> Self {
        Self::with_metrics(config, adapters, store, None)
    }

    pub fn with_metrics(
        config: ProvisioningConfig,
        adapters: Adapters,
        store: Arc<dyn ProjectStore>,
        metrics: Option<ProvisioningMetrics>,
    ) -> Self {
        let ctx = Arc::new(RunContext::new(config, adapters, store, metrics));
        Self {
            quickstarters: QuickstarterManager::new(ctx.clone()),
            ctx,
        }
    }

    pub fn config(&self) -> &ProvisioningConfig {
        &self.ctx.config
    }

    pub fn quickstarters(&self) -> &QuickstarterManager {
        &self.quickstarters
    }

    pub fn get_project(&self, project_key: &str) -> Result<ProjectRecord> {
        let key = normalise_key(project_key)?;
        self.ctx
            .store
            .get(&key)?
            .ok_or(ProvisionError::NotFound(key))
    }

    pub fn list_projects(&self) -> Result<Vec<ProjectRecord>> {
        Ok(self.ctx.store.list()?)
    }

    /// Provision a new project across all systems and persist its record.
    pub async fn create_project(&self, request: CreateProjectRequest) -> Result<ProjectRecord> {
        let span = run_span(Operation::Create.as_str(), &request.project_key);
        self.create(request).instrument(span).await
    }

    async fn create(&self, request: CreateProjectRequest) -> Result<ProjectRecord> {
        let mut record = request.to_record()?;
        let key = record.project_key.clone();
        let _guard = self.ctx.locks.acquire(&key).await;
        if self.ctx.store.get(&key)?.is_some() {
            return Err(ProvisionError::AlreadyExists(key));
        }

        let started = Instant::now();
        info!(project_key = %key, quickstarters = request.quickstarters.len(), "creating project");
        let mut ledger = Ledger::new();
        let outcome = match self.run_create(&mut record, &request, &mut ledger).await {
            Ok(()) => self.ctx.store.put(&record).map_err(StepError::from),
            Err(cause) => Err(cause),
        };
        match outcome {
            Ok(()) => {
                self.ctx.record_run(Operation::Create.as_str(), "success");
                info!(
                    project_key = %key,
                    resources = ledger.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "project created"
                );
                Ok(record)
            }
            Err(cause) => Err(self.ctx.abort(Operation::Create, &key, cause, ledger).await),
        }
    }

    async fn run_create(
        &self,
        record: &mut ProjectRecord,
        request: &CreateProjectRequest,
        ledger: &mut Ledger,
    ) -> std::result::Result<(), StepError> {
        let adapters = &self.ctx.adapters;
        let key = record.project_key.clone();
        let groups = &self.ctx.config.default_groups;
        let admin_group = record
            .project_admin_group
            .clone()
            .unwrap_or_else(|| groups.admin_group.clone());
        let user_group = record
            .project_user_group
            .clone()
            .unwrap_or_else(|| groups.user_group.clone());

        if record.bugtracker_space {
            info!(project_key = %key, step = "tracker_project", "creating tracker project");
            let project = adapters
                .issue_tracker
                .create_project(&TrackerProjectSpec {
                    key: key.clone(),
                    name: record.project_name.clone(),
                    description: record.description.clone(),
                    lead: record.project_admin_user.clone(),
                })
                .await?;
            ledger.record(CompensationEntry::tracker_project(&project.key));
            record.bugtracker_url = project.url;

            if record.special_permission_set {
                info!(project_key = %key, step = "permission_scheme", "resolving permission scheme");
                let scheme = adapters
                    .issue_tracker
                    .get_or_create_permission_scheme(&PermissionSchemeSpec {
                        project_key: key.clone(),
                        admin_group: admin_group.clone(),
                        user_group: user_group.clone(),
                        readonly_group: record.project_readonly_group.clone(),
                    })
                    .await?;
                if scheme.created {
                    ledger.record(CompensationEntry::permission_scheme(&scheme.id));
                    record.permission_scheme_id = Some(scheme.id);
                } else {
                    debug!(project_key = %key, scheme_id = %scheme.id, "reusing permission scheme");
                }
            }

            info!(project_key = %key, step = "wiki_space", "creating wiki space");
            let blueprint_key = &self.ctx.config.wiki_blueprint_key;
            let blueprint = adapters
                .wiki
                .list_blueprints()
                .await?
                .into_iter()
                .find(|blueprint| &blueprint.key == blueprint_key)
                .ok_or_else(|| {
                    AdapterError::Rejected(format!("wiki blueprint {blueprint_key} is not available"))
                })?;
            let server = adapters
                .wiki
                .list_linked_tracker_servers()
                .await?
                .into_iter()
                .next();
            if server.is_none() {
                warn!(project_key = %key, "wiki has no linked tracker server");
            }
            let space = adapters
                .wiki
                .create_space(&WikiSpaceSpec {
                    key: key.clone(),
                    name: record.project_name.clone(),
                    description: record.description.clone(),
                    blueprint_key: blueprint.key,
                    tracker_server_id: server.map(|server| server.id),
                    tracker_project_key: key.clone(),
                })
                .await?;
            ledger.record(CompensationEntry::wiki_space(&space.key));
            record.collaboration_space_url = space.url;
        }

        info!(project_key = %key, step = "repo_host_project", "creating repo-host project");
        let repo_project = adapters
            .repo_host
            .create_project(&RepoHostProjectSpec {
                key: key.clone(),
                name: record.project_name.clone(),
                description: record.description.clone(),
                admin_group: admin_group.clone(),
                user_group: user_group.clone(),
            })
            .await?;
        ledger.record(CompensationEntry::repo_host_project(&repo_project.key));
        record.scmvcs_url = repo_project.url;

        for suffix in AUXILIARY_REPOSITORIES {
            info!(project_key = %key, step = "repository", repository = suffix, "creating auxiliary repository");
            let repository = adapters
                .repo_host
                .create_repository(&RepositorySpec {
                    project_key: repo_project.key.clone(),
                    name: format!("{}-{suffix}", record.lowercase_key()),
                    admin_group: admin_group.clone(),
                    user_group: user_group.clone(),
                })
                .await?;
            ledger.record(CompensationEntry::repository(&repo_project.key, &repository.name));
            record.add_repository(RepositoryRecord {
                name: repository.name,
                url: repository.url,
                admin_group: Some(admin_group.clone()),
                user_group: Some(user_group.clone()),
                project_key: Some(key.clone()),
            });
        }

        if record.platform_runtime {
            info!(project_key = %key, step = "create_job", "triggering project job");
            let job_path = self.ctx.jobs.project_job(ProjectAction::Create, &key);
            let job = adapters
                .build_trigger
                .trigger(&job_path, &project_build_request(record, &admin_group, &user_group))
                .await?;
            record.last_execution_jobs.push(job);
        }

        for descriptor in &request.quickstarters {
            self.quickstarters.provision(record, descriptor, ledger).await?;
        }
        Ok(())
    }

    /// Add the quickstarters not yet present on an existing project.
    pub async fn update_project(&self, request: UpdateProjectRequest) -> Result<ProjectRecord> {
        let span = run_span(Operation::Update.as_str(), &request.project_key);
        self.update(request).instrument(span).await
    }

    async fn update(&self, request: UpdateProjectRequest) -> Result<ProjectRecord> {
        let key = normalise_key(&request.project_key)?;
        for descriptor in &request.quickstarters {
            validate_descriptor(descriptor)?;
        }
        let _guard = self.ctx.locks.acquire(&key).await;
        let mut record = self
            .ctx
            .store
            .get(&key)?
            .ok_or_else(|| ProvisionError::NotFound(key.clone()))?;

        for descriptor in &request.quickstarters {
            if record.has_quickstarter(&descriptor.component_id) {
                debug!(project_key = %key, component_id = %descriptor.component_id, "quickstarter present, skipping");
                continue;
            }
            record = self.quickstarters.add_locked(record, descriptor).await?;
        }
        self.ctx.record_run(Operation::Update.as_str(), "success");
        Ok(record)
    }

    /// Best-effort removal of every resource the project owns.
    pub async fn delete_project(&self, project_key: &str) -> Result<DeletionReport> {
        self.delete(project_key)
            .instrument(run_span("delete", project_key))
            .await
    }

    async fn delete(&self, project_key: &str) -> Result<DeletionReport> {
        let key = normalise_key(project_key)?;
        let _guard = self.ctx.locks.acquire(&key).await;
        let record = self
            .ctx
            .store
            .get(&key)?
            .ok_or_else(|| ProvisionError::NotFound(key.clone()))?;
        let adapters = &self.ctx.adapters;
        let mut report = DeletionReport {
            project_key: key.clone(),
            ..DeletionReport::default()
        };
        info!(project_key = %key, "deleting project");

        if record.bugtracker_space {
            report.track(
                CompensationEntry::tracker_project(&key).to_string(),
                adapters.issue_tracker.delete_project(&key).await,
            );
            if let Some(scheme_id) = &record.permission_scheme_id {
                report.track(
                    CompensationEntry::permission_scheme(scheme_id).to_string(),
                    adapters.issue_tracker.delete_permission_scheme(scheme_id).await,
                );
            }
            report.track(
                CompensationEntry::wiki_space(&key).to_string(),
                adapters.wiki.delete_space(&key).await,
            );
        }
        report.track(
            CompensationEntry::repo_host_project(&key).to_string(),
            adapters.repo_host.delete_project(&key).await,
        );

        self.ctx.store.delete(&key)?;
        report.removed.push(format!("project record {key}"));

        if record.platform_runtime {
            let job_path = self.ctx.jobs.project_job(ProjectAction::Delete, &key);
            let request = BuildRequest {
                project_key: key.clone(),
                component_id: None,
                parameters: [("PROJECT_ID".to_owned(), record.lowercase_key())]
                    .into_iter()
                    .collect(),
            };
            match adapters.build_trigger.trigger(&job_path, &request).await {
                Ok(job) => report.teardown_job = Some(job),
                Err(err) => {
                    warn!(project_key = %key, error = %err, "teardown job failed to start");
                    report.failed.push(format!("teardown job ({err})"));
                }
            }
        }

        if let Some(metrics) = &self.ctx.metrics {
            metrics.record_project_deleted();
        }
        let outcome = if report.is_complete() { "success" } else { "partial" };
        self.ctx.record_run("delete", outcome);
        info!(
            project_key = %key,
            removed = report.removed.len(),
            failed = report.failed.len(),
            "project deleted"
        );
        Ok(report)
    }
}

fn project_build_request(record: &ProjectRecord, admin_group: &str, user_group: &str) -> BuildRequest {
    let mut request = BuildRequest {
        project_key: record.project_key.clone(),
        ..BuildRequest::default()
    };
    let params = &mut request.parameters;
    params.insert("PROJECT_ID".into(), record.lowercase_key());
    if let Some(admin) = &record.project_admin_user {
        params.insert("PROJECT_ADMIN".into(), admin.clone());
    }
    let mut groups = format!("ADMINGROUP={admin_group},USERGROUP={user_group}");
    if let Some(readonly) = &record.project_readonly_group {
        groups.push_str(&format!(",READONLYGROUP={readonly}"));
    }
    params.insert("PROJECT_GROUPS".into(), groups);
    request
}
