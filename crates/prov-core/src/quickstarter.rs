//! ---
//! prov_section: "01-core-functionality"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Adds quickstarter components to existing projects."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
use std::sync::Arc;

use prov_common::logging::run_span;
use prov_common::model::{ProjectRecord, QuickstarterDescriptor, RepositoryRecord};
use tracing::{info, Instrument};

use crate::adapters::{BuildRequest, ComponentSpec, RepositorySpec};
use crate::context::RunContext;
use crate::error::{AdapterError, Operation, ProvisionError, Result, StepError};
use crate::ledger::{CompensationEntry, Ledger};
use crate::request::{normalise_key, validate_descriptor};

/// Provisions quickstarter components: one repository, one tracker
/// component and one build job each.
#[derive(Clone)]
pub struct QuickstarterManager {
    ctx: Arc<RunContext>,
}

impl QuickstarterManager {
    pub(crate) fn new(ctx: Arc<RunContext>) -> Self {
        Self { ctx }
    }

    /// Add one quickstarter to an existing project and persist the result.
    pub async fn add_quickstarter(
        &self,
        project_key: &str,
        descriptor: QuickstarterDescriptor,
    ) -> Result<ProjectRecord> {
        self.add(project_key, descriptor)
            .instrument(run_span(Operation::Update.as_str(), project_key))
            .await
    }

    async fn add(&self, project_key: &str, descriptor: QuickstarterDescriptor) -> Result<ProjectRecord> {
        let key = normalise_key(project_key)?;
        validate_descriptor(&descriptor)?;
        let _guard = self.ctx.locks.acquire(&key).await;
        let record = self
            .ctx
            .store
            .get(&key)?
            .ok_or_else(|| ProvisionError::NotFound(key.clone()))?;
        if record.has_quickstarter(&descriptor.component_id) {
            return Err(ProvisionError::AlreadyExists(format!(
                "{key}/{}",
                descriptor.component_id
            )));
        }
        let record = self.add_locked(record, &descriptor).await?;
        self.ctx.record_run(Operation::Update.as_str(), "success");
        Ok(record)
    }

    /// Caller holds the project lock.
    pub(crate) async fn add_locked(
        &self,
        mut record: ProjectRecord,
        descriptor: &QuickstarterDescriptor,
    ) -> Result<ProjectRecord> {
        let mut ledger = Ledger::new();
        let outcome = match self.provision(&mut record, descriptor, &mut ledger).await {
            Ok(()) => self.ctx.store.put(&record).map_err(StepError::from),
            Err(cause) => Err(cause),
        };
        match outcome {
            Ok(()) => {
                info!(
                    project_key = %record.project_key,
                    component_id = %descriptor.component_id,
                    "quickstarter provisioned"
                );
                Ok(record)
            }
            Err(cause) => Err(self
                .ctx
                .abort(Operation::Update, &record.project_key, cause, ledger)
                .await),
        }
    }

    /// Run the quickstarter steps against `record`, recording created
    /// resources in `ledger`. The record is only touched once every step passed.
    pub(crate) async fn provision(
        &self,
        record: &mut ProjectRecord,
        descriptor: &QuickstarterDescriptor,
        ledger: &mut Ledger,
    ) -> std::result::Result<(), StepError> {
        let key = record.project_key.clone();
        let repo_name = format!("{}-{}", record.lowercase_key(), descriptor.component_id);
        if record.repositories.contains_key(&repo_name) {
            return Err(AdapterError::Rejected(format!("repository {repo_name} already exists")).into());
        }
        let groups = &self.ctx.config.default_groups;
        let admin_group = record
            .project_admin_group
            .clone()
            .unwrap_or_else(|| groups.admin_group.clone());
        let user_group = record
            .project_user_group
            .clone()
            .unwrap_or_else(|| groups.user_group.clone());

        info!(project_key = %key, component_id = %descriptor.component_id, step = "repository", "creating quickstarter repository");
        let repository = self
            .ctx
            .adapters
            .repo_host
            .create_repository(&RepositorySpec {
                project_key: key.clone(),
                name: repo_name,
                admin_group: admin_group.clone(),
                user_group: user_group.clone(),
            })
            .await?;
        ledger.record(CompensationEntry::repository(&key, &repository.name));

        if record.bugtracker_space {
            info!(project_key = %key, component_id = %descriptor.component_id, step = "tracker_component", "creating tracker component");
            let component = self
                .ctx
                .adapters
                .issue_tracker
                .create_component(&ComponentSpec {
                    project_key: key.clone(),
                    name: descriptor.component_id.clone(),
                    description: Some(format!(
                        "Technology component {} stored at {}",
                        descriptor.component_type,
                        repository.url.as_deref().unwrap_or(repository.name.as_str())
                    )),
                })
                .await?;
            ledger.record(CompensationEntry::tracker_component(&component.id));
        }

        info!(project_key = %key, component_id = %descriptor.component_id, step = "quickstarter_job", "triggering quickstarter job");
        let job_path = self.ctx.jobs.quickstarter_job(&key, descriptor);
        let mut request = BuildRequest {
            project_key: key.clone(),
            component_id: Some(descriptor.component_id.clone()),
            ..BuildRequest::default()
        };
        request
            .parameters
            .insert("PROJECT_ID".into(), record.lowercase_key());
        request
            .parameters
            .insert("COMPONENT_ID".into(), descriptor.component_id.clone());
        request
            .parameters
            .insert("COMPONENT_TYPE".into(), descriptor.component_type.clone());
        if let Some(url) = &repository.url {
            request.parameters.insert("GIT_URL_HTTP".into(), url.clone());
        }
        let job = self
            .ctx
            .adapters
            .build_trigger
            .trigger(&job_path, &request)
            .await?;

        record.add_repository(RepositoryRecord {
            name: repository.name,
            url: repository.url,
            admin_group: Some(admin_group),
            user_group: Some(user_group),
            project_key: Some(key),
        });
        let mut descriptor = descriptor.clone();
        if descriptor.component_description.is_none() {
            descriptor.component_description = self.ctx.jobs.description(&descriptor.component_type);
        }
        record.quickstarters.push(descriptor);
        record.last_execution_jobs.push(job);
        Ok(())
    }
}
