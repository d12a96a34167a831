//! ---
//! prov_section: "01-core-functionality"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Capability traits for the external systems a project spans."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
//! Each external system is reached through one narrow async trait. Create
//! calls return a handle the orchestrator can later pass to the matching
//! delete, so every created resource can be compensated.
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use prov_common::model::ExecutionJob;
use serde::{Deserialize, Serialize};

use crate::error::AdapterResult;

/// Input for a new issue-tracker project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerProjectSpec {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub lead: Option<String>,
}

/// Issue-tracker project created for a provisioned project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerProject {
    pub key: String,
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSchemeSpec {
    pub project_key: String,
    pub admin_group: String,
    pub user_group: String,
    pub readonly_group: Option<String>,
}

/// Permission scheme associated with a tracker project. `created` is false
/// when an existing scheme was reused; only created schemes are rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionScheme {
    pub id: String,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    pub project_key: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerComponent {
    pub id: String,
    pub name: String,
}

/// Space template offered by the wiki.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    pub key: String,
    pub name: String,
}

/// Issue-tracker server the wiki is linked to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedServer {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WikiSpaceSpec {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub blueprint_key: String,
    pub tracker_server_id: Option<String>,
    pub tracker_project_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiSpace {
    pub key: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoHostProjectSpec {
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub admin_group: String,
    pub user_group: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoHostProject {
    pub key: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySpec {
    pub project_key: String,
    pub name: String,
    pub admin_group: String,
    pub user_group: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub url: Option<String>,
}

/// Parameters sent along with a job trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub project_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
    pub parameters: IndexMap<String, String>,
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn create_project(&self, spec: &TrackerProjectSpec) -> AdapterResult<TrackerProject>;
    async fn delete_project(&self, project_key: &str) -> AdapterResult<()>;
    /// Find or create a scheme for the groups and associate it with the project.
    async fn get_or_create_permission_scheme(
        &self,
        spec: &PermissionSchemeSpec,
    ) -> AdapterResult<PermissionScheme>;
    async fn delete_permission_scheme(&self, scheme_id: &str) -> AdapterResult<()>;
    async fn create_component(&self, spec: &ComponentSpec) -> AdapterResult<TrackerComponent>;
    async fn delete_component(&self, component_id: &str) -> AdapterResult<()>;
}

#[async_trait]
pub trait Wiki: Send + Sync {
    async fn list_blueprints(&self) -> AdapterResult<Vec<Blueprint>>;
    async fn list_linked_tracker_servers(&self) -> AdapterResult<Vec<LinkedServer>>;
    async fn create_space(&self, spec: &WikiSpaceSpec) -> AdapterResult<WikiSpace>;
    async fn delete_space(&self, space_key: &str) -> AdapterResult<()>;
}

#[async_trait]
pub trait SourceRepoHost: Send + Sync {
    async fn create_project(&self, spec: &RepoHostProjectSpec) -> AdapterResult<RepoHostProject>;
    async fn delete_project(&self, project_key: &str) -> AdapterResult<()>;
    async fn create_repository(&self, spec: &RepositorySpec) -> AdapterResult<Repository>;
    async fn delete_repository(&self, project_key: &str, name: &str) -> AdapterResult<()>;
}

#[async_trait]
pub trait BuildTrigger: Send + Sync {
    /// Start the job at `job_path`; the returned job is recorded on the project.
    async fn trigger(&self, job_path: &str, request: &BuildRequest) -> AdapterResult<ExecutionJob>;
}

/// The adapter set an orchestrator runs against.
#[derive(Clone)]
pub struct Adapters {
    pub issue_tracker: Arc<dyn IssueTracker>,
    pub wiki: Arc<dyn Wiki>,
    pub repo_host: Arc<dyn SourceRepoHost>,
    pub build_trigger: Arc<dyn BuildTrigger>,
}

impl Adapters {
    /// Wire one value implementing every capability, as test backends do.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: IssueTracker + Wiki + SourceRepoHost + BuildTrigger + 'static,
    {
        Self {
            issue_tracker: backend.clone(),
            wiki: backend.clone(),
            repo_host: backend.clone(),
            build_trigger: backend,
        }
    }
}

impl std::fmt::Debug for Adapters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapters").finish_non_exhaustive()
    }
}
