//! ---
//! prov_section: "01-core-functionality"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Project records and the resources they own."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema version stamped on every record written by the store.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Persisted view of a provisioned project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub project_key: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub repositories: IndexMap<String, RepositoryRecord>,
    #[serde(default)]
    pub quickstarters: Vec<QuickstarterDescriptor>,
    #[serde(default)]
    pub last_execution_jobs: Vec<ExecutionJob>,
    #[serde(default)]
    pub special_permission_set: bool,
    #[serde(default = "default_true")]
    pub bugtracker_space: bool,
    #[serde(default = "default_true")]
    pub platform_runtime: bool,
    #[serde(default)]
    pub project_admin_user: Option<String>,
    #[serde(default)]
    pub project_admin_group: Option<String>,
    #[serde(default)]
    pub project_user_group: Option<String>,
    #[serde(default)]
    pub project_readonly_group: Option<String>,
    #[serde(default)]
    pub permission_scheme_id: Option<String>,
    #[serde(default)]
    pub bugtracker_url: Option<String>,
    #[serde(default)]
    pub collaboration_space_url: Option<String>,
    #[serde(default)]
    pub scmvcs_url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ProjectRecord {
    /// Empty record for `project_key` with the default feature flags.
    pub fn new(project_key: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self {
            schema_version: Some(CURRENT_SCHEMA_VERSION),
            project_key: project_key.into(),
            project_name: project_name.into(),
            description: None,
            repositories: IndexMap::new(),
            quickstarters: Vec::new(),
            last_execution_jobs: Vec::new(),
            special_permission_set: false,
            bugtracker_space: true,
            platform_runtime: true,
            project_admin_user: None,
            project_admin_group: None,
            project_user_group: None,
            project_readonly_group: None,
            permission_scheme_id: None,
            bugtracker_url: None,
            collaboration_space_url: None,
            scmvcs_url: None,
        }
    }

    /// Register a repository, keyed by its name. Returns false if the id is taken.
    pub fn add_repository(&mut self, repository: RepositoryRecord) -> bool {
        if self.repositories.contains_key(&repository.name) {
            return false;
        }
        self.repositories
            .insert(repository.name.clone(), repository);
        true
    }

    pub fn has_quickstarter(&self, component_id: &str) -> bool {
        self.quickstarters
            .iter()
            .any(|qs| qs.component_id == component_id)
    }

    pub fn lowercase_key(&self) -> String {
        self.project_key.to_lowercase()
    }
}

/// Repository hosted in the source-repo system. `project_key` is a plain
/// back-reference; deleting the repository never touches the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRecord {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub admin_group: Option<String>,
    #[serde(default)]
    pub user_group: Option<String>,
    #[serde(default)]
    pub project_key: Option<String>,
}

/// Templated component requested for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickstarterDescriptor {
    pub component_type: String,
    pub component_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_description: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl QuickstarterDescriptor {
    pub fn new(component_type: impl Into<String>, component_id: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            component_id: component_id.into(),
            component_description: None,
            extra: IndexMap::new(),
        }
    }
}

/// Build job started on behalf of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionJob {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub build_number: Option<u64>,
}
