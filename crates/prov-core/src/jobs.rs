//! ---
//! prov_section: "01-core-functionality"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Build job path construction for project and quickstarter jobs."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
use indexmap::IndexMap;
use prov_common::config::{BuildTriggerConfig, ProvisioningConfig, QuickstarterTemplate};
use prov_common::model::QuickstarterDescriptor;

/// Whole-project job flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectAction {
    Create,
    Delete,
}

impl ProjectAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectAction::Create => "create",
            ProjectAction::Delete => "delete",
        }
    }
}

/// Resolves job paths from the build-trigger config and the quickstarter catalog.
#[derive(Debug, Clone)]
pub struct JobPathBuilder {
    trigger: BuildTriggerConfig,
    catalog: IndexMap<String, QuickstarterTemplate>,
}

impl JobPathBuilder {
    pub fn from_config(config: &ProvisioningConfig) -> Self {
        Self {
            trigger: config.build_trigger.clone(),
            catalog: config.quickstarters.clone(),
        }
    }

    fn path(&self, project: &str, jenkinsfile: &str, component: &str) -> String {
        format!(
            "{}/build?trigger_secret={}&jenkinsfile_path={}&component={}",
            self.trigger.base_url(project),
            self.trigger.trigger_secret,
            jenkinsfile,
            component
        )
    }

    /// Job creating or tearing down a whole project, run in the provisioning project.
    pub fn project_job(&self, action: ProjectAction, project_key: &str) -> String {
        let action = action.as_str();
        self.path(
            &self.trigger.provisioning_project,
            &format!("{action}-projects/Jenkinsfile"),
            &format!(
                "ods-corejob-{action}-projects-{}",
                project_key.to_lowercase()
            ),
        )
    }

    /// Job rendering a quickstarter into its repository, run in the project itself.
    pub fn quickstarter_job(&self, project_key: &str, descriptor: &QuickstarterDescriptor) -> String {
        self.path(
            &project_key.to_lowercase(),
            &format!("{}/Jenkinsfile", descriptor.component_type),
            &format!(
                "ods-quickstarter-{}-{}",
                self.job_name(&descriptor.component_type),
                descriptor.component_id
            ),
        )
    }

    pub fn job_name(&self, component_type: &str) -> String {
        self.catalog
            .get(component_type)
            .and_then(|template| template.job_name.clone())
            .unwrap_or_else(|| camel_case(component_type))
    }

    /// Catalog description for a component type, if configured.
    pub fn description(&self, component_type: &str) -> Option<String> {
        self.catalog
            .get(component_type)
            .and_then(|template| template.description.clone())
    }
}

/// `be-python-flask` -> `bePythonFlask`.
pub fn camel_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut upper_next = false;
    for ch in input.chars() {
        if ch == '-' || ch == '_' {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}
