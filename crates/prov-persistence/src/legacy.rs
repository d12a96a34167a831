//! ---
//! prov_section: "03-persistence-logging"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Persistence abstractions and storage bindings."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
use indexmap::IndexMap;
use prov_common::model::{
    ExecutionJob, ProjectRecord, QuickstarterDescriptor, RepositoryRecord, CURRENT_SCHEMA_VERSION,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{PersistenceError, Result};

const CURRENT_KEY_FIELD: &str = "projectKey";
const LEGACY_KEY_FIELD: &str = "key";

fn default_true() -> bool {
    true
}

/// Record shape written before project keys, flags and jobs were renamed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyProjectRecord {
    /// Project key.
    pub key: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Quickstarters as loose attribute maps.
    #[serde(default)]
    pub quickstart: Vec<IndexMap<String, Value>>,
    /// Repositories keyed by name.
    #[serde(default)]
    pub repositories: IndexMap<String, LegacyRepository>,
    /// Job URLs of triggered builds.
    #[serde(default)]
    pub last_jobs: Vec<String>,
    /// Whether a dedicated permission scheme was requested.
    #[serde(default)]
    pub createpermissionset: bool,
    /// Whether tracker project and wiki space exist.
    #[serde(default = "default_true")]
    pub jiraconfluencespace: bool,
    /// Whether the platform runtime was provisioned.
    #[serde(default = "default_true")]
    pub openshiftproject: bool,
    /// Administrating user.
    #[serde(default)]
    pub admin: Option<String>,
    /// Administrator group.
    #[serde(default)]
    pub admin_group: Option<String>,
    /// User group.
    #[serde(default)]
    pub user_group: Option<String>,
    /// Read-only group.
    #[serde(default)]
    pub readonly_group: Option<String>,
    /// Tracker project URL.
    #[serde(default)]
    pub jira_url: Option<String>,
    /// Wiki space URL.
    #[serde(default)]
    pub confluence_url: Option<String>,
    /// Repo-host project URL.
    #[serde(default)]
    pub bitbucket_url: Option<String>,
}

/// Repository entry in the legacy shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRepository {
    /// Repository name; falls back to the map key.
    #[serde(default)]
    pub name: Option<String>,
    /// Clone or browse URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Administrator group.
    #[serde(default)]
    pub admin_group: Option<String>,
    /// User group.
    #[serde(default)]
    pub user_group: Option<String>,
}

impl LegacyProjectRecord {
    /// Rebuild a current-shape record from the legacy fields.
    pub fn into_record(self) -> ProjectRecord {
        let mut record = ProjectRecord::new(self.key.clone(), self.name.unwrap_or_default());
        record.description = self.description;
        record.special_permission_set = self.createpermissionset;
        record.bugtracker_space = self.jiraconfluencespace;
        record.platform_runtime = self.openshiftproject;
        record.project_admin_user = self.admin;
        record.project_admin_group = self.admin_group;
        record.project_user_group = self.user_group;
        record.project_readonly_group = self.readonly_group;
        record.bugtracker_url = self.jira_url;
        record.collaboration_space_url = self.confluence_url;
        record.scmvcs_url = self.bitbucket_url;

        for (id, repo) in self.repositories {
            let name = repo.name.unwrap_or(id);
            let added = record.add_repository(RepositoryRecord {
                name: name.clone(),
                url: repo.url,
                admin_group: repo.admin_group,
                user_group: repo.user_group,
                project_key: Some(self.key.clone()),
            });
            if !added {
                warn!(project_key = %self.key, repository = %name, "dropping duplicate legacy repository");
            }
        }

        record.quickstarters = self
            .quickstart
            .into_iter()
            .filter_map(|attrs| descriptor_from_attributes(&self.key, attrs))
            .collect();

        record.last_execution_jobs = self.last_jobs.iter().map(|url| job_from_url(url)).collect();
        record
    }
}

fn descriptor_from_attributes(
    project_key: &str,
    mut attrs: IndexMap<String, Value>,
) -> Option<QuickstarterDescriptor> {
    let component_type = take(&mut attrs, "component_type");
    let component_id = take(&mut attrs, "component_id");
    let component_description = take(&mut attrs, "component_description");
    match (component_type, component_id) {
        (Some(component_type), Some(component_id)) => Some(QuickstarterDescriptor {
            component_type,
            component_id,
            component_description,
            extra: attrs,
        }),
        _ => {
            warn!(project_key, "dropping legacy quickstarter without type or id");
            None
        }
    }
}

fn take(attrs: &mut IndexMap<String, Value>, field: &str) -> Option<String> {
    match attrs.shift_remove(field) {
        Some(Value::String(value)) => Some(value),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

/// Legacy jobs were stored as bare URLs such as
/// `https://jenkins/job/testp-cd/job/testp-cd-build/3`.
fn job_from_url(url: &str) -> ExecutionJob {
    let segments: Vec<&str> = url
        .trim_end_matches('/')
        .rsplit('/')
        .filter(|segment| !segment.is_empty())
        .take(2)
        .collect();
    let (name, build_number) = match segments.as_slice() {
        [last, previous, ..] => match last.parse::<u64>() {
            Ok(number) => ((*previous).to_owned(), Some(number)),
            Err(_) => ((*last).to_owned(), None),
        },
        [last] => ((*last).to_owned(), None),
        [] => (url.to_owned(), None),
    };
    ExecutionJob {
        name,
        url: url.to_owned(),
        build_number,
    }
}

/// Outcome of interpreting a stored JSON document.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    /// Record in the current shape.
    pub record: ProjectRecord,
    /// True when the document was legacy and must be written back.
    pub upgraded: bool,
}

/// Decode a stored document, upgrading it when it carries the legacy shape.
///
/// Detection is structural: a document with `projectKey` is current, one with
/// only `key` is legacy. A legacy key is uppercased and must match
/// `storage_id`. Records tagged with a newer schema are still read.
pub fn decode_record(storage_id: &str, raw: Value) -> Result<DecodedRecord> {
    let Some(object) = raw.as_object() else {
        return Err(PersistenceError::UnrecognisedShape(storage_id.to_owned()));
    };
    if object.contains_key(CURRENT_KEY_FIELD) {
        let record: ProjectRecord = serde_json::from_value(raw)?;
        if record
            .schema_version
            .is_some_and(|version| version > CURRENT_SCHEMA_VERSION)
        {
            warn!(project_key = %record.project_key, schema_version = ?record.schema_version, "record written by a newer release");
        }
        return Ok(DecodedRecord {
            record,
            upgraded: false,
        });
    }
    if object.contains_key(LEGACY_KEY_FIELD) {
        let mut legacy: LegacyProjectRecord = serde_json::from_value(raw)?;
        // Older releases stored the key as typed.
        let normalised = legacy.key.trim().to_ascii_uppercase();
        if normalised != storage_id {
            warn!(storage_id, legacy_key = %legacy.key, "legacy key does not match its storage id");
            return Err(PersistenceError::UnrecognisedShape(storage_id.to_owned()));
        }
        legacy.key = normalised;
        debug!(project_key = %legacy.key, "upgrading legacy project record");
        return Ok(DecodedRecord {
            record: legacy.into_record(),
            upgraded: true,
        });
    }
    Err(PersistenceError::UnrecognisedShape(storage_id.to_owned()))
}
