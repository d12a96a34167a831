//! ---
//! prov_section: "01-core-functionality"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Inbound create and update requests."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
use prov_common::model::{ProjectRecord, QuickstarterDescriptor};
use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};

const MAX_KEY_LENGTH: usize = 32;

fn default_true() -> bool {
    true
}

/// Normalise a project key to its stored form: trimmed and uppercased.
pub fn normalise_key(raw: &str) -> Result<String> {
    let key = raw.trim().to_uppercase();
    if key.is_empty() {
        return Err(ProvisionError::InvalidRequest(
            "projectKey must not be empty".into(),
        ));
    }
    if key.len() > MAX_KEY_LENGTH || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ProvisionError::InvalidRequest(format!(
            "projectKey '{raw}' must be 1-{MAX_KEY_LENGTH} ASCII letters or digits"
        )));
    }
    Ok(key)
}

/// Body of a project creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub project_key: String,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
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
    pub quickstarters: Vec<QuickstarterDescriptor>,
}

impl CreateProjectRequest {
    pub fn new(project_key: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self {
            project_key: project_key.into(),
            project_name: Some(project_name.into()),
            description: None,
            special_permission_set: false,
            bugtracker_space: true,
            platform_runtime: true,
            project_admin_user: None,
            project_admin_group: None,
            project_user_group: None,
            project_readonly_group: None,
            quickstarters: Vec::new(),
        }
    }

    /// Check the request and build the initial record. Quickstarters are not
    /// copied; they are appended as each one is provisioned.
    pub fn to_record(&self) -> Result<ProjectRecord> {
        let key = normalise_key(&self.project_key)?;
        if self.special_permission_set
            && (self.project_admin_group.is_none() || self.project_user_group.is_none())
        {
            return Err(ProvisionError::InvalidRequest(
                "specialPermissionSet requires projectAdminGroup and projectUserGroup".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for descriptor in &self.quickstarters {
            validate_descriptor(descriptor)?;
            if !seen.insert(descriptor.component_id.as_str()) {
                return Err(ProvisionError::InvalidRequest(format!(
                    "component_id '{}' requested twice",
                    descriptor.component_id
                )));
            }
        }

        let name = self
            .project_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(key.as_str())
            .to_owned();
        let mut record = ProjectRecord::new(key, name);
        record.description = self.description.clone();
        record.special_permission_set = self.special_permission_set;
        record.bugtracker_space = self.bugtracker_space;
        record.platform_runtime = self.platform_runtime;
        record.project_admin_user = self.project_admin_user.clone();
        record.project_admin_group = self.project_admin_group.clone();
        record.project_user_group = self.project_user_group.clone();
        record.project_readonly_group = self.project_readonly_group.clone();
        Ok(record)
    }
}

/// Body of a project update: quickstarters to add.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    pub project_key: String,
    #[serde(default)]
    pub quickstarters: Vec<QuickstarterDescriptor>,
}

pub(crate) fn validate_descriptor(descriptor: &QuickstarterDescriptor) -> Result<()> {
    let valid_id = !descriptor.component_id.is_empty()
        && descriptor
            .component_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid_id {
        return Err(ProvisionError::InvalidRequest(format!(
            "component_id '{}' must be lowercase letters, digits or '-'",
            descriptor.component_id
        )));
    }
    if descriptor.component_type.trim().is_empty() {
        return Err(ProvisionError::InvalidRequest(format!(
            "component_type missing for '{}'",
            descriptor.component_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_uppercased() {
        assert_eq!(normalise_key(" testp ").unwrap(), "TESTP");
        assert!(normalise_key("").is_err());
        assert!(normalise_key("te-stp").is_err());
        assert!(normalise_key(&"A".repeat(33)).is_err());
    }

    #[test]
    fn request_defaults_follow_wire_format() {
        let request: CreateProjectRequest = serde_json::from_value(json!({
            "projectKey": "testp",
            "projectName": "Test project"
        }))
        .unwrap();
        assert!(request.bugtracker_space);
        assert!(request.platform_runtime);
        assert!(!request.special_permission_set);

        let record = request.to_record().unwrap();
        assert_eq!(record.project_key, "TESTP");
        assert_eq!(record.project_name, "Test project");
        assert!(record.quickstarters.is_empty());
    }

    #[test]
    fn blank_name_falls_back_to_key() {
        let mut request = CreateProjectRequest::new("abc", "  ");
        request.project_name = Some("  ".into());
        assert_eq!(request.to_record().unwrap().project_name, "ABC");
    }

    #[test]
    fn permission_set_needs_groups() {
        let mut request = CreateProjectRequest::new("ABC", "abc");
        request.special_permission_set = true;
        request.project_admin_group = Some("admins".into());
        assert!(matches!(
            request.to_record(),
            Err(ProvisionError::InvalidRequest(_))
        ));
    }

    #[test]
    fn duplicate_component_ids_are_rejected() {
        let mut request = CreateProjectRequest::new("ABC", "abc");
        request.quickstarters = vec![
            QuickstarterDescriptor::new("be-python-flask", "api"),
            QuickstarterDescriptor::new("fe-angular", "api"),
        ];
        assert!(request.to_record().is_err());
        request.quickstarters[1].component_id = "Bad_Id".into();
        assert!(request.to_record().is_err());
    }
}
