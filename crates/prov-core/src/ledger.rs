//! ---
//! prov_section: "01-core-functionality"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Compensation ledger recording created resources for rollback."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::adapters::Adapters;
use crate::error::AdapterError;

/// Resource types a run can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    TrackerProject,
    PermissionScheme,
    TrackerComponent,
    WikiSpace,
    RepoHostProject,
    Repository,
}

impl ResourceKind {
    /// Adapter able to delete a resource of this kind.
    pub fn capability(&self) -> Capability {
        match self {
            ResourceKind::TrackerProject
            | ResourceKind::PermissionScheme
            | ResourceKind::TrackerComponent => Capability::IssueTracker,
            ResourceKind::WikiSpace => Capability::Wiki,
            ResourceKind::RepoHostProject | ResourceKind::Repository => Capability::SourceRepoHost,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ResourceKind::TrackerProject => "tracker project",
            ResourceKind::PermissionScheme => "permission scheme",
            ResourceKind::TrackerComponent => "tracker component",
            ResourceKind::WikiSpace => "wiki space",
            ResourceKind::RepoHostProject => "repo-host project",
            ResourceKind::Repository => "repository",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    IssueTracker,
    Wiki,
    SourceRepoHost,
}

/// One created resource and the handle needed to delete it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationEntry {
    pub kind: ResourceKind,
    pub handle: String,
    /// Enclosing project for handles that are only unique within one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub capability: Capability,
}

impl CompensationEntry {
    fn new(kind: ResourceKind, handle: impl Into<String>, scope: Option<String>) -> Self {
        Self {
            kind,
            handle: handle.into(),
            scope,
            capability: kind.capability(),
        }
    }

    pub fn tracker_project(key: impl Into<String>) -> Self {
        Self::new(ResourceKind::TrackerProject, key, None)
    }

    pub fn permission_scheme(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::PermissionScheme, id, None)
    }

    pub fn tracker_component(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::TrackerComponent, id, None)
    }

    pub fn wiki_space(key: impl Into<String>) -> Self {
        Self::new(ResourceKind::WikiSpace, key, None)
    }

    pub fn repo_host_project(key: impl Into<String>) -> Self {
        Self::new(ResourceKind::RepoHostProject, key, None)
    }

    pub fn repository(project_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Repository, name, Some(project_key.into()))
    }

    async fn undo(&self, adapters: &Adapters) -> Result<(), AdapterError> {
        match self.kind {
            ResourceKind::TrackerProject => adapters.issue_tracker.delete_project(&self.handle).await,
            ResourceKind::PermissionScheme => {
                adapters
                    .issue_tracker
                    .delete_permission_scheme(&self.handle)
                    .await
            }
            ResourceKind::TrackerComponent => {
                adapters.issue_tracker.delete_component(&self.handle).await
            }
            ResourceKind::WikiSpace => adapters.wiki.delete_space(&self.handle).await,
            ResourceKind::RepoHostProject => adapters.repo_host.delete_project(&self.handle).await,
            ResourceKind::Repository => {
                let project_key = self.scope.as_deref().unwrap_or_default();
                adapters
                    .repo_host
                    .delete_repository(project_key, &self.handle)
                    .await
            }
        }
    }
}

impl fmt::Display for CompensationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{} {}/{}", self.kind.label(), scope, self.handle),
            None => write!(f, "{} {}", self.kind.label(), self.handle),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompensationFailure {
    pub entry: CompensationEntry,
    pub error: AdapterError,
}

impl fmt::Display for CompensationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.entry, self.error)
    }
}

/// Result of undoing a ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompensationReport {
    pub undone: Vec<CompensationEntry>,
    pub failed: Vec<CompensationFailure>,
}

impl CompensationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What happened to the resources of an aborted run.
#[derive(Debug, Clone, PartialEq)]
pub enum CleanupOutcome {
    Complete {
        undone: usize,
    },
    Partial {
        undone: usize,
        failures: Vec<CompensationFailure>,
        remaining: Vec<String>,
    },
    NotAllowed {
        remaining: Vec<CompensationEntry>,
    },
}

/// Append-only record of the resources created during one run.
///
/// On failure the entries are undone newest first. Every delete is attempted
/// even when an earlier one fails; failures are collected in the report.
#[derive(Debug, Default)]
pub struct Ledger {
    entries: Vec<CompensationEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: CompensationEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[CompensationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Undo every entry in reverse creation order.
    pub async fn compensate(self, adapters: &Adapters) -> CompensationReport {
        let mut report = CompensationReport::default();
        for entry in self.entries.into_iter().rev() {
            match entry.undo(adapters).await {
                Ok(()) => {
                    info!(resource = %entry, "compensated");
                    report.undone.push(entry);
                }
                Err(error) => {
                    warn!(resource = %entry, error = %error, "compensation failed");
                    report.failed.push(CompensationFailure { entry, error });
                }
            }
        }
        report
    }

    /// Drop the ledger without undoing anything, handing back what it held.
    pub fn discard(self) -> Vec<CompensationEntry> {
        self.entries
    }

    /// Compensate when cleanup is allowed, otherwise leave everything in place.
    pub async fn roll_back(self, adapters: &Adapters, cleanup_allowed: bool) -> CleanupOutcome {
        if !cleanup_allowed {
            let remaining = self.discard();
            warn!(resources = remaining.len(), "cleanup disabled, leaving created resources");
            return CleanupOutcome::NotAllowed { remaining };
        }
        let report = self.compensate(adapters).await;
        if report.is_complete() {
            CleanupOutcome::Complete {
                undone: report.undone.len(),
            }
        } else {
            let remaining = report.failed.iter().map(ToString::to_string).collect();
            CleanupOutcome::Partial {
                undone: report.undone.len(),
                failures: report.failed,
                remaining,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_render_with_scope() {
        assert_eq!(
            CompensationEntry::repository("TESTP", "testp-design").to_string(),
            "repository TESTP/testp-design"
        );
        assert_eq!(
            CompensationEntry::wiki_space("TESTP").to_string(),
            "wiki space TESTP"
        );
    }

    #[test]
    fn capability_follows_kind() {
        assert_eq!(
            CompensationEntry::tracker_component("10001").capability,
            Capability::IssueTracker
        );
        assert_eq!(
            CompensationEntry::repo_host_project("TESTP").capability,
            Capability::SourceRepoHost
        );
    }

    #[test]
    fn discard_keeps_creation_order() {
        let mut ledger = Ledger::new();
        ledger.record(CompensationEntry::tracker_project("A"));
        ledger.record(CompensationEntry::wiki_space("A"));
        assert_eq!(ledger.len(), 2);
        let left = ledger.discard();
        assert_eq!(left[0].kind, ResourceKind::TrackerProject);
        assert_eq!(left[1].kind, ResourceKind::WikiSpace);
    }
}
