//! ---
//! prov_section: "01-core-functionality"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Provisioning orchestrator crate root."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
//! Provisioning of developer-platform projects across an issue tracker, a
//! wiki, a source-repo host and a build system, with compensation of
//! partially created resources.

pub mod adapters;
mod context;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod locks;
pub mod orchestrator;
pub mod quickstarter;
pub mod request;

pub use adapters::{
    Adapters, Blueprint, BuildRequest, BuildTrigger, ComponentSpec, IssueTracker, LinkedServer,
    PermissionScheme, PermissionSchemeSpec, RepoHostProject, RepoHostProjectSpec, Repository,
    RepositorySpec, SourceRepoHost, TrackerComponent, TrackerProject, TrackerProjectSpec, Wiki,
    WikiSpace, WikiSpaceSpec,
};
pub use error::{AdapterError, AdapterResult, Operation, ProvisionError, Result, RunFailure, StepError};
pub use jobs::{camel_case, JobPathBuilder, ProjectAction};
pub use ledger::{
    Capability, CleanupOutcome, CompensationEntry, CompensationFailure, CompensationReport, Ledger,
    ResourceKind,
};
pub use locks::ProjectLocks;
pub use orchestrator::{DeletionReport, ProvisioningOrchestrator, AUXILIARY_REPOSITORIES};
pub use quickstarter::QuickstarterManager;
pub use request::{normalise_key, CreateProjectRequest, UpdateProjectRequest};
