//! ---
//! prov_section: "01-core-functionality"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Shared primitives and utilities for the provisioning runtime."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
//! Shared primitives for the provisioning workspace: the project data model,
//! configuration loading and tracing setup.

pub mod config;
pub mod logging;
pub mod model;

pub use config::{
    ApiConfig, AppConfig, BuildTriggerConfig, GroupsConfig, LoggingConfig, MetricsConfig, Mode,
    ProvisioningConfig, QuickstarterTemplate, StorageConfig,
};
pub use logging::{init_tracing, run_span, LogFormat};
pub use model::{
    ExecutionJob, ProjectRecord, QuickstarterDescriptor, RepositoryRecord, CURRENT_SCHEMA_VERSION,
};
