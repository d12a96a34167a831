//! ---
//! prov_section: "01-core-functionality"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Shared primitives and utilities for the provisioning runtime."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::logging::LogFormat;

fn default_mode() -> Mode {
    Mode::Production
}

fn default_cleanup_allowed() -> bool {
    true
}

fn default_host_pattern() -> String {
    "https://webhook-proxy-{project}-cd.{domain}".to_owned()
}

fn default_domain() -> String {
    "192.168.56.101.nip.io".to_owned()
}

fn default_provisioning_project() -> String {
    "prov".to_owned()
}

fn default_blueprint_key() -> String {
    "com.atlassian.confluence.plugins.confluence-space-blueprints:documentation-space-blueprint"
        .to_owned()
}

fn default_user_group() -> String {
    "opendevstack-users".to_owned()
}

fn default_admin_group() -> String {
    "opendevstack-administrators".to_owned()
}

fn default_storage_directory() -> PathBuf {
    PathBuf::from("target/projects")
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    "0.0.0.0:9898"
        .parse()
        .expect("valid default metrics address")
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("valid default api address")
}

/// Primary configuration object for the provisioning daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "PROV_CONFIG";

    /// Load configuration from disk, respecting the `PROV_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.provisioning.validate()?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            provisioning: ProvisioningConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Which adapter set the daemon wires.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Production,
    Simulation,
}

impl Mode {
    pub fn is_simulation(&self) -> bool {
        matches!(self, Mode::Simulation)
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Mode::Production),
            "simulation" => Ok(Mode::Simulation),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Orchestrator behaviour. Passed by value into the orchestrator so that
/// concurrently running instances never share the toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Roll back created resources when a run fails.
    #[serde(default = "default_cleanup_allowed")]
    pub cleanup_allowed: bool,
    #[serde(default)]
    pub build_trigger: BuildTriggerConfig,
    #[serde(default = "default_blueprint_key")]
    pub wiki_blueprint_key: String,
    #[serde(default)]
    pub default_groups: GroupsConfig,
    #[serde(default)]
    pub quickstarters: IndexMap<String, QuickstarterTemplate>,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            cleanup_allowed: default_cleanup_allowed(),
            build_trigger: BuildTriggerConfig::default(),
            wiki_blueprint_key: default_blueprint_key(),
            default_groups: GroupsConfig::default(),
            quickstarters: IndexMap::new(),
        }
    }
}

impl ProvisioningConfig {
    pub fn validate(&self) -> Result<()> {
        self.build_trigger.validate()?;
        if self.wiki_blueprint_key.trim().is_empty() {
            return Err(anyhow!("provisioning.wiki_blueprint_key must not be empty"));
        }
        Ok(())
    }

    pub fn quickstarter(&self, component_type: &str) -> Option<&QuickstarterTemplate> {
        self.quickstarters.get(component_type)
    }
}

/// Where build jobs are sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildTriggerConfig {
    /// Base URL pattern; `{project}` and `{domain}` are substituted.
    #[serde(default = "default_host_pattern")]
    pub host_pattern: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Project segment used for whole-project jobs.
    #[serde(default = "default_provisioning_project")]
    pub provisioning_project: String,
    #[serde(default)]
    pub trigger_secret: String,
}

impl Default for BuildTriggerConfig {
    fn default() -> Self {
        Self {
            host_pattern: default_host_pattern(),
            domain: default_domain(),
            provisioning_project: default_provisioning_project(),
            trigger_secret: String::new(),
        }
    }
}

impl BuildTriggerConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.host_pattern.contains("{project}") {
            return Err(anyhow!(
                "build_trigger.host_pattern '{}' must contain a {{project}} placeholder",
                self.host_pattern
            ));
        }
        Ok(())
    }

    /// Resolve the proxy base URL for the given project segment.
    pub fn base_url(&self, project: &str) -> String {
        self.host_pattern
            .replace("{project}", project)
            .replace("{domain}", &self.domain)
            .trim_end_matches('/')
            .to_owned()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupsConfig {
    #[serde(default = "default_user_group")]
    pub user_group: String,
    #[serde(default = "default_admin_group")]
    pub admin_group: String,
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            user_group: default_user_group(),
            admin_group: default_admin_group(),
        }
    }
}

/// Catalog entry for a quickstarter template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuickstarterTemplate {
    #[serde(default)]
    pub description: Option<String>,
    /// Job identifier used in the component name; camel-cased type when unset.
    #[serde(default)]
    pub job_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_directory")]
    pub directory: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: default_storage_directory(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Filter directive used when neither `PROV_LOG` nor `RUST_LOG` is set.
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
        }
    }
}
