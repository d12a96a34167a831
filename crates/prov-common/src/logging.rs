//! ---
//! prov_section: "01-core-functionality"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Shared primitives and utilities for the provisioning runtime."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, Span};
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "PROV_LOG";

/// Saga steps and store writes at debug, everything else (HTTP, runtime) at info.
pub const DEFAULT_FILTER: &str = "info,prov_core=debug,prov_persistence=debug,provd=debug";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Available log formats for the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Initialize the tracing subscriber based on configuration and environment variables.
///
/// * `PROV_LOG` overrides the log filter (e.g. `info`, `debug,prov_core=trace`).
///   When unset `RUST_LOG` is honoured, then `logging.filter`, finally
///   [`DEFAULT_FILTER`].
/// * Stdout receives either structured JSON or pretty output; a rolling daily
///   JSON file is always written next to it.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)?;
    let prefix = config
        .file_prefix
        .clone()
        .unwrap_or_else(|| service_name.to_owned());

    let file_appender = daily(
        &config.directory,
        format!("{}-{}.log", prefix, service_name),
    );
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);

    let directive = filter_directive(
        std::env::var(LOG_ENV).ok(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        config.filter.as_deref(),
    );
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("invalid log filter {directive:?} ({err}); using {DEFAULT_FILTER}");
        EnvFilter::new(DEFAULT_FILTER)
    });

    let fmt_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };

    let file_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer)
        .boxed();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(service = %service_name, log_dir = %config.directory.display(), format = ?config.format, filter = %directive, "tracing initialised");
    Ok(())
}

/// Pick the first non-empty directive: `PROV_LOG`, `RUST_LOG`, configured, default.
pub fn filter_directive(
    prov_log: Option<String>,
    rust_log: Option<String>,
    configured: Option<&str>,
) -> String {
    [prov_log, rust_log, configured.map(str::to_owned)]
        .into_iter()
        .flatten()
        .map(|directive| directive.trim().to_owned())
        .find(|directive| !directive.is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_owned())
}

/// Span wrapping one provisioning run; every step event inherits its fields.
pub fn run_span(operation: &'static str, project_key: &str) -> Span {
    info_span!("provisioning_run", operation, project_key = %project_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_win_over_configured_filter() {
        assert_eq!(
            filter_directive(Some("trace".into()), Some("warn".into()), Some("info")),
            "trace"
        );
        assert_eq!(filter_directive(None, Some("warn".into()), Some("info")), "warn");
        assert_eq!(filter_directive(None, None, Some(" info ")), "info");
    }

    #[test]
    fn blank_directives_fall_through_to_default() {
        assert_eq!(filter_directive(Some("  ".into()), None, Some("")), DEFAULT_FILTER);
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
