//! ---
//! prov_section: "01-core-functionality"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Failure taxonomy for provisioning runs."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
use std::fmt;

use prov_persistence::PersistenceError;

use crate::ledger::CleanupOutcome;

/// Failure reported by an external-system adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// The call never produced a usable answer (connection, timeout, 5xx).
    #[error("{0}")]
    Transport(String),
    /// The external system understood and refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),
}

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Why a step of a provisioning run failed.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("failed to persist project record: {0}")]
    Storage(#[from] PersistenceError),
}

/// Kind of run that was aborted; only affects the surfaced message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
        }
    }

    fn gerund(&self) -> &'static str {
        match self {
            Operation::Create => "creating",
            Operation::Update => "updating",
        }
    }
}

/// Aborted run: the failing step's cause plus what happened to the
/// resources created before it.
#[derive(Debug)]
pub struct RunFailure {
    pub operation: Operation,
    pub project_key: String,
    pub cause: StepError,
    pub cleanup: CleanupOutcome,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "An error occured while {} project [{}], reason [{}]",
            self.operation.gerund(),
            self.project_key,
            self.cause
        )?;
        match &self.cleanup {
            CleanupOutcome::Complete { .. } => write!(f, " - but all cleaned up!"),
            CleanupOutcome::Partial { remaining, .. } => write!(
                f,
                " - cleanup incomplete, remaining resources: [{}]",
                remaining.join(", ")
            ),
            CleanupOutcome::NotAllowed { remaining } if remaining.is_empty() => {
                write!(f, " - not cleaned up (cleanup disabled)")
            }
            CleanupOutcome::NotAllowed { remaining } => write!(
                f,
                " - not cleaned up (cleanup disabled), remaining resources: [{}]",
                remaining
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

impl RunFailure {
    /// Classify the failure into the public taxonomy.
    pub fn into_error(self) -> ProvisionError {
        match (&self.cleanup, &self.cause) {
            (CleanupOutcome::NotAllowed { .. }, _) => ProvisionError::ConfigurationDenied(self),
            (CleanupOutcome::Partial { .. }, _) => ProvisionError::Cleanup(self),
            (_, StepError::Adapter(AdapterError::Rejected(_))) => {
                ProvisionError::DomainRejection(self)
            }
            _ => ProvisionError::Transport(self),
        }
    }
}

/// Errors surfaced by the orchestrator and the quickstarter manager.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// A step failed on the wire (or in the store); every created resource was removed.
    #[error("{0}")]
    Transport(RunFailure),
    /// An external system refused a step; every created resource was removed.
    #[error("{0}")]
    DomainRejection(RunFailure),
    /// At least one compensating delete failed.
    #[error("{0}")]
    Cleanup(RunFailure),
    /// Cleanup is disabled, nothing was rolled back.
    #[error("{0}")]
    ConfigurationDenied(RunFailure),
    #[error("project [{0}] not found")]
    NotFound(String),
    #[error("[{0}] already exists")]
    AlreadyExists(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("project store failure: {0}")]
    Storage(#[from] PersistenceError),
}

impl ProvisionError {
    /// The run failure behind this error, for aborted create/update runs.
    pub fn run_failure(&self) -> Option<&RunFailure> {
        match self {
            ProvisionError::Transport(failure)
            | ProvisionError::DomainRejection(failure)
            | ProvisionError::Cleanup(failure)
            | ProvisionError::ConfigurationDenied(failure) => Some(failure),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
