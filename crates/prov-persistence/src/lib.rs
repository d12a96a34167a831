//! ---
//! prov_section: "03-persistence-logging"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Persistence abstractions and storage bindings."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Project store: one record per project key, with structural detection and
//! upgrade of records written by older releases.

/// Result alias used throughout the persistence crate.
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Error type for the persistence subsystem.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Wrapper for IO errors encountered while reading/writing record files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// The key cannot be used as a storage identifier.
    #[error("invalid project key '{0}'")]
    InvalidKey(String),
    /// Stored data matches neither the current nor the legacy record shape.
    #[error("record for '{0}' has an unrecognised shape")]
    UnrecognisedShape(String),
}

pub mod legacy;
pub mod store;

pub use legacy::{decode_record, DecodedRecord, LegacyProjectRecord};
pub use store::{FileProjectStore, InMemoryProjectStore, ProjectStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_key() {
        let err = PersistenceError::InvalidKey("../etc".into());
        assert_eq!(format!("{err}"), "invalid project key '../etc'");
        let err = PersistenceError::UnrecognisedShape("ABC".into());
        assert_eq!(format!("{err}"), "record for 'ABC' has an unrecognised shape");
    }
}
