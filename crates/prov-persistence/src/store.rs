//! ---
//! prov_section: "03-persistence-logging"
//! prov_subsection: "module"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Persistence abstractions and storage bindings."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use prov_common::model::{ProjectRecord, CURRENT_SCHEMA_VERSION};
use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::legacy::decode_record;
use crate::{PersistenceError, Result};

const RECORD_EXTENSION: &str = "json";

/// Durable keyed storage for project records.
///
/// `get` upgrades legacy documents and writes the upgraded form back before
/// returning, so repeated reads observe the same shape. `put` replaces the
/// whole record.
pub trait ProjectStore: Send + Sync {
    /// Fetch the record for `key`, if any.
    fn get(&self, key: &str) -> Result<Option<ProjectRecord>>;
    /// Write `record`, replacing any previous version.
    fn put(&self, record: &ProjectRecord) -> Result<()>;
    /// Remove the record for `key`. Absent keys are not an error.
    fn delete(&self, key: &str) -> Result<()>;
    /// All stored records ordered by key.
    fn list(&self) -> Result<Vec<ProjectRecord>>;
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PersistenceError::InvalidKey(key.to_owned()))
    }
}

fn stamped(record: &ProjectRecord) -> ProjectRecord {
    let mut record = record.clone();
    record.schema_version = Some(CURRENT_SCHEMA_VERSION);
    record
}

/// File-backed store holding one pretty-printed JSON document per key.
#[derive(Debug, Clone)]
pub struct FileProjectStore {
    root: PathBuf,
}

impl FileProjectStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Directory holding the record files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.{RECORD_EXTENSION}"))
    }

    fn read_raw(&self, path: &Path) -> Result<Value> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_record(&self, key: &str, record: &ProjectRecord) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, record)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        debug!(project_key = %record.project_key, path = %path.display(), "project record persisted");
        Ok(())
    }

    fn load(&self, key: &str, path: &Path) -> Result<ProjectRecord> {
        let decoded = decode_record(key, self.read_raw(path)?)?;
        if decoded.upgraded {
            let record = stamped(&decoded.record);
            self.write_record(key, &record)?;
            info!(project_key = %record.project_key, "legacy project record upgraded");
            return Ok(record);
        }
        Ok(decoded.record)
    }
}

impl ProjectStore for FileProjectStore {
    fn get(&self, key: &str) -> Result<Option<ProjectRecord>> {
        validate_key(key)?;
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        self.load(key, &path).map(Some)
    }

    fn put(&self, record: &ProjectRecord) -> Result<()> {
        validate_key(&record.project_key)?;
        self.write_record(&record.project_key, &stamped(record))
    }

    fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(project_key = key, "project record removed");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn list(&self) -> Result<Vec<ProjectRecord>> {
        let mut paths: Vec<PathBuf> = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension().and_then(|ext| ext.to_str()) == Some(RECORD_EXTENSION)
            })
            .collect();
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(key) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match self.load(key, &path) {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable project record");
                }
            }
        }
        Ok(records)
    }
}

/// Volatile store keeping raw documents, so legacy upgrades behave exactly as
/// they do on disk.
#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    documents: RwLock<BTreeMap<String, Value>>,
}

impl InMemoryProjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw document, bypassing validation. Used to stage legacy data.
    pub fn insert_raw(&self, key: impl Into<String>, document: Value) {
        self.documents.write().insert(key.into(), document);
    }

    /// Raw document currently stored for `key`.
    pub fn raw(&self, key: &str) -> Option<Value> {
        self.documents.read().get(key).cloned()
    }

    fn load(&self, key: &str, document: Value) -> Result<ProjectRecord> {
        let decoded = decode_record(key, document)?;
        if decoded.upgraded {
            let record = stamped(&decoded.record);
            self.documents
                .write()
                .insert(key.to_owned(), serde_json::to_value(&record)?);
            info!(project_key = %record.project_key, "legacy project record upgraded");
            return Ok(record);
        }
        Ok(decoded.record)
    }
}

impl ProjectStore for InMemoryProjectStore {
    fn get(&self, key: &str) -> Result<Option<ProjectRecord>> {
        validate_key(key)?;
        let document = self.documents.read().get(key).cloned();
        match document {
            Some(document) => self.load(key, document).map(Some),
            None => Ok(None),
        }
    }

    fn put(&self, record: &ProjectRecord) -> Result<()> {
        validate_key(&record.project_key)?;
        let document = serde_json::to_value(stamped(record))?;
        self.documents
            .write()
            .insert(record.project_key.clone(), document);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.documents.write().remove(key);
        Ok(())
    }

    fn list(&self) -> Result<Vec<ProjectRecord>> {
        let documents: Vec<(String, Value)> = self
            .documents
            .read()
            .iter()
            .map(|(key, doc)| (key.clone(), doc.clone()))
            .collect();
        documents
            .into_iter()
            .map(|(key, doc)| self.load(&key, doc))
            .collect()
    }
}
