//! ---
//! prov_section: "03-persistence-logging"
//! prov_subsection: "tests"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Persistence abstractions and storage bindings."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
use prov_common::model::{ExecutionJob, ProjectRecord, RepositoryRecord, CURRENT_SCHEMA_VERSION};
use prov_persistence::{
    FileProjectStore, InMemoryProjectStore, PersistenceError, ProjectStore,
};
use serde_json::{json, Value};
use tempfile::tempdir;

fn sample_record(key: &str) -> ProjectRecord {
    let mut record = ProjectRecord::new(key, format!("{key} project"));
    record.add_repository(RepositoryRecord {
        name: format!("{}-design", key.to_lowercase()),
        url: Some(format!("https://scm.example/{key}/design.git")),
        admin_group: Some("admins".into()),
        user_group: Some("users".into()),
        project_key: Some(key.into()),
    });
    record.last_execution_jobs.push(ExecutionJob {
        name: "prov-cd-create-projects".into(),
        url: "https://jenkins.example/job/prov-cd/job/prov-cd-create-projects/1".into(),
        build_number: Some(1),
    });
    record
}

fn legacy_document() -> Value {
    json!({
        "key": "LEGPROJ",
        "name": "Legacy project",
        "repositories": {
            "legproj-occonfig-artifacts": {},
            "legproj-design": {},
            "legproj-be-python-flask": {},
            "legproj-logviewer": {}
        },
        "quickstart": [
            {
                "component_type": "9992a587-959c-4ceb-8e3f-c1390e40c582",
                "component_id": "be-python-flask",
                "component_description": "Backend - Python/Flask"
            },
            {
                "component_type": "bePythonFlask",
                "component_id": "logviewer",
                "component_description": "Backend - Python/Flask"
            }
        ],
        "lastJobs": []
    })
}

#[test]
fn file_store_get_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = FileProjectStore::open(dir.path()).unwrap();
    store.put(&sample_record("TESTP")).unwrap();

    let first = store.get("TESTP").unwrap().expect("record present");
    let second = store.get("TESTP").unwrap().expect("record present");
    assert_eq!(first, second);
    assert_eq!(first.repositories.len(), 1);
    assert_eq!(first.schema_version, Some(CURRENT_SCHEMA_VERSION));
}

#[test]
fn file_store_put_overwrites_whole_record() {
    let dir = tempdir().unwrap();
    let store = FileProjectStore::open(dir.path()).unwrap();
    store.put(&sample_record("TESTP")).unwrap();

    let replacement = ProjectRecord::new("TESTP", "renamed");
    store.put(&replacement).unwrap();

    let loaded = store.get("TESTP").unwrap().unwrap();
    assert_eq!(loaded.project_name, "renamed");
    assert!(loaded.repositories.is_empty());
    assert!(loaded.last_execution_jobs.is_empty());
}

#[test]
fn file_store_upgrades_legacy_record_and_persists_it() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("LEGPROJ.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&legacy_document()).unwrap()).unwrap();
    let store = FileProjectStore::open(dir.path()).unwrap();

    let upgraded = store.get("LEGPROJ").unwrap().expect("legacy record");
    assert_eq!(upgraded.repositories.len(), 4);
    assert_eq!(upgraded.quickstarters.len(), 2);
    assert_eq!(upgraded.quickstarters[0].component_id, "be-python-flask");
    assert_eq!(upgraded.quickstarters[1].component_id, "logviewer");

    let on_disk: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(on_disk["projectKey"], json!("LEGPROJ"));
    assert!(on_disk.get("key").is_none());

    let again = store.get("LEGPROJ").unwrap().unwrap();
    assert_eq!(again, upgraded);
}

#[test]
fn file_store_upgrades_lowercase_legacy_key_in_place() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("LEGPROJ.json");
    std::fs::write(&path, br#"{"key":"legproj","name":"Legacy"}"#).unwrap();
    let store = FileProjectStore::open(dir.path()).unwrap();

    let upgraded = store.get("LEGPROJ").unwrap().expect("legacy record");
    assert_eq!(upgraded.project_key, "LEGPROJ");

    let mut files: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(files, vec!["LEGPROJ.json".to_string()]);
    let on_disk: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(on_disk["projectKey"], json!("LEGPROJ"));

    assert_eq!(store.list().unwrap().len(), 1);
    store.delete("LEGPROJ").unwrap();
    assert!(store.list().unwrap().is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn file_store_delete_and_list() {
    let dir = tempdir().unwrap();
    let store = FileProjectStore::open(dir.path()).unwrap();
    store.put(&sample_record("BETA")).unwrap();
    store.put(&sample_record("ALPHA")).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a record").unwrap();

    let keys: Vec<String> = store
        .list()
        .unwrap()
        .into_iter()
        .map(|record| record.project_key)
        .collect();
    assert_eq!(keys, vec!["ALPHA".to_string(), "BETA".to_string()]);

    store.delete("ALPHA").unwrap();
    store.delete("ALPHA").unwrap();
    assert!(store.get("ALPHA").unwrap().is_none());
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn keys_that_escape_the_store_are_rejected() {
    let dir = tempdir().unwrap();
    let store = FileProjectStore::open(dir.path()).unwrap();
    let err = store.get("../outside").unwrap_err();
    assert!(matches!(err, PersistenceError::InvalidKey(_)));
    assert!(store.put(&ProjectRecord::new("", "empty")).is_err());
}

#[test]
fn memory_store_upgrades_legacy_documents_in_place() {
    let store = InMemoryProjectStore::new();
    store.insert_raw("LEGPROJ", legacy_document());

    let first = store.get("LEGPROJ").unwrap().unwrap();
    let raw_after_first = store.raw("LEGPROJ").unwrap();
    let second = store.get("LEGPROJ").unwrap().unwrap();
    let raw_after_second = store.raw("LEGPROJ").unwrap();

    assert_eq!(first, second);
    assert_eq!(raw_after_first, raw_after_second);
    assert_eq!(raw_after_first["schemaVersion"], json!(CURRENT_SCHEMA_VERSION));
}

#[test]
fn memory_store_upgrade_keeps_the_storage_key() {
    let store = InMemoryProjectStore::new();
    store.insert_raw("LEGPROJ", json!({"key": "legproj", "name": "Legacy"}));

    let upgraded = store.get("LEGPROJ").unwrap().unwrap();
    assert_eq!(upgraded.project_key, "LEGPROJ");
    assert_eq!(store.raw("LEGPROJ").unwrap()["projectKey"], json!("LEGPROJ"));
    assert!(store.raw("legproj").is_none());
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn memory_store_round_trips_records() {
    let store = InMemoryProjectStore::new();
    assert!(store.get("TESTP").unwrap().is_none());
    store.put(&sample_record("TESTP")).unwrap();
    assert_eq!(store.list().unwrap().len(), 1);
    store.delete("TESTP").unwrap();
    assert!(store.list().unwrap().is_empty());
}
