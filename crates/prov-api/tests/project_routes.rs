//! ---
//! prov_section: "05-networking-external-interfaces"
//! prov_subsection: "tests"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Route-level tests for the v2 project API."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use prov_api::{router, ApiState};
use prov_common::config::{Mode, ProvisioningConfig};
use prov_core::{AdapterError, ProvisioningOrchestrator};
use prov_persistence::InMemoryProjectStore;
use prov_testharness::{CallKind, RecordingBackend};
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_router(backend: &Arc<RecordingBackend>) -> Router {
    let orchestrator = ProvisioningOrchestrator::new(
        ProvisioningConfig::default(),
        backend.adapters(),
        Arc::new(InMemoryProjectStore::new()),
    );
    router(Arc::new(ApiState::new(orchestrator, Mode::Simulation)))
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> Result<(StatusCode, Value), String> {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(payload) => {
            let bytes = serde_json::to_vec(&payload)
                .map_err(|err| format!("serialize request body: {err}"))?;
            builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(bytes))
                .map_err(|err| format!("build request: {err}"))?
        }
        None => builder
            .body(Body::empty())
            .map_err(|err| format!("build request: {err}"))?,
    };

    let response = router
        .clone()
        .oneshot(req)
        .await
        .map_err(|err| format!("route request: {err}"))?;
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .map_err(|err| format!("read response body: {err}"))?;
    let parsed = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|err| format!("parse response body: {err}"))?
    };
    Ok((status, parsed))
}

fn create_body(key: &str) -> Value {
    json!({
        "projectKey": key,
        "projectName": "Test project",
        "description": "created through the api"
    })
}

#[tokio::test]
async fn create_get_and_list() -> Result<(), String> {
    let backend = RecordingBackend::new();
    let router = test_router(&backend);

    let (status, created) =
        send(&router, Method::POST, "/api/v2/project", Some(create_body("testp"))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["projectKey"], json!("TESTP"));
    assert_eq!(created["repositories"].as_object().map(|r| r.len()), Some(2));

    let (status, fetched) = send(&router, Method::GET, "/api/v2/project/TESTP", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, listed) = send(&router, Method::GET, "/api/v2/project", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn failed_create_returns_cleanup_message() -> Result<(), String> {
    let backend = RecordingBackend::new();
    backend.fail_on(
        CallKind::Trigger,
        AdapterError::Transport("Rundeck TestFail".into()),
    );
    let router = test_router(&backend);

    let (status, body) =
        send(&router, Method::POST, "/api/v2/project", Some(create_body("TESTP"))).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body["message"],
        json!("An error occured while creating project [TESTP], reason [Rundeck TestFail] - but all cleaned up!")
    );
    assert_eq!(backend.deletes().len(), 5);

    let (status, _) = send(&router, Method::GET, "/api/v2/project/TESTP", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn invalid_and_duplicate_keys() -> Result<(), String> {
    let backend = RecordingBackend::new();
    let router = test_router(&backend);

    let (status, _) =
        send(&router, Method::POST, "/api/v2/project", Some(create_body("te-st"))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    send(&router, Method::POST, "/api/v2/project", Some(create_body("TESTP"))).await?;
    let (status, body) =
        send(&router, Method::POST, "/api/v2/project", Some(create_body("TESTP"))).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().is_some());
    Ok(())
}

#[tokio::test]
async fn update_adds_quickstarters() -> Result<(), String> {
    let backend = RecordingBackend::new();
    let router = test_router(&backend);
    send(&router, Method::POST, "/api/v2/project", Some(create_body("TESTP"))).await?;

    let (status, updated) = send(
        &router,
        Method::PUT,
        "/api/v2/project",
        Some(json!({
            "projectKey": "TESTP",
            "quickstarters": [
                {"component_type": "be-python-flask", "component_id": "be-python-flask"}
            ]
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["quickstarters"][0]["component_id"], json!("be-python-flask"));
    assert_eq!(updated["lastExecutionJobs"].as_array().map(Vec::len), Some(2));

    let (status, _) = send(
        &router,
        Method::PUT,
        "/api/v2/project",
        Some(json!({"projectKey": "NOPE", "quickstarters": []})),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn failed_update_names_the_update() -> Result<(), String> {
    let backend = RecordingBackend::new();
    let router = test_router(&backend);
    send(&router, Method::POST, "/api/v2/project", Some(create_body("TESTP"))).await?;
    backend.fail_on(
        CallKind::Trigger,
        AdapterError::Transport("Rundeck TestFail".into()),
    );

    let (status, body) = send(
        &router,
        Method::PUT,
        "/api/v2/project",
        Some(json!({
            "projectKey": "TESTP",
            "quickstarters": [{"component_type": "be-python-flask", "component_id": "api"}]
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["message"]
        .as_str()
        .is_some_and(|m| m.starts_with("An error occured while updating project [TESTP]")));
    Ok(())
}

#[tokio::test]
async fn delete_reports_and_component_delete_is_unimplemented() -> Result<(), String> {
    let backend = RecordingBackend::new();
    let router = test_router(&backend);
    send(&router, Method::POST, "/api/v2/project", Some(create_body("TESTP"))).await?;

    let (status, _) = send(
        &router,
        Method::DELETE,
        "/api/v2/project",
        Some(json!({"projectKey": "TESTP"})),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

    let (status, report) = send(&router, Method::DELETE, "/api/v2/project/TESTP", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["projectKey"], json!("TESTP"));
    assert_eq!(report["failed"], json!([]));

    let (status, _) = send(&router, Method::DELETE, "/api/v2/project/TESTP", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn malformed_bodies_get_a_json_message() -> Result<(), String> {
    let backend = RecordingBackend::new();
    let router = test_router(&backend);

    let (status, body) = send(
        &router,
        Method::POST,
        "/api/v2/project",
        Some(json!({"projectName": "no key"})),
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().is_some_and(|m| m.contains("projectKey")));

    let req = Request::builder()
        .method(Method::PUT)
        .uri("/api/v2/project")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .map_err(|err| format!("build request: {err}"))?;
    let response = router
        .clone()
        .oneshot(req)
        .await
        .map_err(|err| format!("route request: {err}"))?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .map_err(|err| format!("read response body: {err}"))?;
    let body: Value =
        serde_json::from_slice(&bytes).map_err(|err| format!("parse response body: {err}"))?;
    assert!(body["message"].is_string());
    assert!(backend.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn status_reports_mode_and_project_count() -> Result<(), String> {
    let backend = RecordingBackend::new();
    let router = test_router(&backend);
    send(&router, Method::POST, "/api/v2/project", Some(create_body("TESTP"))).await?;

    let (status, body) = send(&router, Method::GET, "/api/status", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], json!("simulation"));
    assert_eq!(body["projectCount"], json!(1));
    assert_eq!(body["cleanupAllowed"], json!(true));
    assert!(body["version"].is_string());
    Ok(())
}
