//! End-to-end tests of the REST API against a mocked reconciler

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use strata_daemon::{create_router, AppState, HttpReconciler, InMemoryDatabase, RouterOptions};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DEPLOYMENT: &str = "/api/v1/clusters/c1/namespaces/ns1/deployments/d1";

async fn reconciler() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/deployments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "res-1"})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path_regex(r"^/v1/deployments/.+$"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

fn app(server: &MockServer) -> Router {
    let reconciler = HttpReconciler::new(server.uri()).unwrap();
    let state = AppState::new(Arc::new(InMemoryDatabase::new()), Arc::new(reconciler));
    create_router(state, RouterOptions::default())
}

async fn send(app: &Router, verb: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(verb).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn count(server: &MockServer, verb: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.to_string() == verb)
        .count()
}

async fn create_cluster(app: &Router) {
    let (status, _) = send(app, "POST", "/api/v1/clusters", Some(json!({"name": "c1"}))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_health_endpoints() {
    let server = reconciler().await;
    let app = app(&server);

    let (status, body) = send(&app, "GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app, "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_deployment_lifecycle() {
    let server = reconciler().await;
    let app = app(&server);
    create_cluster(&app).await;

    // Create with one target: one serving instance and one artifact request.
    let (status, created) = send(
        &app,
        "POST",
        "/api/v1/clusters/c1/deployments",
        Some(json!({
            "name": "d1",
            "kube_namespace": "ns1",
            "targets": [{"repository": "repoA", "version": "v1"}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "non-deployed");
    let targets = &created["active_revision"]["targets"];
    assert_eq!(targets.as_array().unwrap().len(), 1);
    assert_eq!(targets[0]["artifact_tag"], "repoA:v1");
    assert_eq!(targets[0]["kube_deployment_id"], "res-1");
    assert_eq!(
        targets[0]["config"]["resources"]["requests"]["memory"],
        "1G"
    );
    assert_eq!(count(&server, "POST").await, 2);
    assert_eq!(count(&server, "DELETE").await, 0);

    // Update to v2: two more creates, then the v1 resources are deleted.
    let (status, updated) = send(
        &app,
        "PATCH",
        DEPLOYMENT,
        Some(json!({"targets": [{"bento_repository": "repoA", "bento": "v2"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        updated["active_revision"]["targets"][0]["artifact_tag"],
        "repoA:v2"
    );
    assert_ne!(
        updated["active_revision"]["id"],
        created["active_revision"]["id"]
    );
    assert_eq!(count(&server, "POST").await, 4);
    assert_eq!(count(&server, "DELETE").await, 2);

    let (status, revisions) = send(&app, "GET", &format!("{DEPLOYMENT}/revisions"), None).await;
    assert_eq!(status, StatusCode::OK);
    let revisions = revisions.as_array().unwrap().clone();
    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[0]["status"], "inactive");
    assert_eq!(revisions[1]["status"], "active");

    // Only terminated deployments can be deleted.
    let (status, body) = send(&app, "DELETE", DEPLOYMENT, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_STATE");

    let (status, terminated) = send(&app, "POST", &format!("{DEPLOYMENT}/terminate"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(terminated["status"], "terminating");
    assert!(terminated["active_revision"].is_null());
    assert_eq!(count(&server, "DELETE").await, 4);

    let (status, _) = send(&app, "DELETE", DEPLOYMENT, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, "GET", DEPLOYMENT, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_reconciler_failure_rolls_back_create() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("no capacity"))
        .mount(&server)
        .await;
    let app = app(&server);
    create_cluster(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/clusters/c1/deployments",
        Some(json!({
            "name": "d1",
            "kube_namespace": "ns1",
            "targets": [{"repository": "repoA", "version": "v1"}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "RECONCILER_ERROR");

    let (status, list) = send(&app, "GET", "/api/v1/clusters/c1/deployments", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_names_are_rejected() {
    let server = reconciler().await;
    let app = app(&server);

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/clusters",
        Some(json!({"name": "Bad_Cluster"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    create_cluster(&app).await;
    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/clusters/c1/deployments",
        Some(json!({"name": "d1", "kube_namespace": "1ns", "targets": []})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_cluster_crud() {
    let server = reconciler().await;
    let app = app(&server);
    create_cluster(&app).await;

    let (status, _) = send(&app, "POST", "/api/v1/clusters", Some(json!({"name": "c1"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, cluster) = send(
        &app,
        "PATCH",
        "/api/v1/clusters/c1",
        Some(json!({"description": "primary"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cluster["description"], "primary");

    let (status, clusters) = send(&app, "GET", "/api/v1/clusters?start=0&count=10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(clusters.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "GET", "/api/v1/clusters/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Serving instance created at once; the artifact request fails after `delay`.
async fn slow_failing_reconciler(delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"type": "CompoundAINimDeployment"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "dep-1"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"type": "CompoundAINimRequest"})))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_string("no capacity")
                .set_delay(delay),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/deployments/dep-1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

fn create_body() -> Value {
    json!({
        "name": "d1",
        "kube_namespace": "ns1",
        "targets": [{"repository": "repoA", "version": "v1"}]
    })
}

#[tokio::test]
async fn test_slow_reconciler_failure_is_compensated() {
    let server = slow_failing_reconciler(Duration::from_secs(2)).await;
    let app = app(&server);
    create_cluster(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/clusters/c1/deployments",
        Some(create_body()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "RECONCILER_ERROR");
    assert_eq!(count(&server, "POST").await, 2);
    assert_eq!(count(&server, "DELETE").await, 1);

    let (_, list) = send(&app, "GET", "/api/v1/clusters/c1/deployments", None).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_abandoned_request_still_runs_to_completion() {
    let server = slow_failing_reconciler(Duration::from_secs(1)).await;
    let app = app(&server);
    create_cluster(&app).await;

    // The caller gives up while the artifact request is still pending.
    let abandoned = tokio::time::timeout(
        Duration::from_millis(200),
        send(
            &app,
            "POST",
            "/api/v1/clusters/c1/deployments",
            Some(create_body()),
        ),
    )
    .await;
    assert!(abandoned.is_err());

    let mut deletes = 0;
    for _ in 0..50 {
        deletes = count(&server, "DELETE").await;
        if deletes > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(deletes, 1);

    // The flow rolled back once the reconciler error surfaced.
    let (status, list) = send(&app, "GET", "/api/v1/clusters/c1/deployments", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(list.as_array().unwrap().is_empty());
}
