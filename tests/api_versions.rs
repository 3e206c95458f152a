mod support;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{Value, json};
use tower::ServiceExt;

use support::{
    ContendedVersions, EDITOR_EMAIL, TestApp, authed, authed_json, json_body, report_payload,
};

async fn draft_report(app: &TestApp, token: &str, title: &str) -> u64 {
    let response = app
        .send(authed_json("POST", "/api/v1/reports", token, &report_payload(title)))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await["data"]["id"].as_u64().unwrap()
}

async fn publish(app: &TestApp, token: &str, id: u64) -> StatusCode {
    app.send(authed_json(
        "PUT",
        &format!("/api/v1/reports/{id}"),
        token,
        &json!({ "status": "published" }),
    ))
    .await
    .status()
}

async fn versions(app: &TestApp, token: &str, id: u64) -> Vec<Value> {
    let response = app
        .send(authed("GET", &format!("/api/v1/reports/{id}/versions"), token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await["data"].as_array().unwrap().clone()
}

fn numbers(versions: &[Value]) -> Vec<u64> {
    versions
        .iter()
        .map(|version| version["version_number"].as_u64().unwrap())
        .collect()
}

#[tokio::test]
async fn losing_the_version_number_race_retries_with_the_next_number() {
    let app = TestApp::with_versions(|backend| Arc::new(ContendedVersions::new(backend, 1))).await;
    let editor = app.token_for(EDITOR_EMAIL).await;
    let editor_id = app.principal_id(EDITOR_EMAIL).await;
    let id = draft_report(&app, &editor, "Wound Care Market Forecast").await;

    assert_eq!(publish(&app, &editor, id).await, StatusCode::OK);

    let history = versions(&app, &editor, id).await;
    assert_eq!(numbers(&history), vec![1, 2]);
    assert!(history[0]["published_by"].is_null());
    assert_eq!(history[1]["published_by"], editor_id);
}

#[tokio::test]
async fn exhausted_version_retries_still_publish() {
    let app = TestApp::with_versions(|backend| Arc::new(ContendedVersions::new(backend, 3))).await;
    let editor = app.token_for(EDITOR_EMAIL).await;
    let id = draft_report(&app, &editor, "Dialysis Equipment Market Review").await;

    assert_eq!(publish(&app, &editor, id).await, StatusCode::OK);

    let history = versions(&app, &editor, id).await;
    assert_eq!(numbers(&history), vec![1, 2, 3]);
    assert!(history.iter().all(|version| version["published_by"].is_null()));

    let response = app
        .send(authed("GET", &format!("/api/v1/reports/{id}"), &editor))
        .await;
    assert_eq!(json_body(response).await["data"]["status"], "published");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_publishes_keep_version_numbers_contiguous() {
    let app = TestApp::new().await;
    let editor = app.token_for(EDITOR_EMAIL).await;
    let id = draft_report(&app, &editor, "Respiratory Therapeutics Landscape").await;

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let router = app.router.clone();
            let request = authed_json(
                "PUT",
                &format!("/api/v1/reports/{id}"),
                &editor,
                &json!({ "status": "published" }),
            );
            tokio::spawn(async move { router.oneshot(request).await.unwrap().status() })
        })
        .collect();
    let mut statuses = Vec::new();
    for task in tasks {
        statuses.push(task.await.unwrap());
    }
    assert!(statuses.contains(&StatusCode::OK), "{statuses:?}");

    let history = numbers(&versions(&app, &editor, id).await);
    assert!(!history.is_empty());
    let expected: Vec<u64> = (1..=history.len() as u64).collect();
    assert_eq!(history, expected);
}
