mod support;

use axum::http::{StatusCode, header};
use serde_json::json;

use support::{
    ADMIN_EMAIL, EDITOR_EMAIL, PASSWORD, TestApp, VIEWER_EMAIL, authed, authed_json, get,
    json_body, json_request,
};

async fn login(app: &TestApp, email: &str, password: &str) -> axum::http::Response<axum::body::Body> {
    app.send(json_request(
        "POST",
        "/api/v1/auth/login",
        &json!({ "email": email, "password": password }),
    ))
    .await
}

#[tokio::test]
async fn login_refresh_logout_rotates_and_revokes_sessions() {
    let app = TestApp::new().await;

    let response = login(&app, ADMIN_EMAIL, PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["token_type"], "Bearer");
    assert_eq!(body["data"]["expires_in"], 900);
    assert_eq!(body["data"]["user"]["email"], ADMIN_EMAIL);
    assert!(body["data"]["user"].get("password_hash").is_none());
    let access = body["data"]["access_token"].as_str().unwrap().to_string();
    let refresh = body["data"]["refresh_token"].as_str().unwrap().to_string();
    assert!(!access.is_empty());
    assert!(!refresh.is_empty());

    let response = app
        .send(json_request(
            "POST",
            "/api/v1/auth/refresh",
            &json!({ "refresh_token": refresh }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let new_access = body["data"]["access_token"].as_str().unwrap().to_string();
    let new_refresh = body["data"]["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(new_refresh, refresh);

    let replay = app
        .send(json_request(
            "POST",
            "/api/v1/auth/refresh",
            &json!({ "refresh_token": refresh }),
        ))
        .await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(replay).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Invalid or expired refresh token");

    let response = app
        .send(authed_json(
            "POST",
            "/api/v1/auth/logout",
            &new_access,
            &json!({ "refresh_token": new_refresh }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["message"], "Logged out");

    let after_logout = app
        .send(json_request(
            "POST",
            "/api/v1/auth/refresh",
            &json!({ "refresh_token": new_refresh }),
        ))
        .await;
    assert_eq!(after_logout.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_rejects_bad_credentials_with_a_uniform_message() {
    let app = TestApp::new().await;

    let wrong_password = login(&app, ADMIN_EMAIL, "not-the-password").await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    let wrong_password = json_body(wrong_password).await;

    let unknown = login(&app, "nobody@example.com", PASSWORD).await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    let unknown = json_body(unknown).await;

    assert_eq!(wrong_password["error"], unknown["error"]);
}

#[tokio::test]
async fn login_requires_email_and_password() {
    let app = TestApp::new().await;

    let response = login(&app, "", "").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/v1/auth/login")
                .body(axum::body::Body::from("{}"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn inactive_accounts_cannot_log_in() {
    let app = TestApp::new().await;
    let admin = app.token_for(ADMIN_EMAIL).await;
    let viewer_id = app.principal_id(VIEWER_EMAIL).await;

    let response = app
        .send(authed(
            "DELETE",
            &format!("/api/v1/users/{viewer_id}"),
            &admin,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Written before the response, without waiting on the background writer.
    let audit = app.backend.audit.lock().await;
    let record = audit
        .iter()
        .find(|record| record.action == "user.deactivate")
        .expect("deactivation is audited synchronously");
    assert_eq!(record.entity_id.as_deref(), Some(viewer_id.to_string().as_str()));
    drop(audit);

    let response = login(&app, VIEWER_EMAIL, PASSWORD).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_require_a_valid_bearer_token() {
    let app = TestApp::new().await;

    let response = app.send(get("/api/v1/users/me")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Authentication required");

    let response = app.send(authed("GET", "/api/v1/users/me", "garbage")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = app.token_for(EDITOR_EMAIL).await;
    let response = app.send(authed("GET", "/api/v1/users/me", &token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["email"], EDITOR_EMAIL);
    assert_eq!(body["data"]["role"], "editor");
}

#[tokio::test]
async fn refresh_tokens_are_not_accepted_as_access_tokens() {
    let app = TestApp::new().await;
    let body = json_body(login(&app, ADMIN_EMAIL, PASSWORD).await).await;
    let refresh = body["data"]["refresh_token"].as_str().unwrap();

    let response = app.send(authed("GET", "/api/v1/users/me", refresh)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn role_policy_guards_admin_and_editor_routes() {
    let app = TestApp::new().await;
    let viewer = app.token_for(VIEWER_EMAIL).await;
    let editor = app.token_for(EDITOR_EMAIL).await;
    let admin = app.token_for(ADMIN_EMAIL).await;

    let response = app.send(authed("GET", "/api/v1/users", &editor)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Insufficient permissions");

    let response = app.send(authed("GET", "/api/v1/users", &admin)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["meta"]["total"], 3);

    let response = app
        .send(authed_json(
            "POST",
            "/api/v1/reports",
            &viewer,
            &support::report_payload("Viewer Cannot Create Reports"),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.send(authed("GET", "/api/v1/dashboard/stats", &viewer)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app.send(authed("GET", "/api/v1/dashboard/stats", &editor)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admins_manage_users() {
    let app = TestApp::new().await;
    let admin = app.token_for(ADMIN_EMAIL).await;

    let response = app
        .send(authed_json(
            "POST",
            "/api/v1/users",
            &admin,
            &json!({
                "email": "analyst@example.com",
                "password": "Analyst@2024",
                "name": "Analyst",
                "role": "editor"
            }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    let id = body["data"]["id"].as_u64().unwrap();
    assert_eq!(body["data"]["role"], "editor");

    let duplicate = app
        .send(authed_json(
            "POST",
            "/api/v1/users",
            &admin,
            &json!({
                "email": "ANALYST@example.com",
                "password": "Analyst@2024",
                "name": "Analyst Again",
                "role": "viewer"
            }),
        ))
        .await;
    assert!(duplicate.status().is_client_error());

    let response = app
        .send(authed("GET", "/api/v1/users/by-role/editor", &admin))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["meta"]["total"], 2);

    let response = app
        .send(authed("GET", "/api/v1/users/by-role/overlord", &admin))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(authed_json(
            "PUT",
            &format!("/api/v1/users/{id}"),
            &admin,
            &json!({ "name": "Senior Analyst" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["name"], "Senior Analyst");

    let response = app
        .send(json_request(
            "POST",
            "/api/v1/auth/login",
            &json!({ "email": "analyst@example.com", "password": "Analyst@2024" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn logout_accepts_an_empty_body() {
    let app = TestApp::new().await;
    let token = app.token_for(EDITOR_EMAIL).await;

    let response = app
        .send(authed("POST", "/api/v1/auth/logout", &token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::CONTENT_TYPE).is_some());
}
