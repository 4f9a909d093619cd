mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{acquire_db_lock, body_to_vec, TestApp};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct AuthenticatedUser {
    username: String,
    role: String,
}

#[tokio::test]
async fn login_and_me_roundtrip() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let password = "s3cret";
    app.insert_user("alice", password, "corrector").await?;

    let token = app.login_token("alice", password).await?;

    let response = app.get("/api/auth/me", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let user: AuthenticatedUser = serde_json::from_slice(&body)?;

    assert_eq!(user.username, "alice");
    assert_eq!(user.role, "corrector");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn login_sets_session_cookies_accepted_by_staff_routes() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    app.insert_user("bob", "hunter2", "user").await?;

    let response = app
        .post_json(
            "/api/auth/login",
            &json!({ "username": "bob", "password": "hunter2" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or_default().to_string())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("access_token=")));
    assert!(cookies.iter().any(|c| c.starts_with("refresh_token=")));

    let access_cookie = cookies
        .iter()
        .find(|c| c.starts_with("access_token="))
        .cloned()
        .unwrap_or_default();
    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/auth/me")
        .header(header::COOKIE, access_cookie)
        .body(Body::empty())?;
    let response = tower::ServiceExt::oneshot(
        correction_orders::routes::create_router(app.state.clone()),
        request,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn rejects_wrong_password_and_unknown_user() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;
    app.insert_user("carol", "right", "admin").await?;

    let wrong = app
        .post_json(
            "/api/auth/login",
            &json!({ "username": "carol", "password": "wrong" }),
            None,
        )
        .await?;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let unknown = app
        .post_json(
            "/api/auth/login",
            &json!({ "username": "nobody", "password": "right" }),
            None,
        )
        .await?;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);

    let anonymous = app.get("/api/auth/me", None).await?;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    app.cleanup().await?;
    Ok(())
}
