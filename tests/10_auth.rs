mod common;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::Duration;
use serde_json::json;

use common::{TestApp, PASSWORD};
use shopfront_api::database::models::User;

#[tokio::test]
async fn signup_issues_token_and_never_returns_the_password() -> Result<()> {
    let app = TestApp::new();
    let res = app.signup("Ada@Example.com", "+44 7700 900123").await?;

    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
    assert_eq!(res.body["status"], "success");
    assert!(!res.token().is_empty());
    assert!(res.set_cookie().starts_with("jwt="), "cookie: {}", res.set_cookie());
    assert!(res.set_cookie().contains("HttpOnly"));

    let user = &res.body["data"]["user"];
    assert_eq!(user["email"], "ada@example.com");
    assert_eq!(user["role"], "user");
    assert!(user.get("password").is_none(), "password leaked: {}", user);
    assert!(user.get("active").is_none());

    let stored = app
        .state
        .repo::<User>()
        .select_one(json!({ "email": "ada@example.com" }))
        .await?
        .unwrap();
    assert_ne!(stored.password, PASSWORD);
    assert!(stored.password.starts_with("$2"));
    Ok(())
}

#[tokio::test]
async fn signup_cannot_choose_a_role() -> Result<()> {
    let app = TestApp::new();
    let res = app
        .post(
            "/api/v1/users/signup",
            json!({
                "firstName": "Eve",
                "lastName": "Mallory",
                "email": "eve@example.com",
                "phoneNumber": "+44 7700 900999",
                "password": PASSWORD,
                "passwordConfirm": PASSWORD,
                "role": "admin"
            }),
            None,
        )
        .await?;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["data"]["user"]["role"], "user");
    Ok(())
}

#[tokio::test]
async fn signup_validates_input() -> Result<()> {
    let app = TestApp::new();
    let res = app
        .post(
            "/api/v1/users/signup",
            json!({
                "firstName": "Ada",
                "lastName": "Lovelace",
                "email": "ada@example.com",
                "phoneNumber": "+44 7700 900123",
                "password": "weak",
                "passwordConfirm": "weak"
            }),
            None,
        )
        .await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["status"], "fail");
    assert!(res.body["errors"]["password"].is_string());

    let res = app
        .post(
            "/api/v1/users/signup",
            json!({
                "firstName": "Ada",
                "lastName": "Lovelace",
                "email": "not-an-email",
                "phoneNumber": "+44 7700 900123",
                "password": PASSWORD,
                "passwordConfirm": PASSWORD
            }),
            None,
        )
        .await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["errors"]["email"], "Please provide a valid email");
    Ok(())
}

#[tokio::test]
async fn duplicate_email_is_rejected() -> Result<()> {
    let app = TestApp::new();
    app.signup("ada@example.com", "+44 7700 900123").await?;
    let res = app.signup("ada@example.com", "+44 7700 900124").await?;

    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["message"], "Duplicate field value: email. Please use another value");
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_unknown_email_look_the_same() -> Result<()> {
    let app = TestApp::new();
    app.signup("ada@example.com", "+44 7700 900123").await?;

    let wrong = app
        .post("/api/v1/users/login", json!({"email": "ada@example.com", "password": "Wrong#1234"}), None)
        .await?;
    let unknown = app
        .post("/api/v1/users/login", json!({"email": "nobody@example.com", "password": PASSWORD}), None)
        .await?;

    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.status, unknown.status);
    assert_eq!(wrong.body, unknown.body);
    assert_eq!(wrong.body["message"], "Incorrect email or password");
    assert!(app.state.decoy.is_ready(), "unknown accounts still pay for a bcrypt check");

    let ok = app
        .post("/api/v1/users/login", json!({"email": "ADA@example.com", "password": PASSWORD}), None)
        .await?;
    assert_eq!(ok.status, StatusCode::OK);
    assert!(!ok.token().is_empty());
    Ok(())
}

#[tokio::test]
async fn login_requires_email_and_password() -> Result<()> {
    let app = TestApp::new();
    let res = app.post("/api/v1/users/login", json!({"email": "ada@example.com"}), None).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["message"], "Please provide email and password");
    Ok(())
}

#[tokio::test]
async fn protected_routes_need_a_token() -> Result<()> {
    let app = TestApp::new();
    let res = app.get("/api/v1/users/getMe", None).await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["message"], "You are not logged in! Please log in to get access.");

    let res = app.get("/api/v1/users/getMe", Some("not-a-jwt")).await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["message"], "Invalid token. Please log in again!");
    Ok(())
}

#[tokio::test]
async fn cookie_token_is_accepted() -> Result<()> {
    let app = TestApp::new();
    let token = app.signup("ada@example.com", "+44 7700 900123").await?.token();

    let request = axum::http::Request::builder()
        .uri("/api/v1/users/getMe")
        .header("cookie", format!("jwt={}", token))
        .body(axum::body::Body::empty())?;
    let res = app.send(request).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["user"]["email"], "ada@example.com");
    Ok(())
}

#[tokio::test]
async fn expired_tokens_are_rejected() -> Result<()> {
    let app = TestApp::new();
    let token = app.signup("ada@example.com", "+44 7700 900123").await?.token();

    let hours = app.state.config.security.jwt_expiry_hours as i64;
    app.clock.advance(Duration::hours(hours) + Duration::seconds(1));

    let res = app.get("/api/v1/users/getMe", Some(&token)).await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["message"], "Your token has expired! Please log in again.");
    Ok(())
}

#[tokio::test]
async fn tokens_issued_before_a_password_change_are_rejected() -> Result<()> {
    let app = TestApp::new();
    let old_token = app.signup("ada@example.com", "+44 7700 900123").await?.token();

    app.clock.advance(Duration::seconds(30));
    let res = app
        .patch(
            "/api/v1/users/updateMyPassword",
            json!({"passwordCurrent": PASSWORD, "password": "Fresh#4567", "passwordConfirm": "Fresh#4567"}),
            Some(&old_token),
        )
        .await?;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let new_token = res.token();

    let res = app.get("/api/v1/users/getMe", Some(&old_token)).await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["message"], "User recently changed password! Please log in again.");

    let res = app.get("/api/v1/users/getMe", Some(&new_token)).await?;
    assert_eq!(res.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn update_my_password_checks_the_current_one() -> Result<()> {
    let app = TestApp::new();
    let token = app.signup("ada@example.com", "+44 7700 900123").await?.token();

    let res = app
        .patch(
            "/api/v1/users/updateMyPassword",
            json!({"passwordCurrent": "Wrong#1234", "password": "Fresh#4567", "passwordConfirm": "Fresh#4567"}),
            Some(&token),
        )
        .await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn logout_overwrites_the_cookie() -> Result<()> {
    let app = TestApp::new();
    let res = app.get("/api/v1/users/logout", None).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, json!({"status": "success"}));
    let cookie = res.set_cookie();
    assert!(cookie.starts_with("jwt=loggedout"), "cookie: {}", cookie);
    assert!(cookie.contains("Max-Age=10"));
    Ok(())
}

#[tokio::test]
async fn password_reset_round_trip() -> Result<()> {
    let app = TestApp::new();
    app.signup("ada@example.com", "+44 7700 900123").await?;

    let res = app
        .post("/api/v1/users/forgotPassword", json!({"email": "ada@example.com"}), None)
        .await?;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let token = res.body["data"]["resetToken"].as_str().unwrap().to_string();

    let sent = app.notifier.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.ends_with(&format!("/api/v1/users/resetPassword/{}", token)));

    let stored = app
        .state
        .repo::<User>()
        .select_one(json!({ "email": "ada@example.com" }))
        .await?
        .unwrap();
    assert_ne!(stored.password_reset_token.as_deref(), Some(token.as_str()));

    let res = app
        .patch(
            &format!("/api/v1/users/resetPassword/{}", token),
            json!({"password": "Fresh#4567", "passwordConfirm": "Fresh#4567"}),
            None,
        )
        .await?;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert!(!res.token().is_empty());

    let login = app
        .post("/api/v1/users/login", json!({"email": "ada@example.com", "password": "Fresh#4567"}), None)
        .await?;
    assert_eq!(login.status, StatusCode::OK);

    // Tokens are single use.
    let again = app
        .patch(
            &format!("/api/v1/users/resetPassword/{}", token),
            json!({"password": "Other#4567", "passwordConfirm": "Other#4567"}),
            None,
        )
        .await?;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn reset_token_fails_at_expiry() -> Result<()> {
    let app = TestApp::new();
    app.signup("ada@example.com", "+44 7700 900123").await?;
    let res = app
        .post("/api/v1/users/forgotPassword", json!({"email": "ada@example.com"}), None)
        .await?;
    let token = res.body["data"]["resetToken"].as_str().unwrap().to_string();

    app.clock.advance(Duration::minutes(10));
    let res = app
        .patch(
            &format!("/api/v1/users/resetPassword/{}", token),
            json!({"password": "Fresh#4567", "passwordConfirm": "Fresh#4567"}),
            None,
        )
        .await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["message"], "Token is invalid or has expired");
    Ok(())
}

#[tokio::test]
async fn failed_delivery_clears_the_reset_token() -> Result<()> {
    let app = TestApp::new();
    app.signup("ada@example.com", "+44 7700 900123").await?;
    app.notifier.fail.store(true, std::sync::atomic::Ordering::SeqCst);

    let res = app
        .post("/api/v1/users/forgotPassword", json!({"email": "ada@example.com"}), None)
        .await?;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body["status"], "error");
    assert_eq!(res.body["message"], "There was an error sending the email. Try again later!");

    let stored = app
        .state
        .repo::<User>()
        .select_one(json!({ "email": "ada@example.com" }))
        .await?
        .unwrap();
    assert!(stored.password_reset_token.is_none());
    assert!(stored.password_reset_expires.is_none());
    Ok(())
}

#[tokio::test]
async fn forgot_password_for_unknown_email_is_not_found() -> Result<()> {
    let app = TestApp::new();
    let res = app
        .post("/api/v1/users/forgotPassword", json!({"email": "nobody@example.com"}), None)
        .await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn update_me_refuses_password_changes_and_protected_fields() -> Result<()> {
    let app = TestApp::new();
    let token = app.signup("ada@example.com", "+44 7700 900123").await?.token();

    let res = app
        .patch("/api/v1/users/updateMe", json!({"password": "Fresh#4567"}), Some(&token))
        .await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["message"], "This route is not for password updates. Please use /updateMyPassword.");

    let res = app
        .patch("/api/v1/users/updateMe", json!({"firstName": "Augusta", "role": "admin"}), Some(&token))
        .await?;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.body["data"]["user"]["firstName"], "Augusta");
    assert_eq!(res.body["data"]["user"]["role"], "user");
    Ok(())
}

#[tokio::test]
async fn update_me_accepts_an_image_upload() -> Result<()> {
    let app = TestApp::new();
    let token = app.signup("ada@example.com", "+44 7700 900123").await?.token();

    let res = app
        .multipart(
            axum::http::Method::PATCH,
            "/api/v1/users/updateMe",
            &[("lastName", "King")],
            Some(("image/png", &[137, 80, 78, 71])),
            &token,
        )
        .await?;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    let image = res.body["data"]["user"]["image"].as_str().unwrap().to_string();
    assert!(image.starts_with("public/images/users/"));
    assert!(image.ends_with(".png"), "png bytes keep a png name: {}", image);
    assert_eq!(res.body["data"]["user"]["lastName"], "King");
    Ok(())
}

#[tokio::test]
async fn deleted_accounts_can_no_longer_log_in() -> Result<()> {
    let app = TestApp::new();
    let token = app.signup("ada@example.com", "+44 7700 900123").await?.token();

    let res = app.delete("/api/v1/users/deleteMe", Some(&token)).await?;
    assert_eq!(res.status, StatusCode::NO_CONTENT);

    let res = app.get("/api/v1/users/getMe", Some(&token)).await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body["message"], "The user belonging to this token no longer exists.");

    let res = app
        .post("/api/v1/users/login", json!({"email": "ada@example.com", "password": PASSWORD}), None)
        .await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn user_administration_is_admin_only() -> Result<()> {
    let app = TestApp::new();
    let admin = app.admin().await?;
    let user = app.signup("ada@example.com", "+44 7700 900123").await?.token();

    let res = app.get("/api/v1/users", Some(&user)).await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app.get("/api/v1/users?limit=10", Some(&admin)).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["results"], 2);
    for u in res.body["data"]["users"].as_array().unwrap() {
        assert!(u.get("password").is_none());
    }

    let res = app.post("/api/v1/users", json!({}), Some(&admin)).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["message"], "This route is not defined! Please use /signup instead");

    let res = app.get("/api/v1/users?password=x", Some(&admin)).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    Ok(())
}
