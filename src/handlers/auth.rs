use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension,
};
use axum_extra::extract::{cookie::Cookie, CookieJar};
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::auth::password::{digest_reset_token, generate_reset_token, hash_password, strength_problem, verify_password};
use crate::auth::{generate_jwt, Claims, TokenError};
use crate::database::models::User;
use crate::database::schema::Document;
use crate::database::Repository;
use crate::error::ApiError;
use crate::handlers::input::Payload;
use crate::middleware::auth::JWT_COOKIE;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

type TokenResponse = Result<(CookieJar, ApiResponse), ApiError>;

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordInput {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPasswordInput {
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordInput {
    pub password_current: Option<String>,
    #[serde(flatten)]
    pub new: NewPasswordInput,
}

/// POST /users/signup
pub async fn signup(State(state): State<AppState>, jar: CookieJar, Payload(body): Payload<Document>) -> TokenResponse {
    let new_password = NewPasswordInput {
        password: body.get("password").and_then(Value::as_str).map(str::to_string),
        password_confirm: body.get("passwordConfirm").and_then(Value::as_str).map(str::to_string),
    };
    let password = checked_password(&new_password)?;
    let hashed = hash_password(password, state.config.security.bcrypt_cost).await?;

    let forced = json!({ "password": hashed, "role": "user", "active": true });
    let forced = forced.as_object().cloned().unwrap_or_default();

    let user = state.repo::<User>().create(body, forced, state.clock.now()).await?;
    tracing::info!("signup: user {} created", user.id);

    send_token(&state, jar, &user, StatusCode::CREATED)
}

/// POST /users/login
pub async fn login(State(state): State<AppState>, jar: CookieJar, Payload(body): Payload<LoginInput>) -> TokenResponse {
    let (email, password) = match (body.email, body.password) {
        (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => (email, password),
        _ => return Err(ApiError::validation("Please provide email and password")),
    };

    let user = state
        .repo::<User>()
        .select_one(json!({ "email": email.trim().to_lowercase() }))
        .await?
        .filter(|u| u.active);

    let Some(user) = user else {
        state.decoy.verify(password, state.config.security.bcrypt_cost).await?;
        return Err(ApiError::invalid_credentials());
    };
    if !verify_password(password, user.password.clone()).await? {
        return Err(ApiError::invalid_credentials());
    }

    send_token(&state, jar, &user, StatusCode::OK)
}

/// GET /users/logout
pub async fn logout(jar: CookieJar) -> Result<(CookieJar, ApiResponse), ApiError> {
    let cookie = Cookie::parse(format!("{}=loggedout; HttpOnly; Path=/; Max-Age=10", JWT_COOKIE))
        .map_err(ApiError::internal)?;
    Ok((jar.add(cookie), ApiResponse::ok()))
}

/// POST /users/forgotPassword
pub async fn forgot_password(State(state): State<AppState>, Payload(body): Payload<ForgotPasswordInput>) -> ApiResult {
    let email = body
        .email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| ApiError::validation("Please provide an email"))?;

    let repo = state.repo::<User>();
    let mut user = repo
        .select_one(json!({ "email": email.trim().to_lowercase() }))
        .await?
        .filter(|u| u.active)
        .ok_or_else(|| ApiError::not_found("There is no user with that email address"))?;

    let reset = generate_reset_token();
    user.password_reset_token = Some(reset.digest.clone());
    user.password_reset_expires =
        Some(state.clock.now() + Duration::minutes(state.config.security.password_reset_ttl_minutes));
    let mut user = repo.save(user).await?;

    let reset_url = format!("{}/api/v1/users/resetPassword/{}", state.config.server.public_base_url, reset.plain);
    if let Err(e) = state.notifier.send_reset(&user.email, &reset_url).await {
        tracing::error!("forgot password: {}", e);
        user.clear_reset_token();
        repo.save(user).await?;
        return Err(ApiError::Delivery("There was an error sending the email. Try again later!".to_string()));
    }

    let mut response = ApiResponse::ok().message("Token sent to email!");
    if state.config.is_development() {
        response = response.data(json!({ "resetToken": reset.plain }));
    }
    Ok(response)
}

/// PATCH /users/resetPassword/:token
pub async fn reset_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(token): Path<String>,
    Payload(body): Payload<NewPasswordInput>,
) -> TokenResponse {
    let now = state.clock.now();
    let repo = state.repo::<User>();

    let mut user = repo
        .select_one(json!({ "passwordResetToken": digest_reset_token(&token) }))
        .await?
        .filter(|u| u.active && u.password_reset_expires.map(|exp| exp > now).unwrap_or(false))
        .ok_or_else(|| ApiError::InvalidOrExpiredToken("Token is invalid or has expired".to_string()))?;

    let password = checked_password(&body)?;
    user.password = hash_password(password, state.config.security.bcrypt_cost).await?;
    user.password_changed_at = Some(now - Duration::seconds(1));
    user.clear_reset_token();
    let user = repo.save(user).await?;

    send_token(&state, jar, &user, StatusCode::OK)
}

/// PATCH /users/updateMyPassword
pub async fn update_my_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    jar: CookieJar,
    Payload(body): Payload<UpdatePasswordInput>,
) -> TokenResponse {
    let repo = state.repo::<User>();
    let mut user = repo.select_404(auth.id).await?;

    let current = body
        .password_current
        .ok_or_else(|| ApiError::validation("Please provide your current password"))?;
    if !verify_password(current, user.password.clone()).await? {
        return Err(ApiError::InvalidCredentials("Your current password is wrong.".to_string()));
    }

    let password = checked_password(&body.new)?;
    user.password = hash_password(password, state.config.security.bcrypt_cost).await?;
    user.password_changed_at = Some(state.clock.now() - Duration::seconds(1));
    let user = repo.save(user).await?;

    send_token(&state, jar, &user, StatusCode::OK)
}

/// Validates a new password and its confirmation, returning the password.
fn checked_password(input: &NewPasswordInput) -> Result<String, ApiError> {
    let mut errors = BTreeMap::new();
    match input.password.as_deref() {
        None | Some("") => {
            errors.insert("password".to_string(), "Please provide a password".to_string());
        }
        Some(password) => {
            if let Some(problem) = strength_problem(password) {
                errors.insert("password".to_string(), problem.to_string());
            }
            if input.password_confirm.as_deref() != Some(password) {
                errors.insert("passwordConfirm".to_string(), "Passwords are not the same".to_string());
            }
        }
    }

    match (errors.is_empty(), &input.password) {
        (true, Some(password)) => Ok(password.clone()),
        _ => Err(ApiError::validation_fields(errors)),
    }
}

/// Issues a token for `user`, sets it as the `jwt` cookie and responds with
/// the token and the user.
fn send_token(state: &AppState, jar: CookieJar, user: &User, status: StatusCode) -> TokenResponse {
    let security = &state.config.security;
    let claims = Claims::new(user.id, state.clock.now(), security.jwt_expiry_hours)?;
    let token = generate_jwt(&claims, &security.jwt_secret)?;

    let max_age = security
        .jwt_cookie_expiry_days
        .checked_mul(24 * 60 * 60)
        .ok_or_else(|| TokenError::Generation("cookie lifetime is out of range".to_string()))?;
    let secure = if state.config.is_production() { "; Secure" } else { "" };
    let cookie = Cookie::parse(format!("{}={}; HttpOnly; Path=/; Max-Age={}{}", JWT_COOKIE, token, max_age, secure))
        .map_err(ApiError::internal)?;

    let body = json!({ "user": Repository::<User>::present(user)? });
    Ok((jar.add(cookie), ApiResponse::with_status(status).token(token).data(body)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(password: Option<&str>, confirm: Option<&str>) -> NewPasswordInput {
        NewPasswordInput {
            password: password.map(str::to_string),
            password_confirm: confirm.map(str::to_string),
        }
    }

    #[test]
    fn accepts_strong_matching_passwords() {
        assert_eq!(checked_password(&input(Some("Secret#123"), Some("Secret#123"))).unwrap(), "Secret#123");
    }

    #[test]
    fn reports_weak_and_mismatched_passwords() {
        let err = checked_password(&input(Some("secret"), Some("other"))).unwrap_err();
        let body = err.to_json();
        assert!(body["errors"]["password"].is_string());
        assert_eq!(body["errors"]["passwordConfirm"], "Passwords are not the same");
    }

    #[test]
    fn missing_password_is_a_validation_error() {
        let err = checked_password(&input(None, None)).unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
    }
}
