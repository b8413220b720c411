use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use uuid::Uuid;

use crate::auth::verify_jwt;
use crate::database::models::{Role, User};
use crate::error::ApiError;
use crate::state::AppState;

pub const JWT_COOKIE: &str = "jwt";

/// Identity attached to the request extensions once a token checks out.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// Rejects requests without a valid token for an active user.
pub async fn protect(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers(), &jar)
        .ok_or_else(|| ApiError::unauthenticated("You are not logged in! Please log in to get access."))?;

    let user = authenticate(&state, &token).await.map_err(|e| {
        tracing::warn!("auth: rejected token: {}", e.message());
        e
    })?;

    tracing::debug!("auth: {} authenticated", user.id);
    request.extensions_mut().insert(AuthUser::from(&user));
    Ok(next.run(request).await)
}

/// Runs after [`protect`]; only admins pass.
pub async fn restrict_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    match request.extensions().get::<AuthUser>() {
        Some(user) if user.is_admin() => Ok(next.run(request).await),
        Some(_) => Err(ApiError::forbidden("You do not have permission to perform this action")),
        None => Err(ApiError::unauthenticated("You are not logged in! Please log in to get access.")),
    }
}

/// Attaches the identity when a valid token is present; never rejects.
pub async fn identify(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_token(request.headers(), &jar) {
        match authenticate(&state, &token).await {
            Ok(user) => {
                request.extensions_mut().insert(AuthUser::from(&user));
            }
            Err(e) => tracing::debug!("auth: anonymous request, {}", e.message()),
        }
    }
    next.run(request).await
}

/// Bearer header first, then the `jwt` cookie.
pub fn extract_token(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    match bearer {
        Some(token) => Some(token.to_string()),
        None => jar
            .get(JWT_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty()),
    }
}

/// Verifies the token and loads its user, checking the account is still
/// active and the password has not changed since the token was issued.
pub async fn authenticate(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = verify_jwt(token, &state.config.security.jwt_secret, state.clock.now())?;

    let user = state
        .repo::<User>()
        .find_by_id(claims.sub)
        .await?
        .filter(|u| u.active)
        .ok_or_else(|| ApiError::unauthenticated("The user belonging to this token no longer exists."))?;

    if user.changed_password_after(claims.iat) {
        return Err(ApiError::unauthenticated("User recently changed password! Please log in again."));
    }

    Ok(user)
}
