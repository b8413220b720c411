use axum::extract::{Path, State};
use axum::Extension;
use serde_json::json;
use axum_extra::extract::{cookie::Cookie, CookieJar};

use crate::database::models::{Entity, User};
use crate::error::ApiError;
use crate::handlers::crud::{self, attach_upload, parse_id, single, store_upload};
use crate::handlers::input::DocumentInput;
use crate::handlers::reviews;
use crate::middleware::auth::JWT_COOKIE;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::ratings;
use crate::state::AppState;

const PASSWORD_FIELDS: [&str; 3] = ["password", "passwordConfirm", "passwordCurrent"];

/// GET /users/getMe
pub async fn get_me(State(state): State<AppState>, Extension(auth): Extension<AuthUser>) -> ApiResult {
    let user = state.repo::<User>().select_404(auth.id).await?;
    Ok(ApiResponse::success(single(&user)?))
}

/// PATCH /users/updateMe
pub async fn update_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    input: DocumentInput,
) -> ApiResult {
    if PASSWORD_FIELDS.iter().any(|f| input.fields.contains_key(*f)) {
        return Err(ApiError::bad_request(
            "This route is not for password updates. Please use /updateMyPassword.",
        ));
    }

    let (mut fields, image) = input.into_parts(User::schema())?;
    let pending = attach_upload::<User>(&mut fields, image);

    let mut allowed = User::SELF_FIELDS.to_vec();
    if pending.is_some() {
        allowed.push("image");
    }

    let user = state.repo::<User>().update(auth.id, fields, &allowed).await?;
    store_upload(&state, pending);

    Ok(ApiResponse::success(single(&user)?))
}

/// DELETE /users/deleteMe: deactivates the account and ends the session.
pub async fn delete_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse), ApiError> {
    let repo = state.repo::<User>();
    let mut user = repo.select_404(auth.id).await?;
    user.active = false;
    repo.save(user).await?;
    tracing::info!("user {} deactivated their account", auth.id);

    Ok((jar.remove(Cookie::build(JWT_COOKIE).path("/")), ApiResponse::no_content()))
}

/// DELETE /users/:id. The user's reviews go with them, and the ratings of
/// the products they reviewed are recomputed.
pub async fn delete_user(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let user_id = parse_id(&id)?;
    state.repo::<User>().select_404(user_id).await?;

    let reviewed = reviews::delete_matching(&state, json!({ "user": user_id })).await?;
    let response = crud::delete_one::<User>(State(state.clone()), Path(id)).await?;
    for product in reviewed {
        ratings::recalculate(&state.store, product).await?;
    }
    tracing::info!("user {} deleted", user_id);

    Ok(response)
}

/// POST /users
pub async fn create_user() -> ApiError {
    ApiError::bad_request("This route is not defined! Please use /signup instead")
}
