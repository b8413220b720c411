use axum::extract::{Path, RawQuery, State};
use axum::Extension;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::database::models::{Entity, Product, Review};
use crate::database::schema::Document;
use crate::error::ApiError;
use crate::handlers::crud::{find_documents, parse_id, single};
use crate::handlers::input::Payload;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::ratings;
use crate::state::AppState;

/// GET /reviews and GET /products/:id/reviews
pub async fn list_reviews(
    State(state): State<AppState>,
    product: Option<Path<String>>,
    RawQuery(raw): RawQuery,
) -> ApiResult {
    let scope = match product {
        Some(Path(id)) => Some(("product", json!(parse_id(&id)?))),
        None => None,
    };
    let docs = find_documents::<Review>(&state, raw.as_deref(), scope).await?;
    Ok(ApiResponse::list("reviews", docs))
}

/// POST /reviews and POST /products/:id/reviews. The author is always the
/// caller; the product comes from the path when nested.
pub async fn create_review(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    product: Option<Path<String>>,
    Payload(mut body): Payload<Document>,
) -> ApiResult {
    if let Some(Path(id)) = product {
        body.insert("product".to_string(), json!(parse_id(&id)?));
    }

    let product_id = body
        .get("product")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::validation("Review must belong to a product"))
        .and_then(parse_id)?;
    state.repo::<Product>().select_404(product_id).await?;

    let forced = json!({ "user": auth.id });
    let forced = forced.as_object().cloned().unwrap_or_default();
    let review = state.repo::<Review>().create(body, forced, state.clock.now()).await?;

    ratings::recalculate(&state.store, review.product).await?;
    Ok(ApiResponse::created(single(&review)?))
}

/// PATCH /reviews/:id
pub async fn update_review(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
    Payload(body): Payload<Document>,
) -> ApiResult {
    let id = parse_id(&id)?;
    owned_review(&state, &auth, id).await?;

    let review = state.repo::<Review>().update(id, body, Review::UPDATE_FIELDS).await?;
    ratings::recalculate(&state.store, review.product).await?;
    Ok(ApiResponse::success(single(&review)?))
}

/// DELETE /reviews/:id
pub async fn delete_review(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult {
    let id = parse_id(&id)?;
    owned_review(&state, &auth, id).await?;

    let review = state.repo::<Review>().delete(id).await?;
    ratings::recalculate(&state.store, review.product).await?;
    Ok(ApiResponse::no_content())
}

/// The review, if the caller wrote it or is an admin.
async fn owned_review(state: &AppState, auth: &AuthUser, id: Uuid) -> Result<Review, ApiError> {
    let review = state.repo::<Review>().select_404(id).await?;
    if review.user != auth.id && !auth.is_admin() {
        return Err(ApiError::forbidden("You can only change your own reviews"));
    }
    Ok(review)
}

/// Deletes every review matching `where_clause`. Returns the distinct
/// products those reviews belonged to.
pub async fn delete_matching(state: &AppState, where_clause: Value) -> Result<Vec<Uuid>, ApiError> {
    let repo = state.repo::<Review>();
    let mut products = Vec::new();
    for review in repo.select_any(where_clause).await? {
        repo.delete(review.id).await?;
        if !products.contains(&review.product) {
            products.push(review.product);
        }
    }
    Ok(products)
}
