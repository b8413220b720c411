use axum::extract::{Path, State};
use axum::Extension;
use serde_json::{json, Value};

use crate::database::models::{Product, Review};
use crate::database::Repository;
use crate::handlers::crud::{self, parse_id, single};
use crate::handlers::reviews;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;

/// GET /products/:id. An identified caller also gets their own review of
/// the product as `userReview`.
pub async fn get_product(
    State(state): State<AppState>,
    identity: Option<Extension<AuthUser>>,
    Path(id): Path<String>,
) -> ApiResult {
    let product = state.repo::<Product>().select_404(parse_id(&id)?).await?;
    let mut data = single(&product)?;

    if let Some(Extension(auth)) = identity {
        let own = state
            .repo::<Review>()
            .select_one(json!({ "product": product.id, "user": auth.id }))
            .await?;
        data["userReview"] = match own {
            Some(review) => Repository::present(&review)?,
            None => Value::Null,
        };
    }

    Ok(ApiResponse::success(data))
}

/// DELETE /products/:id, together with its reviews.
pub async fn delete_product(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let product_id = parse_id(&id)?;
    state.repo::<Product>().select_404(product_id).await?;

    reviews::delete_matching(&state, json!({ "product": product_id })).await?;
    crud::delete_one::<Product>(State(state), Path(id)).await
}
