use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::models::{Product, Review};
use crate::database::{Document, DocumentStore, Repository};
use crate::error::ApiError;

/// Recomputes `ratingsAverage` and `ratingsQuantity` of a product from its
/// reviews. Missing products are skipped; the review may outlive them.
pub async fn recalculate(store: &Arc<dyn DocumentStore>, product_id: Uuid) -> Result<(), ApiError> {
    let reviews = Repository::<Review>::new(store.clone());
    let products = Repository::<Product>::new(store.clone());

    let summary = reviews.summarize(json!({ "product": product_id }), "rating").await?;

    let (average, quantity) = match summary.average {
        Some(avg) if summary.count > 0 => (round_one_decimal(avg), summary.count),
        _ => (0.0, 0),
    };

    let mut fields = Document::new();
    fields.insert("ratingsAverage".to_string(), json!(average));
    fields.insert("ratingsQuantity".to_string(), json!(quantity));
    match products.set_fields(product_id, fields).await {
        Err(ApiError::NotFound(_)) => {
            tracing::debug!("ratings: product {} no longer exists", product_id);
            return Ok(());
        }
        other => other?,
    };

    tracing::debug!("ratings: product {} now {} over {} reviews", product_id, average, quantity);
    Ok(())
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
