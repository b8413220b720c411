use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{trim_in_place, Entity};
use crate::database::schema::{Field, FieldKind, Schema, UniqueIndex};

pub static SCHEMA: Schema = Schema {
    collection: "reviews",
    singular: "review",
    fields: &[
        Field::new("id", FieldKind::Uuid),
        Field::new("createdAt", FieldKind::Timestamp),
        Field::new("revision", FieldKind::Integer),
        Field::new("comment", FieldKind::Text),
        Field::new("rating", FieldKind::Integer),
        Field::new("product", FieldKind::Uuid),
        Field::new("user", FieldKind::Uuid),
    ],
    unique: &[UniqueIndex { name: "reviews_product_user_key", fields: &["product", "user"] }],
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub revision: i64,
    #[validate(length(min = 1, max = 250, message = "A review must have between 1 and 250 characters"))]
    pub comment: String,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i64,
    pub product: Uuid,
    pub user: Uuid,
}

impl Entity for Review {
    const CREATE_FIELDS: &'static [&'static str] = &["comment", "rating", "product"];
    const UPDATE_FIELDS: &'static [&'static str] = &["comment", "rating"];

    fn schema() -> &'static Schema {
        &SCHEMA
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn prepare(&mut self) {
        trim_in_place(&mut self.comment);
    }
}
