use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{trim_in_place, Entity, Upload};
use crate::database::schema::{Field, FieldKind, Schema, UniqueIndex};

pub static SCHEMA: Schema = Schema {
    collection: "products",
    singular: "product",
    fields: &[
        Field::new("id", FieldKind::Uuid),
        Field::new("createdAt", FieldKind::Timestamp),
        Field::new("revision", FieldKind::Integer),
        Field::new("name", FieldKind::Text),
        Field::new("slug", FieldKind::Text),
        Field::new("category", FieldKind::Text),
        Field::new("price", FieldKind::Number),
        Field::new("summary", FieldKind::Text),
        Field::new("description", FieldKind::Text),
        Field::new("imgUrl", FieldKind::Text),
        Field::new("ratingsAverage", FieldKind::Number),
        Field::new("ratingsQuantity", FieldKind::Integer),
    ],
    unique: &[UniqueIndex { name: "products_name_key", fields: &["name"] }],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Door,
    Window,
    Net,
    Sill,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub revision: i64,
    #[validate(length(min = 3, max = 25, message = "A product name must have between 3 and 25 characters"))]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    pub category: Category,
    #[validate(range(min = 0.0, message = "Price must be a positive number"))]
    pub price: f64,
    #[validate(length(min = 20, max = 200, message = "A product summary must have between 20 and 200 characters"))]
    pub summary: Option<String>,
    #[validate(length(min = 20, max = 1500, message = "A product description must have between 20 and 1500 characters"))]
    pub description: Option<String>,
    #[validate(length(min = 1, message = "A product must have an image"))]
    pub img_url: String,
    #[serde(default)]
    pub ratings_average: f64,
    #[serde(default)]
    pub ratings_quantity: i64,
}

impl Entity for Product {
    const CREATE_FIELDS: &'static [&'static str] = &["name", "category", "price", "summary", "description", "imgUrl"];
    const UPDATE_FIELDS: &'static [&'static str] = &["name", "category", "price", "summary", "description", "imgUrl"];
    const DERIVED_FIELDS: &'static [&'static str] = &["slug"];
    const UPLOAD: Option<Upload> = Some(Upload { folder: "products", field: "imgUrl" });

    fn schema() -> &'static Schema {
        &SCHEMA
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn prepare(&mut self) {
        trim_in_place(&mut self.name);
        trim_in_place(&mut self.img_url);
        for text in [&mut self.summary, &mut self.description].into_iter().flatten() {
            trim_in_place(text);
        }
        self.slug = slugify(&self.name);
    }
}

/// Lowercase, with every run of non-alphanumeric characters collapsed to a
/// single `-` and no leading or trailing `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut gap = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            if gap && !slug.is_empty() {
                slug.push('-');
            }
            gap = false;
            slug.extend(c.to_lowercase());
        } else {
            gap = true;
        }
    }
    slug
}
