use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

use super::{trim_in_place, Entity, Upload};
use crate::database::schema::{Field, FieldKind, Schema, UniqueIndex};

static MOBILE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 \-]{6,18}[0-9]$").expect("Invalid regex"));

pub static SCHEMA: Schema = Schema {
    collection: "users",
    singular: "user",
    fields: &[
        Field::new("id", FieldKind::Uuid),
        Field::new("createdAt", FieldKind::Timestamp),
        Field::new("revision", FieldKind::Integer),
        Field::new("firstName", FieldKind::Text),
        Field::new("lastName", FieldKind::Text),
        Field::new("email", FieldKind::Text),
        Field::new("phoneNumber", FieldKind::Text),
        Field::new("image", FieldKind::Text),
        Field::new("role", FieldKind::Text),
        Field::hidden("password", FieldKind::Text),
        Field::new("passwordChangedAt", FieldKind::Timestamp),
        Field::hidden("passwordResetToken", FieldKind::Text),
        Field::hidden("passwordResetExpires", FieldKind::Timestamp),
        Field::hidden("active", FieldKind::Bool),
    ],
    unique: &[
        UniqueIndex { name: "users_email_key", fields: &["email"] },
        UniqueIndex { name: "users_phone_number_key", fields: &["phoneNumber"] },
    ],
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub revision: i64,
    #[validate(length(min = 1, max = 20, message = "First name must have between 1 and 20 characters"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 20, message = "Last name must have between 1 and 20 characters"))]
    pub last_name: String,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    pub phone_number: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub role: Role,
    /// bcrypt hash
    pub password: String,
    #[serde(default)]
    pub password_changed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub password_reset_token: Option<String>,
    #[serde(default)]
    pub password_reset_expires: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl User {
    /// Fields a user may change about themselves.
    pub const SELF_FIELDS: &'static [&'static str] = &["firstName", "lastName", "phoneNumber"];

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True when the password changed after a token issued at `iat`
    /// (seconds), which invalidates that token.
    pub fn changed_password_after(&self, iat: i64) -> bool {
        self.password_changed_at
            .map(|changed| changed.timestamp() > iat)
            .unwrap_or(false)
    }

    pub fn clear_reset_token(&mut self) {
        self.password_reset_token = None;
        self.password_reset_expires = None;
    }
}

impl Entity for User {
    const CREATE_FIELDS: &'static [&'static str] = &["firstName", "lastName", "email", "phoneNumber"];
    const UPDATE_FIELDS: &'static [&'static str] = &["firstName", "lastName", "email", "phoneNumber", "image", "role", "active"];
    const UPLOAD: Option<Upload> = Some(Upload { folder: "users", field: "image" });

    fn schema() -> &'static Schema {
        &SCHEMA
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn prepare(&mut self) {
        trim_in_place(&mut self.first_name);
        trim_in_place(&mut self.last_name);
        trim_in_place(&mut self.phone_number);
        self.email = self.email.trim().to_lowercase();
    }

    fn extra_checks(&self, errors: &mut BTreeMap<String, String>) {
        if !MOBILE_NUMBER.is_match(&self.phone_number) {
            errors.insert("phoneNumber".to_string(), "Please insert a valid phone number".to_string());
        }
    }
}
