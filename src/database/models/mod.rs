pub mod product;
pub mod review;
pub mod user;

pub use product::{Category, Product};
pub use review::Review;
pub use user::{Role, User};

use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

use crate::database::schema::Schema;
use crate::error::{field_messages, ApiError};

/// Where an uploaded image for this entity is stored, and which field
/// records its path.
#[derive(Debug, Clone, Copy)]
pub struct Upload {
    pub folder: &'static str,
    pub field: &'static str,
}

/// A typed document stored in one collection.
pub trait Entity: Serialize + DeserializeOwned + Validate + Send + Sync + 'static {
    /// Fields a client may set when creating.
    const CREATE_FIELDS: &'static [&'static str];
    /// Fields a client may change on update.
    const UPDATE_FIELDS: &'static [&'static str];
    /// Fields `prepare` recomputes from others; written along with any update.
    const DERIVED_FIELDS: &'static [&'static str] = &[];
    const UPLOAD: Option<Upload> = None;

    fn schema() -> &'static Schema;

    fn id(&self) -> Uuid;

    /// Normalizes input and recomputes derived fields. Runs before every
    /// validation.
    fn prepare(&mut self) {}

    /// Rules the validator attributes cannot express.
    fn extra_checks(&self, _errors: &mut BTreeMap<String, String>) {}

    fn check(&self) -> Result<(), ApiError> {
        let mut errors = match self.validate() {
            Ok(()) => BTreeMap::new(),
            Err(e) => field_messages(&e),
        };
        self.extra_checks(&mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation_fields(errors))
        }
    }
}

pub(crate) fn trim_in_place(s: &mut String) {
    let trimmed = s.trim();
    if trimmed.len() != s.len() {
        *s = trimmed.to_string();
    }
}
