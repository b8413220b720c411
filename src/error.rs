// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::auth::password::PasswordError;
use crate::auth::TokenError;
use crate::database::store::StoreError;
use crate::filter::error::FilterError;

/// HTTP API error with appropriate status codes and client-friendly messages.
///
/// Every variant except `Internal` is operational: its message is safe to
/// show to clients as-is.
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    Validation {
        message: String,
        field_errors: Option<BTreeMap<String, String>>,
    },
    DuplicateKey(String),
    BadRequest(String),
    InvalidOrExpiredToken(String),

    // 401 Unauthorized
    Unauthenticated(String),
    InvalidCredentials(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 500, but with a message meant for the client
    Delivery(String),

    // 500 Internal Server Error, details never leave the server
    Internal(anyhow::Error),
}

/// Detail of an internal error, attached to the response extensions so the
/// error normalizer layer can log it.
#[derive(Debug, Clone)]
pub struct InternalErrorDetail(pub String);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. }
            | ApiError::DuplicateKey(_)
            | ApiError::BadRequest(_)
            | ApiError::InvalidOrExpiredToken(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) | ApiError::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Delivery(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::Validation { message, .. } => message,
            ApiError::DuplicateKey(msg)
            | ApiError::BadRequest(msg)
            | ApiError::InvalidOrExpiredToken(msg)
            | ApiError::Unauthenticated(msg)
            | ApiError::InvalidCredentials(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Delivery(msg) => msg,
            ApiError::Internal(_) => "Something went wrong",
        }
    }

    pub fn is_operational(&self) -> bool {
        !matches!(self, ApiError::Internal(_))
    }

    /// `fail` for client errors, `error` for server errors
    pub fn status_label(&self) -> &'static str {
        if self.status_code().is_client_error() {
            "fail"
        } else {
            "error"
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "status": self.status_label(),
            "message": self.message(),
        });

        if let ApiError::Validation { field_errors: Some(field_errors), .. } = self {
            body["errors"] = json!(field_errors);
        }

        body
    }
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            field_errors: None,
        }
    }

    pub fn validation_fields(field_errors: BTreeMap<String, String>) -> Self {
        let joined = field_errors.values().cloned().collect::<Vec<_>>().join(". ");
        ApiError::Validation {
            message: format!("Invalid input data. {}", joined),
            field_errors: Some(field_errors),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        ApiError::Unauthenticated(message.into())
    }

    pub fn invalid_credentials() -> Self {
        ApiError::InvalidCredentials("Incorrect email or password".to_string())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        ApiError::Internal(err.into())
    }
}

/// Flattens validator output into one message per field.
pub fn field_messages(errors: &validator::ValidationErrors) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (field, errs) in errors.field_errors() {
        let message = errs
            .iter()
            .map(|e| e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| format!("{} is invalid", field)))
            .collect::<Vec<_>>()
            .join(", ");
        out.insert(field.to_string(), message);
    }
    out
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::validation_fields(field_messages(&errors))
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { fields } => ApiError::DuplicateKey(format!(
                "Duplicate field value: {}. Please use another value",
                fields.join(", ")
            )),
            StoreError::Query(e) => e.into(),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        ApiError::validation(format!("Invalid query. {}", err))
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ApiError::unauthenticated("Your token has expired! Please log in again."),
            TokenError::Invalid(_) => ApiError::unauthenticated("Invalid token. Please log in again!"),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::Internal(err.into())
    }
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::bad_request("Request body is too large");
        }
        ApiError::validation(format!("Invalid input data. {}", rejection.body_text()))
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Internal(err) => write!(f, "{:#}", err),
            other => write!(f, "{}", other.message()),
        }
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let mut response = (self.status_code(), Json(self.to_json())).into_response();
        if let ApiError::Internal(err) = &self {
            response.extensions_mut().insert(InternalErrorDetail(format!("{:#}", err)));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_render_as_fail() {
        let err = ApiError::not_found("No product found with that ID");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            err.to_json(),
            json!({"status": "fail", "message": "No product found with that ID"})
        );
    }

    #[test]
    fn internal_errors_hide_their_detail() {
        let err = ApiError::internal(anyhow::anyhow!("connection refused"));
        assert!(!err.is_operational());
        assert_eq!(err.to_json(), json!({"status": "error", "message": "Something went wrong"}));

        let response = err.into_response();
        let detail = response.extensions().get::<InternalErrorDetail>().map(|d| d.0.clone());
        assert_eq!(detail.as_deref(), Some("connection refused"));
    }

    #[test]
    fn delivery_errors_are_operational() {
        let err = ApiError::Delivery("There was an error sending the email. Try again later!".into());
        assert!(err.is_operational());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_json()["status"], "error");
    }

    #[test]
    fn duplicate_store_error_names_the_fields() {
        let err: ApiError = StoreError::Duplicate { fields: vec!["email".into()] }.into();
        assert_eq!(err.message(), "Duplicate field value: email. Please use another value");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn validation_fields_are_listed() {
        let mut fields = BTreeMap::new();
        fields.insert("rating".to_string(), "Rating must be between 1 and 5".to_string());
        let err = ApiError::validation_fields(fields);
        let body = err.to_json();
        assert_eq!(body["message"], "Invalid input data. Rating must be between 1 and 5");
        assert_eq!(body["errors"]["rating"], "Rating must be between 1 and 5");
    }
}
