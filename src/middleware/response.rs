use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};

/// Success envelope: `{status: "success", token?, results?, message?, data?}`.
#[derive(Debug)]
pub struct ApiResponse {
    pub status_code: StatusCode,
    pub token: Option<String>,
    pub results: Option<usize>,
    pub message: Option<String>,
    pub data: Option<Value>,
}

impl ApiResponse {
    pub fn with_status(status_code: StatusCode) -> Self {
        Self {
            status_code,
            token: None,
            results: None,
            message: None,
            data: None,
        }
    }

    /// 200 with a `data` section
    pub fn success(data: Value) -> Self {
        Self::with_status(StatusCode::OK).data(data)
    }

    /// 201 with a `data` section
    pub fn created(data: Value) -> Self {
        Self::with_status(StatusCode::CREATED).data(data)
    }

    /// 200 with nothing but the status
    pub fn ok() -> Self {
        Self::with_status(StatusCode::OK)
    }

    pub fn no_content() -> Self {
        Self::with_status(StatusCode::NO_CONTENT)
    }

    /// 200 listing: `results` is the number of items.
    pub fn list(key: &str, items: Vec<Value>) -> Self {
        let results = items.len();
        let mut response = Self::success(json!({ key: items }));
        response.results = Some(results);
        response
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        if self.status_code == StatusCode::NO_CONTENT {
            return self.status_code.into_response();
        }

        let mut envelope = json!({ "status": "success" });
        if let Some(token) = self.token {
            envelope["token"] = json!(token);
        }
        if let Some(results) = self.results {
            envelope["results"] = json!(results);
        }
        if let Some(message) = self.message {
            envelope["message"] = json!(message);
        }
        if let Some(data) = self.data {
            envelope["data"] = data;
        }

        (self.status_code, Json(envelope)).into_response()
    }
}

pub type ApiResult = Result<ApiResponse, crate::error::ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_counts_results() {
        let response = ApiResponse::list("products", vec![json!({"name": "a"}), json!({"name": "b"})]);
        assert_eq!(response.results, Some(2));
        assert_eq!(response.status_code, StatusCode::OK);
    }

    #[test]
    fn no_content_has_no_body() {
        let response = ApiResponse::no_content().into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
