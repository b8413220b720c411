#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use shopfront_api::clock::ManualClock;
use shopfront_api::config::{AppConfig, StoreBackend};
use shopfront_api::database::models::{Role, User};
use shopfront_api::database::schema::Schema;
use shopfront_api::database::{Document, DocumentStore, MemoryStore, StoreError, Summary};
use shopfront_api::filter::FilterData;
use shopfront_api::services::{ImageStore, NotifyError, ResetNotifier};
use shopfront_api::state::AppState;

pub const PASSWORD: &str = "Secret#123";

/// Records reset links instead of sending them; can be told to fail.
#[derive(Default)]
pub struct CapturingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl ResetNotifier for CapturingNotifier {
    async fn send_reset(&self, email: &str, reset_url: &str) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Failed {
                recipient: email.to_string(),
                reason: "smtp unavailable".to_string(),
            });
        }
        self.sent.lock().unwrap().push((email.to_string(), reset_url.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct CapturingImages {
    pub saved: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl ImageStore for CapturingImages {
    async fn save(&self, path: &str, bytes: Vec<u8>) -> std::io::Result<()> {
        self.saved.lock().unwrap().push((path.to_string(), bytes.len()));
        Ok(())
    }
}

/// Detail carried by every [`BrokenStore`] failure; must never reach a client
/// outside development.
pub const BROKEN_DETAIL: &str = "replica db-internal-7 refused the connection";

/// A store whose every operation fails the way a lost database connection does.
pub struct BrokenStore;

impl BrokenStore {
    fn failure() -> StoreError {
        StoreError::Database(sqlx::Error::Protocol(BROKEN_DETAIL.to_string()))
    }
}

#[async_trait]
impl DocumentStore for BrokenStore {
    async fn find(&self, _schema: &'static Schema, _query: &FilterData) -> Result<Vec<Document>, StoreError> {
        Err(Self::failure())
    }

    async fn find_by_id(&self, _schema: &'static Schema, _id: uuid::Uuid) -> Result<Option<Document>, StoreError> {
        Err(StoreError::Malformed(BROKEN_DETAIL.to_string()))
    }

    async fn insert(&self, _schema: &'static Schema, _doc: Document) -> Result<Document, StoreError> {
        Err(Self::failure())
    }

    async fn replace(&self, _schema: &'static Schema, _id: uuid::Uuid, _doc: Document) -> Result<Option<Document>, StoreError> {
        Err(Self::failure())
    }

    async fn set_fields(&self, _schema: &'static Schema, _id: uuid::Uuid, _fields: Document) -> Result<Option<Document>, StoreError> {
        Err(Self::failure())
    }

    async fn delete(&self, _schema: &'static Schema, _id: uuid::Uuid) -> Result<Option<Document>, StoreError> {
        Err(Self::failure())
    }

    async fn summarize(&self, _schema: &'static Schema, _where_clause: Value, _field: &str) -> Result<Summary, StoreError> {
        Err(Self::failure())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(Self::failure())
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn token(&self) -> String {
        self.body["token"].as_str().unwrap_or_default().to_string()
    }

    pub fn set_cookie(&self) -> String {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<CapturingNotifier>,
    pub images: Arc<CapturingImages>,
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(Self::config(AppConfig::development()), Arc::new(MemoryStore::new()))
    }

    /// `base` adjusted for fast in-process tests.
    pub fn config(mut base: AppConfig) -> AppConfig {
        base.database.backend = StoreBackend::Memory;
        base.security.bcrypt_cost = 4;
        base.security.jwt_secret = "test-secret".to_string();
        base
    }

    pub fn with(config: AppConfig, store: Arc<dyn DocumentStore>) -> Self {
        let clock = Arc::new(ManualClock::new(start()));
        let notifier = Arc::new(CapturingNotifier::default());
        let images = Arc::new(CapturingImages::default());

        let state = AppState::new(config, store)
            .with_clock(clock.clone())
            .with_notifier(notifier.clone())
            .with_images(images.clone());
        let router = shopfront_api::app(state.clone());

        Self { state, router, clock, notifier, images }
    }

    pub async fn send(&self, request: Request<Body>) -> Result<TestResponse> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok(TestResponse { status, headers, body })
    }

    pub async fn call(&self, method: Method, path: &str, body: Option<Value>, token: Option<&str>) -> Result<TestResponse> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };
        self.send(request).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<TestResponse> {
        self.call(Method::GET, path, None, token).await
    }

    pub async fn post(&self, path: &str, body: Value, token: Option<&str>) -> Result<TestResponse> {
        self.call(Method::POST, path, Some(body), token).await
    }

    pub async fn patch(&self, path: &str, body: Value, token: Option<&str>) -> Result<TestResponse> {
        self.call(Method::PATCH, path, Some(body), token).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<TestResponse> {
        self.call(Method::DELETE, path, None, token).await
    }

    /// Multipart request with text fields and an optional `image` part.
    pub async fn multipart(
        &self,
        method: Method,
        path: &str,
        fields: &[(&str, &str)],
        image: Option<(&str, &[u8])>,
        token: &str,
    ) -> Result<TestResponse> {
        let boundary = "shopfront-test-boundary";
        let mut body: Vec<u8> = Vec::new();
        for (name, value) in fields {
            body.extend(format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes());
        }
        if let Some((content_type, bytes)) = image {
            body.extend(
                format!("--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"upload\"\r\nContent-Type: {content_type}\r\n\r\n")
                    .as_bytes(),
            );
            body.extend(bytes);
            body.extend(b"\r\n");
        }
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(method)
            .uri(path)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))?;
        self.send(request).await
    }

    /// Signs up a user and returns the login response.
    pub async fn signup(&self, email: &str, phone: &str) -> Result<TestResponse> {
        self.post(
            "/api/v1/users/signup",
            json!({
                "firstName": "Test",
                "lastName": "User",
                "email": email,
                "phoneNumber": phone,
                "password": PASSWORD,
                "passwordConfirm": PASSWORD
            }),
            None,
        )
        .await
    }

    /// A signed-up user holding the admin role; returns their token.
    pub async fn admin(&self) -> Result<String> {
        let res = self.signup("admin@shop.test", "+40 700 000 001").await?;
        let repo = self.state.repo::<User>();
        let mut user = repo
            .select_one(json!({ "email": "admin@shop.test" }))
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?
            .ok_or_else(|| anyhow::anyhow!("admin missing"))?;
        user.role = Role::Admin;
        repo.save(user).await.map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(res.token())
    }

    pub async fn create_product(&self, token: &str, name: &str, category: &str, price: f64) -> Result<Value> {
        let res = self
            .post(
                "/api/v1/products",
                json!({
                    "name": name,
                    "category": category,
                    "price": price,
                    "imgUrl": "public/images/products/sample.jpg"
                }),
                Some(token),
            )
            .await?;
        anyhow::ensure!(res.status == StatusCode::CREATED, "product create failed: {}", res.body);
        Ok(res.body["data"]["product"].clone())
    }
}
