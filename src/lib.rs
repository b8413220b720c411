pub mod auth;
pub mod cli;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod middleware;
pub mod services;
pub mod state;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::database::models::{Product, Review, User};
use crate::handlers::{auth as auth_handlers, crud, products, reviews, users};
use crate::middleware::{identify, normalize_errors, protect, restrict_admin, route_not_found, ApiResponse};
use crate::state::AppState;

/// Builds the full application router.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .nest("/users", user_routes(&state))
        .nest("/products", product_routes(&state))
        .nest("/reviews", review_routes(&state));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .nest_service("/public", ServeDir::new(&state.config.uploads.public_dir))
        .fallback(route_not_found)
        .layer(from_fn_with_state(state.clone(), normalize_errors))
        .layer(DefaultBodyLimit::max(state.config.server.max_request_size_bytes))
        .layer(cors_layer(&state.config.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn user_routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/signup", post(auth_handlers::signup))
        .route("/login", post(auth_handlers::login))
        .route("/logout", get(auth_handlers::logout))
        .route("/forgotPassword", post(auth_handlers::forgot_password))
        .route("/resetPassword/:token", patch(auth_handlers::reset_password));

    let protected = Router::new()
        .route("/updateMyPassword", patch(auth_handlers::update_my_password))
        .route("/getMe", get(users::get_me))
        .route("/updateMe", patch(users::update_me))
        .route("/deleteMe", delete(users::delete_me))
        .route_layer(from_fn_with_state(state.clone(), protect));

    let admin = Router::new()
        .route("/", get(crud::get_all::<User>).post(users::create_user))
        .route(
            "/:id",
            get(crud::get_one::<User>)
                .patch(crud::update_one::<User>)
                .delete(users::delete_user),
        )
        .route_layer(from_fn(restrict_admin))
        .route_layer(from_fn_with_state(state.clone(), protect));

    public.merge(protected).merge(admin)
}

fn product_routes(state: &AppState) -> Router<AppState> {
    let browse = Router::new()
        .route("/", get(crud::get_all::<Product>))
        .route("/:id", get(products::get_product))
        .route("/:id/reviews", get(reviews::list_reviews))
        .route_layer(from_fn_with_state(state.clone(), identify));

    let review = Router::new()
        .route("/:id/reviews", post(reviews::create_review))
        .route_layer(from_fn_with_state(state.clone(), protect));

    let admin = Router::new()
        .route("/", post(crud::create_one::<Product>))
        .route(
            "/:id",
            patch(crud::update_one::<Product>).delete(products::delete_product),
        )
        .route_layer(from_fn(restrict_admin))
        .route_layer(from_fn_with_state(state.clone(), protect));

    browse.merge(review).merge(admin)
}

fn review_routes(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/", get(reviews::list_reviews))
        .route("/:id", get(crud::get_one::<Review>));

    let protected = Router::new()
        .route("/", post(reviews::create_review))
        .route("/:id", patch(reviews::update_review).delete(reviews::delete_review))
        .route_layer(from_fn_with_state(state.clone(), protect));

    public.merge(protected)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS];
    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

    if allowed.is_empty() || origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any).allow_methods(methods).allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_methods(methods)
            .allow_headers([axum::http::header::AUTHORIZATION, axum::http::header::CONTENT_TYPE])
            .allow_credentials(true)
    }
}

/// GET /health
async fn health(State(state): State<AppState>) -> Response {
    let now = state.clock.now();
    match state.store.ping().await {
        Ok(()) => ApiResponse::ok()
            .data(json!({ "status": "ok", "timestamp": now, "database": "ok" }))
            .into_response(),
        Err(e) => {
            tracing::error!("health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error", "message": "database unavailable" })),
            )
                .into_response()
        }
    }
}
