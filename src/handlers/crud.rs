//! Handlers shared by every collection, generic over the entity type.

use axum::extract::{Path, RawQuery, State};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::database::models::Entity;
use crate::database::schema::Document;
use crate::database::Repository;
use crate::error::ApiError;
use crate::filter::FilterApi;
use crate::handlers::input::{DocumentInput, ImageUpload};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::images;
use crate::state::AppState;

pub async fn get_all<E: Entity>(State(state): State<AppState>, RawQuery(raw): RawQuery) -> ApiResult {
    let docs = find_documents::<E>(&state, raw.as_deref(), None).await?;
    Ok(ApiResponse::list(E::schema().collection, docs))
}

pub async fn get_one<E: Entity>(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let entity = state.repo::<E>().select_404(parse_id(&id)?).await?;
    Ok(ApiResponse::success(single::<E>(&entity)?))
}

pub async fn create_one<E: Entity>(State(state): State<AppState>, input: DocumentInput) -> ApiResult {
    let (mut fields, image) = input.into_parts(E::schema())?;
    let pending = attach_upload::<E>(&mut fields, image);

    let entity = state
        .repo::<E>()
        .create(fields, Document::new(), state.clock.now())
        .await?;
    store_upload(&state, pending);

    Ok(ApiResponse::created(single::<E>(&entity)?))
}

pub async fn update_one<E: Entity>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    input: DocumentInput,
) -> ApiResult {
    let id = parse_id(&id)?;
    let (mut fields, image) = input.into_parts(E::schema())?;
    let pending = attach_upload::<E>(&mut fields, image);

    let entity = state.repo::<E>().update(id, fields, E::UPDATE_FIELDS).await?;
    store_upload(&state, pending);

    Ok(ApiResponse::success(single::<E>(&entity)?))
}

pub async fn delete_one<E: Entity>(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    state.repo::<E>().delete(parse_id(&id)?).await?;
    Ok(ApiResponse::no_content())
}

/// Runs a client query string against a collection, optionally narrowed by
/// an extra equality condition. Hidden fields never leave.
pub async fn find_documents<E: Entity>(
    state: &AppState,
    raw_query: Option<&str>,
    scope: Option<(&str, Value)>,
) -> Result<Vec<Value>, ApiError> {
    let data = FilterApi::from_raw(raw_query, &state.config.filter)
        .filter()
        .sort()
        .project()
        .paginate()
        .into_data();
    let mut data = E::schema().check_query(data)?;

    if let Some((field, value)) = scope {
        let mut where_clause = match data.where_clause.take() {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        where_clause.insert(field.to_string(), value);
        data.where_clause = Some(Value::Object(where_clause));
    }

    let docs = state.repo::<E>().select_documents(&data).await?;
    Ok(docs
        .into_iter()
        .map(|doc| Value::Object(E::schema().strip_hidden(doc)))
        .collect())
}

/// `{<singular>: doc}`
pub fn single<E: Entity>(entity: &E) -> Result<Value, ApiError> {
    let key = E::schema().singular;
    let doc = Repository::<E>::present(entity)?;
    Ok(json!({ key: doc }))
}

pub fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("Invalid id: {}.", raw)))
}

/// Records the path of an uploaded image on the document. The bytes are
/// written only once the document itself has been stored.
pub fn attach_upload<E: Entity>(fields: &mut Document, image: Option<ImageUpload>) -> Option<(String, Vec<u8>)> {
    let (upload, image) = match (E::UPLOAD, image) {
        (Some(upload), Some(image)) => (upload, image),
        _ => return None,
    };
    let path = images::upload_path(upload.folder, image.extension);
    tracing::debug!("upload: {} bytes of {} for {}", image.bytes.len(), image.content_type, path);
    fields.insert(upload.field.to_string(), json!(path));
    Some((path, image.bytes))
}

pub fn store_upload(state: &AppState, pending: Option<(String, Vec<u8>)>) {
    if let Some((path, bytes)) = pending {
        images::spawn_save(state.images.clone(), path, bytes);
    }
}
