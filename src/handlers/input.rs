use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Multipart, Request},
    http::{header, StatusCode},
    Json,
};
use serde_json::Value;

use crate::database::schema::{Document, Schema};
use crate::error::ApiError;
use crate::services::images;

/// JSON body whose rejections render as [`ApiError`].
pub struct Payload<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Payload<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Payload(value))
    }
}

#[derive(Debug)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub extension: &'static str,
}

/// A write body sent either as a JSON object or as `multipart/form-data`,
/// where the `image` part carries an uploaded picture.
#[derive(Debug)]
pub struct DocumentInput {
    pub fields: Document,
    pub image: Option<ImageUpload>,
    pub from_form: bool,
}

impl DocumentInput {
    /// Splits off the upload, converting form text to the collection's
    /// field kinds.
    pub fn into_parts(self, schema: &Schema) -> Result<(Document, Option<ImageUpload>), ApiError> {
        let mut fields = self.fields;
        if self.from_form {
            schema.coerce_form(&mut fields)?;
        }
        Ok((fields, self.image))
    }
}

#[async_trait]
impl<S> FromRequest<S> for DocumentInput
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("multipart/form-data"))
            .unwrap_or(false);

        if is_form {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(format!("Invalid form data. {}", e.body_text())))?;
            return read_form(multipart).await;
        }

        match Json::<Value>::from_request(req, state).await? {
            Json(Value::Object(fields)) => Ok(DocumentInput {
                fields,
                image: None,
                from_form: false,
            }),
            Json(_) => Err(ApiError::validation("Invalid input data. Expected a JSON object")),
        }
    }
}

async fn read_form(mut multipart: Multipart) -> Result<DocumentInput, ApiError> {
    let mut fields = Document::new();
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "image" {
            let content_type = field.content_type().unwrap_or_default().to_string();
            let Some(extension) = images::extension_for(&content_type) else {
                return Err(ApiError::bad_request("Not an image! Please upload only images."));
            };
            let bytes = field.bytes().await.map_err(form_error)?;
            image = Some(ImageUpload {
                bytes: bytes.to_vec(),
                content_type,
                extension,
            });
        } else {
            let text = field.text().await.map_err(form_error)?;
            fields.insert(name, Value::String(text));
        }
    }

    Ok(DocumentInput {
        fields,
        image,
        from_form: true,
    })
}

fn form_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::bad_request("Request body is too large")
    } else {
        ApiError::bad_request(format!("Invalid form data. {}", err.body_text()))
    }
}
