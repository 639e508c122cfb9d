//! Request extractors shared by the API handlers
//!
//! Rejections render through [`ApiError`], so malformed bodies get the same
//! `{status, message}` shape as every other failure.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Form,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::ApiError;

/// Form field Plex puts the webhook JSON in
pub const PAYLOAD_FIELD: &str = "payload";

fn content_type(req: &Request) -> String {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// A request body that must be `application/json` holding a JSON object
#[derive(Debug, Clone)]
pub struct JsonObject(pub Map<String, Value>);

#[async_trait]
impl<S> FromRequest<S> for JsonObject
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !content_type(&req).starts_with("application/json") {
            return Err(ApiError::UnsupportedMediaType(
                "Content-Type must be application/json".to_string(),
            ));
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read request body: {}", e)))?;

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(JsonObject(map)),
            _ => Err(ApiError::BadRequest(
                "Request body must be a valid JSON object".to_string(),
            )),
        }
    }
}

/// The raw `payload` field of a webhook form post
///
/// Plex sends `multipart/form-data` (with a thumbnail part on some events);
/// `application/x-www-form-urlencoded` is accepted too. Any other body yields
/// `None`.
#[derive(Debug, Clone, Default)]
pub struct WebhookForm {
    pub payload: Option<String>,
}

#[async_trait]
impl<S> FromRequest<S> for WebhookForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = content_type(&req);

        if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;

            while let Some(field) = multipart
                .next_field()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?
            {
                if field.name() == Some(PAYLOAD_FIELD) {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                    return Ok(Self {
                        payload: Some(text),
                    });
                }
            }

            Ok(Self::default())
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(mut fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;

            Ok(Self {
                payload: fields.remove(PAYLOAD_FIELD),
            })
        } else {
            Ok(Self::default())
        }
    }
}
