//! HTTP handlers for image upload, deletion and retrieval.
//! Upload bodies are read chunk by chunk so the size ceiling is enforced
//! before an oversized body is fully buffered; everything else is delegated
//! to `IngestService`.

use crate::{
    errors::AppError,
    handlers::auth::{AuthenticatedUser, UrlPrefix},
    models::fingerprint::Fingerprint,
    services::ingest_service::check_size,
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::warn;

/// Success body: `{"message":"ok"}`, plus `url` for uploads.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OkResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl OkResponse {
    fn ok(url: Option<String>) -> Self {
        Self {
            message: "ok".into(),
            url,
        }
    }
}

/// Query params accepted by `DELETE /`.
#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub hash: String,
}

/// `POST /` — upload an image; the body is the raw encoded image.
pub async fn upload_image(
    State(state): State<AppState>,
    AuthenticatedUser(who): AuthenticatedUser,
    UrlPrefix(prefix): UrlPrefix,
    body: Body,
) -> Result<Json<OkResponse>, AppError> {
    let limit = state.ingest.max_upload_bytes();
    let mut stream = body.into_data_stream();
    let mut upload = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| {
            warn!(user = %who.login, error = %err, "error reading image");
            AppError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("error reading image: {}", err),
            )
        })?;
        check_size(upload.len() + chunk.len(), limit).inspect_err(|err| {
            warn!(user = %who.login, error = %err, "upload rejected");
        })?;
        upload.extend_from_slice(&chunk);
    }

    let ingested = state.ingest.ingest(upload, &who).await?;
    Ok(Json(OkResponse::ok(Some(ingested.locator(&prefix)))))
}

/// `DELETE /?hash=<fingerprint>` — remove a stored image.
pub async fn delete_image(
    State(state): State<AppState>,
    AuthenticatedUser(who): AuthenticatedUser,
    query: Result<Query<DeleteQuery>, QueryRejection>,
) -> Result<Json<OkResponse>, AppError> {
    let Query(q) = query.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    state.ingest.delete(&q.hash, &who).await?;
    Ok(Json(OkResponse::ok(None)))
}

/// `GET /{fingerprint}.png` — stream a stored image.
pub async fn get_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let fp = Fingerprint::from_filename(&filename)
        .map_err(|_| AppError::not_found(format!("nonexistent image: {}", filename)))?;

    let file = state.ingest.store().open_object(&fp).await?;
    let len = file.metadata().await.map_err(|err| AppError::internal(err.to_string()))?.len();

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    Ok(response)
}
