#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode},
};
use base64::{Engine as _, engine::general_purpose};
use image::{ExtendedColorType, ImageBuffer, ImageEncoder, Rgb, codecs::jpeg::JpegEncoder};
use serde_json::Value;
use std::{path::PathBuf, sync::Arc};
use taswira::{
    config::AppConfig,
    models::identity::{Credentials, Identity},
    routes::routes::routes,
    services::{
        auth_service::{AuthError, Authenticator},
        image_store::ImageStore,
        ingest_service::IngestService,
    },
    state::AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;

pub const USER: &str = "alice";
pub const TOKEN: &str = "good-token";

/// Accepts exactly one user/token pair.
pub struct FakeAuthenticator;

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        if credentials.token != TOKEN {
            return Err(AuthError::Rejected("401 Unauthorized".into()));
        }
        if credentials.username != USER {
            return Err(AuthError::LoginMismatch {
                claimed: credentials.username.clone(),
                actual: USER.into(),
            });
        }
        Ok(Identity::new(USER))
    }
}

pub struct TestServer {
    pub dir: TempDir,
    pub router: Router,
    pub store: ImageStore,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_limit(None).await
    }

    pub async fn with_limit(limit: Option<usize>) -> Self {
        let dir = TempDir::new().unwrap();
        let store = ImageStore::open(dir.path()).await.unwrap();
        let mut ingest = IngestService::new(store.clone());
        if let Some(limit) = limit {
            ingest = ingest.with_max_upload_bytes(limit);
        }

        let config = AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            instance: "http://forgejo.invalid".into(),
            img_root: PathBuf::from(dir.path()),
            subpath: "i/".into(),
        };
        let state = AppState::new(config, ingest, Arc::new(FakeAuthenticator));
        let router = routes().with_state(state);

        Self { dir, router, store }
    }

    pub fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body.to_vec())
    }

    pub async fn json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send(request).await;
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

pub fn basic_auth(user: &str, token: &str) -> String {
    format!(
        "Basic {}",
        general_purpose::STANDARD.encode(format!("{}:{}", user, token))
    )
}

/// Authenticated `POST /` as it arrives through the reverse proxy.
pub fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header("authorization", basic_auth(USER, TOKEN))
        .header("x-forwarded-proto", "https")
        .header("x-forwarded-host", "img.example.org")
        .body(Body::from(body))
        .unwrap()
}

pub fn delete_request(hash: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(format!("/?hash={}", hash))
        .header("authorization", basic_auth(USER, TOKEN))
        .body(Body::empty())
        .unwrap()
}

pub fn test_jpeg() -> Vec<u8> {
    let rgb = ImageBuffer::from_fn(40, 30, |x, y| Rgb([(x * 6) as u8, (y * 8) as u8, 77]));
    let mut out = Vec::new();
    JpegEncoder::new(&mut out)
        .write_image(rgb.as_raw(), 40, 30, ExtendedColorType::Rgb8)
        .unwrap();
    out
}
