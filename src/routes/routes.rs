//! Defines routes for the image store.
//!
//! ## Structure
//! - `POST   /`                 — upload an image (authenticated)
//! - `DELETE /?hash=<fp>`       — delete an image (authenticated)
//! - `GET    /{fp}.png`         — fetch a stored image
//! - `GET    /healthz`, `/readyz` — probes
//!
//! Every response carries a `Server: taswira/v<version>` header.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        image_handlers::{delete_image, get_image, upload_image},
    },
    services::auth_service::USER_AGENT,
    state::AppState,
};
use axum::{
    Router,
    http::{HeaderValue, header},
    middleware,
    response::Response,
    routing::{get, post},
};

/// Build the router. The caller attaches `AppState` with `with_state`.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/", post(upload_image).delete(delete_image))
        .route("/{filename}", get(get_image))
        .layer(middleware::map_response(server_header))
}

async fn server_header(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::SERVER, HeaderValue::from_static(USER_AGENT));
    response
}
