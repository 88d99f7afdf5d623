pub mod auth;
pub mod health_handlers;
pub mod image_handlers;
