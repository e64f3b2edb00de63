//! Axum HTTP API server.
//!
//! This crate provides:
//! - Photo upload with content sniffing and static serving of uploads
//! - Username/password accounts with Argon2 hashes and HS256 JWTs
//! - Rate limiting on the auth endpoints and security headers
//! - Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use auth::{AuthUser, Claims, JwtKeys};
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use extract::ApiJson;
pub use routes::create_router;
pub use services::{InMemoryUserStore, UploadService, UserService, UserStore};
pub use state::AppState;
