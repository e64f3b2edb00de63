//! Client for the try-on backend.
//!
//! Uploads photos, resolves the returned paths against the backend origin,
//! downloads and decodes images, and wraps the signup/login endpoints.
//! Transient failures are retried with exponential backoff.

pub mod client;
pub mod error;

pub use client::{ClientConfig, TryOnClient};
pub use error::{TransportError, TransportResult};
