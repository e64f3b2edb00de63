//! Try-on backend HTTP client.

use std::path::Path;
use std::time::Duration;

use image::DynamicImage;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, info, warn};
use tryon_models::{AuthResponse, Credentials, ErrorBody, UploadResponse, UserProfile};
use url::Url;

use crate::error::{TransportError, TransportResult};

/// Multipart field carrying the photo.
pub const UPLOAD_FIELD: &str = "image";

/// Configuration for the backend client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend origin; upload paths are resolved against it
    pub origin: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries for transient failures
    pub max_retries: u32,
    /// First retry delay, doubled on each attempt
    pub retry_base_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:5000".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            origin: std::env::var("TRYON_ORIGIN").unwrap_or(defaults.origin),
            timeout: std::env::var("TRYON_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("TRYON_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_base_delay: defaults.retry_base_delay,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }
}

/// Client for the try-on backend.
pub struct TryOnClient {
    http: Client,
    origin: Url,
    config: ClientConfig,
}

impl TryOnClient {
    /// Create a new client.
    pub fn new(config: ClientConfig) -> TransportResult<Self> {
        let origin = Url::parse(&config.origin)?;
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(TransportError::Network)?;

        Ok(Self {
            http,
            origin,
            config,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> TransportResult<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Absolute URL for a server path such as `/uploads/x.png`.
    ///
    /// Absolute URLs are returned unchanged.
    pub fn resolve_url(&self, path: &str) -> TransportResult<Url> {
        Ok(self.origin.join(path)?)
    }

    /// Check if the backend answers its health endpoint.
    pub async fn health_check(&self) -> TransportResult<bool> {
        let url = self.resolve_url("/health")?;
        match self.http.get(url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                warn!("Backend health check error: {}", e);
                Ok(false)
            }
        }
    }

    /// Upload a photo and return its absolute URL.
    pub async fn upload_image(&self, path: &Path) -> TransportResult<Url> {
        if !path.exists() {
            return Err(TransportError::FileNotFound(path.to_path_buf()));
        }
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mime = mime_for(path);
        let url = self.resolve_url("/api/upload")?;

        debug!(path = %path.display(), size = bytes.len(), "Uploading image");

        let response = self
            .with_retry(|| async {
                // A multipart body is consumed by sending, so rebuild it per attempt
                let part = Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime)
                    .map_err(TransportError::Network)?;
                let form = Form::new().part(UPLOAD_FIELD, part);
                let response = self
                    .http
                    .post(url.clone())
                    .multipart(form)
                    .send()
                    .await?;
                check_status(response).await
            })
            .await?;

        let upload: UploadResponse = read_json(response).await?;
        let resolved = self.resolve_url(&upload.path)?;
        info!(url = %resolved, "Image uploaded");
        Ok(resolved)
    }

    /// Download and decode an image. Relative paths resolve against the origin.
    pub async fn fetch_image(&self, url: &str) -> TransportResult<DynamicImage> {
        let url = self.resolve_url(url)?;
        debug!(url = %url, "Fetching image");

        let response = self
            .with_retry(|| async {
                let response = self.http.get(url.clone()).send().await?;
                check_status(response).await
            })
            .await?;

        let bytes = response.bytes().await?;
        Ok(image::load_from_memory(&bytes)?)
    }

    /// Register a new account.
    pub async fn signup(&self, credentials: &Credentials) -> TransportResult<AuthResponse> {
        self.post_credentials("/api/auth/signup", credentials).await
    }

    /// Log in to an existing account.
    pub async fn login(&self, credentials: &Credentials) -> TransportResult<AuthResponse> {
        self.post_credentials("/api/auth/login", credentials).await
    }

    /// Profile of the token's owner.
    pub async fn me(&self, token: &str) -> TransportResult<UserProfile> {
        let url = self.resolve_url("/api/auth/me")?;
        let response = self
            .with_retry(|| async {
                let response = self.http.get(url.clone()).bearer_auth(token).send().await?;
                check_status(response).await
            })
            .await?;
        read_json(response).await
    }

    async fn post_credentials(
        &self,
        path: &str,
        credentials: &Credentials,
    ) -> TransportResult<AuthResponse> {
        let url = self.resolve_url(path)?;
        debug!(username = %credentials.username, endpoint = path, "Sending credentials");

        let response = self
            .with_retry(|| async {
                let response = self.http.post(url.clone()).json(credentials).send().await?;
                check_status(response).await
            })
            .await?;
        read_json(response).await
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> TransportResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = TransportResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_base_delay * 2u32.pow(attempt);
                    warn!(
                        "Backend request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| TransportError::ServiceUnavailable("no attempts made".to_string())))
    }
}

/// Map non-2xx responses to errors, reading the `{error}` body when present.
async fn check_status(response: Response) -> TransportResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or_else(|_| {
            if body.is_empty() {
                status.to_string()
            } else {
                body
            }
        });

    // 500 carries the route's own failure message; gateway-type errors retry
    let transient = matches!(
        status,
        StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
    );
    if transient {
        return Err(TransportError::ServiceUnavailable(format!(
            "{}: {}",
            status, message
        )));
    }

    Err(TransportError::Rejected {
        status: status.as_u16(),
        message,
    })
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> TransportResult<T> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body)
        .map_err(|e| TransportError::InvalidResponse(format!("unexpected body: {}", e)))
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.origin, "http://localhost:5000");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_resolve_url() {
        let client = TryOnClient::new(ClientConfig::default()).unwrap();
        assert_eq!(
            client.resolve_url("/uploads/a.png").unwrap().as_str(),
            "http://localhost:5000/uploads/a.png"
        );
        assert_eq!(
            client.resolve_url("https://cdn.example.com/b.png").unwrap().as_str(),
            "https://cdn.example.com/b.png"
        );
    }

    #[test]
    fn test_invalid_origin() {
        let result = TryOnClient::new(ClientConfig::default().with_origin("not a url"));
        assert!(matches!(result, Err(TransportError::InvalidUrl(_))));
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for(Path::new("me.JPG")), "image/jpeg");
        assert_eq!(mime_for(Path::new("me.png")), "image/png");
        assert_eq!(mime_for(Path::new("me")), "application/octet-stream");
    }
}
