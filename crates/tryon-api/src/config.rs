//! API configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

/// Development-only signing secret; rejected in production.
const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// API server configuration.
#[derive(Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Auth endpoint rate limit, requests per second per IP
    pub rate_limit_rps: u32,
    /// Request timeout
    pub request_timeout: Duration,
    /// Max request body size
    pub max_body_size: usize,
    /// Max size of one uploaded photo
    pub max_upload_size: usize,
    /// Directory uploads are stored in and served from
    pub upload_dir: PathBuf,
    /// Accepted photo extensions, lowercase
    pub allowed_extensions: Vec<String>,
    /// HS256 signing secret
    pub jwt_secret: String,
    /// Token lifetime
    pub token_ttl: Duration,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 5,
            request_timeout: Duration::from_secs(30),
            max_body_size: 12 * 1024 * 1024, // 12MB
            max_upload_size: 10 * 1024 * 1024, // 10MB
            upload_dir: PathBuf::from("uploads"),
            allowed_extensions: ["jpg", "jpeg", "png", "webp", "gif", "bmp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl: Duration::from_secs(24 * 60 * 60),
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit_rps),
            request_timeout: std::env::var("REQUEST_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            max_upload_size: std::env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_upload_size),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            allowed_extensions: std::env::var("ALLOWED_EXTENSIONS")
                .map(|s| {
                    s.split(',')
                        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                        .filter(|e| !e.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.allowed_extensions),
            jwt_secret: std::env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            token_ttl: std::env::var("TOKEN_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.token_ttl),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> ApiResult<()> {
        if self.jwt_secret.is_empty() {
            return Err(ApiError::internal("JWT_SECRET must not be empty"));
        }
        if self.is_production() && self.jwt_secret == DEV_JWT_SECRET {
            return Err(ApiError::internal(
                "JWT_SECRET must be set in production",
            ));
        }
        if self.max_upload_size > self.max_body_size {
            return Err(ApiError::internal(
                "MAX_UPLOAD_SIZE must not exceed MAX_BODY_SIZE",
            ));
        }
        Ok(())
    }

    /// Whether `ext` is an accepted photo extension.
    pub fn extension_allowed(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.allowed_extensions.iter().any(|e| *e == ext)
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("cors_origins", &self.cors_origins)
            .field("rate_limit_rps", &self.rate_limit_rps)
            .field("max_body_size", &self.max_body_size)
            .field("max_upload_size", &self.max_upload_size)
            .field("upload_dir", &self.upload_dir)
            .field("allowed_extensions", &self.allowed_extensions)
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("environment", &self.environment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.token_ttl, Duration::from_secs(86_400));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dev_secret_rejected_in_production() {
        let config = ApiConfig {
            environment: "Production".to_string(),
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ApiConfig {
            jwt_secret: "a-real-secret".to_string(),
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_extension_allowed() {
        let config = ApiConfig::default();
        assert!(config.extension_allowed("PNG"));
        assert!(config.extension_allowed("jpeg"));
        assert!(!config.extension_allowed("svg"));
    }

    #[test]
    fn test_debug_hides_secret() {
        let rendered = format!("{:?}", ApiConfig::default());
        assert!(!rendered.contains(DEV_JWT_SECRET));
    }
}
