//! Account service: signup, login and profile lookup.

use std::collections::HashMap;
use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use tryon_models::{AuthResponse, Credentials, UserProfile};
use uuid::Uuid;

use crate::auth::JwtKeys;
use crate::error::{ApiError, ApiResult};
use crate::metrics;

/// Stored account.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    /// PHC-format Argon2 hash
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence seam for accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a record. Returns `false` when the username is taken.
    async fn insert(&self, record: UserRecord) -> ApiResult<bool>;

    async fn find_by_username(&self, username: &str) -> ApiResult<Option<UserRecord>>;

    async fn find_by_id(&self, id: &str) -> ApiResult<Option<UserRecord>>;
}

/// Process-local store keyed by username.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, record: UserRecord) -> ApiResult<bool> {
        let mut users = self.users.write().await;
        if users.contains_key(&record.username) {
            return Ok(false);
        }
        users.insert(record.username.clone(), record);
        Ok(true)
    }

    async fn find_by_username(&self, username: &str) -> ApiResult<Option<UserRecord>> {
        Ok(self.users.read().await.get(username).cloned())
    }

    async fn find_by_id(&self, id: &str) -> ApiResult<Option<UserRecord>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.id == id)
            .cloned())
    }
}

/// Account operations over a [`UserStore`].
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    keys: Arc<JwtKeys>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, keys: Arc<JwtKeys>) -> Self {
        Self { store, keys }
    }

    /// Register a new account and issue a token.
    pub async fn signup(&self, credentials: &Credentials) -> ApiResult<AuthResponse> {
        if self
            .store
            .find_by_username(&credentials.username)
            .await?
            .is_some()
        {
            metrics::record_auth_attempt("signup", "duplicate");
            return Err(ApiError::bad_request("User already exists"));
        }

        let password = credentials.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| {
                warn!("Password hashing task failed: {}", e);
                ApiError::internal("Signup failed")
            })??;

        let record = UserRecord {
            id: Uuid::new_v4().to_string(),
            username: credentials.username.clone(),
            password_hash,
            created_at: Utc::now(),
        };
        let id = record.id.clone();

        // The store re-checks under its own lock; a concurrent signup may win
        if !self.store.insert(record).await? {
            metrics::record_auth_attempt("signup", "duplicate");
            return Err(ApiError::bad_request("User already exists"));
        }

        let token = self.keys.issue(&id, &credentials.username).map_err(|e| {
            warn!("Token issue failed: {}", e);
            ApiError::internal("Signup failed")
        })?;

        metrics::record_auth_attempt("signup", "success");
        info!(username = %credentials.username, "User registered");
        Ok(AuthResponse {
            token,
            username: credentials.username.clone(),
        })
    }

    /// Check credentials and issue a token.
    pub async fn login(&self, credentials: &Credentials) -> ApiResult<AuthResponse> {
        let Some(record) = self.store.find_by_username(&credentials.username).await? else {
            debug!(username = %credentials.username, "Login for unknown user");
            metrics::record_auth_attempt("login", "rejected");
            return Err(ApiError::unauthorized("Invalid credentials"));
        };

        let password = credentials.password.clone();
        let hash = record.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| {
                warn!("Password verification task failed: {}", e);
                ApiError::internal("Login failed")
            })?;

        if !valid {
            metrics::record_auth_attempt("login", "rejected");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }

        let token = self.keys.issue(&record.id, &record.username).map_err(|e| {
            warn!("Token issue failed: {}", e);
            ApiError::internal("Login failed")
        })?;

        metrics::record_auth_attempt("login", "success");
        info!(username = %record.username, "User logged in");
        Ok(AuthResponse {
            token,
            username: record.username,
        })
    }

    /// Profile for a token subject. Deleted accounts are unauthorized.
    pub async fn profile(&self, user_id: &str) -> ApiResult<UserProfile> {
        let record = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::unauthorized("User not found"))?;
        Ok(UserProfile {
            id: record.id,
            username: record.username,
        })
    }
}

fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            warn!("Password hashing failed: {}", e);
            ApiError::internal("Signup failed")
        })
}

fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is malformed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn service() -> (UserService, Arc<JwtKeys>) {
        let keys = Arc::new(JwtKeys::new("test-secret", Duration::from_secs(86_400)));
        let store: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
        (UserService::new(store, Arc::clone(&keys)), keys)
    }

    #[tokio::test]
    async fn test_signup_then_login() {
        let (users, keys) = service();
        let creds = Credentials::new("alice", "secret1");

        let signed_up = users.signup(&creds).await.unwrap();
        assert_eq!(signed_up.username, "alice");

        let logged_in = users.login(&creds).await.unwrap();
        let claims = keys.verify(&logged_in.token).unwrap();
        assert_eq!(claims.username, "alice");

        let profile = users.profile(&claims.sub).await.unwrap();
        assert_eq!(profile.username, "alice");
    }

    #[tokio::test]
    async fn test_duplicate_signup() {
        let (users, _) = service();
        let creds = Credentials::new("bob", "secret1");
        users.signup(&creds).await.unwrap();

        let err = users.signup(&creds).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref m) if m == "User already exists"));
    }

    #[tokio::test]
    async fn test_bad_login() {
        let (users, _) = service();
        users
            .signup(&Credentials::new("carol", "secret1"))
            .await
            .unwrap();

        let wrong = users
            .login(&Credentials::new("carol", "wrong-pass"))
            .await
            .unwrap_err();
        assert!(matches!(wrong, ApiError::Unauthorized(ref m) if m == "Invalid credentials"));

        let unknown = users
            .login(&Credentials::new("nobody", "secret1"))
            .await
            .unwrap_err();
        assert!(matches!(unknown, ApiError::Unauthorized(ref m) if m == "Invalid credentials"));
    }

    #[test]
    fn test_hash_is_not_plaintext() {
        let hash = hash_password("secret1").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("secret2", &hash));
        assert!(!verify_password("secret1", "not-a-hash"));
    }
}
