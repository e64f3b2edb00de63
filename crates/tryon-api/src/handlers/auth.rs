//! Account handlers.

use axum::extract::State;
use axum::Json;
use tryon_models::{AuthResponse, Credentials, UserProfile};
use validator::Validate;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::extract::ApiJson;
use crate::metrics;
use crate::state::AppState;

/// `POST /api/auth/signup`
pub async fn signup(
    State(state): State<AppState>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> ApiResult<Json<AuthResponse>> {
    if let Err(e) = credentials.validate() {
        metrics::record_auth_attempt("signup", "invalid");
        return Err(e.into());
    }
    let response = state.users.signup(&credentials).await?;
    Ok(Json(response))
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    ApiJson(credentials): ApiJson<Credentials>,
) -> ApiResult<Json<AuthResponse>> {
    let response = state.users.login(&credentials).await?;
    Ok(Json(response))
}

/// `GET /api/auth/me`
pub async fn me(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<UserProfile>> {
    let profile = state.users.profile(&user.id).await?;
    Ok(Json(profile))
}
