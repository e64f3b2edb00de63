//! Photo upload handler.

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{debug, warn};
use tryon_models::UploadResponse;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Multipart field carrying the photo.
pub const UPLOAD_FIELD: &str = "image";

/// `POST /api/upload`
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            debug!(field = ?field.name(), "Skipping multipart field");
            continue;
        }

        let file_name = field.file_name().map(|s| s.to_string());
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let result = state.uploads.store(file_name.as_deref(), &bytes).await;
        match &result {
            Ok(_) => metrics::record_upload("stored", bytes.len()),
            Err(e) => {
                debug!(error = %e, "Upload rejected");
                metrics::record_upload("rejected", bytes.len());
            }
        }
        return result.map(Json);
    }

    metrics::record_upload("missing", 0);
    Err(ApiError::bad_request("No file uploaded"))
}

fn multipart_error(e: MultipartError) -> ApiError {
    let status = e.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Upload exceeds the request size limit".to_string())
    } else if status.is_client_error() {
        ApiError::bad_request(e.body_text())
    } else {
        warn!("Multipart read failed: {}", e);
        ApiError::internal("Upload failed")
    }
}
