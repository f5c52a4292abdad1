use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::{ApiResponse, Result};
use crate::models::{AlbumTokenResponse, HasPasswordResponse, PasswordRequest};
use crate::services::{AlbumPasswordService, AlbumService};
use crate::AppState;

/// GET /api/v1/albums/:album_id/has-password
pub async fn has_password(
    State(state): State<AppState>,
    Path(album_id): Path<i64>,
) -> Result<Json<ApiResponse<HasPasswordResponse>>> {
    AlbumService::ensure_exists(&state.db, album_id).await?;
    let has_password = AlbumPasswordService::has_password(&state.db, album_id).await?;
    Ok(Json(ApiResponse::success(HasPasswordResponse { has_password })))
}

/// Exchange the album password for an access token
/// POST /api/v1/albums/:album_id/verify-password
pub async fn verify_password(
    State(state): State<AppState>,
    Path(album_id): Path<i64>,
    Json(req): Json<PasswordRequest>,
) -> Result<Json<ApiResponse<AlbumTokenResponse>>> {
    let token = AlbumPasswordService::verify_and_issue(
        &state.db,
        state.gate.codec(),
        album_id,
        req.password.as_deref(),
    )
    .await?;
    Ok(Json(ApiResponse::success(token)))
}

/// POST /api/v1/albums/:album_id/password
pub async fn set_password(
    State(state): State<AppState>,
    Path(album_id): Path<i64>,
    Json(req): Json<PasswordRequest>,
) -> Result<Json<ApiResponse<()>>> {
    AlbumPasswordService::set_password(&state.db, album_id, req.password.as_deref()).await?;
    Ok(Json(ApiResponse::<()>::success_message("Password set")))
}

/// DELETE /api/v1/albums/:album_id/password
pub async fn remove_password(
    State(state): State<AppState>,
    Path(album_id): Path<i64>,
) -> Result<Json<ApiResponse<()>>> {
    AlbumPasswordService::remove_password(&state.db, album_id).await?;
    Ok(Json(ApiResponse::<()>::success_message("Password removed")))
}
