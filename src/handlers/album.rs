use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::{ApiResponse, Result};
use crate::handlers::require_album_access;
use crate::middleware::auth::AlbumCredential;
use crate::models::{
    Album, AlbumListItem, CreateAlbumRequest, CreatedResponse, Image, ImageCountResponse,
    UpdateAlbumRequest,
};
use crate::services::{AlbumService, ImageService};
use crate::AppState;

/// List albums
/// GET /api/v1/albums
pub async fn list_albums(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<AlbumListItem>>>> {
    let albums = AlbumService::list_albums(&state.db).await?;
    Ok(Json(ApiResponse::success(albums)))
}

/// Create album
/// POST /api/v1/albums
pub async fn create_album(
    State(state): State<AppState>,
    Json(req): Json<CreateAlbumRequest>,
) -> Result<Json<ApiResponse<CreatedResponse>>> {
    let id = AlbumService::create_album(&state.db, req).await?;
    Ok(Json(ApiResponse::success(CreatedResponse { id })))
}

/// Update album
/// PUT /api/v1/albums/:album_id
pub async fn update_album(
    State(state): State<AppState>,
    Path(album_id): Path<i64>,
    Json(req): Json<UpdateAlbumRequest>,
) -> Result<Json<ApiResponse<Album>>> {
    let album = AlbumService::update_album(&state.db, album_id, req).await?;
    Ok(Json(ApiResponse::success(album)))
}

/// Delete album with all of its images
/// DELETE /api/v1/albums/:album_id
pub async fn delete_album(
    State(state): State<AppState>,
    Path(album_id): Path<i64>,
) -> Result<Json<ApiResponse<()>>> {
    AlbumService::delete_album(&state.db, state.resolver.store(), album_id).await?;
    Ok(Json(ApiResponse::<()>::success_message("Album deleted")))
}

/// List images of an album
/// GET /api/v1/albums/:album_id/images
pub async fn list_album_images(
    State(state): State<AppState>,
    Path(album_id): Path<i64>,
    AlbumCredential(credential): AlbumCredential,
) -> Result<Json<ApiResponse<Vec<Image>>>> {
    require_album_access(&state, album_id, &credential).await?;
    AlbumService::ensure_exists(&state.db, album_id).await?;
    let images = ImageService::list_images(&state.db, album_id).await?;
    Ok(Json(ApiResponse::success(images)))
}

/// GET /api/v1/albums/:album_id/image-count
pub async fn image_count(
    State(state): State<AppState>,
    Path(album_id): Path<i64>,
) -> Result<Json<ApiResponse<ImageCountResponse>>> {
    AlbumService::ensure_exists(&state.db, album_id).await?;
    let count = ImageService::count_images(&state.db, album_id).await?;
    Ok(Json(ApiResponse::success(ImageCountResponse { count })))
}
