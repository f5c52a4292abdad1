use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};

use crate::error::{ApiResponse, AppError, Result};
use crate::handlers::require_album_access;
use crate::middleware::auth::AlbumCredential;
use crate::models::{
    FavoriteResponse, ImageFileQuery, RenameImageRequest, UpdateDescriptionRequest, UploadResponse,
};
use crate::services::resolver::ResolveError;
use crate::services::ImageService;
use crate::storage::ArtifactKind;
use crate::AppState;

const CACHE_CONTROL: &str = "private, max-age=3600";

/// Serve an image artifact, rebuilding a missing derivative on demand
/// GET /api/v1/albums/:album_id/images/:image_id/file?type=original|thumbnail|compressed
pub async fn get_image_file(
    State(state): State<AppState>,
    Path((album_id, image_id)): Path<(i64, i64)>,
    Query(query): Query<ImageFileQuery>,
    AlbumCredential(credential): AlbumCredential,
) -> Result<Response> {
    let kind = match query.kind.as_deref() {
        None | Some("") => ArtifactKind::Compressed,
        Some(value) => ArtifactKind::from_str(value)
            .ok_or_else(|| AppError::BadRequest(format!("Invalid file type: {}", value)))?,
    };

    // Gate before the lookup so a locked album does not reveal its images
    require_album_access(&state, album_id, &credential).await?;

    let image = ImageService::get_album_image(&state.db, album_id, image_id).await?;
    let key = ImageService::resource_key(&image)?;

    let data = match state.resolver.fetch(&key, kind).await {
        Ok(data) => data,
        Err(ResolveError::SourceMissing) => {
            if kind.is_derived() {
                ImageService::purge_orphan(&state.db, state.resolver.store(), &image).await?;
            }
            return Err(ResolveError::SourceMissing.into());
        }
        Err(e) => return Err(e.into()),
    };

    let content_type = if kind.is_derived() {
        "image/jpeg".to_string()
    } else {
        mime_guess::from_path(&image.filename)
            .first_or_octet_stream()
            .to_string()
    };

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, data.len())
        .header(header::CACHE_CONTROL, CACHE_CONTROL)
        .body(Body::from(data))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}

/// Upload an image into an album
/// POST /api/v1/albums/:album_id/images
pub async fn upload_image(
    State(state): State<AppState>,
    Path(album_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadResponse>>> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::BadRequest(format!("Failed to process multipart: {}", e))
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("image").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read file: {}", e)))?;
        upload = Some((file_name, data));
    }

    let (file_name, data) =
        upload.ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;

    let uploaded =
        ImageService::upload_image(&state.db, &state.resolver, album_id, &file_name, data).await?;
    Ok(Json(ApiResponse::success(uploaded)))
}

/// DELETE /api/v1/images/:image_id
pub async fn delete_image(
    State(state): State<AppState>,
    Path(image_id): Path<i64>,
) -> Result<Json<ApiResponse<()>>> {
    ImageService::delete_image(&state.db, state.resolver.store(), image_id).await?;
    Ok(Json(ApiResponse::<()>::success_message("Image deleted")))
}

/// POST /api/v1/images/:image_id/favorite
pub async fn toggle_favorite(
    State(state): State<AppState>,
    Path(image_id): Path<i64>,
) -> Result<Json<ApiResponse<FavoriteResponse>>> {
    let is_favorited = ImageService::toggle_favorite(&state.db, image_id).await?;
    Ok(Json(ApiResponse::success(FavoriteResponse { is_favorited })))
}

/// POST /api/v1/images/:image_id/rename
pub async fn rename_image(
    State(state): State<AppState>,
    Path(image_id): Path<i64>,
    Json(req): Json<RenameImageRequest>,
) -> Result<Json<ApiResponse<()>>> {
    ImageService::rename_image(&state.db, image_id, req.new_filename.as_deref()).await?;
    Ok(Json(ApiResponse::<()>::success_message("Image renamed")))
}

/// PUT /api/v1/images/:image_id/description
pub async fn update_description(
    State(state): State<AppState>,
    Path(image_id): Path<i64>,
    Json(req): Json<UpdateDescriptionRequest>,
) -> Result<Json<ApiResponse<()>>> {
    ImageService::update_description(&state.db, image_id, &req.description).await?;
    Ok(Json(ApiResponse::<()>::success_message("Description updated")))
}
