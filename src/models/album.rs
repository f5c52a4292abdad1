use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Album model
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Album {
    pub id: i64,
    pub name: String,
    pub cover_image_id: Option<i64>,
    pub shoot_date: Option<String>,
    pub model_name: Option<String>,
    pub location: Option<String>,
    pub created_at: String,
}

/// Album row for the overview listing
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AlbumListItem {
    pub id: i64,
    pub name: String,
    pub cover_image_id: Option<i64>,
    pub cover_filename: Option<String>,
    pub shoot_date: Option<String>,
    pub model_name: Option<String>,
    pub location: Option<String>,
    pub created_at: String,
    pub image_count: i64,
    pub has_password: bool,
}

/// Create album request
#[derive(Debug, Deserialize)]
pub struct CreateAlbumRequest {
    pub name: Option<String>,
    pub shoot_date: Option<String>,
    pub model_name: Option<String>,
    pub location: Option<String>,
}

/// Partial album update; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UpdateAlbumRequest {
    pub name: Option<String>,
    pub shoot_date: Option<String>,
    pub model_name: Option<String>,
    pub location: Option<String>,
    pub cover_image_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: i64,
}
