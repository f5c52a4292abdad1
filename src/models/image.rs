use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Image model
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Image {
    pub id: i64,
    pub album_id: i64,
    /// Name in the asset store, shared by every artifact of the image
    pub filename: String,
    /// Display name, as uploaded or renamed
    pub original_filename: String,
    pub file_size: i64,
    pub width: i64,
    pub height: i64,
    pub is_favorited: bool,
    pub description: Option<String>,
    pub uploaded_at: String,
}

/// Record to insert after the original has been stored
#[derive(Debug, Clone)]
pub struct NewImage {
    pub album_id: i64,
    pub filename: String,
    pub original_filename: String,
    pub file_size: i64,
    pub width: u32,
    pub height: u32,
}

/// Query for the artifact endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ImageFileQuery {
    /// original, thumbnail or compressed
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameImageRequest {
    pub new_filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDescriptionRequest {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct FavoriteResponse {
    pub is_favorited: bool,
}

#[derive(Debug, Serialize)]
pub struct ImageCountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: i64,
    pub filename: String,
    pub original_filename: String,
    pub width: u32,
    pub height: u32,
}
