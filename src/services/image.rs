use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Image, NewImage, UploadResponse};
use crate::services::derivative::decoded_dimensions;
use crate::services::resolver::AssetResolver;
use crate::services::AlbumService;
use crate::storage::{ArtifactKind, AssetStore, ResourceKey};

/// Longest sanitized upload name kept in the stored filename
const MAX_NAME_LEN: usize = 80;

/// Image service
pub struct ImageService;

impl ImageService {
    /// Images of an album, newest first
    pub async fn list_images(db: &Database, album_id: i64) -> Result<Vec<Image>> {
        let images = sqlx::query_as(
            "SELECT * FROM images WHERE album_id = ? ORDER BY uploaded_at DESC, id DESC",
        )
        .bind(album_id)
        .fetch_all(db.pool())
        .await?;
        Ok(images)
    }

    pub async fn count_images(db: &Database, album_id: i64) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM images WHERE album_id = ?")
            .bind(album_id)
            .fetch_one(db.pool())
            .await?;
        Ok(count.0)
    }

    pub async fn get_image(db: &Database, image_id: i64) -> Result<Image> {
        sqlx::query_as("SELECT * FROM images WHERE id = ?")
            .bind(image_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("Image not found".to_string()))
    }

    /// Image lookup scoped to an album; an image of another album is not found
    pub async fn get_album_image(db: &Database, album_id: i64, image_id: i64) -> Result<Image> {
        sqlx::query_as("SELECT * FROM images WHERE id = ? AND album_id = ?")
            .bind(image_id)
            .bind(album_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("Image not found".to_string()))
    }

    pub fn resource_key(image: &Image) -> Result<ResourceKey> {
        ResourceKey::new(image.album_id, image.filename.clone())
    }

    /// Store an uploaded original, record it, and pre-build its derivatives
    pub async fn upload_image(
        db: &Database,
        resolver: &AssetResolver,
        album_id: i64,
        original_name: &str,
        data: Bytes,
    ) -> Result<UploadResponse> {
        if data.is_empty() {
            return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
        }

        AlbumService::ensure_exists(db, album_id).await?;

        // Decode fully before anything is stored
        let source = data.clone();
        let (width, height) = tokio::task::spawn_blocking(move || decoded_dimensions(&source))
            .await
            .map_err(|e| AppError::Internal(format!("Image validation task failed: {}", e)))?
            .map_err(|e| AppError::BadRequest(format!("Unsupported image: {}", e)))?;

        let filename = Self::stored_filename(original_name);
        let key = ResourceKey::new(album_id, filename.clone())?;
        let store = resolver.store();

        store.write(&key, ArtifactKind::Original, data.clone()).await?;

        let record = NewImage {
            album_id,
            filename: filename.clone(),
            original_filename: original_name.to_string(),
            file_size: data.len() as i64,
            width,
            height,
        };
        let image_id = match Self::insert_record(db, &record).await {
            Ok(id) => id,
            Err(e) => {
                if let Err(cleanup) = store.delete(&key, ArtifactKind::Original).await {
                    tracing::warn!("Failed to remove unrecorded original {}: {}", key, cleanup);
                }
                return Err(e);
            }
        };

        resolver.warm(&key).await;

        tracing::info!("Uploaded image {} as {} ({}x{})", image_id, filename, width, height);
        Ok(UploadResponse {
            id: image_id,
            filename,
            original_filename: record.original_filename,
            width,
            height,
        })
    }

    async fn insert_record(db: &Database, record: &NewImage) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO images (album_id, filename, original_filename, file_size, width, height, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.album_id)
        .bind(&record.filename)
        .bind(&record.original_filename)
        .bind(record.file_size)
        .bind(record.width as i64)
        .bind(record.height as i64)
        .bind(&now)
        .execute(db.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Delete all artifacts and the record
    pub async fn delete_image(db: &Database, store: &AssetStore, image_id: i64) -> Result<()> {
        let image = Self::get_image(db, image_id).await?;
        let key = Self::resource_key(&image)?;
        store.delete_all(&key).await?;
        Self::delete_record(db, &image).await?;
        tracing::info!("Deleted image {} ({})", image.id, image.filename);
        Ok(())
    }

    /// Drop a record whose original is gone, along with any derived leftovers
    pub async fn purge_orphan(db: &Database, store: &AssetStore, image: &Image) -> Result<()> {
        tracing::warn!(
            "Original for image {} ({}) is missing; removing its record",
            image.id,
            image.filename
        );
        let key = Self::resource_key(image)?;
        store.delete_all(&key).await?;
        Self::delete_record(db, image).await
    }

    async fn delete_record(db: &Database, image: &Image) -> Result<()> {
        let mut tx = db.pool().begin().await?;
        sqlx::query("UPDATE albums SET cover_image_id = NULL WHERE cover_image_id = ?")
            .bind(image.id)
            .execute(tx.as_mut())
            .await?;
        sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(image.id)
            .execute(tx.as_mut())
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Flip the favorite flag and return the new state
    pub async fn toggle_favorite(db: &Database, image_id: i64) -> Result<bool> {
        let image = Self::get_image(db, image_id).await?;
        let favorited = !image.is_favorited;
        sqlx::query("UPDATE images SET is_favorited = ? WHERE id = ?")
            .bind(favorited)
            .bind(image_id)
            .execute(db.pool())
            .await?;
        Ok(favorited)
    }

    /// Change the display name; stored artifacts keep their filename
    pub async fn rename_image(db: &Database, image_id: i64, new_name: Option<&str>) -> Result<()> {
        let new_name = new_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::BadRequest("New filename cannot be empty".to_string()))?;

        Self::get_image(db, image_id).await?;

        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM images WHERE original_filename = ? AND id != ?")
                .bind(new_name)
                .bind(image_id)
                .fetch_optional(db.pool())
                .await?;
        if existing.is_some() {
            return Err(AppError::Conflict("Filename already exists".to_string()));
        }

        sqlx::query("UPDATE images SET original_filename = ? WHERE id = ?")
            .bind(new_name)
            .bind(image_id)
            .execute(db.pool())
            .await?;
        Ok(())
    }

    pub async fn update_description(db: &Database, image_id: i64, description: &str) -> Result<()> {
        Self::get_image(db, image_id).await?;
        sqlx::query("UPDATE images SET description = ? WHERE id = ?")
            .bind(description)
            .bind(image_id)
            .execute(db.pool())
            .await?;
        Ok(())
    }

    /// `YYYYmmddHHMMSS_<8 hex>_<sanitized name>`
    pub fn stored_filename(original_name: &str) -> String {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let unique = Uuid::new_v4().simple().to_string();
        format!("{}_{}_{}", stamp, &unique[..8], Self::sanitize_filename(original_name))
    }

    fn sanitize_filename(name: &str) -> String {
        let base = name.rsplit(['/', '\\']).next().unwrap_or("");
        let cleaned: String = base
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let cleaned = cleaned.trim_start_matches('.');
        // Keep the tail so the extension survives
        let cleaned = if cleaned.len() > MAX_NAME_LEN {
            &cleaned[cleaned.len() - MAX_NAME_LEN..]
        } else {
            cleaned
        };
        if cleaned.is_empty() {
            "image".to_string()
        } else {
            cleaned.to_string()
        }
    }
}
