use chrono::Utc;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Album, AlbumListItem, CreateAlbumRequest, Image, UpdateAlbumRequest};
use crate::services::ImageService;
use crate::storage::AssetStore;

/// Album service
pub struct AlbumService;

impl AlbumService {
    /// All albums with cover, image count and whether they are gated
    pub async fn list_albums(db: &Database) -> Result<Vec<AlbumListItem>> {
        let albums = sqlx::query_as(
            r#"
            SELECT
              a.id,
              a.name,
              a.cover_image_id,
              i.filename AS cover_filename,
              a.shoot_date,
              a.model_name,
              a.location,
              a.created_at,
              (SELECT COUNT(*) FROM images WHERE album_id = a.id) AS image_count,
              CASE WHEN ap.id IS NOT NULL THEN 1 ELSE 0 END AS has_password
            FROM albums a
            LEFT JOIN images i ON a.cover_image_id = i.id
            LEFT JOIN album_passwords ap ON a.id = ap.album_id
            ORDER BY a.created_at DESC, a.id DESC
            "#,
        )
        .fetch_all(db.pool())
        .await?;
        Ok(albums)
    }

    pub async fn get_album(db: &Database, album_id: i64) -> Result<Album> {
        sqlx::query_as("SELECT * FROM albums WHERE id = ?")
            .bind(album_id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::NotFound("Album not found".to_string()))
    }

    pub async fn ensure_exists(db: &Database, album_id: i64) -> Result<()> {
        Self::get_album(db, album_id).await.map(|_| ())
    }

    pub async fn create_album(db: &Database, req: CreateAlbumRequest) -> Result<i64> {
        let name = req
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::BadRequest("Album name cannot be empty".to_string()))?;

        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            INSERT INTO albums (name, shoot_date, model_name, location, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&name)
        .bind(&req.shoot_date)
        .bind(&req.model_name)
        .bind(&req.location)
        .bind(&now)
        .execute(db.pool())
        .await?;

        let album_id = result.last_insert_rowid();
        tracing::info!("Created album {} ({})", album_id, name);
        Ok(album_id)
    }

    pub async fn update_album(db: &Database, album_id: i64, req: UpdateAlbumRequest) -> Result<Album> {
        Self::ensure_exists(db, album_id).await?;

        if matches!(req.name.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(AppError::BadRequest("Album name cannot be empty".to_string()));
        }

        if let Some(cover_id) = req.cover_image_id {
            let cover: Option<(i64,)> =
                sqlx::query_as("SELECT id FROM images WHERE id = ? AND album_id = ?")
                    .bind(cover_id)
                    .bind(album_id)
                    .fetch_optional(db.pool())
                    .await?;
            if cover.is_none() {
                return Err(AppError::BadRequest(
                    "Cover image must belong to the album".to_string(),
                ));
            }
        }

        sqlx::query(
            r#"
            UPDATE albums SET
              name = COALESCE(?, name),
              shoot_date = COALESCE(?, shoot_date),
              model_name = COALESCE(?, model_name),
              location = COALESCE(?, location),
              cover_image_id = COALESCE(?, cover_image_id)
            WHERE id = ?
            "#,
        )
        .bind(req.name.map(|n| n.trim().to_string()))
        .bind(&req.shoot_date)
        .bind(&req.model_name)
        .bind(&req.location)
        .bind(req.cover_image_id)
        .bind(album_id)
        .execute(db.pool())
        .await?;

        Self::get_album(db, album_id).await
    }

    /// Delete every artifact of every image, then the records
    pub async fn delete_album(db: &Database, store: &AssetStore, album_id: i64) -> Result<()> {
        Self::ensure_exists(db, album_id).await?;

        let images: Vec<Image> = sqlx::query_as("SELECT * FROM images WHERE album_id = ?")
            .bind(album_id)
            .fetch_all(db.pool())
            .await?;

        for image in &images {
            let key = ImageService::resource_key(image)?;
            store.delete_all(&key).await?;
        }

        let mut tx = db.pool().begin().await?;
        sqlx::query("DELETE FROM images WHERE album_id = ?")
            .bind(album_id)
            .execute(tx.as_mut())
            .await?;
        sqlx::query("DELETE FROM album_passwords WHERE album_id = ?")
            .bind(album_id)
            .execute(tx.as_mut())
            .await?;
        sqlx::query("DELETE FROM albums WHERE id = ?")
            .bind(album_id)
            .execute(tx.as_mut())
            .await?;
        tx.commit().await?;

        tracing::info!("Deleted album {} with {} images", album_id, images.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::AlbumPasswordService;

    fn request(name: &str) -> CreateAlbumRequest {
        CreateAlbumRequest {
            name: Some(name.to_string()),
            shoot_date: Some("2024-05-01".to_string()),
            model_name: None,
            location: Some("Lisbon".to_string()),
        }
    }

    #[tokio::test]
    async fn create_requires_name() {
        let db = Database::in_memory().await.unwrap();
        assert!(matches!(
            AlbumService::create_album(&db, request("   ")).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn list_reports_password_and_count() {
        let db = Database::in_memory().await.unwrap();
        let open = AlbumService::create_album(&db, request("Open")).await.unwrap();
        let gated = AlbumService::create_album(&db, request("Gated")).await.unwrap();
        AlbumPasswordService::set_password(&db, gated, Some("pw")).await.unwrap();

        let albums = AlbumService::list_albums(&db).await.unwrap();
        assert_eq!(albums.len(), 2);
        let find = |id: i64| albums.iter().find(|a| a.id == id).unwrap();
        assert!(!find(open).has_password);
        assert!(find(gated).has_password);
        assert_eq!(find(open).image_count, 0);
        assert!(find(open).cover_filename.is_none());
    }

    #[tokio::test]
    async fn update_is_partial() {
        let db = Database::in_memory().await.unwrap();
        let id = AlbumService::create_album(&db, request("Before")).await.unwrap();

        let album = AlbumService::update_album(
            &db,
            id,
            UpdateAlbumRequest {
                name: Some("After".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(album.name, "After");
        assert_eq!(album.location.as_deref(), Some("Lisbon"));
        assert_eq!(album.shoot_date.as_deref(), Some("2024-05-01"));
    }

    #[tokio::test]
    async fn cover_must_belong_to_album() {
        let db = Database::in_memory().await.unwrap();
        let id = AlbumService::create_album(&db, request("A")).await.unwrap();
        assert!(matches!(
            AlbumService::update_album(
                &db,
                id,
                UpdateAlbumRequest {
                    cover_image_id: Some(999),
                    ..Default::default()
                },
            )
            .await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn unknown_album_is_not_found() {
        let db = Database::in_memory().await.unwrap();
        assert!(matches!(
            AlbumService::get_album(&db, 42).await,
            Err(AppError::NotFound(_))
        ));
    }
}
