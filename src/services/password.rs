use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::OsRng;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::AlbumTokenResponse;
use crate::services::access::PasswordRecords;
use crate::services::token::TokenCodec;
use crate::services::AlbumService;

/// Hash password using Argon2
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?
        .to_string();

    Ok(password_hash)
}

/// Verify password against hash; an unparseable hash never matches
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::error!("Invalid stored password hash: {}", e);
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// `verify_password` on the blocking pool; Argon2 is too slow for a runtime worker
pub async fn check_password(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("Password check task failed: {}", e)))
}

async fn hash_password_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
}

/// Album password records
pub struct AlbumPasswordService;

impl AlbumPasswordService {
    /// Argon2 hash of the album password, if the album has one
    pub async fn stored_hash(db: &Database, album_id: i64) -> Result<Option<String>> {
        let hash = sqlx::query_scalar("SELECT password_hash FROM album_passwords WHERE album_id = ?")
            .bind(album_id)
            .fetch_optional(db.pool())
            .await?;
        Ok(hash)
    }

    pub async fn has_password(db: &Database, album_id: i64) -> Result<bool> {
        Ok(Self::stored_hash(db, album_id).await?.is_some())
    }

    /// Create or replace the album password
    pub async fn set_password(db: &Database, album_id: i64, password: Option<&str>) -> Result<()> {
        let password = password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::BadRequest("Password cannot be empty".to_string()))?;

        AlbumService::ensure_exists(db, album_id).await?;

        let password_hash = hash_password_blocking(password.to_string()).await?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO album_passwords (album_id, password_hash, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(album_id) DO UPDATE SET password_hash = excluded.password_hash
            "#,
        )
        .bind(album_id)
        .bind(&password_hash)
        .bind(&now)
        .execute(db.pool())
        .await?;

        tracing::info!("Password set for album {}", album_id);
        Ok(())
    }

    pub async fn remove_password(db: &Database, album_id: i64) -> Result<()> {
        AlbumService::ensure_exists(db, album_id).await?;

        sqlx::query("DELETE FROM album_passwords WHERE album_id = ?")
            .bind(album_id)
            .execute(db.pool())
            .await?;

        tracing::info!("Password removed from album {}", album_id);
        Ok(())
    }

    /// Check the album password and hand out a signed access token
    pub async fn verify_and_issue(
        db: &Database,
        codec: &TokenCodec,
        album_id: i64,
        password: Option<&str>,
    ) -> Result<AlbumTokenResponse> {
        let password = password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::BadRequest("Password cannot be empty".to_string()))?;

        AlbumService::ensure_exists(db, album_id).await?;

        let hash = Self::stored_hash(db, album_id)
            .await?
            .ok_or_else(|| AppError::BadRequest("Album has no password".to_string()))?;

        if !check_password(password.to_string(), hash).await? {
            return Err(AppError::Unauthorized("Invalid password".to_string()));
        }

        Ok(AlbumTokenResponse {
            token: codec.issue(album_id).to_string(),
            token_type: "Bearer".to_string(),
            expires_in: codec.validity_secs(),
        })
    }
}

#[async_trait]
impl PasswordRecords for Database {
    async fn password_hash(&self, album_id: i64) -> Result<Option<String>> {
        AlbumPasswordService::stored_hash(self, album_id).await
    }
}
