pub mod album;
pub mod image;
pub mod password;

use crate::error::{AppError, Result};
use crate::services::access::Credential;
use crate::AppState;

/// Fail with 401 unless the credential opens the album
pub(crate) async fn require_album_access(
    state: &AppState,
    album_id: i64,
    credential: &Credential,
) -> Result<()> {
    if state.gate.authorize(album_id, credential).await?.is_allowed() {
        Ok(())
    } else {
        Err(AppError::Unauthorized(
            "Album is password protected".to_string(),
        ))
    }
}
