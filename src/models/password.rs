use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HasPasswordResponse {
    pub has_password: bool,
}

/// Issued after a successful password check
#[derive(Debug, Serialize)]
pub struct AlbumTokenResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: u64,
}
