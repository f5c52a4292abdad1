use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::services::password::check_password;
use crate::services::token::TokenCodec;

/// Lookup of the password record that gates an album
#[async_trait]
pub trait PasswordRecords: Send + Sync {
    /// Stored password hash, or `None` when the album is open
    async fn password_hash(&self, album_id: i64) -> Result<Option<String>>;
}

/// What a client presented to open an album
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    None,
    Token(String),
    Password(String),
}

impl Credential {
    /// Prefer a token over a password; empty values count as absent
    pub fn from_parts(token: Option<String>, password: Option<String>) -> Self {
        let token = token.filter(|t| !t.is_empty());
        let password = password.filter(|p| !p.is_empty());
        match (token, password) {
            (Some(token), _) => Credential::Token(token),
            (None, Some(password)) => Credential::Password(password),
            (None, None) => Credential::None,
        }
    }
}

/// Why access was refused. Only logged; clients get one generic answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    CredentialRequired,
    EmptyPassword,
    InvalidToken,
    WrongPassword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied(DenyReason),
}

impl Access {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Access::Allowed)
    }
}

/// Decides whether a credential opens an album
pub struct AccessGate {
    codec: TokenCodec,
    records: Arc<dyn PasswordRecords>,
}

impl AccessGate {
    pub fn new(codec: TokenCodec, records: Arc<dyn PasswordRecords>) -> Self {
        Self { codec, records }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Errors only when the record lookup or the password check task fails
    pub async fn authorize(&self, album_id: i64, credential: &Credential) -> Result<Access> {
        if matches!(credential, Credential::Password(p) if p.is_empty()) {
            return Ok(Access::Denied(DenyReason::EmptyPassword));
        }

        let Some(hash) = self.records.password_hash(album_id).await? else {
            return Ok(Access::Allowed);
        };

        let access = match credential {
            Credential::None => Access::Denied(DenyReason::CredentialRequired),
            Credential::Token(token) => {
                if self.codec.verify(token, album_id) {
                    Access::Allowed
                } else {
                    Access::Denied(DenyReason::InvalidToken)
                }
            }
            Credential::Password(password) => {
                if check_password(password.clone(), hash).await? {
                    Access::Allowed
                } else {
                    Access::Denied(DenyReason::WrongPassword)
                }
            }
        };

        if let Access::Denied(reason) = access {
            tracing::debug!("Denied access to album {}: {:?}", album_id, reason);
        }
        Ok(access)
    }
}
