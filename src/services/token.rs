//! Signed album access tokens.
//!
//! Wire format: `album_{album_id}_{issued_at}_{signature}` where `issued_at` is
//! a unix timestamp in seconds and `signature` is the lowercase hex of the
//! left-truncated HMAC-SHA256 of `"{album_id}:{issued_at}"` under the server
//! secret. Validity is a server setting and is not carried in the token.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

use crate::config::TokenConfig;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_PREFIX: &str = "album";

/// Bytes of the MAC kept in the token
const SIGNATURE_BYTES: usize = 16;

/// A decoded access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub album_id: i64,
    pub issued_at: i64,
    pub signature: String,
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            TOKEN_PREFIX, self.album_id, self.issued_at, self.signature
        )
    }
}

impl AccessToken {
    /// Split a token string into its fields. Only the layout is checked here.
    pub fn parse(token: &str) -> Option<Self> {
        if !token.starts_with("album_") {
            return None;
        }

        let parts: Vec<&str> = token.split('_').collect();
        if parts.len() != 4 || parts[0] != TOKEN_PREFIX {
            return None;
        }

        let album_id: i64 = parts[1].parse().ok()?;
        let issued_at: i64 = parts[2].parse().ok()?;

        // Reject non-canonical numbers such as "+5" or "007"
        if album_id.to_string() != parts[1] || issued_at.to_string() != parts[2] {
            return None;
        }

        let signature = parts[3];
        if signature.len() != SIGNATURE_BYTES * 2
            || !signature
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return None;
        }

        Some(Self {
            album_id,
            issued_at,
            signature: signature.to_string(),
        })
    }
}

/// Issues and verifies album access tokens
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
    validity_secs: i64,
    skew_secs: i64,
}

impl TokenCodec {
    pub fn new(secret: &str, validity_minutes: u64, skew_seconds: u64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            validity_secs: (validity_minutes as i64).saturating_mul(60),
            skew_secs: skew_seconds as i64,
        }
    }

    pub fn from_config(config: &TokenConfig) -> Self {
        Self::new(&config.secret, config.expire_minutes, config.skew_seconds)
    }

    /// Token lifetime in seconds
    pub fn validity_secs(&self) -> u64 {
        self.validity_secs.max(0) as u64
    }

    pub fn issue(&self, album_id: i64) -> AccessToken {
        self.issue_at(album_id, Utc::now().timestamp())
    }

    pub fn issue_at(&self, album_id: i64, now: i64) -> AccessToken {
        let tag = self.mac(album_id, now).finalize().into_bytes();
        AccessToken {
            album_id,
            issued_at: now,
            signature: hex::encode(&tag[..SIGNATURE_BYTES]),
        }
    }

    /// Never errors: anything malformed, expired, forged or issued for a
    /// different album is simply `false`.
    pub fn verify(&self, token: &str, expected_album_id: i64) -> bool {
        self.verify_at(token, expected_album_id, Utc::now().timestamp())
    }

    pub fn verify_at(&self, token: &str, expected_album_id: i64, now: i64) -> bool {
        let Some(parsed) = AccessToken::parse(token) else {
            tracing::debug!("Rejected malformed album token");
            return false;
        };

        if parsed.album_id != expected_album_id {
            tracing::debug!(
                "Rejected token for album {} presented to album {}",
                parsed.album_id,
                expected_album_id
            );
            return false;
        }

        let age = now.saturating_sub(parsed.issued_at);
        if age > self.validity_secs || age < -self.skew_secs {
            tracing::debug!("Rejected album token outside validity window (age {}s)", age);
            return false;
        }

        let Ok(signature) = hex::decode(&parsed.signature) else {
            return false;
        };
        let valid = self
            .mac(parsed.album_id, parsed.issued_at)
            .verify_truncated_left(&signature)
            .is_ok();
        if !valid {
            tracing::debug!("Rejected album token with bad signature");
        }
        valid
    }

    fn mac(&self, album_id: i64, issued_at: i64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(format!("{}:{}", album_id, issued_at).as_bytes());
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn codec() -> TokenCodec {
        TokenCodec::new("test-secret", 30, 60)
    }

    #[test]
    fn issued_token_verifies_for_its_album() {
        let codec = codec();
        let token = codec.issue(42).to_string();
        assert!(token.starts_with("album_42_"));
        assert!(codec.verify(&token, 42));
    }

    #[test]
    fn token_is_bound_to_album() {
        let codec = codec();
        let token = codec.issue_at(42, NOW).to_string();
        assert!(!codec.verify_at(&token, 43, NOW));
    }

    #[test]
    fn token_expires_after_window() {
        let codec = codec();
        let token = codec.issue_at(1, NOW).to_string();
        assert!(codec.verify_at(&token, 1, NOW + 30 * 60));
        assert!(!codec.verify_at(&token, 1, NOW + 30 * 60 + 1));
    }

    #[test]
    fn future_tokens_only_tolerate_small_skew() {
        let codec = codec();
        let token = codec.issue_at(1, NOW + 30).to_string();
        assert!(codec.verify_at(&token, 1, NOW));

        let token = codec.issue_at(1, NOW + 3600).to_string();
        assert!(!codec.verify_at(&token, 1, NOW));
    }

    #[test]
    fn altered_signature_is_rejected() {
        let codec = codec();
        let token = codec.issue_at(9, NOW).to_string();

        let mut chars: Vec<char> = token.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '0' { '1' } else { '0' };
        let forged: String = chars.into_iter().collect();

        assert_ne!(forged, token);
        assert!(!codec.verify_at(&forged, 9, NOW));
    }

    #[test]
    fn extending_expiry_breaks_signature() {
        let codec = codec();
        let token = codec.issue_at(9, NOW);
        let extended = AccessToken {
            issued_at: NOW + 3600,
            ..token
        };
        assert!(!codec.verify_at(&extended.to_string(), 9, NOW + 3600));
    }

    #[test]
    fn other_secret_cannot_verify() {
        let token = codec().issue_at(5, NOW).to_string();
        let rotated = TokenCodec::new("rotated-secret", 30, 60);
        assert!(!rotated.verify_at(&token, 5, NOW));
    }

    #[test]
    fn legacy_unsigned_formats_are_rejected() {
        let codec = codec();
        assert!(!codec.verify_at("album_5_verified", 5, NOW));
        assert!(!codec.verify_at(&format!("album_5_verified_{}", NOW), 5, NOW));
    }

    #[test]
    fn malformed_input_fails_closed() {
        let codec = codec();
        let sig = codec.issue_at(5, NOW).signature;
        for token in [
            "".to_string(),
            "album".to_string(),
            "album_".to_string(),
            "photo_5_1_abc".to_string(),
            format!("album_x_{}_{}", NOW, sig),
            format!("album_5_{}_{}_extra", NOW, sig),
            format!("album_+5_{}_{}", NOW, sig),
            format!("album_5_{}_{}", NOW, sig.to_uppercase()),
            format!("album_5_{}_{}", NOW, &sig[..10]),
            format!("album_5_{}_{}zz", NOW, &sig[..30]),
        ] {
            assert!(!codec.verify_at(&token, 5, NOW), "accepted {:?}", token);
        }
    }

    #[test]
    fn parse_exposes_fields() {
        let token = codec().issue_at(12, NOW);
        let parsed = AccessToken::parse(&token.to_string()).unwrap();
        assert_eq!(parsed, token);
        assert_eq!(parsed.signature.len(), 32);
    }
}
