//! Signed verification tokens.
//!
//! A token embeds a product id, issue time, nonce, and optional expiry. The
//! wire form is URL-safe base64 of `payload || hmac-sha256-tag`. Signature
//! comparison is constant time.

use std::{fmt, time::Duration};

use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use hmac::{Hmac, Mac};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;
use zeroize::Zeroize;

use crate::ids::ProductUuid;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA-256 tag length appended to the payload.
const SIGNATURE_BYTES: usize = 32;

/// Process-lifetime signing secret.
pub struct TokenSecret {
    bytes: Vec<u8>,
}

impl TokenSecret {
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: secret.into(),
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for TokenSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenSecret(**redacted**)")
    }
}

impl Drop for TokenSecret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// Decoded token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationToken {
    pub product_id: ProductUuid,

    /// Issue time, unix seconds.
    pub timestamp: i64,

    pub nonce: String,

    /// Expiry, unix seconds. Absent means the token never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("invalid verification token")]
    Invalid,

    #[error("invalid token signature")]
    Signature,

    #[error("verification token expired")]
    Expired,
}

/// Signs and verifies verification tokens with a process secret.
#[derive(Debug)]
pub struct TokenSigner {
    secret: TokenSecret,
    ttl: Option<Duration>,
}

impl TokenSigner {
    #[must_use]
    pub fn new(secret: TokenSecret, ttl: Option<Duration>) -> Self {
        Self { secret, ttl }
    }

    /// Mint a signed token for `product_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Invalid`] if the payload cannot be serialized.
    pub fn generate(&self, product_id: ProductUuid) -> Result<String, TokenError> {
        let now = Timestamp::now().as_second();

        let token = VerificationToken {
            product_id,
            timestamp: now,
            nonce: Uuid::new_v4().to_string(),
            expires_at: self
                .ttl
                .map(|ttl| now.saturating_add(ttl.as_secs().try_into().unwrap_or(i64::MAX))),
        };

        self.encode(&token)
    }

    /// Decode and verify a token.
    ///
    /// # Errors
    ///
    /// [`TokenError::Invalid`] on malformed input, [`TokenError::Signature`]
    /// on tag mismatch, [`TokenError::Expired`] past the embedded expiry.
    pub fn verify(&self, encoded: &str) -> Result<VerificationToken, TokenError> {
        let combined = URL_SAFE.decode(encoded).map_err(|_| TokenError::Invalid)?;

        if combined.len() < SIGNATURE_BYTES {
            return Err(TokenError::Invalid);
        }

        let (payload, tag) = combined.split_at(combined.len() - SIGNATURE_BYTES);

        let mut mac = self.mac();
        mac.update(payload);
        mac.verify_slice(tag).map_err(|_| TokenError::Signature)?;

        let token: VerificationToken =
            serde_json::from_slice(payload).map_err(|_| TokenError::Invalid)?;

        if let Some(expires_at) = token.expires_at
            && Timestamp::now().as_second() > expires_at
        {
            return Err(TokenError::Expired);
        }

        Ok(token)
    }

    /// Mint a complete verification URL of the form `{base_url}/r/{token}`.
    ///
    /// # Errors
    ///
    /// Propagates [`TokenError`] from token generation.
    pub fn verification_url(
        &self,
        base_url: &str,
        product_id: ProductUuid,
    ) -> Result<String, TokenError> {
        let token = self.generate(product_id)?;

        Ok(format!("{base_url}/r/{token}"))
    }

    fn encode(&self, token: &VerificationToken) -> Result<String, TokenError> {
        let mut combined = serde_json::to_vec(token).map_err(|_| TokenError::Invalid)?;

        let mut mac = self.mac();
        mac.update(&combined);
        combined.extend_from_slice(&mac.finalize().into_bytes());

        Ok(URL_SAFE.encode(combined))
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("hmac accepts keys of any length")
    }
}
