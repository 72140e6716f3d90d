//! Bearer-token authentication for the control socket
//!
//! Only SHA-256 hashes of the accepted tokens are configured; incoming tokens
//! are hashed and compared against them.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Authentication configuration for the control socket
///
/// ```ron
/// auth: (
///     enabled: true,
///     // echo -n "operator-token" | sha256sum
///     token_hashes: ["0850123315d21ab90f4f7236408a52ef6dbd6a02a6550e5c10dc73f4d993680e"],
/// )
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlAuthConfig {
    /// When disabled, access is governed by the socket's file permissions alone
    #[serde(default)]
    pub enabled: bool,

    /// Hex-encoded SHA-256 hashes of the accepted tokens
    #[serde(default)]
    pub token_hashes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Authentication required but no token provided")]
    MissingToken,

    #[error("Invalid authentication token")]
    InvalidToken,
}

/// Hex-encoded SHA-256 of `token`, as it appears in `token_hashes`
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

impl ControlAuthConfig {
    #[must_use]
    pub const fn requires_auth(&self) -> bool {
        self.enabled
    }

    /// Check the token a request carried
    ///
    /// # Errors
    ///
    /// When authentication is enabled and the token is missing or unknown.
    pub fn authenticate(&self, token: Option<&str>) -> Result<(), AuthError> {
        if !self.enabled {
            return Ok(());
        }

        let token = token.ok_or(AuthError::MissingToken)?;
        let hash = hash_token(token);

        if self
            .token_hashes
            .iter()
            .any(|configured| configured.eq_ignore_ascii_case(&hash))
        {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}
