//! Authenticated session tokens with expiry metadata.
//!
//! A [`Session`] is the unit persisted to durable storage so a process
//! restart resumes without a fresh login. Only the auth manager mutates it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::TOKEN_EXPIRY_MARGIN_SECS;

/// OAuth access and refresh tokens with expiry metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer access token for API authentication
    pub access_token: String,

    /// Refresh token for obtaining new access tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type (always "Bearer" for OAuth 2.0)
    pub token_type: String,

    /// Absolute expiration timestamp (UTC), already reduced by the safety
    /// margin at creation time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// OAuth client id the tokens were issued to
    pub client_id: String,
}

impl Session {
    /// Create a session from a token endpoint response.
    ///
    /// `expires_in` is the server-declared lifetime in seconds; the stored
    /// expiry is current time plus that lifetime minus the safety margin.
    #[must_use]
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        token_type: String,
        expires_in: i64,
        client_id: String,
    ) -> Self {
        let expires_at = if expires_in > 0 {
            Some(Utc::now() + chrono::Duration::seconds(expires_in - TOKEN_EXPIRY_MARGIN_SECS))
        } else {
            None
        };

        Self { access_token, refresh_token, token_type, expires_at, client_id }
    }

    /// Check if the access token is expired or will expire within the given
    /// threshold.
    ///
    /// Returns `true` if the token is expired or will expire within
    /// `threshold_seconds`; `false` if still valid or if no expiry is set.
    #[must_use]
    pub fn is_expired(&self, threshold_seconds: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() + chrono::Duration::seconds(threshold_seconds) >= expires_at,
            None => false,
        }
    }

    /// Get seconds until token expiration, or `None` if no expiry is set.
    #[must_use]
    pub fn seconds_until_expiry(&self) -> Option<i64> {
        self.expires_at.map(|expires_at| (expires_at - Utc::now()).num_seconds())
    }
}
