//! Participant credential checks shared by the coordinator and test fixtures.
//!
//! Credentials are HS256 tokens minted by the identity service. Signature
//! verification lives in the coordinator's auth module; this module holds
//! the pieces that do not need a key:
//! - a hard size cap applied before the token is decoded
//! - the `iat` tolerance window (default and configurable ceiling)
//! - [`ParticipantClaims`], whose subject never appears in Debug output
//!
//! Every rejection maps to the same client-facing message so a caller cannot
//! tell an expired credential from a forged one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Largest credential accepted, in bytes. Checked before decoding.
///
/// Participant credentials are a few hundred bytes.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// How far in the future a credential's `iat` may sit before it is refused.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Ceiling for `SC_CLOCK_SKEW_SECONDS`.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Why a participant credential was refused.
///
/// All variants display the same text; the variant itself is only logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Not a JWT, wrong algorithm, or bad signature.
    #[error("The access token is invalid or expired")]
    MalformedToken,

    #[error("The access token is invalid or expired")]
    Expired,

    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,

    /// `sub` (or legacy `id`) is empty.
    #[error("The access token is invalid or expired")]
    MissingSubject,
}

// =============================================================================
// Claims Types
// =============================================================================

/// Claims carried by a participant credential.
///
/// The identity service issues tokens whose subject is either `sub` or the
/// legacy `id` claim; both are accepted. The subject is redacted in Debug
/// output.
#[derive(Clone, Serialize, Deserialize)]
pub struct ParticipantClaims {
    /// Participant identity.
    #[serde(alias = "id")]
    pub sub: String,

    /// Unix seconds.
    pub exp: i64,

    /// Unix seconds.
    pub iat: i64,
}

impl fmt::Debug for ParticipantClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticipantClaims")
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .finish()
    }
}

impl ParticipantClaims {
    #[must_use]
    pub fn new(sub: impl Into<String>, exp: i64, iat: i64) -> Self {
        Self {
            sub: sub.into(),
            exp,
            iat,
        }
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Reject tokens larger than [`MAX_JWT_SIZE_BYTES`].
///
/// # Errors
///
/// Returns `JwtValidationError::TokenTooLarge` when the token exceeds the limit.
pub fn check_token_size(token: &str) -> Result<(), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            size = token.len(),
            limit = MAX_JWT_SIZE_BYTES,
            "Credential refused: oversized"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }
    Ok(())
}

/// Refuse a credential issued more than `clock_skew` in the future.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` past the window.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// [`validate_iat`] against a fixed `now`.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    let skew = i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX);
    let latest = now.saturating_add(skew);

    if iat > latest {
        tracing::debug!(
            target: "common.jwt",
            iat,
            latest,
            "Credential refused: issued in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
