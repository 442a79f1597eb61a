//! Participant credential verification.
//!
//! Credentials are HS256 JWTs issued by the identity service with a shared
//! secret.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only HS256 is accepted
//! - Expiration and issued-at claims are validated with clock skew tolerance
//! - Generic error messages prevent information leakage

use common::jwt::{check_token_size, validate_iat, JwtValidationError, ParticipantClaims};
use common::secret::{ExposeSecret, SecretString};
use common::types::UserId;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::time::Duration;
use tracing::instrument;

/// Resolves a credential to a participant identity (enables mocking).
pub trait CredentialVerifier: Send + Sync {
    /// Verify `credential` and return the identity it was issued to.
    ///
    /// # Errors
    ///
    /// Returns a `JwtValidationError` for every rejection; all variants carry
    /// the same client-facing message.
    fn verify(&self, credential: &str) -> Result<UserId, JwtValidationError>;
}

/// HS256 credential verifier.
pub struct JwtCredentialVerifier {
    decoding_key: DecodingKey,

    /// Clock skew tolerance for iat validation.
    clock_skew: Duration,
}

impl JwtCredentialVerifier {
    /// Create a verifier for tokens signed with `secret`.
    pub fn new(secret: &SecretString, clock_skew: Duration) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            clock_skew,
        }
    }
}

impl CredentialVerifier for JwtCredentialVerifier {
    /// # Security Checks
    ///
    /// 1. Size check - reject tokens > 8KB before parsing
    /// 2. Verify HS256 signature
    /// 3. Validate exp claim (reject expired tokens)
    /// 4. Validate iat claim with clock skew tolerance
    /// 5. Reject empty subjects
    #[instrument(skip_all)]
    fn verify(&self, credential: &str) -> Result<UserId, JwtValidationError> {
        check_token_size(credential)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let token_data = decode::<ParticipantClaims>(credential, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(target: "sc.auth", error = %e, "Credential verification failed");
                match e.kind() {
                    ErrorKind::ExpiredSignature => JwtValidationError::Expired,
                    _ => JwtValidationError::MalformedToken,
                }
            })?;

        let claims = token_data.claims;
        validate_iat(claims.iat, self.clock_skew)?;

        if claims.sub.trim().is_empty() {
            tracing::debug!(target: "sc.auth", "Credential rejected: empty subject");
            return Err(JwtValidationError::MissingSubject);
        }

        Ok(UserId(claims.sub))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_JWT_SIZE_BYTES};
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "unit-test-secret";

    fn sign(claims: &serde_json::Value, secret: &str, alg: Algorithm) -> String {
        encode(
            &Header::new(alg),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn verifier() -> JwtCredentialVerifier {
        JwtCredentialVerifier::new(&SecretString::from(SECRET), DEFAULT_CLOCK_SKEW)
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    #[test]
    fn test_valid_credential_resolves_identity() {
        let token = sign(
            &serde_json::json!({ "sub": "learner-1", "iat": now(), "exp": now() + 3600 }),
            SECRET,
            Algorithm::HS256,
        );
        assert_eq!(verifier().verify(&token).unwrap(), UserId::from("learner-1"));
    }

    #[test]
    fn test_legacy_id_claim_accepted() {
        let token = sign(
            &serde_json::json!({ "id": "teacher-1", "iat": now(), "exp": now() + 3600 }),
            SECRET,
            Algorithm::HS256,
        );
        assert_eq!(verifier().verify(&token).unwrap(), UserId::from("teacher-1"));
    }

    #[test]
    fn test_expired_credential_rejected() {
        let token = sign(
            &serde_json::json!({ "sub": "learner-1", "iat": now() - 7200, "exp": now() - 60 }),
            SECRET,
            Algorithm::HS256,
        );
        assert_eq!(verifier().verify(&token), Err(JwtValidationError::Expired));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign(
            &serde_json::json!({ "sub": "learner-1", "iat": now(), "exp": now() + 3600 }),
            "other-secret",
            Algorithm::HS256,
        );
        assert_eq!(
            verifier().verify(&token),
            Err(JwtValidationError::MalformedToken)
        );
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let token = sign(
            &serde_json::json!({ "sub": "learner-1", "iat": now(), "exp": now() + 3600 }),
            SECRET,
            Algorithm::HS512,
        );
        assert!(verifier().verify(&token).is_err());
    }

    #[test]
    fn test_future_iat_rejected() {
        let token = sign(
            &serde_json::json!({ "sub": "learner-1", "iat": now() + 3600, "exp": now() + 7200 }),
            SECRET,
            Algorithm::HS256,
        );
        assert_eq!(
            verifier().verify(&token),
            Err(JwtValidationError::IatTooFarInFuture)
        );
    }

    #[test]
    fn test_empty_subject_rejected() {
        let token = sign(
            &serde_json::json!({ "sub": "  ", "iat": now(), "exp": now() + 3600 }),
            SECRET,
            Algorithm::HS256,
        );
        assert_eq!(
            verifier().verify(&token),
            Err(JwtValidationError::MissingSubject)
        );
    }

    #[test]
    fn test_garbage_and_oversized_rejected() {
        assert_eq!(
            verifier().verify("not-a-jwt"),
            Err(JwtValidationError::MalformedToken)
        );
        assert_eq!(
            verifier().verify(&"a".repeat(MAX_JWT_SIZE_BYTES + 1)),
            Err(JwtValidationError::TokenTooLarge)
        );
    }
}
