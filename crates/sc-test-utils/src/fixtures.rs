//! Pre-configured test data fixtures.
//!
//! Provides builders for:
//! - Sessions with a teacher/learner pair
//! - Signed participant credentials

use chrono::{Duration, Utc};
use common::jwt::ParticipantClaims;
use common::protocol::Credential;
use common::secret::SecretString;
use common::types::{SessionId, SessionRecord, SessionStatus, UserId};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use uuid::Uuid;

/// HS256 secret shared by test credentials and test coordinators.
pub const TEST_JWT_SECRET: &str = "sc-test-secret-do-not-use-in-production";

/// [`TEST_JWT_SECRET`] wrapped for coordinator configuration.
#[must_use]
pub fn test_jwt_secret() -> SecretString {
    SecretString::from(TEST_JWT_SECRET)
}

/// Test session fixture.
#[derive(Debug, Clone)]
pub struct TestSession {
    /// Session ID.
    pub id: String,
    /// Teacher identity.
    pub teacher: String,
    /// Learner identity.
    pub learner: String,
    /// Persisted status.
    pub status: SessionStatus,
}

impl TestSession {
    /// Create a scheduled session between `teacher` and `learner`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            teacher: "teacher-1".to_string(),
            learner: "learner-1".to_string(),
            status: SessionStatus::Scheduled,
        }
    }

    /// Create a test session with a random ID.
    #[must_use]
    pub fn random() -> Self {
        Self::new(format!("session-{}", Uuid::new_v4()))
    }

    /// Set the teacher identity.
    #[must_use]
    pub fn with_teacher(mut self, teacher: impl Into<String>) -> Self {
        self.teacher = teacher.into();
        self
    }

    /// Set the learner identity.
    #[must_use]
    pub fn with_learner(mut self, learner: impl Into<String>) -> Self {
        self.learner = learner.into();
        self
    }

    /// Set the persisted status.
    #[must_use]
    pub fn with_status(mut self, status: SessionStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        SessionId(self.id.clone())
    }

    /// Build the record the session directory returns.
    #[must_use]
    pub fn build(&self) -> SessionRecord {
        SessionRecord {
            id: self.session_id(),
            teacher: UserId(self.teacher.clone()),
            learner: UserId(self.learner.clone()),
            status: self.status,
        }
    }
}

/// Builder for signed participant credentials.
///
/// # Example
/// ```rust,ignore
/// let credential = TestTokenBuilder::new()
///     .for_user("alice")
///     .expires_in(3600)
///     .credential();
/// ```
pub struct TestTokenBuilder {
    sub: String,
    exp: i64,
    iat: i64,
    secret: String,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults (valid for one hour).
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "test-user".to_string(),
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
            secret: TEST_JWT_SECRET.to_string(),
        }
    }

    /// Set the subject (participant identity).
    #[must_use]
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set expiration in seconds from now. Negative values produce an
    /// expired token.
    #[must_use]
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set issued-at timestamp.
    #[must_use]
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Sign with a different secret.
    #[must_use]
    pub fn signed_with(mut self, secret: &str) -> Self {
        self.secret = secret.to_string();
        self
    }

    /// Build the claims.
    #[must_use]
    pub fn claims(&self) -> ParticipantClaims {
        ParticipantClaims::new(self.sub.clone(), self.exp, self.iat)
    }

    /// Build the signed HS256 token.
    pub fn build(self) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &self.claims(),
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .expect("HS256 signing with a byte secret cannot fail")
    }

    /// Build the signed token as a join credential.
    pub fn credential(self) -> Credential {
        Credential(self.build())
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Valid credential for `user` signed with [`TEST_JWT_SECRET`].
pub fn credential_for(user: &str) -> Credential {
    TestTokenBuilder::new().for_user(user).credential()
}
