//! Authorization Gate.
//!
//! Admits a connection to a session room only when its credential resolves to
//! the session's teacher or learner. Nothing is mutated on rejection.

pub mod credentials;

pub use credentials::{CredentialVerifier, JwtCredentialVerifier};

use crate::errors::CoordinatorError;
use crate::sessions::SessionDirectory;
use common::types::{Role, SessionId, UserId};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Result of a successful authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub identity: UserId,
    pub role: Role,
}

/// Validates credentials and session membership.
#[derive(Clone)]
pub struct AuthorizationGate {
    verifier: Arc<dyn CredentialVerifier>,
    directory: Arc<dyn SessionDirectory>,
}

impl AuthorizationGate {
    pub fn new(verifier: Arc<dyn CredentialVerifier>, directory: Arc<dyn SessionDirectory>) -> Self {
        Self {
            verifier,
            directory,
        }
    }

    /// Authorize `credential` for `session_id`.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated` when the credential does not verify
    /// - `SessionNotFound` when the session does not exist
    /// - `Forbidden` when the identity is neither teacher nor learner
    /// - `SessionApi` when the session directory is unreachable
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub async fn authorize(
        &self,
        session_id: &SessionId,
        credential: &str,
    ) -> Result<Admission, CoordinatorError> {
        let identity = self.verifier.verify(credential)?;

        let record = self
            .directory
            .fetch_session(session_id)
            .await?
            .ok_or_else(|| CoordinatorError::SessionNotFound(session_id.to_string()))?;

        let role = record.role_of(&identity).ok_or_else(|| {
            debug!(
                target: "sc.auth",
                session_id = %session_id,
                identity = %identity,
                "Identity holds no role in session"
            );
            CoordinatorError::Forbidden(format!("{identity} is not a participant of {session_id}"))
        })?;

        debug!(
            target: "sc.auth",
            session_id = %session_id,
            identity = %identity,
            role = ?role,
            "Join authorized"
        );

        Ok(Admission { identity, role })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::jwt::JwtValidationError;
    use common::types::{SessionRecord, SessionStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts credentials of the form `valid:<identity>`.
    struct PrefixVerifier;

    impl CredentialVerifier for PrefixVerifier {
        fn verify(&self, credential: &str) -> Result<UserId, JwtValidationError> {
            credential
                .strip_prefix("valid:")
                .map(UserId::from)
                .ok_or(JwtValidationError::MalformedToken)
        }
    }

    struct OneSession {
        lookups: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl SessionDirectory for OneSession {
        async fn fetch_session(
            &self,
            session_id: &SessionId,
        ) -> Result<Option<SessionRecord>, CoordinatorError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CoordinatorError::SessionApi("unreachable".to_string()));
            }
            Ok((session_id.as_str() == "sess-1").then(|| SessionRecord {
                id: session_id.clone(),
                teacher: UserId::from("teacher-1"),
                learner: UserId::from("learner-1"),
                status: SessionStatus::Scheduled,
            }))
        }
    }

    fn gate(fail: bool) -> (AuthorizationGate, Arc<OneSession>) {
        let directory = Arc::new(OneSession {
            lookups: AtomicUsize::new(0),
            fail,
        });
        (
            AuthorizationGate::new(Arc::new(PrefixVerifier), directory.clone()),
            directory,
        )
    }

    #[tokio::test]
    async fn test_teacher_and_learner_admitted() {
        let (gate, _) = gate(false);
        let sess = SessionId::from("sess-1");

        let teacher = gate.authorize(&sess, "valid:teacher-1").await.unwrap();
        assert_eq!(teacher.role, Role::Teacher);

        let learner = gate.authorize(&sess, "valid:learner-1").await.unwrap();
        assert_eq!(learner.role, Role::Learner);
        assert_eq!(learner.identity, UserId::from("learner-1"));
    }

    #[tokio::test]
    async fn test_bad_credential_skips_directory() {
        let (gate, directory) = gate(false);
        let result = gate.authorize(&SessionId::from("sess-1"), "garbage").await;

        assert!(matches!(result, Err(CoordinatorError::Unauthenticated(_))));
        assert_eq!(directory.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (gate, _) = gate(false);
        let result = gate
            .authorize(&SessionId::from("sess-404"), "valid:teacher-1")
            .await;
        assert!(matches!(result, Err(CoordinatorError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_outsider_forbidden() {
        let (gate, _) = gate(false);
        let result = gate
            .authorize(&SessionId::from("sess-1"), "valid:mallory")
            .await;
        assert!(matches!(result, Err(CoordinatorError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_directory_outage_is_internal() {
        let (gate, _) = gate(true);
        let err = gate
            .authorize(&SessionId::from("sess-1"), "valid:teacher-1")
            .await
            .unwrap_err();
        assert_eq!(err.client_message(), "An internal error occurred");
    }
}
