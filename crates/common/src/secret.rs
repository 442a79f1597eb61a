//! Redacting wrappers for credentials and service tokens.
//!
//! Participant credentials, the signing secret and the session API bearer
//! token are held as [`SecretString`] from the moment they are read. Their
//! `Debug` output is redacted, so a struct that derives `Debug` (a config,
//! a join request) can be logged without leaking them. Reading the value
//! takes an explicit [`ExposeSecret::expose_secret`] call.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! let credential = SecretString::from("eyJhbGciOi...");
//! assert!(!format!("{credential:?}").contains("eyJ"));
//! assert_eq!(credential.expose_secret(), "eyJhbGciOi...");
//! ```

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("signing-secret");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("signing-secret"));
    }

    #[test]
    fn test_struct_with_secret_is_safe() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct JoinAttempt {
            session_id: String,
            credential: SecretString,
        }

        let attempt = JoinAttempt {
            session_id: "sess-42".to_string(),
            credential: SecretString::from("super-secret"),
        };

        let debug_str = format!("{attempt:?}");

        assert!(debug_str.contains("sess-42"));
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("super-secret"));
    }

    #[test]
    fn test_deserialize() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct ApiCredentials {
            base_url: String,
            token: SecretString,
        }

        let json = r#"{"base_url": "http://sessions.local", "token": "my-secret-value"}"#;
        let creds: ApiCredentials = serde_json::from_str(json).expect("deserialize");

        assert_eq!(creds.token.expose_secret(), "my-secret-value");

        let debug = format!("{creds:?}");
        assert!(!debug.contains("my-secret-value"));
        assert!(debug.contains("REDACTED"));
    }
}
