//! Session Coordinator configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default WebSocket signaling bind address.
pub const DEFAULT_SIGNALING_BIND_ADDRESS: &str = "0.0.0.0:4000";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default maximum number of concurrently active rooms.
pub const DEFAULT_MAX_ROOMS: usize = 10_000;

/// Default transport idle timeout in seconds.
///
/// A link that sends nothing (not even a pong) for this long is treated as
/// disconnected.
pub const DEFAULT_IDLE_TIMEOUT_SECONDS: u64 = 45;

/// Default interval between server pings in seconds.
pub const DEFAULT_PING_INTERVAL_SECONDS: u64 = 15;

/// Default per-connection outbound mailbox size.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// Default graceful shutdown deadline in seconds.
pub const DEFAULT_SHUTDOWN_GRACE_SECONDS: u64 = 10;

/// Default instance ID prefix.
pub const DEFAULT_SC_ID_PREFIX: &str = "sc";

/// Session Coordinator configuration.
///
/// Loaded from environment variables with sensible defaults.
/// Sensitive fields are redacted in Debug output.
#[derive(Clone)]
pub struct Config {
    /// WebSocket signaling bind address (default: "0.0.0.0:4000").
    pub signaling_bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Unique identifier for this coordinator instance.
    pub sc_id: String,

    /// HS256 secret shared with the identity service.
    /// Protected by `SecretString` to prevent accidental logging.
    pub jwt_secret: SecretString,

    /// Base URL of the session persistence API.
    pub session_api_url: String,

    /// Bearer token for the session persistence API.
    pub session_api_token: SecretString,

    /// Maximum concurrently active rooms.
    pub max_rooms: usize,

    /// Credential `iat` tolerance (bounded by `MAX_CLOCK_SKEW`).
    pub clock_skew: Duration,

    /// Transport liveness timeout.
    pub idle_timeout: Duration,

    /// Interval between server pings.
    pub ping_interval: Duration,

    /// Per-connection outbound mailbox size.
    pub outbound_buffer: usize,

    /// Deadline for draining actors on shutdown.
    pub shutdown_grace: Duration,

    /// Emit logs as JSON (`SC_LOG_FORMAT=json`).
    pub json_logs: bool,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("signaling_bind_address", &self.signaling_bind_address)
            .field("health_bind_address", &self.health_bind_address)
            .field("sc_id", &self.sc_id)
            .field("jwt_secret", &"[REDACTED]")
            .field("session_api_url", &self.session_api_url)
            .field("session_api_token", &"[REDACTED]")
            .field("max_rooms", &self.max_rooms)
            .field("clock_skew", &self.clock_skew)
            .field("idle_timeout", &self.idle_timeout)
            .field("ping_interval", &self.ping_interval)
            .field("outbound_buffer", &self.outbound_buffer)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("json_logs", &self.json_logs)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn parse_or<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}"))),
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a required variable is missing or a value
    /// fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let jwt_secret = SecretString::from(required(vars, "SC_JWT_SECRET")?);
        let session_api_url = required(vars, "SESSION_API_URL")?
            .trim_end_matches('/')
            .to_string();
        let session_api_token = SecretString::from(required(vars, "SESSION_API_TOKEN")?);

        let signaling_bind_address = vars
            .get("SC_SIGNALING_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_SIGNALING_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("SC_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let max_rooms = parse_or(vars, "SC_MAX_ROOMS", DEFAULT_MAX_ROOMS)?;
        if max_rooms == 0 {
            return Err(ConfigError::InvalidValue(
                "SC_MAX_ROOMS must be greater than zero".to_string(),
            ));
        }

        let clock_skew_seconds =
            parse_or(vars, "SC_CLOCK_SKEW_SECONDS", DEFAULT_CLOCK_SKEW.as_secs())?;
        if clock_skew_seconds > MAX_CLOCK_SKEW.as_secs() {
            return Err(ConfigError::InvalidValue(format!(
                "SC_CLOCK_SKEW_SECONDS={clock_skew_seconds} exceeds maximum of {}",
                MAX_CLOCK_SKEW.as_secs()
            )));
        }

        let idle_timeout_seconds =
            parse_or(vars, "SC_IDLE_TIMEOUT_SECONDS", DEFAULT_IDLE_TIMEOUT_SECONDS)?;
        let ping_interval_seconds =
            parse_or(vars, "SC_PING_INTERVAL_SECONDS", DEFAULT_PING_INTERVAL_SECONDS)?;
        if ping_interval_seconds == 0 || ping_interval_seconds >= idle_timeout_seconds {
            return Err(ConfigError::InvalidValue(
                "SC_PING_INTERVAL_SECONDS must be non-zero and below SC_IDLE_TIMEOUT_SECONDS"
                    .to_string(),
            ));
        }

        let outbound_buffer = parse_or(vars, "SC_OUTBOUND_BUFFER", DEFAULT_OUTBOUND_BUFFER)?;
        if outbound_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "SC_OUTBOUND_BUFFER must be greater than zero".to_string(),
            ));
        }

        let shutdown_grace_seconds = parse_or(
            vars,
            "SC_SHUTDOWN_GRACE_SECONDS",
            DEFAULT_SHUTDOWN_GRACE_SECONDS,
        )?;

        let json_logs = vars
            .get("SC_LOG_FORMAT")
            .is_some_and(|v| v.eq_ignore_ascii_case("json"));

        // Generate instance ID
        let sc_id = vars.get("SC_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_SC_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            signaling_bind_address,
            health_bind_address,
            sc_id,
            jwt_secret,
            session_api_url,
            session_api_token,
            max_rooms,
            clock_skew: Duration::from_secs(clock_skew_seconds),
            idle_timeout: Duration::from_secs(idle_timeout_seconds),
            ping_interval: Duration::from_secs(ping_interval_seconds),
            outbound_buffer,
            shutdown_grace: Duration::from_secs(shutdown_grace_seconds),
            json_logs,
        })
    }
}
