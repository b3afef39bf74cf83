//! Error types for Safepost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SafepostError>;

#[derive(Error, Debug)]
pub enum SafepostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Retry deadline exceeded ({0})")]
    DeadlineExceeded(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SafepostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SafepostError::Config(_) => 2,
            SafepostError::State(StateError::Locked(_)) => 3,
            SafepostError::State(_) => 1,
            SafepostError::Platform(_) => 1,
            SafepostError::DeadlineExceeded(_) => 1,
            SafepostError::Io(_) => 1,
        }
    }

    /// The platform error behind this error, if any
    pub fn as_platform(&self) -> Option<&PlatformError> {
        match self {
            SafepostError::Platform(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("State file IO failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("State file is locked by another process: {0}")]
    Locked(String),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}

impl PlatformError {
    /// Whether the remote service asked us to slow down
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, PlatformError::RateLimit(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_config_error() {
        let error =
            SafepostError::Config(ConfigError::MissingField("mastodon.instance".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_locked_state() {
        let error = SafepostError::State(StateError::Locked("/tmp/state.json.lock".to_string()));
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_platform_errors() {
        let network = SafepostError::Platform(PlatformError::Network("timeout".to_string()));
        let rate_limit = SafepostError::Platform(PlatformError::RateLimit("429".to_string()));
        let auth = SafepostError::Platform(PlatformError::Authentication("bad token".to_string()));

        assert_eq!(network.exit_code(), 1);
        assert_eq!(rate_limit.exit_code(), 1);
        assert_eq!(auth.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting_config() {
        let error = SafepostError::Config(ConfigError::MissingField("mastodon.token".to_string()));
        assert_eq!(
            error.to_string(),
            "Configuration error: Missing required field: mastodon.token"
        );
    }

    #[test]
    fn test_error_message_formatting_invalid_value() {
        let error = ConfigError::InvalidValue {
            field: "schedule.quiet_start_hour".to_string(),
            reason: "must be below 24".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid value for schedule.quiet_start_hour: must be below 24"
        );
    }

    #[test]
    fn test_error_message_formatting_rate_limit() {
        let error =
            SafepostError::Platform(PlatformError::RateLimit("Too many requests".to_string()));
        assert_eq!(
            error.to_string(),
            "Platform error: Rate limit exceeded: Too many requests"
        );
    }

    #[test]
    fn test_is_rate_limit() {
        assert!(PlatformError::RateLimit("slow down".to_string()).is_rate_limit());
        assert!(!PlatformError::Network("reset".to_string()).is_rate_limit());
        assert!(!PlatformError::Posting("422".to_string()).is_rate_limit());
    }

    #[test]
    fn test_as_platform() {
        let error: SafepostError = PlatformError::Network("reset".to_string()).into();
        assert!(matches!(error.as_platform(), Some(PlatformError::Network(_))));

        let error = SafepostError::DeadlineExceeded("favourite".to_string());
        assert!(error.as_platform().is_none());
    }

    #[test]
    fn test_error_conversion_from_state_error() {
        let state_error = StateError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        ));
        let error: SafepostError = state_error.into();

        match error {
            SafepostError::State(StateError::Io(_)) => {}
            _ => panic!("Expected SafepostError::State"),
        }
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::Network("Connection failed".to_string());
        let cloned = original.clone();

        assert_eq!(format!("{}", original), format!("{}", cloned));
    }
}
