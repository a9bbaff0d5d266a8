use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Coordinate storage unavailable: {0}")]
    StorageUnavailable(sqlx::Error),

    #[error("Timed out waiting for a storage connection during {operation}")]
    PoolTimeout { operation: String },

    #[error("AI service error: {0}")]
    AiService(#[from] AiServiceError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfig { field: String },
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => EngineError::PoolTimeout {
                operation: "acquire".to_string(),
            },
            other => EngineError::StorageUnavailable(other),
        }
    }
}

/// Failures of one region-batch call to the AI service. Always recovered at
/// group granularity by the resolver.
#[derive(Error, Debug)]
pub enum AiServiceError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("service returned no content")]
    EmptyResponse,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("expected {expected} targets, got {actual}")]
    TargetCountMismatch { expected: usize, actual: usize },

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<AiServiceError>,
    },

    #[error("cycle deadline exceeded")]
    DeadlineExceeded,
}

impl AiServiceError {
    /// Network hiccups, throttling and server-side failures are worth another
    /// attempt with the same batch; a bad answer is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AiServiceError::Transport(_) | AiServiceError::EmptyResponse => true,
            AiServiceError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EngineError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EngineError::AiService(_) | EngineError::Http(_) => ErrorSeverity::Medium,
            EngineError::PoolTimeout { .. } => ErrorSeverity::Medium,
            EngineError::Serialization(_) => ErrorSeverity::High,
            EngineError::Config { .. }
            | EngineError::InvalidConfigValue { .. }
            | EngineError::MissingConfig { .. } => ErrorSeverity::High,
            EngineError::StorageUnavailable(_) | EngineError::Io(_) => ErrorSeverity::Critical,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EngineError::StorageUnavailable(_) => {
                "The coordinate database could not be opened or queried. Check the database path and permissions.".to_string()
            }
            EngineError::PoolTimeout { .. } => {
                "All database connections were busy for too long. Try a larger pool or fewer workers.".to_string()
            }
            EngineError::AiService(e) => format!("The AI service could not resolve coordinates: {}", e),
            EngineError::Http(e) => format!("HTTP request failed: {}", e),
            EngineError::Io(e) => format!("File access failed: {}", e),
            EngineError::Serialization(e) => format!("Input or output JSON is invalid: {}", e),
            EngineError::Config { message } => format!("Configuration problem: {}", message),
            EngineError::InvalidConfigValue { field, reason, .. } => {
                format!("Configuration field '{}' is invalid: {}", field, reason)
            }
            EngineError::MissingConfig { field } => {
                format!("Configuration field '{}' is required", field)
            }
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EngineError::StorageUnavailable(_) => {
                "Verify store.database_url points at a writable location"
            }
            EngineError::PoolTimeout { .. } => {
                "Raise store.pool_size or store.acquire_timeout_seconds"
            }
            EngineError::AiService(_) | EngineError::Http(_) => {
                "Check network access and the AI endpoint, then rerun the cycle"
            }
            EngineError::Io(_) => "Check that the input file exists and the output directory is writable",
            EngineError::Serialization(_) => "Make sure the input is a JSON array of messages",
            EngineError::Config { .. }
            | EngineError::InvalidConfigValue { .. }
            | EngineError::MissingConfig { .. } => {
                "Fix the configuration file or pass the value on the command line"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
