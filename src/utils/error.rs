use thiserror::Error;

#[derive(Error, Debug)]
pub enum TailorError {
    #[error("Rule store read failed: {message}")]
    StoreReadFailure { message: String },

    #[error("Rule store write failed: {message}")]
    StoreWriteFailure { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid pattern '{pattern}': {source}")]
    PatternError {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Storage,
    Configuration,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl TailorError {
    pub fn store_read(message: impl Into<String>) -> Self {
        Self::StoreReadFailure {
            message: message.into(),
        }
    }

    pub fn store_write(message: impl Into<String>) -> Self {
        Self::StoreWriteFailure {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::StoreReadFailure { .. } | Self::StoreWriteFailure { .. } | Self::IoError(_) => {
                ErrorCategory::Storage
            }
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            Self::SerializationError(_) | Self::PatternError { .. } => ErrorCategory::Data,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // A failed read only skips one cycle; the next trigger retries.
            Self::StoreReadFailure { .. } => ErrorSeverity::Medium,
            Self::StoreWriteFailure { .. } | Self::SerializationError(_) => ErrorSeverity::High,
            Self::PatternError { .. } => ErrorSeverity::Low,
            Self::IoError(_) => ErrorSeverity::Critical,
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. } => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::StoreReadFailure { .. } => {
                "Existing treatments were kept; they will be refreshed on the next change"
            }
            Self::StoreWriteFailure { .. } => "Check that the store file is writable and retry",
            Self::IoError(_) => "Check file paths and permissions",
            Self::SerializationError(_) => "The stored entries are not valid JSON; fix or remove the store file",
            Self::ConfigError { .. } | Self::ConfigValidationError { .. } => {
                "Check the TOML configuration file syntax"
            }
            Self::InvalidConfigValueError { .. } => "Correct the highlighted configuration value",
            Self::PatternError { .. } => "Use a valid regular expression for the engine match pattern",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::StoreReadFailure { .. } => "Could not read your tailoring rules".to_string(),
            Self::StoreWriteFailure { .. } => "Could not save your tailoring rules".to_string(),
            Self::InvalidConfigValueError { field, .. } => {
                format!("The configuration value for '{}' is invalid", field)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TailorError>;
