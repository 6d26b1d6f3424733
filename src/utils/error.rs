use thiserror::Error;

#[derive(Error, Debug)]
pub enum DebateError {
    #[error("Inference request to model '{model}' failed: {message}")]
    InferenceError { model: String, message: String },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("CSV export error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Results file error ({path}): {message}")]
    ResultsFileError { path: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Inference,
    Network,
    Storage,
    Data,
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl DebateError {
    pub fn inference(model: &str, message: impl Into<String>) -> Self {
        Self::InferenceError {
            model: model.to_string(),
            message: message.into(),
        }
    }

    pub fn results_file(path: &str, message: impl Into<String>) -> Self {
        Self::ResultsFileError {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InferenceError { .. } => ErrorCategory::Inference,
            Self::HttpError(_) => ErrorCategory::Network,
            Self::IoError(_) | Self::ZipError(_) | Self::ResultsFileError { .. } => {
                ErrorCategory::Storage
            }
            Self::SerializationError(_) | Self::CsvError(_) => ErrorCategory::Data,
            Self::TomlError(_)
            | Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            // 推論失敗在辯論中會被記錄成錯誤標記，單獨出現時可以重試
            ErrorCategory::Inference | ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Configuration | ErrorCategory::Data => ErrorSeverity::High,
            // 結果檔寫不進去代表進度會遺失
            ErrorCategory::Storage => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Inference => {
                "Check that the model is pulled locally (ollama pull <model>) and retry"
            }
            ErrorCategory::Network => {
                "Make sure the Ollama server is running and --ollama-url points to it"
            }
            ErrorCategory::Storage => {
                "Check the output directory permissions and free disk space, then use --resume"
            }
            ErrorCategory::Data => "The results file may be truncated or hand-edited; inspect its JSON",
            ErrorCategory::Configuration => "Review the command line flags and the TOML config file",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::InferenceError { model, .. } => {
                format!("Model '{}' could not produce a response", model)
            }
            Self::HttpError(_) => "Could not reach the inference server".to_string(),
            Self::IoError(e) => format!("File system error: {}", e),
            Self::ResultsFileError { path, message } => {
                format!("Results file '{}' is unusable: {}", path, message)
            }
            Self::MissingConfigError { field } => format!("Missing setting: {}", field),
            Self::InvalidConfigValueError { field, reason, .. } => {
                format!("Invalid setting {}: {}", field, reason)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DebateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_are_critical() {
        let err = DebateError::results_file("results.json", "not an array");
        assert_eq!(err.category(), ErrorCategory::Storage);
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.user_friendly_message().contains("results.json"));
    }

    #[test]
    fn test_inference_errors_are_retryable() {
        let err = DebateError::inference("mistral:7b", "connection refused");
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(err.to_string().contains("mistral:7b"));
        assert!(err.recovery_suggestion().contains("ollama pull"));
    }

    #[test]
    fn test_config_errors() {
        let err = DebateError::InvalidConfigValueError {
            field: "rounds".to_string(),
            value: "0".to_string(),
            reason: "Value must be at least 1".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.user_friendly_message(), "Invalid setting rounds: Value must be at least 1");
    }
}
