use crate::utils::error::{DebateError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(DebateError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(DebateError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(DebateError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(DebateError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(DebateError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(DebateError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

/// Ollama 的模型名稱是 `name[:tag]`，不允許空白
pub fn validate_model_name(field_name: &str, model: &str) -> Result<()> {
    validate_non_empty_string(field_name, model)?;

    if model.chars().any(char::is_whitespace) {
        return Err(DebateError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: model.to_string(),
            reason: "Model name cannot contain whitespace".to_string(),
        });
    }

    if model.matches(':').count() > 1 || model.ends_with(':') {
        return Err(DebateError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: model.to_string(),
            reason: "Expected <name> or <name>:<tag>".to_string(),
        });
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DebateError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(DebateError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("ollama_url", "http://localhost:11434").is_ok());
        assert!(validate_url("ollama_url", "https://gpu-box.internal").is_ok());
        assert!(validate_url("ollama_url", "").is_err());
        assert!(validate_url("ollama_url", "localhost:11434").is_err());
        assert!(validate_url("ollama_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("rounds", 2, 1).is_ok());
        assert!(validate_positive_number("rounds", 0, 1).is_err());
    }

    #[test]
    fn test_validate_model_name() {
        assert!(validate_model_name("judge", "phi3:3.8b").is_ok());
        assert!(validate_model_name("judge", "mistral").is_ok());
        assert!(validate_model_name("judge", "").is_err());
        assert!(validate_model_name("judge", "deepseek r1").is_err());
        assert!(validate_model_name("judge", "a:b:c").is_err());
        assert!(validate_model_name("judge", "mistral:").is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("temperature", 0.7_f32, 0.0, 2.0).is_ok());
        assert!(validate_range("temperature", 3.0_f32, 0.0, 2.0).is_err());
    }
}
