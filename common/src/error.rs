use thiserror::Error;

/// A parameter failed validation before the plugin was started.
///
/// Always names the offending parameter so callers can point at the field.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid parameter '{param}': {reason}")]
pub struct ValidationError {
    pub param: String,
    pub reason: ValidationReason,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationReason {
    #[error("a value is required")]
    Missing,
    #[error("expected {expected}, got {found}")]
    TypeMismatch { expected: &'static str, found: String },
    #[error("{value} is outside [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
    #[error("'{value}' is not one of {allowed:?}")]
    NotAnOption { value: String, allowed: Vec<String> },
    #[error("{0}")]
    Invalid(String),
}

impl ValidationError {
    pub fn new(param: impl Into<String>, reason: ValidationReason) -> Self {
        Self {
            param: param.into(),
            reason,
        }
    }

    pub fn missing(param: impl Into<String>) -> Self {
        Self::new(param, ValidationReason::Missing)
    }

    pub fn invalid(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(param, ValidationReason::Invalid(message.into()))
    }
}

/// A plugin descriptor contradicts itself (bad default, missing options, ...).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("plugin '{plugin}' has an invalid descriptor: {reason}")]
pub struct DescriptorError {
    pub plugin: String,
    pub reason: String,
}

impl DescriptorError {
    pub fn new(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }
}
