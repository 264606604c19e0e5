use std::path::PathBuf;
use thiserror::Error;

/// Error taxonomy for signature loading and scanning.
#[derive(Debug, Error)]
pub enum HoundError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed signature in {origin}: {message}")]
    Format { origin: String, message: String },

    #[error("Invalid JSON signature document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML signature document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse class {class}: {source:#}")]
    ClassParse {
        class: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Class {class} is too large: {size} bytes exceeds limit of {limit} bytes")]
    ClassTooLarge { class: String, size: usize, limit: usize },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Path does not exist: {path}")]
    PathNotFound { path: PathBuf },

    #[error("Duplicate archetype identifier '{identifier}'")]
    DuplicateArchetype { identifier: String },
}

pub type Result<T> = std::result::Result<T, HoundError>;

impl HoundError {
    pub fn format<O: Into<String>, S: Into<String>>(origin: O, message: S) -> Self {
        Self::Format { origin: origin.into(), message: message.into() }
    }

    pub fn class_parse<S: Into<String>>(class: S, source: anyhow::Error) -> Self {
        Self::ClassParse { class: class.into(), source }
    }

    pub fn class_too_large<S: Into<String>>(class: S, size: usize, limit: usize) -> Self {
        Self::ClassTooLarge { class: class.into(), size, limit }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn path_not_found<P: Into<PathBuf>>(path: P) -> Self {
        Self::PathNotFound { path: path.into() }
    }

    pub fn duplicate_archetype<S: Into<String>>(identifier: S) -> Self {
        Self::DuplicateArchetype { identifier: identifier.into() }
    }

    /// Returns true if the error only affects a single class and the scan can continue
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ClassParse { .. } | Self::ClassTooLarge { .. })
    }

    /// Returns true if the error comes from a malformed signature document
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::Format { .. } | Self::Json(_) | Self::Yaml(_) | Self::DuplicateArchetype { .. }
        )
    }
}
