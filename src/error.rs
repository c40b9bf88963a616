use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::registry::ParseErrorKind;

/// Uniform failure record: a message plus an optional source position.
///
/// Every validator failure, regardless of the schema language that produced
/// it, is reduced to this shape before it reaches the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    pub message: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl ErrorDetail {
    pub fn new(message: impl Into<String>) -> Self {
        ErrorDetail {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub fn with_position(
        message: impl Into<String>,
        line: Option<u32>,
        column: Option<u32>,
    ) -> Self {
        ErrorDetail {
            message: message.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(line) = self.line {
            write!(f, ", line {}", line)?;
        }
        if let Some(column) = self.column {
            write!(f, ", column {}", column)?;
        }
        Ok(())
    }
}

/// A declared schema whose resource could not be obtained or applied.
/// Never carries a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    pub reference: String,
    pub reason: String,
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not resolve {}: {}", self.reference, self.reason)
    }
}

/// Main error type for the public API
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Document is not well-formed: {0}")]
    NotWellFormed(ErrorDetail),

    #[error("No validating parser for syntax '{syntax}'")]
    UnsupportedSyntax { syntax: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LibXML2 internal error: {details}")]
    LibXml2Internal { details: String },

    #[error("Concurrent operation error: {details}")]
    Concurrency { details: String },
}

/// Failures while turning a schema locator into bytes
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Relative locator '{locator}' cannot be resolved: document has no location")]
    NoBaseLocation { locator: String },

    #[error("Invalid schema locator '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },

    #[error("Unsupported URL scheme '{scheme}' for {url}")]
    UnsupportedScheme { scheme: String, url: String },

    #[error("Schema not found: {url}")]
    NotFound { url: String },

    #[error("IO error reading {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status error: {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Request timeout: {url} after {timeout_seconds} seconds")]
    Timeout { url: String, timeout_seconds: u64 },
}

/// Schema engine errors raised while compiling a schema
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{kind} parse failed: {details}")]
    SchemaParse {
        kind: ParseErrorKind,
        details: String,
    },

    #[error("Schema {url} depends on an unreachable resource: {details}")]
    UnreachableResource { url: String, details: String },

    #[error("Schema source not supported by {kind}")]
    UnsupportedSource { kind: ParseErrorKind },

    #[error("Validation context creation failed")]
    ValidationContextCreationFailed,

    #[error("Memory allocation failed in libxml2")]
    MemoryAllocation,
}

impl EngineError {
    pub fn parse(kind: ParseErrorKind, details: impl Into<String>) -> Self {
        EngineError::SchemaParse {
            kind,
            details: details.into(),
        }
    }
}

impl From<ConfigError> for ValidationError {
    fn from(err: ConfigError) -> Self {
        ValidationError::Config(err.to_string())
    }
}

impl From<EngineError> for ValidationError {
    fn from(err: EngineError) -> Self {
        ValidationError::LibXml2Internal {
            details: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for ValidationError {
    fn from(err: tokio::task::JoinError) -> Self {
        ValidationError::Concurrency {
            details: err.to_string(),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Resolution result type alias
pub type ResolveResult<T> = std::result::Result<T, ResolveError>;

/// Engine result type alias
pub type EngineResult<T> = std::result::Result<T, EngineError>;
