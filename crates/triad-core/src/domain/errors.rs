//! Domain error types
//!
//! Validation failures raised while constructing domain values such as
//! resource paths, tags and comparison criteria identifiers.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid resource path format or content
    #[error("Invalid resource path: {0}")]
    InvalidPath(String),

    /// Invalid tag or branch name
    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    /// Unknown comparison criterion identifier
    #[error("Unknown comparison criterion: {0}")]
    UnknownCriterion(String),

    /// A persisted descriptor could not be decoded
    #[error("Invalid revision descriptor: {0}")]
    InvalidDescriptor(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}
