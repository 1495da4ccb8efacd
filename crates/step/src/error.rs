//! Error types for the step crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Error type for host documents handed to the step
#[derive(Error, Debug, Diagnostic)]
pub enum StepError {
    /// A JSON document from the host could not be parsed
    #[error("Invalid {document} document: {source}")]
    #[diagnostic(
        code(stepcache::step::invalid_document),
        help("The host must pass JSON objects for step inputs, context and outputs")
    )]
    InvalidDocument {
        /// Which document failed ("inputs", "context" or "outputs")
        document: &'static str,
        /// The parse error
        #[source]
        source: serde_json::Error,
    },
}

impl StepError {
    /// Create an invalid document error
    #[must_use]
    pub fn invalid_document(document: &'static str, source: serde_json::Error) -> Self {
        Self::InvalidDocument { document, source }
    }
}

/// Result type for step operations
pub type Result<T> = std::result::Result<T, StepError>;
