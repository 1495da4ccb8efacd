//! Error types for the cache crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Direction of a bulk copy between the local path and the remote location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Remote location to local path (restore)
    Download,
    /// Local path to remote location (persist)
    Upload,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download => f.write_str("download"),
            Self::Upload => f.write_str("upload"),
        }
    }
}

/// Error type for cache operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// One or more required configuration fields are missing
    #[error("{}", violations.join("\n"))]
    #[diagnostic(
        code(stepcache::cache::validation),
        help("Provide the cache key, the local path, a region and credentials for the step")
    )]
    Validation {
        /// Every violated constraint, in rule order
        violations: Vec<String>,
    },

    /// I/O error during cache operations
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(stepcache::cache::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "create_dir_all")
        operation: String,
    },

    /// A metadata probe (existence or usage) did not complete successfully
    #[error("ossutil {operation} failed: {reason}")]
    #[diagnostic(code(stepcache::cache::probe))]
    Probe {
        /// The probe subcommand
        operation: String,
        /// What went wrong (launch error, timeout or exit status)
        reason: String,
    },

    /// A bulk copy process could not be started
    #[error("failed to launch ossutil {direction} copy")]
    #[diagnostic(
        code(stepcache::cache::transfer_launch),
        help("Ensure ossutil is installed and on PATH, or point STEPCACHE_OSSUTIL at it")
    )]
    TransferLaunch {
        /// Which way the copy was going
        direction: TransferDirection,
        /// The spawn error
        #[source]
        source: std::io::Error,
    },

    /// Creating a self-provisioned bucket failed
    #[error("failed to create bucket {bucket}: {reason}")]
    #[diagnostic(code(stepcache::cache::bucket_provision))]
    BucketProvision {
        /// Bucket name
        bucket: String,
        /// What went wrong
        reason: String,
    },
}

impl Error {
    /// Create a validation error from the collected violations
    #[must_use]
    pub fn validation(violations: Vec<String>) -> Self {
        Self::Validation { violations }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create a probe error
    #[must_use]
    pub fn probe(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Probe {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a transfer launch error
    #[must_use]
    pub fn transfer_launch(direction: TransferDirection, source: std::io::Error) -> Self {
        Self::TransferLaunch { direction, source }
    }

    /// Create a bucket provisioning error
    #[must_use]
    pub fn bucket_provision(bucket: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BucketProvision {
            bucket: bucket.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error came from configuration validation
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, Error>;
