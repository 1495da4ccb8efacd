//! Object-storage backed artifact cache for step-based execution engines
//!
//! Before a step runs, [`CacheEngine::run`] restores a previously saved tree
//! from object storage into a local path. After the step, [`CacheEngine::post_run`]
//! pushes the local path back so a later run with the same key can restore it.
//!
//! # Remote layout
//!
//! A cache key maps to exactly one directory-like URL,
//! `oss://<bucket>/<prefix>/<key>/` (see [`RemoteLocation`]). When no bucket
//! is configured, one named `cache-<region>-<account>` is created on first use.
//!
//! # Transfers
//!
//! All remote work goes through the `ossutil` command line tool, invoked with
//! structured argument lists via the [`TransferTool`] trait.

mod error;

pub mod config;
pub mod engine;
pub mod invoker;
pub mod location;

// Re-export error types at crate root
pub use error::{Error, Result, TransferDirection};

// Re-export main types
pub use config::{BucketOrigin, CacheConfig, CacheProps, Credentials};
pub use engine::{BucketStatus, CacheEngine, CacheOutcome};
pub use invoker::{
    CommandArg, CredentialFlags, Invocation, Operation, ProcessTool, ToolOutput, TransferSettings,
    TransferTool,
};
pub use location::RemoteLocation;
