//! Restore and persist orchestration
//!
//! [`CacheEngine::run`] restores a previously saved tree before a step runs;
//! [`CacheEngine::post_run`] pushes the local tree back afterwards. Both talk
//! to the object store only through a [`TransferTool`].

use crate::config::{BucketOrigin, CacheConfig, CacheProps};
use crate::error::TransferDirection;
use crate::invoker::{
    CredentialFlags, Invocation, Operation, ToolOutput, TransferSettings, TransferTool,
};
use crate::location::{RemoteLocation, bucket_url};
use crate::{Error, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Line printed by `ossutil du` when the location holds nothing
pub const EMPTY_USAGE_MARKER: &str = "total object count: 0";

const OBJECT_COUNT_LABEL: &str = "total object count:";

/// Markers in `ossutil stat` output meaning the bucket does not exist
const BUCKET_MISSING_MARKERS: [&str; 2] = ["NoSuchBucket", "StatusCode=404"];

/// Result of the restore phase, handed to the persist phase by the host
#[derive(Debug, Default)]
pub struct CacheOutcome {
    /// A non-empty cache was found at the remote location
    pub cache_hit: bool,
    /// What went wrong, if anything
    pub error: Option<Error>,
}

impl CacheOutcome {
    /// Cache found and restored
    #[must_use]
    pub const fn hit() -> Self {
        Self {
            cache_hit: true,
            error: None,
        }
    }

    /// Nothing cached yet
    #[must_use]
    pub const fn miss() -> Self {
        Self {
            cache_hit: false,
            error: None,
        }
    }

    /// Attach an error to this outcome
    #[must_use]
    pub fn with_error(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }
}

/// What the bucket existence probe said
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    /// Probe succeeded
    Exists,
    /// Probe reported the bucket as absent
    Missing,
    /// Probe failed for another reason
    Unknown,
}

/// Classify the result of `ossutil stat oss://<bucket>`
///
/// Only an explicit not-found answer counts as [`BucketStatus::Missing`];
/// launch failures, timeouts and other errors are [`BucketStatus::Unknown`].
#[must_use]
pub fn classify_bucket_probe(result: &io::Result<ToolOutput>) -> BucketStatus {
    match result {
        Ok(out) if out.success() => BucketStatus::Exists,
        Ok(out) => {
            let missing = BUCKET_MISSING_MARKERS
                .iter()
                .any(|m| out.stdout.contains(m) || out.stderr.contains(m));
            if missing {
                BucketStatus::Missing
            } else {
                BucketStatus::Unknown
            }
        }
        Err(_) => BucketStatus::Unknown,
    }
}

/// Whether a `du` report says the location holds zero objects
///
/// `ossutil` prints the count followed by other columns on the same line,
/// so only the first token after the label is read.
#[must_use]
pub fn usage_reports_empty(report: &str) -> bool {
    if !report.contains(EMPTY_USAGE_MARKER) {
        return false;
    }
    report.match_indices(OBJECT_COUNT_LABEL).any(|(at, label)| {
        report[at + label.len()..].split_whitespace().next() == Some("0")
    })
}

/// Restore/persist engine for one step instance
pub struct CacheEngine {
    config: CacheConfig,
    location: RemoteLocation,
    flags: CredentialFlags,
    settings: TransferSettings,
    tool: Arc<dyn TransferTool>,
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("location", &self.location)
            .field("bucket_origin", &self.config.bucket_origin())
            .field("local_path", &self.config.local_path())
            .finish_non_exhaustive()
    }
}

impl CacheEngine {
    /// Create an engine for a validated configuration
    #[must_use]
    pub fn new(
        config: CacheConfig,
        settings: TransferSettings,
        tool: Arc<dyn TransferTool>,
    ) -> Self {
        let location = config.location();
        let flags = CredentialFlags::new(&config, &settings);
        Self {
            config,
            location,
            flags,
            settings,
            tool,
        }
    }

    /// Validate `props` and create an engine
    pub fn from_props(
        props: CacheProps,
        settings: TransferSettings,
        tool: Arc<dyn TransferTool>,
    ) -> Result<Self> {
        Ok(Self::new(CacheConfig::from_props(props)?, settings, tool))
    }

    /// The configuration this engine was built from
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The remote location of the cache
    #[must_use]
    pub const fn location(&self) -> &RemoteLocation {
        &self.location
    }

    /// Local directory, relative paths resolved against the working directory
    #[must_use]
    pub fn local_dir(&self) -> PathBuf {
        let local = self.config.local_path();
        match self.config.working_dir() {
            Some(dir) if local.is_relative() => dir.join(local),
            _ => local.to_path_buf(),
        }
    }

    /// Restore the cache into the local path
    #[instrument(skip_all, fields(location = %self.location))]
    pub async fn run(&self) -> CacheOutcome {
        if self.config.bucket_origin() == BucketOrigin::SelfProvisioned {
            if self.config.credentials().account_id().is_empty() {
                warn!(
                    bucket = %self.config.bucket(),
                    "no account id to name the cache bucket, skipping bucket provisioning"
                );
            } else if let Err(e) = self.ensure_bucket().await {
                warn!(error = %e, "continuing without a confirmed bucket");
            }
        }

        match self.probe_usage().await {
            Ok(true) => {
                info!("cache miss: no objects stored under the cache key");
                return CacheOutcome::miss();
            }
            Ok(false) => debug!("cache hit"),
            Err(e) => {
                error!(error = %e, "usage probe failed");
                return CacheOutcome::miss().with_error(e);
            }
        }

        let local = self.local_dir();
        if let Err(e) = self.ensure_local_path(&local).await {
            error!(error = %e, "cannot prepare local path for restore");
            return CacheOutcome::hit().with_error(e);
        }

        match self
            .copy(TransferDirection::Download, self.location.as_str(), &local.to_string_lossy())
            .await
        {
            Ok(out) => {
                if out.success() {
                    info!(path = %local.display(), "cache restored");
                } else {
                    warn!(
                        status = %out.describe_status(),
                        stderr = %out.stderr.trim(),
                        "cache restore copy did not finish cleanly"
                    );
                }
                CacheOutcome::hit()
            }
            Err(e) => {
                error!(error = %e, "cache restore copy could not start");
                CacheOutcome::hit().with_error(e)
            }
        }
    }

    /// Persist the local path to the remote location
    ///
    /// Runs regardless of the restore outcome; failures are logged only.
    #[instrument(skip_all, fields(location = %self.location))]
    pub async fn post_run(&self, prior_hit: bool, prior_error: Option<&str>) {
        debug!(
            cache_hit = prior_hit,
            restore_error = prior_error.unwrap_or("none"),
            "restore phase outcome"
        );
        info!("pushing cache");

        let local = self.local_dir();
        if let Err(e) = self.ensure_local_path(&local).await {
            error!(error = %e, "cannot prepare local path for persist");
            return;
        }

        match self
            .copy(TransferDirection::Upload, &local.to_string_lossy(), self.location.as_str())
            .await
        {
            Ok(out) if out.success() => info!("cache pushed"),
            Ok(out) => warn!(
                status = %out.describe_status(),
                stderr = %out.stderr.trim(),
                "cache push did not finish cleanly"
            ),
            Err(e) => error!(error = %e, "cache push could not start"),
        }
    }

    /// Probe the self-provisioned bucket and create it if it is missing
    async fn ensure_bucket(&self) -> Result<()> {
        let url = bucket_url(self.config.bucket());
        let probe = self.tool.execute(&self.invocation(Operation::Stat, &[url.as_str()])).await;
        if let Ok(out) = &probe {
            debug!(stdout = %out.stdout.trim(), status = ?out.status, "bucket probe finished");
        }

        match classify_bucket_probe(&probe) {
            BucketStatus::Exists => Ok(()),
            BucketStatus::Unknown => {
                let reason = match &probe {
                    Ok(out) => out.describe_status(),
                    Err(e) => e.to_string(),
                };
                warn!(bucket = %self.config.bucket(), %reason, "bucket probe inconclusive");
                Ok(())
            }
            BucketStatus::Missing => {
                info!(bucket = %self.config.bucket(), "creating cache bucket");
                let created = self
                    .tool
                    .execute(&self.invocation(Operation::MakeBucket, &[url.as_str()]))
                    .await;
                match created {
                    Ok(out) if out.success() => Ok(()),
                    Ok(out) => Err(Error::bucket_provision(
                        self.config.bucket(),
                        format!("{}: {}", out.describe_status(), out.stderr.trim()),
                    )),
                    Err(e) => Err(Error::bucket_provision(self.config.bucket(), e.to_string())),
                }
            }
        }
    }

    /// Returns `true` when the remote location holds no objects
    async fn probe_usage(&self) -> Result<bool> {
        let inv = self.invocation(Operation::Du, &[self.location.as_str()]);
        let out = self
            .tool
            .execute(&inv)
            .await
            .map_err(|e| Error::probe(Operation::Du.subcommand(), e.to_string()))?;
        debug!(status = ?out.status, stdout = %out.stdout.trim(), "usage probe finished");

        if !out.success() {
            return Err(Error::probe(Operation::Du.subcommand(), out.describe_status()));
        }
        Ok(usage_reports_empty(&out.stdout))
    }

    async fn ensure_local_path(&self, local: &Path) -> Result<()> {
        tokio::fs::create_dir_all(local)
            .await
            .map_err(|e| Error::io(e, local, "create_dir_all"))
    }

    async fn copy(&self, direction: TransferDirection, src: &str, dst: &str) -> Result<ToolOutput> {
        let operation = match direction {
            TransferDirection::Download => Operation::CopyIn,
            TransferDirection::Upload => Operation::CopyOut,
        };
        let inv = self.invocation(operation, &[src, dst]);
        debug!(command = %inv, "starting copy");
        let out = self
            .tool
            .execute(&inv)
            .await
            .map_err(|e| Error::transfer_launch(direction, e))?;
        debug!(status = ?out.status, stdout = %out.stdout.trim(), "copy finished");
        Ok(out)
    }

    fn invocation(&self, operation: Operation, operands: &[&str]) -> Invocation {
        Invocation::build(
            operation,
            operands,
            &self.settings,
            &self.flags,
            self.config.working_dir(),
        )
    }
}
