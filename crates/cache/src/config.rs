//! Cache configuration and validation
//!
//! [`CacheProps`] is the loosely populated record produced at the host
//! boundary. [`CacheConfig::from_props`] is the only way to obtain a
//! [`CacheConfig`]: it either yields a fully valid configuration or an
//! [`Error::Validation`] listing every violated rule.

use crate::location::RemoteLocation;
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};

/// Access credentials for the object store
///
/// The secret and the optional STS token never show up in `Debug` output.
#[derive(Clone, Debug)]
pub struct Credentials {
    account_id: String,
    access_key_id: String,
    access_key_secret: SecretString,
    security_token: Option<SecretString>,
}

impl Credentials {
    /// Create long-lived credentials
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            access_key_id: access_key_id.into(),
            access_key_secret: SecretString::from(access_key_secret.into()),
            security_token: None,
        }
    }

    /// Attach an STS security token
    #[must_use]
    pub fn with_security_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.security_token = (!token.is_empty()).then(|| SecretString::from(token));
        self
    }

    /// Account the credentials belong to
    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Access key id
    #[must_use]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub(crate) const fn access_key_secret(&self) -> &SecretString {
        &self.access_key_secret
    }

    pub(crate) const fn security_token(&self) -> Option<&SecretString> {
        self.security_token.as_ref()
    }

    /// Whether the credentials carry a temporary STS token
    #[must_use]
    pub const fn has_security_token(&self) -> bool {
        self.security_token.is_some()
    }

    fn is_complete(&self) -> bool {
        !self.access_key_id.is_empty() && !self.access_key_secret.expose_secret().is_empty()
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new(String::new(), String::new(), String::new())
    }
}

/// Raw configuration fields as resolved from the host context
#[derive(Debug, Clone, Default)]
pub struct CacheProps {
    /// Cache key
    pub object_key: String,
    /// Region of the object store
    pub region: String,
    /// Explicit bucket; `None` or empty means self-provisioned
    pub bucket: Option<String>,
    /// Remote prefix; `None` means the default prefix
    pub prefix: Option<String>,
    /// Local directory restored into and persisted from
    pub local_path: PathBuf,
    /// Object store credentials
    pub credentials: Credentials,
    /// Use the internal-network endpoint
    pub internal: bool,
    /// Working directory for bulk copies
    pub working_dir: Option<PathBuf>,
}

/// Where the bucket name came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketOrigin {
    /// Supplied by the caller; assumed to exist and never created
    Provided,
    /// Synthesized from region and account; created on first use
    SelfProvisioned,
}

/// Validated cache configuration, immutable once built
#[derive(Debug, Clone)]
pub struct CacheConfig {
    object_key: String,
    region: String,
    bucket: String,
    bucket_origin: BucketOrigin,
    prefix: Option<String>,
    local_path: PathBuf,
    credentials: Credentials,
    internal_endpoint: bool,
    working_dir: Option<PathBuf>,
}

/// Name of the bucket used when the caller does not supply one
#[must_use]
pub fn self_provisioned_bucket(region: &str, account_id: &str) -> String {
    format!("cache-{region}-{account_id}")
}

impl CacheConfig {
    /// Validate raw props into a configuration
    ///
    /// All rules are checked before failing so the caller sees every
    /// missing field at once. On success the working directory, if any,
    /// is created.
    pub fn from_props(props: CacheProps) -> Result<Self> {
        let mut violations = Vec::new();

        if props.region.is_empty() {
            violations.push("region is empty".to_string());
        }
        if !props.credentials.is_complete() {
            violations.push(
                "credentials are invalid: access key id and access key secret are required"
                    .to_string(),
            );
        }
        if props.object_key.is_empty() {
            violations.push("cache key is empty".to_string());
        }
        if props.local_path.as_os_str().is_empty() {
            violations.push("local path is empty".to_string());
        }

        if !violations.is_empty() {
            tracing::debug!(?violations, "cache configuration rejected");
            return Err(Error::validation(violations));
        }

        let (bucket, bucket_origin) = match props.bucket.filter(|b| !b.is_empty()) {
            Some(bucket) => (bucket, BucketOrigin::Provided),
            None => (
                self_provisioned_bucket(&props.region, props.credentials.account_id()),
                BucketOrigin::SelfProvisioned,
            ),
        };

        if let Some(dir) = &props.working_dir {
            std::fs::create_dir_all(dir).map_err(|e| Error::io(e, dir, "create_dir_all"))?;
        }

        let config = Self {
            object_key: props.object_key,
            region: props.region,
            bucket,
            bucket_origin,
            prefix: props.prefix,
            local_path: props.local_path,
            credentials: props.credentials,
            internal_endpoint: props.internal,
            working_dir: props.working_dir,
        };
        tracing::debug!(
            region = %config.region,
            bucket = %config.bucket,
            origin = ?config.bucket_origin,
            location = %config.location(),
            local_path = %config.local_path.display(),
            "cache configuration resolved"
        );
        Ok(config)
    }

    /// Cache key
    #[must_use]
    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    /// Region of the object store
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Bucket name, explicit or synthesized
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Whether the bucket name was supplied or synthesized
    #[must_use]
    pub const fn bucket_origin(&self) -> BucketOrigin {
        self.bucket_origin
    }

    /// Remote prefix as given by the caller
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Local directory
    #[must_use]
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Credentials
    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Whether the internal-network endpoint is used
    #[must_use]
    pub const fn internal_endpoint(&self) -> bool {
        self.internal_endpoint
    }

    /// Working directory for bulk copies
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Remote location this configuration maps to
    #[must_use]
    pub fn location(&self) -> RemoteLocation {
        RemoteLocation::derive(&self.bucket, &self.object_key, self.prefix.as_deref())
    }
}
