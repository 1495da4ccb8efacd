//! Typed view of the host engine's step inputs and context
//!
//! The host hands over two JSON documents: the step's own inputs
//! (`key`, `path`) and the execution context. Only the fields the cache
//! needs are modelled; everything else is ignored. Each default and
//! override rule lives in its own `resolve_*` function.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use stepcache_cache::{CacheProps, Credentials};
use std::fmt;
use std::path::PathBuf;

/// Inputs declared on the cache step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepInputs {
    /// Cache key
    pub key: String,
    /// Local directory to restore into and persist from
    pub path: String,
}

/// Execution context supplied by the host engine
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StepContext {
    /// Working directory of the step
    pub cwd: Option<PathBuf>,
    /// Engine-level inputs
    pub inputs: EngineInputs,
}

/// Engine-level inputs carried in the context
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineInputs {
    /// Region the engine itself runs in
    pub current_region: Option<String>,
    /// Account id of the caller
    #[serde(deserialize_with = "string_or_number")]
    pub uid: Option<String>,
    /// Temporary credentials
    pub sts: Option<StsCredentials>,
    /// Free-form engine data
    pub ctx: Option<EngineCtx>,
}

/// STS-style credentials
#[derive(Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StsCredentials {
    /// Account the credentials belong to
    #[serde(deserialize_with = "string_or_number")]
    pub account_id: Option<String>,
    /// Access key id
    pub access_key_id: Option<String>,
    /// Access key secret
    pub access_key_secret: Option<String>,
    /// Security token for temporary credentials
    pub security_token: Option<String>,
}

impl fmt::Debug for StsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StsCredentials")
            .field("account_id", &self.account_id)
            .field("access_key_id", &self.access_key_id)
            .field(
                "access_key_secret",
                &self.access_key_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "security_token",
                &self.security_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// `ctx` object of the engine inputs
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineCtx {
    /// Engine data
    pub data: Option<EngineData>,
}

/// `ctx.data` object of the engine inputs
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineData {
    /// Cache overrides
    pub cache_config: Option<CacheOverrides>,
}

/// `ctx.data.cacheConfig`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheOverrides {
    /// Object storage overrides
    pub oss: Option<OssOverrides>,
}

/// `ctx.data.cacheConfig.oss`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OssOverrides {
    /// Region of the cache bucket
    pub region_id: Option<String>,
    /// Explicit bucket
    pub bucket_name: Option<String>,
    /// Remote prefix
    pub prefix: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

impl StepContext {
    fn oss(&self) -> Option<&OssOverrides> {
        self.inputs
            .ctx
            .as_ref()?
            .data
            .as_ref()?
            .cache_config
            .as_ref()?
            .oss
            .as_ref()
    }

    fn current_region(&self) -> Option<&str> {
        non_empty(self.inputs.current_region.as_ref())
    }
}

/// Cache region: `cacheConfig.oss.regionId`, then `currentRegion`, else empty
#[must_use]
pub fn resolve_region(context: &StepContext) -> String {
    context
        .oss()
        .and_then(|oss| non_empty(oss.region_id.as_ref()))
        .or_else(|| context.current_region())
        .unwrap_or_default()
        .to_string()
}

/// Explicit bucket from `cacheConfig.oss.bucketName`, if non-empty
#[must_use]
pub fn resolve_bucket(context: &StepContext) -> Option<String> {
    context
        .oss()
        .and_then(|oss| non_empty(oss.bucket_name.as_ref()))
        .map(str::to_string)
}

/// Remote prefix from `cacheConfig.oss.prefix`, if non-empty
#[must_use]
pub fn resolve_prefix(context: &StepContext) -> Option<String> {
    context
        .oss()
        .and_then(|oss| non_empty(oss.prefix.as_ref()))
        .map(str::to_string)
}

/// Account id: `sts.accountId`, then `uid`, else empty
#[must_use]
pub fn resolve_account_id(context: &StepContext) -> String {
    context
        .inputs
        .sts
        .as_ref()
        .and_then(|sts| non_empty(sts.account_id.as_ref()))
        .or_else(|| non_empty(context.inputs.uid.as_ref()))
        .unwrap_or_default()
        .to_string()
}

/// The internal endpoint is reachable only from the engine's own region
#[must_use]
pub fn resolve_internal(current_region: Option<&str>, region: &str) -> bool {
    current_region.is_some_and(|current| !current.is_empty() && current == region)
}

/// Working directory: context `cwd`, then the process's current directory
#[must_use]
pub fn resolve_working_dir(context: &StepContext) -> Option<PathBuf> {
    context
        .cwd
        .clone()
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| std::env::current_dir().ok())
}

/// Credentials from the context's STS block
#[must_use]
pub fn resolve_credentials(context: &StepContext) -> Credentials {
    let sts = context.inputs.sts.clone().unwrap_or_default();
    let credentials = Credentials::new(
        resolve_account_id(context),
        sts.access_key_id.unwrap_or_default(),
        sts.access_key_secret.unwrap_or_default(),
    );
    match sts.security_token {
        Some(token) => credentials.with_security_token(token),
        None => credentials,
    }
}

/// Assemble raw cache props from the step inputs and context
#[must_use]
pub fn cache_props(inputs: &StepInputs, context: &StepContext) -> CacheProps {
    let region = resolve_region(context);
    CacheProps {
        object_key: inputs.key.clone(),
        internal: resolve_internal(context.current_region(), &region),
        bucket: resolve_bucket(context),
        prefix: resolve_prefix(context),
        local_path: PathBuf::from(&inputs.path),
        credentials: resolve_credentials(context),
        working_dir: resolve_working_dir(context),
        region,
    }
}
