//! Property-based tests for configuration validation and location derivation.
//!
//! These tests verify the contracts that must hold for every input:
//! - Rejection: any config missing a required field lists exactly those fields
//!   and never reaches the transfer tool
//! - Idempotence: a trailing slash on the cache key does not move the location

use async_trait::async_trait;
use proptest::prelude::*;
use stepcache_cache::{
    CacheEngine, CacheProps, Credentials, Error, Invocation, RemoteLocation, ToolOutput,
    TransferSettings, TransferTool,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts invocations without answering any of them
#[derive(Default)]
struct CountingTool {
    calls: AtomicUsize,
}

#[async_trait]
impl TransferTool for CountingTool {
    async fn execute(&self, _invocation: &Invocation) -> io::Result<ToolOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ToolOutput::default())
    }
}

const REGION: u8 = 0b0001;
const CREDENTIALS: u8 = 0b0010;
const KEY: u8 = 0b0100;
const PATH: u8 = 0b1000;

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Ways a credential pair can be incomplete
fn broken_credentials_strategy() -> impl Strategy<Value = Credentials> {
    prop_oneof![
        Just(Credentials::new("1740298130743624", "", "SECRET")),
        Just(Credentials::new("1740298130743624", "AKID", "")),
        Just(Credentials::new("", "", "")),
        Just(Credentials::new("1740298130743624", "", "").with_security_token("TOKEN")),
    ]
}

/// Cache keys as users write them, possibly nested
fn key_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_.-]{1,16}(/[A-Za-z0-9_.-]{1,8}){0,2}".prop_map(String::from)
}

fn bucket_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9-]{2,20}".prop_map(String::from)
}

fn prefix_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[a-z0-9-]{0,12}".prop_map(String::from))
}

/// Props with the fields selected by `missing` blanked out
fn props_missing(missing: u8, credentials: Credentials) -> CacheProps {
    CacheProps {
        object_key: if missing & KEY == 0 { "deps".to_string() } else { String::new() },
        region: if missing & REGION == 0 { "cn-hongkong".to_string() } else { String::new() },
        bucket: Some("team".to_string()),
        prefix: None,
        local_path: if missing & PATH == 0 { PathBuf::from("out") } else { PathBuf::new() },
        credentials: if missing & CREDENTIALS == 0 {
            Credentials::new("1740298130743624", "AKID", "SECRET")
        } else {
            credentials
        },
        internal: false,
        working_dir: None,
    }
}

fn expected_violations(missing: u8) -> Vec<&'static str> {
    [
        (REGION, "region is empty"),
        (
            CREDENTIALS,
            "credentials are invalid: access key id and access key secret are required",
        ),
        (KEY, "cache key is empty"),
        (PATH, "local path is empty"),
    ]
    .into_iter()
    .filter(|(field, _)| missing & field != 0)
    .map(|(_, message)| message)
    .collect()
}

// =============================================================================
// Property Tests: Rejection
// =============================================================================

proptest! {
    /// Contract: every non-empty set of missing fields is reported exactly,
    /// in rule order, and no remote call is made
    #[test]
    fn incomplete_config_lists_exactly_missing_fields(
        missing in 1u8..16,
        credentials in broken_credentials_strategy(),
    ) {
        let tool = Arc::new(CountingTool::default());
        let dyn_tool: Arc<dyn TransferTool> = tool.clone();

        let result = CacheEngine::from_props(
            props_missing(missing, credentials),
            TransferSettings::default(),
            dyn_tool,
        );

        match result {
            Err(Error::Validation { violations }) => {
                prop_assert_eq!(violations, expected_violations(missing));
            }
            other => prop_assert!(false, "expected validation error, got {:?}", other),
        }
        prop_assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
    }
}

// =============================================================================
// Property Tests: Location derivation
// =============================================================================

proptest! {
    /// Contract: `key` and `key/` resolve to the same remote location
    #[test]
    fn trailing_slash_on_key_is_idempotent(
        bucket in bucket_strategy(),
        key in key_strategy(),
        prefix in prefix_strategy(),
    ) {
        let bare = RemoteLocation::derive(&bucket, &key, prefix.as_deref());
        let slashed = RemoteLocation::derive(&bucket, &format!("{key}/"), prefix.as_deref());

        prop_assert_eq!(bare, slashed);
    }

    /// Contract: the location always names the bucket and ends in a directory
    #[test]
    fn location_is_a_directory_in_the_bucket(
        bucket in bucket_strategy(),
        key in key_strategy(),
        prefix in prefix_strategy(),
    ) {
        let location = RemoteLocation::derive(&bucket, &key, prefix.as_deref());
        let bucket_root = format!("oss://{bucket}/");

        prop_assert!(location.as_str().starts_with(&bucket_root));
        prop_assert!(location.as_str().ends_with('/'));
        prop_assert!(!location.as_str()[bucket_root.len()..].starts_with('/'));
    }
}
