//! Remote location derivation

use std::fmt;

/// URL scheme understood by ossutil
pub const SCHEME: &str = "oss";

/// Prefix used when the caller does not give one
pub const DEFAULT_PREFIX: &str = "cache-home";

/// Directory-like remote URL a cache key maps to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteLocation(String);

impl RemoteLocation {
    /// Derive the remote URL for a cache key
    ///
    /// `oss://<bucket>/[<prefix>/]<key>/`. A `None` prefix falls back to
    /// [`DEFAULT_PREFIX`]; an empty prefix adds no segment. The result always
    /// ends in exactly the key's own trailing slash or one added slash.
    #[must_use]
    pub fn derive(bucket: &str, object_key: &str, prefix: Option<&str>) -> Self {
        let mut url = bucket_url(bucket);
        let prefix = prefix.unwrap_or(DEFAULT_PREFIX);
        if !prefix.is_empty() {
            url.push_str(prefix);
            url.push('/');
        }
        url.push_str(object_key);
        if !object_key.ends_with('/') {
            url.push('/');
        }
        Self(url)
    }

    /// The URL as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RemoteLocation {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// URL of a bucket root, `oss://<bucket>/`
#[must_use]
pub fn bucket_url(bucket: &str) -> String {
    format!("{SCHEME}://{bucket}/")
}
