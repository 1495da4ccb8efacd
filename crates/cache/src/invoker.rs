//! Transfer tool invocation
//!
//! Every remote operation is an [`Invocation`] of the ossutil command line
//! tool. Invocations are structured argument lists, never shell strings, and
//! carry credentials as [`CommandArg::Secret`] so that rendering an
//! invocation for logs masks them.

use crate::config::CacheConfig;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Default transfer tool binary
pub const DEFAULT_PROGRAM: &str = "ossutil";

/// Default timeout for metadata probes
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of files copied in parallel
pub const DEFAULT_PARALLELISM: u32 = 50;

/// Default size above which files are copied in resumable chunks
pub const DEFAULT_BIGFILE_THRESHOLD: u64 = 9_223_372_036_854_775_800;

/// Default endpoint domain
pub const DEFAULT_ENDPOINT_DOMAIN: &str = "aliyuncs.com";

/// Placeholder for masked arguments
pub const REDACTED_PLACEHOLDER: &str = "*_*";

/// Deployment-level settings for invoking the transfer tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
    /// Program to run
    pub program: String,
    /// Timeout applied to `stat`, `mb` and `du`
    pub probe_timeout: Duration,
    /// `-j` value for copies
    pub parallelism: u32,
    /// `--bigfile-threshold` value for copies, in bytes
    pub bigfile_threshold: u64,
    /// Domain appended to the regional endpoint
    pub endpoint_domain: String,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            parallelism: DEFAULT_PARALLELISM,
            bigfile_threshold: DEFAULT_BIGFILE_THRESHOLD,
            endpoint_domain: DEFAULT_ENDPOINT_DOMAIN.to_string(),
        }
    }
}

impl TransferSettings {
    /// Copy flags shared by restore and persist
    #[must_use]
    pub fn copy_flags(&self) -> Vec<String> {
        vec![
            "-r".to_string(),
            "-f".to_string(),
            "-j".to_string(),
            self.parallelism.to_string(),
            format!("--bigfile-threshold={}", self.bigfile_threshold),
        ]
    }
}

/// Endpoint host for a region, `oss-<region>[-internal].<domain>`
#[must_use]
pub fn endpoint(region: &str, internal: bool, domain: &str) -> String {
    let suffix = if internal { "-internal" } else { "" };
    format!("oss-{region}{suffix}.{domain}")
}

/// One command line argument
#[derive(Clone)]
pub enum CommandArg {
    /// Rendered as-is
    Plain(String),
    /// Passed to the process but masked when rendered
    Secret(SecretString),
}

impl CommandArg {
    /// The real argument value
    #[must_use]
    pub fn expose(&self) -> &str {
        match self {
            Self::Plain(s) => s,
            Self::Secret(s) => s.expose_secret(),
        }
    }

    /// Whether this argument is masked when rendered
    #[must_use]
    pub const fn is_secret(&self) -> bool {
        matches!(self, Self::Secret(_))
    }
}

impl From<&str> for CommandArg {
    fn from(s: &str) -> Self {
        Self::Plain(s.to_string())
    }
}

impl From<String> for CommandArg {
    fn from(s: String) -> Self {
        Self::Plain(s)
    }
}

impl fmt::Display for CommandArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(s) => f.write_str(s),
            Self::Secret(_) => f.write_str(REDACTED_PLACEHOLDER),
        }
    }
}

impl fmt::Debug for CommandArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string())
    }
}

/// Endpoint and credential flags, assembled once per configuration
#[derive(Debug, Clone)]
pub struct CredentialFlags(Vec<CommandArg>);

impl CredentialFlags {
    /// Build the flags appended to every invocation for `config`
    #[must_use]
    pub fn new(config: &CacheConfig, settings: &TransferSettings) -> Self {
        let creds = config.credentials();
        let mut args = vec![
            CommandArg::from("-e"),
            CommandArg::Plain(endpoint(
                config.region(),
                config.internal_endpoint(),
                &settings.endpoint_domain,
            )),
            CommandArg::from("-i"),
            CommandArg::from(creds.access_key_id()),
            CommandArg::from("-k"),
            CommandArg::Secret(creds.access_key_secret().clone()),
        ];
        if let Some(token) = creds.security_token() {
            args.push(CommandArg::from("-t"));
            args.push(CommandArg::Secret(token.clone()));
        }
        Self(args)
    }

    /// The flags in order
    #[must_use]
    pub fn args(&self) -> &[CommandArg] {
        &self.0
    }
}

/// Kind of remote operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Bucket existence probe
    Stat,
    /// Bucket creation
    MakeBucket,
    /// Usage probe on the remote location
    Du,
    /// Remote to local copy
    CopyIn,
    /// Local to remote copy
    CopyOut,
}

impl Operation {
    /// ossutil subcommand
    #[must_use]
    pub const fn subcommand(self) -> &'static str {
        match self {
            Self::Stat => "stat",
            Self::MakeBucket => "mb",
            Self::Du => "du",
            Self::CopyIn | Self::CopyOut => "cp",
        }
    }

    /// Probes are bounded by the probe timeout, copies are not
    #[must_use]
    pub const fn is_probe(self) -> bool {
        matches!(self, Self::Stat | Self::MakeBucket | Self::Du)
    }
}

/// A fully assembled command
#[derive(Debug, Clone)]
pub struct Invocation {
    /// What the command does
    pub operation: Operation,
    /// Program to run
    pub program: String,
    /// Arguments, subcommand first
    pub args: Vec<CommandArg>,
    /// Upper bound on the run time
    pub timeout: Option<Duration>,
    /// Working directory of the child
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    /// Assemble `<program> <subcommand> <operands..> [copy flags] <credential flags>`
    #[must_use]
    pub fn build(
        operation: Operation,
        operands: &[&str],
        settings: &TransferSettings,
        flags: &CredentialFlags,
        current_dir: Option<&Path>,
    ) -> Self {
        let mut args: Vec<CommandArg> = Vec::with_capacity(operands.len() + 12);
        args.push(CommandArg::from(operation.subcommand()));
        args.extend(operands.iter().map(|op| CommandArg::from(*op)));
        if !operation.is_probe() {
            args.extend(settings.copy_flags().into_iter().map(CommandArg::Plain));
        }
        args.extend(flags.args().iter().cloned());

        Self {
            operation,
            program: settings.program.clone(),
            args,
            timeout: operation.is_probe().then_some(settings.probe_timeout),
            current_dir: current_dir.map(Path::to_path_buf),
        }
    }

    /// Arguments as they appear in logs, secrets masked
    #[must_use]
    pub fn rendered_args(&self) -> Vec<String> {
        self.args.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` when the process was terminated by a signal
    pub status: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ToolOutput {
    /// Exit code 0
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.status, Some(0))
    }

    /// Human readable exit status
    #[must_use]
    pub fn describe_status(&self) -> String {
        self.status.map_or_else(
            || "terminated without exit status".to_string(),
            |code| format!("exited with status {code}"),
        )
    }
}

/// Executes invocations
///
/// The process-backed [`ProcessTool`] is used in production; tests substitute
/// recording stubs.
#[async_trait]
pub trait TransferTool: Send + Sync {
    /// Run the command to completion (or until its timeout elapses)
    ///
    /// An `Err` means the command could not be launched or timed out; a
    /// command that ran and failed is an `Ok` with a non-zero status.
    async fn execute(&self, invocation: &Invocation) -> io::Result<ToolOutput>;
}

/// Runs invocations as child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessTool;

impl ProcessTool {
    /// Create a process-backed tool
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransferTool for ProcessTool {
    async fn execute(&self, invocation: &Invocation) -> io::Result<ToolOutput> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(invocation.args.iter().map(CommandArg::expose));
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        if let Some(dir) = &invocation.current_dir {
            cmd.current_dir(dir);
        }

        tracing::trace!(command = %invocation, "spawning transfer tool");

        let output = match invocation.timeout {
            Some(limit) => timeout(limit, cmd.output()).await.map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("timed out after {}ms", limit.as_millis()),
                )
            })??,
            None => cmd.output().await?,
        };

        Ok(ToolOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheProps, Credentials};

    fn config(token: Option<&str>, internal: bool) -> CacheConfig {
        let mut credentials = Credentials::new("42", "AKID", "top-secret");
        if let Some(token) = token {
            credentials = credentials.with_security_token(token);
        }
        CacheConfig::from_props(CacheProps {
            object_key: "key".to_string(),
            region: "cn-shanghai".to_string(),
            local_path: PathBuf::from("/tmp/cache"),
            credentials,
            internal,
            ..CacheProps::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_public_and_internal() {
        assert_eq!(
            endpoint("cn-hongkong", false, "aliyuncs.com"),
            "oss-cn-hongkong.aliyuncs.com"
        );
        assert_eq!(
            endpoint("cn-hongkong", true, "aliyuncs.com"),
            "oss-cn-hongkong-internal.aliyuncs.com"
        );
    }

    #[test]
    fn test_credential_flags_without_token() {
        let flags = CredentialFlags::new(&config(None, false), &TransferSettings::default());
        let exposed: Vec<&str> = flags.args().iter().map(CommandArg::expose).collect();
        assert_eq!(
            exposed,
            vec![
                "-e",
                "oss-cn-shanghai.aliyuncs.com",
                "-i",
                "AKID",
                "-k",
                "top-secret"
            ]
        );
    }

    #[test]
    fn test_credential_flags_with_token_and_internal() {
        let flags = CredentialFlags::new(&config(Some("sts-token"), true), &TransferSettings::default());
        let exposed: Vec<&str> = flags.args().iter().map(CommandArg::expose).collect();
        assert_eq!(exposed[1], "oss-cn-shanghai-internal.aliyuncs.com");
        assert_eq!(&exposed[6..], ["-t", "sts-token"]);
        assert!(flags.args()[7].is_secret());
    }

    #[test]
    fn test_probe_invocation_has_timeout_and_no_copy_flags() {
        let settings = TransferSettings::default();
        let flags = CredentialFlags::new(&config(None, false), &settings);
        let inv = Invocation::build(Operation::Du, &["oss://b/cache-home/key/"], &settings, &flags, None);
        assert_eq!(inv.timeout, Some(DEFAULT_PROBE_TIMEOUT));
        assert_eq!(inv.rendered_args()[..2], ["du", "oss://b/cache-home/key/"]);
        assert!(!inv.rendered_args().iter().any(|a| a == "-r"));
    }

    #[test]
    fn test_copy_invocation_has_copy_flags_and_no_timeout() {
        let settings = TransferSettings {
            parallelism: 8,
            bigfile_threshold: 1024,
            ..TransferSettings::default()
        };
        let flags = CredentialFlags::new(&config(None, false), &settings);
        let inv = Invocation::build(
            Operation::CopyIn,
            &["oss://b/p/k/", "/tmp/cache"],
            &settings,
            &flags,
            Some(Path::new("/work")),
        );
        assert_eq!(inv.timeout, None);
        assert_eq!(inv.current_dir.as_deref(), Some(Path::new("/work")));
        assert_eq!(
            inv.rendered_args()[..8],
            [
                "cp",
                "oss://b/p/k/",
                "/tmp/cache",
                "-r",
                "-f",
                "-j",
                "8",
                "--bigfile-threshold=1024"
            ]
        );
    }

    #[test]
    fn test_rendered_invocation_masks_secrets() {
        let settings = TransferSettings::default();
        let flags = CredentialFlags::new(&config(Some("sts-token"), false), &settings);
        let inv = Invocation::build(Operation::Stat, &["oss://b/"], &settings, &flags, None);
        let line = inv.to_string();
        assert!(line.starts_with("ossutil stat oss://b/ -e"));
        assert!(!line.contains("top-secret"));
        assert!(!line.contains("sts-token"));
        assert!(line.contains("-k *_*"));
        assert!(!format!("{inv:?}").contains("top-secret"));
    }

    fn raw(program: &str, args: &[&str], limit: Option<Duration>) -> Invocation {
        Invocation {
            operation: Operation::Du,
            program: program.to_string(),
            args: args.iter().map(|a| CommandArg::from(*a)).collect(),
            timeout: limit,
            current_dir: None,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_tool_captures_stdout() {
        let out = ProcessTool::new()
            .execute(&raw("echo", &["total object count: 0"], Some(Duration::from_secs(5))))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "total object count: 0");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_tool_reports_exit_status() {
        let out = ProcessTool::new()
            .execute(&raw("sh", &["-c", "echo oops >&2; exit 3"], None))
            .await
            .unwrap();
        assert_eq!(out.status, Some(3));
        assert!(!out.success());
        assert_eq!(out.stderr.trim(), "oops");
        assert_eq!(out.describe_status(), "exited with status 3");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_tool_passes_secret_verbatim() {
        let mut inv = raw("echo", &[], None);
        inv.args.push(CommandArg::Secret(SecretString::from("hidden; rm -rf /".to_string())));
        let out = ProcessTool::new().execute(&inv).await.unwrap();
        assert_eq!(out.stdout.trim(), "hidden; rm -rf /");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_tool_times_out() {
        let err = ProcessTool::new()
            .execute(&raw("sleep", &["5"], Some(Duration::from_millis(100))))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_process_tool_missing_program() {
        let err = ProcessTool::new()
            .execute(&raw("stepcache-definitely-missing-binary", &[], None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
