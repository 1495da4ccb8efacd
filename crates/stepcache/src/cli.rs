use crate::logging::{LogLevel, TracingFormat};
use clap::{Args, Parser, Subcommand};
use miette::Diagnostic;
use std::path::PathBuf;
use std::time::Duration;
use stepcache_cache::TransferSettings;
use stepcache_cache::invoker::{
    DEFAULT_BIGFILE_THRESHOLD, DEFAULT_ENDPOINT_DOMAIN, DEFAULT_PARALLELISM, DEFAULT_PROGRAM,
};
use stepcache_step::StepError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Reading or writing a host document failed
    #[error("Failed to {operation} {}", path.display())]
    #[diagnostic(
        code(stepcache::cli::file_error),
        help("Check file permissions and ensure the path exists")
    )]
    File {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A host document was malformed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Step(#[from] StepError),

    /// Outputs could not be encoded
    #[error("Failed to encode step outputs: {0}")]
    #[diagnostic(code(stepcache::cli::encode))]
    Encode(#[from] serde_json::Error),
}

impl CliError {
    pub fn file(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            operation,
            path: path.into(),
            source,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "stepcache")]
#[command(about = "Restore and persist a step's artifact directory through object storage")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    #[arg(long, global = true, help = "Log format (pretty, compact, json)", default_value = "compact")]
    pub log_format: TracingFormat,

    #[arg(long, global = true, help = "Output logs in JSON format")]
    pub json: bool,

    #[command(flatten)]
    pub transfer: TransferArgs,
}

/// Deployment settings for the transfer tool
#[derive(Args, Debug, Clone)]
pub struct TransferArgs {
    #[arg(
        long,
        global = true,
        env = "STEPCACHE_OSSUTIL",
        default_value = DEFAULT_PROGRAM,
        help = "ossutil binary to invoke"
    )]
    pub ossutil: String,

    #[arg(
        long,
        global = true,
        env = "STEPCACHE_PROBE_TIMEOUT_SECS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Timeout in seconds for stat/mb/du probes"
    )]
    pub probe_timeout_secs: u64,

    #[arg(
        long,
        global = true,
        env = "STEPCACHE_PARALLELISM",
        default_value_t = DEFAULT_PARALLELISM,
        value_parser = clap::value_parser!(u32).range(1..=10_000),
        help = "Files copied in parallel"
    )]
    pub parallelism: u32,

    #[arg(
        long,
        global = true,
        env = "STEPCACHE_BIGFILE_THRESHOLD",
        default_value_t = DEFAULT_BIGFILE_THRESHOLD,
        help = "File size in bytes above which copies are resumable"
    )]
    pub bigfile_threshold: u64,

    #[arg(
        long,
        global = true,
        env = "STEPCACHE_ENDPOINT_DOMAIN",
        default_value = DEFAULT_ENDPOINT_DOMAIN,
        help = "Domain appended to oss-<region>[-internal]"
    )]
    pub endpoint_domain: String,
}

impl From<TransferArgs> for TransferSettings {
    fn from(args: TransferArgs) -> Self {
        Self {
            program: args.ossutil,
            probe_timeout: Duration::from_secs(args.probe_timeout_secs),
            parallelism: args.parallelism,
            bigfile_threshold: args.bigfile_threshold,
            endpoint_domain: args.endpoint_domain,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Restore the cache before the step runs")]
    Run(StepArgs),
    #[command(about = "Persist the cache after the step has run")]
    PostRun(StepArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StepArgs {
    #[arg(long, help = "JSON file with the step inputs (key, path)")]
    pub inputs: PathBuf,

    #[arg(long, help = "JSON file with the execution context")]
    pub context: PathBuf,

    #[arg(
        long,
        help = "Outputs file: written by `run` (stdout when omitted), read by `post-run`"
    )]
    pub outputs: Option<PathBuf>,
}

impl Cli {
    pub fn tracing_format(&self) -> TracingFormat {
        if self.json {
            TracingFormat::Json
        } else {
            self.log_format
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENV_KEYS: [&str; 5] = [
        "STEPCACHE_OSSUTIL",
        "STEPCACHE_PROBE_TIMEOUT_SECS",
        "STEPCACHE_PARALLELISM",
        "STEPCACHE_BIGFILE_THRESHOLD",
        "STEPCACHE_ENDPOINT_DOMAIN",
    ];

    fn parse_clean(args: &[&str]) -> Result<Cli, clap::Error> {
        temp_env::with_vars_unset(ENV_KEYS, || Cli::try_parse_from(args))
    }

    #[test]
    fn test_cli_default_values() {
        let cli = parse_clean(&["stepcache", "run", "--inputs", "i.json", "--context", "c.json"])
            .unwrap();

        assert_eq!(cli.level, LogLevel::Warn);
        assert_eq!(cli.tracing_format(), TracingFormat::Compact);
        let Commands::Run(args) = &cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.inputs, PathBuf::from("i.json"));
        assert!(args.outputs.is_none());

        let settings = TransferSettings::from(cli.transfer);
        assert_eq!(settings, TransferSettings::default());
    }

    #[test]
    fn test_post_run_with_outputs() {
        let cli = parse_clean(&[
            "stepcache",
            "post-run",
            "--inputs",
            "i.json",
            "--context",
            "c.json",
            "--outputs",
            "o.json",
        ])
        .unwrap();
        let Commands::PostRun(args) = cli.command else {
            panic!("expected post-run command");
        };
        assert_eq!(args.outputs, Some(PathBuf::from("o.json")));
    }

    #[test]
    fn test_json_flag_overrides_format() {
        let cli = parse_clean(&[
            "stepcache", "--json", "run", "--inputs", "i", "--context", "c",
        ])
        .unwrap();
        assert_eq!(cli.tracing_format(), TracingFormat::Json);
    }

    #[test]
    fn test_transfer_flags() {
        let cli = parse_clean(&[
            "stepcache",
            "run",
            "--inputs",
            "i",
            "--context",
            "c",
            "--parallelism",
            "8",
            "--probe-timeout-secs",
            "3",
            "--ossutil",
            "/opt/ossutil64",
        ])
        .unwrap();
        let settings = TransferSettings::from(cli.transfer);
        assert_eq!(settings.parallelism, 8);
        assert_eq!(settings.probe_timeout, Duration::from_secs(3));
        assert_eq!(settings.program, "/opt/ossutil64");
    }

    #[test]
    fn test_parallelism_out_of_range() {
        assert!(
            parse_clean(&["stepcache", "run", "--inputs", "i", "--context", "c", "--parallelism", "0"])
                .is_err()
        );
    }

    #[test]
    fn test_zero_probe_timeout_is_rejected() {
        assert!(
            parse_clean(&[
                "stepcache",
                "run",
                "--inputs",
                "i",
                "--context",
                "c",
                "--probe-timeout-secs",
                "0",
            ])
            .is_err()
        );
    }

    #[test]
    fn test_transfer_settings_from_env() {
        let cli = temp_env::with_vars(
            [
                ("STEPCACHE_OSSUTIL", Some("ossutil-test")),
                ("STEPCACHE_BIGFILE_THRESHOLD", Some("104857600")),
                ("STEPCACHE_ENDPOINT_DOMAIN", Some("example.com")),
                ("STEPCACHE_PROBE_TIMEOUT_SECS", None),
                ("STEPCACHE_PARALLELISM", None),
            ],
            || Cli::try_parse_from(["stepcache", "run", "--inputs", "i", "--context", "c"]),
        )
        .unwrap();
        let settings = TransferSettings::from(cli.transfer);
        assert_eq!(settings.program, "ossutil-test");
        assert_eq!(settings.bigfile_threshold, 104_857_600);
        assert_eq!(settings.endpoint_domain, "example.com");
        assert_eq!(settings.parallelism, DEFAULT_PARALLELISM);
    }

    #[test]
    fn test_missing_context_is_rejected() {
        assert!(parse_clean(&["stepcache", "run", "--inputs", "i"]).is_err());
    }
}
