//! stepcache CLI
//!
//! Host shim for the cache step: `stepcache run` restores before the wrapped
//! step body, `stepcache post-run` persists after it.

// Fatal errors are reported on stderr
#![allow(clippy::print_stderr)]

mod cli;
mod commands;
mod logging;

use crate::cli::Commands;
use crate::logging::TracingConfig;
use stepcache_step::CacheStep;

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    if let Err(error) = run_main().await {
        eprintln!("{error:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> miette::Result<()> {
    let cli = cli::parse();

    logging::init_tracing(TracingConfig {
        format: cli.tracing_format(),
        level: cli.level.into(),
    })?;

    let step = CacheStep::with_process_tool(cli.transfer.into());
    match &cli.command {
        Commands::Run(args) => {
            commands::run(&step, args).await?;
        }
        Commands::PostRun(args) => commands::post_run(&step, args).await?,
    }
    Ok(())
}
