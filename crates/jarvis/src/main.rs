//! jarvis: compose, sign, broadcast and inspect EVM transactions from the terminal.

use clap::Parser;
use eyre::WrapErr;

use jarvis_adapters::AdapterConfig;
use jarvis_core::PortError;

mod app;
mod cli;
mod commands;
mod render;

pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIME"),
    ")"
);

fn run(cli: cli::Cli) -> eyre::Result<i32> {
    let config = AdapterConfig::from_env();
    tracing::debug!(home = %config.home_dir.display(), "configuration loaded");
    let app = app::App::new(config, cli.json_output);
    let code = commands::run(&app, &cli.network, cli.command)
        .wrap_err_with(|| format!("on network {}", cli.network))?;
    Ok(code)
}

fn main() {
    let cli = cli::Cli::parse();

    // Logs go to stderr so stdout stays parseable with --json-output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let code = match run(cli) {
        Ok(code) => code,
        Err(report) => {
            eprintln!("error: {report:#}");
            report
                .downcast_ref::<PortError>()
                .map(PortError::exit_code)
                .unwrap_or(2)
        }
    };
    std::process::exit(code);
}
