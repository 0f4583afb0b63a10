mod app;
mod cli;
mod config;
mod fallback;
mod input;
mod items;
mod llm;
mod model;
mod reply;
mod render;
mod sim;
mod storage;
mod task;
#[cfg(test)]
mod testutil;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::fs::OpenOptions;
use std::path::Path;

/// `RUST_LOG` wins; otherwise warn, or info with `--debug`. The interactive
/// screen owns the terminal, so `run` logs to a file instead of stderr.
fn init_logging(debug: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if debug { "info" } else { "warn" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.clone().unwrap_or(Commands::Run);

    let paths = config::project_paths(cli.save_dir.as_deref())?;
    let interactive = matches!(command, Commands::Run);
    init_logging(cli.debug, interactive.then_some(paths.log_path.as_path()))?;
    let settings = config::load(&paths);

    match command {
        Commands::Run => app::run(settings, &paths).await,
        Commands::Status => cli::status(&settings, &paths),
        Commands::Reset { force } => cli::reset(&paths, force),
        Commands::Config {
            show,
            write_defaults,
        } => cli::configure(&settings, &paths, show, write_defaults),
        Commands::Items(args) => cli::items(&settings, &paths, &args),
    }
}
