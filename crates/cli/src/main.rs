//! `tessera`: inspect a tessera task cache

mod cli;
mod commands;
mod tracing;

use crate::cli::{Cli, Commands, parse};
use crate::tracing::{TracingConfig, correlation_id, init_tracing};
use std::io::Write;
use tessera_engine::{CacheStore, TesseraConfig};

fn main() -> miette::Result<()> {
    let cli = parse();

    init_tracing(TracingConfig {
        format: cli.log_format,
        level: cli.log_level.into(),
        ..TracingConfig::default()
    })?;

    let span = ::tracing::info_span!(
        "command",
        command = ?cli.command,
        correlation_id = %correlation_id(),
    );
    let _guard = span.enter();
    run(cli)
}

fn load_config(cli: &Cli) -> miette::Result<TesseraConfig> {
    let mut config = TesseraConfig::load(&cli.config)?.with_env_overrides()?;
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = Some(dir.clone());
    }
    Ok(config)
}

fn run(cli: Cli) -> miette::Result<()> {
    let config = load_config(&cli)?;
    let root = config.resolve_cache_root()?;
    ::tracing::debug!(root = %root.display(), "Resolved cache root");

    let store = CacheStore::filesystem(&root);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Scopes => commands::scopes(&store, &mut out)?,
        Commands::Entries { scope } => commands::entries(&store, &scope, &mut out)?,
        Commands::Show { scope, hash } => commands::show(&store, &scope, &hash, &mut out)?,
        Commands::Config => commands::config(&config, &root, &mut out)?,
    }
    out.flush().map_err(|e| miette::miette!("Failed to write output: {e}"))?;
    Ok(())
}
