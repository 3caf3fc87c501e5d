use crate::tracing::{LogLevel, TracingFormat};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(about = "Inspect the content-addressed result cache of tessera tasks")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        long,
        global = true,
        env = "TESSERA_CACHE_DIR",
        help = "Cache root directory (overrides the configuration file)"
    )]
    pub cache_dir: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        help = "Path to the configuration file",
        default_value = tessera_engine::config::CONFIG_FILE_NAME
    )]
    pub config: PathBuf,

    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub log_level: LogLevel,

    #[arg(
        long,
        global = true,
        help = "Log output format",
        default_value = "compact",
        value_enum
    )]
    pub log_format: TracingFormat,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    #[command(about = "List cache scopes and their entry counts")]
    Scopes,
    #[command(about = "List the entries stored in a scope")]
    Entries {
        #[arg(help = "Scope name, usually the task type name")]
        scope: String,
    },
    #[command(about = "Show a stored entry and its captured logs")]
    Show {
        #[arg(help = "Scope name, usually the task type name")]
        scope: String,
        #[arg(help = "Entry hash, e.g. Crop_3fa1...")]
        hash: String,
    },
    #[command(about = "Print the resolved configuration")]
    Config,
}

pub fn parse() -> Cli {
    Cli::parse()
}
