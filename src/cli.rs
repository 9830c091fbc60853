use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// essh - declarative hosts and tasks configured with Lua
#[derive(Parser)]
#[command(name = "essh")]
#[command(about = "Inspect hosts and tasks defined in Lua configuration")]
#[command(version)]
pub struct Cli {
    /// Configuration file to evaluate (repeatable; replaces the default files)
    #[arg(short, long, global = true, env = "ESSH_CONFIG", value_delimiter = ':')]
    pub config: Vec<PathBuf>,

    /// Directory searched for modules (repeatable)
    #[arg(long, global = true, env = "ESSH_MODULE_PATH", value_delimiter = ':')]
    pub module_path: Vec<PathBuf>,

    /// JSON settings file
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate configuration and report what it defines
    Check,
    /// List hosts
    Hosts {
        /// Include hidden hosts
        #[arg(short, long)]
        all: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List tasks
    Tasks {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Run a task's prepare function and print the resulting payload
    Prepare {
        /// Task name
        task: String,
        /// Initial payload
        #[arg(short, long, default_value = "")]
        payload: String,
    },
    /// Print the resolved settings as JSON
    Settings {
        /// Also write them to this file, for use with --settings
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,
    },
    /// Fire one hook point of a host
    Hook {
        /// Host name
        host: String,
        /// Hook point (before_connect, after_connect, after_disconnect, ...)
        point: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
