//! essh - command-line entry point

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use essh::cli::{Cli, Commands};
use essh::{DirectoryLoader, HookAction, HookPoint, Session, Settings, TaskContext};

/// Initialize logging; RUST_LOG overrides the default filter.
fn init_logger(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut settings = Settings::defaults(&cwd, home.as_deref());

    if let Some(path) = &cli.settings {
        settings = settings.merge(Settings::load_from_file(path)?);
    }

    Ok(settings.merge(Settings {
        config_files: cli.config.clone(),
        module_paths: cli.module_path.clone(),
        log_filter: None,
    }))
}

fn load_session(settings: &Settings) -> Result<Session> {
    let session = Session::new(DirectoryLoader::new(settings.module_paths.clone()))?;
    let files = settings.existing_config_files();
    if files.is_empty() {
        bail!("No configuration file found (tried {:?})", settings.config_files);
    }
    for file in &files {
        session
            .load_file(file)
            .with_context(|| format!("Failed to evaluate {}", file.display()))?;
    }
    Ok(session)
}

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    let settings = resolve_settings(&cli)?;

    let default_filter = if cli.verbose {
        "debug".to_string()
    } else {
        settings.log_filter.clone().unwrap_or_else(|| "warn".to_string())
    };
    init_logger(&default_filter);
    debug!(?settings, "settings resolved");

    if let Commands::Settings { save } = &cli.command {
        if let Some(path) = save {
            settings.save_to_file(path)?;
            info!(path = %path.display(), "settings saved");
        }
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    let session = load_session(&settings)?;

    match cli.command {
        Commands::Check => {
            println!(
                "✓ {} host(s), {} task(s), {} module(s)",
                session.hosts().len(),
                session.tasks().len(),
                session.loaded_modules().len()
            );
        }
        Commands::Hosts { all, json } => {
            let hosts = if all {
                session.hosts()
            } else {
                session.hosts_visible()
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&hosts)?);
            } else {
                for host in &hosts {
                    println!("{:<24} {:<40} {}", host.name, host.description, host.tags.join(","));
                }
            }
        }
        Commands::Tasks { json } => {
            let tasks = session.tasks();
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                for task in &tasks {
                    println!("{:<24} {:<40} {}", task.name, task.description, task.targets().join(","));
                }
            }
        }
        Commands::Prepare { task, payload } => {
            let Some(task) = session.task(&task) else {
                bail!("Task '{}' is not defined", task);
            };
            let mut ctx = TaskContext::with_payload(payload);
            session
                .prepare(&task, &mut ctx)
                .with_context(|| format!("Prepare of task '{}' failed", task.name))?;
            info!(task = %task.name, "prepare succeeded");
            println!("{}", ctx.payload);
        }
        Commands::Settings { .. } => unreachable!("handled before loading configuration"),
        Commands::Hook { host, point } => {
            let Some(host) = session.host(&host) else {
                bail!("Host '{}' is not defined", host);
            };
            let point = HookPoint::from_str(&point)
                .with_context(|| format!("Unknown hook point '{}'", point))?;
            match session.fire_hook(&host, point)? {
                HookAction::Skipped => println!("no '{}' hook on {}", point, host.name),
                HookAction::Ran => println!("✓ ran '{}' hook on {}", point, host.name),
                HookAction::Remote(cmd) => println!("{}", cmd),
            }
        }
    }

    Ok(())
}
