//! Trip Planner
//!
//! CLI entry point for chatting with the planner and managing preferences.

use std::fs;
use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches};
use eyre::{Context, Result};
use tracing::{debug, info};

use tripplanner::cli::{Cli, Command, PrefsCommand, generate_after_help};
use tripplanner::config::Config;
use tripplanner::preferences::{BudgetLevel, FilePreferenceStore, PreferenceStore};
use tripplanner::repl;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tripplanner")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("tripplanner.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // LLM_API_KEY, BASE_URL and MODEL_CHOICE may live in a .env file; real env vars win
    let dotenv_path = dotenvy::dotenv().ok();

    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref())?;
    debug!(dotenv = ?dotenv_path, "main: environment loaded");

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    debug!(prefs_path = %config.preferences.path.display(), "main: config loaded");

    match cli.command {
        None => repl::run_interactive(&config, None, false).await,
        Some(Command::Chat { message, offline }) => repl::run_interactive(&config, message, offline).await,
        Some(Command::Prefs { command }) => run_prefs(&config, command),
        Some(Command::Examples) => {
            repl::print_examples();
            Ok(())
        }
    }
}

fn run_prefs(config: &Config, command: PrefsCommand) -> Result<()> {
    let store = FilePreferenceStore::new(&config.preferences.path);
    debug!(path = %store.path().display(), ?command, "run_prefs: called");

    match command {
        PrefsCommand::Show => {
            let prefs = store.load().context("Failed to load preferences")?;
            repl::print_preferences(&prefs);
        }
        PrefsCommand::Set {
            airlines,
            amenities,
            budget,
        } => {
            let current = store.load().context("Failed to load preferences")?;
            let budget = budget.map(|b| b.parse::<BudgetLevel>()).transpose()?;
            let prefs = current.with_updates(
                (!airlines.is_empty()).then_some(airlines),
                (!amenities.is_empty()).then_some(amenities),
                budget,
            )?;
            store.save(&prefs).context("Failed to save preferences")?;
            println!("Preferences saved!");
            repl::print_preferences(&prefs);
        }
        PrefsCommand::Reset => {
            let prefs = store.reset().context("Failed to reset preferences")?;
            println!("Preferences reset.");
            repl::print_preferences(&prefs);
        }
    }
    Ok(())
}
