//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::config::LlmConfig;

/// Trip Planner - conversational travel planning assistant
#[derive(Parser)]
#[command(
    name = "tp",
    about = "Plan trips through a conversation with a resumable planning agent",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Chat with the trip planner (default)
    Chat {
        /// First message to send
        message: Option<String>,

        /// Use the built-in scripted planner instead of the LLM
        #[arg(long)]
        offline: bool,
    },

    /// Show or edit travel preferences
    Prefs {
        #[command(subcommand)]
        command: PrefsCommand,
    },

    /// List example trip requests
    Examples,
}

/// Preference subcommands
#[derive(Debug, Subcommand)]
pub enum PrefsCommand {
    /// Show saved preferences
    Show,

    /// Replace saved preferences; omitted options keep their current value
    Set {
        /// Preferred airline (repeatable)
        #[arg(short, long = "airline", value_name = "AIRLINE")]
        airlines: Vec<String>,

        /// Must-have hotel amenity (repeatable)
        #[arg(short = 'm', long = "amenity", value_name = "AMENITY")]
        amenities: Vec<String>,

        /// Budget level (budget, mid-range, luxury)
        #[arg(short, long)]
        budget: Option<String>,
    },

    /// Forget saved preferences
    Reset,
}

/// Get the path to the log file
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tripplanner")
        .join("logs")
        .join("tripplanner.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Generate the after_help text with API key status and log location
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let api_key_env = LlmConfig::default().api_key_env;
    let key_loaded = std::env::var(&api_key_env).is_ok_and(|v| !v.trim().is_empty());

    let mut help = String::new();
    help.push_str("LLM:\n");
    let icon = if key_loaded {
        debug!("generate_after_help: api key present");
        "\u{2705}"
    } else {
        debug!("generate_after_help: api key missing");
        "\u{274C}"
    };
    let status = if key_loaded { "loaded" } else { "not set (use --offline)" };
    help.push_str(&format!("  {} {:<12} {}\n", icon, api_key_env, status));

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));

    debug!("generate_after_help: returning help text");
    help
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_command() {
        let cli = Cli::try_parse_from(["tp"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_chat() {
        let cli = Cli::try_parse_from(["tp", "chat", "Trip to Rome", "--offline"]).unwrap();
        match cli.command {
            Some(Command::Chat { message, offline }) => {
                assert_eq!(message.as_deref(), Some("Trip to Rome"));
                assert!(offline);
            }
            _ => panic!("Expected Chat command"),
        }
    }

    #[test]
    fn test_cli_parse_prefs_set() {
        let cli = Cli::try_parse_from([
            "tp", "prefs", "set", "-a", "Delta", "--airline", "United", "-m", "WiFi", "--budget", "luxury",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Prefs {
                command: PrefsCommand::Set {
                    airlines,
                    amenities,
                    budget,
                },
            }) => {
                assert_eq!(airlines, vec!["Delta", "United"]);
                assert_eq!(amenities, vec!["WiFi"]);
                assert_eq!(budget.as_deref(), Some("luxury"));
            }
            _ => panic!("Expected Prefs Set command"),
        }
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::try_parse_from(["tp", "-c", "/tmp/config.yml", "-l", "debug", "examples"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/config.yml")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Some(Command::Examples)));
    }

    #[test]
    fn test_log_path_location() {
        let path = get_log_path();
        assert!(path.ends_with("tripplanner/logs/tripplanner.log"));
    }
}
