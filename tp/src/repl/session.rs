//! REPL session management

use std::io::{self, Write};
use std::sync::Arc;

use colored::Colorize;
use eyre::Result;
use rand::seq::IndexedRandom;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::debug;

use crate::conversation::{ConversationHandle, Role, Turn, TurnError, TurnOutcome};
use crate::preferences::{BudgetLevel, PreferenceError, PreferenceStore, Preferences, UserContext};

/// Sample requests shown as hints
pub const EXAMPLE_QUERIES: &[&str] = &[
    "Plan a trip to Paris from New York, leaving on June 10 and returning on June 20. My hotel budget is $150 per night.",
    "Find me a flight to Tokyo from Los Angeles on April 15, returning on April 25, with a max hotel budget of $200 per night.",
    "I'm traveling from London to Rome on May 5 for 4 days. I prefer hotels with WiFi and free breakfast.",
    "Suggest a budget-friendly travel plan for a 7-day trip to Bali from Sydney.",
];

/// Interactive trip planning session
pub struct ReplSession {
    conversation: ConversationHandle,
    store: Arc<dyn PreferenceStore>,
}

impl ReplSession {
    pub fn new(conversation: ConversationHandle, store: Arc<dyn PreferenceStore>) -> Self {
        Self { conversation, store }
    }

    /// Run the REPL main loop
    pub async fn run(&mut self, initial_message: Option<String>) -> Result<()> {
        self.print_welcome();

        if let Some(message) = initial_message {
            println!("{} {}", ">".bright_green(), message);
            self.process_user_input(&message).await?;
        }

        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;

        loop {
            let readline = rl.readline(&format!("{} ", ">".bright_green()));

            match readline {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }

                    let _ = rl.add_history_entry(input);

                    if input.starts_with('/') {
                        match self.handle_slash_command(input).await? {
                            SlashResult::Continue => continue,
                            SlashResult::Send(message) => self.process_user_input(&message).await?,
                            SlashResult::Quit => break,
                        }
                    } else {
                        self.process_user_input(input).await?;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        self.conversation.shutdown().await?;
        println!("Safe travels!");
        Ok(())
    }

    fn print_welcome(&self) {
        println!();
        println!("{}", "Travel Planner Assistant".bright_cyan().bold());
        println!("Give me the details for your trip and let me plan it for you!");
        if let Some(hint) = EXAMPLE_QUERIES.choose(&mut rand::rng()) {
            println!("{} {}", "Try:".yellow(), hint.bold());
        }
        println!("Type {} for help, {} to quit", "/help".yellow(), "/quit".yellow());
        println!();
    }

    async fn handle_slash_command(&mut self, input: &str) -> Result<SlashResult> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let cmd = parts.first().copied().unwrap_or("");
        let rest = input[cmd.len()..].trim();
        debug!(%cmd, "handle_slash_command: called");

        let result = match cmd {
            "/help" | "/h" => {
                self.print_help();
                SlashResult::Continue
            }
            "/quit" | "/q" | "/exit" => SlashResult::Quit,
            "/new" | "/n" => {
                let session = self.conversation.new_conversation().await?;
                println!("{} {}", "New conversation started:".dimmed(), session.thread_id());
                SlashResult::Continue
            }
            "/history" => {
                print_history(&self.conversation.history().await?);
                SlashResult::Continue
            }
            "/prefs" => {
                self.handle_prefs(rest).await?;
                SlashResult::Continue
            }
            "/examples" => {
                print_examples();
                SlashResult::Continue
            }
            "/example" => match parts.get(1).and_then(|n| n.parse::<usize>().ok()) {
                Some(n) if (1..=EXAMPLE_QUERIES.len()).contains(&n) => {
                    let query = EXAMPLE_QUERIES[n - 1];
                    println!("{} {}", ">".bright_green(), query);
                    SlashResult::Send(query.to_string())
                }
                _ => {
                    println!("{} Usage: /example <1-{}>", "?".yellow(), EXAMPLE_QUERIES.len());
                    SlashResult::Continue
                }
            },
            _ => {
                println!("{} Unknown command: {}", "?".yellow(), cmd);
                println!("Type {} for available commands", "/help".yellow());
                SlashResult::Continue
            }
        };
        Ok(result)
    }

    fn print_help(&self) {
        println!();
        println!("{}", "Available Commands:".bright_cyan());
        println!("  {:14} Show this help", "/help".yellow());
        println!("  {:14} Exit", "/quit".yellow());
        println!("  {:14} Start a new conversation", "/new".yellow());
        println!("  {:14} Show conversation history", "/history".yellow());
        println!("  {:14} Show travel preferences", "/prefs".yellow());
        println!("  {:14} Set preferred airlines (comma separated, empty clears)", "/prefs airlines".yellow());
        println!("  {:14} Set hotel amenities (comma separated, empty clears)", "/prefs amenities".yellow());
        println!("  {:14} Set budget level (budget, mid-range, luxury)", "/prefs budget".yellow());
        println!("  {:14} Restore default preferences", "/prefs reset".yellow());
        println!("  {:14} Re-read the saved preference file", "/prefs reload".yellow());
        println!("  {:14} List example requests", "/examples".yellow());
        println!("  {:14} Send example request N", "/example N".yellow());
        println!();
        println!("Preference changes apply when the next conversation starts.");
        println!();
    }

    /// Show or edit preferences; edits are saved and handed to the conversation
    async fn handle_prefs(&mut self, args: &str) -> Result<()> {
        let (sub, value) = args
            .split_once(char::is_whitespace)
            .map(|(sub, value)| (sub, value.trim()))
            .unwrap_or((args, ""));
        debug!(%sub, %value, "handle_prefs: called");

        let context = self.conversation.user_context().await?;
        let updated = match sub {
            "" | "show" => {
                print_preferences(&context.preferences);
                return Ok(());
            }
            "reset" => self.store.reset(),
            "reload" => self.store.load(),
            _ => match edit_preferences(&context.preferences, sub, value) {
                Ok(prefs) => self.store.save(&prefs).map(|()| prefs),
                Err(e) => Err(e),
            },
        };

        match updated {
            Ok(preferences) => {
                self.conversation
                    .set_user_context(UserContext {
                        user_id: context.user_id,
                        preferences,
                    })
                    .await?;
                println!("{}", "Preferences saved!".bright_green());
                print_preferences(&self.conversation.user_context().await?.preferences);
            }
            Err(e) => println!("{} {}", "!".yellow(), e),
        }
        Ok(())
    }

    /// Send one message and print the reply as it streams in
    async fn process_user_input(&mut self, input: &str) -> Result<()> {
        let mut ticket = match self.conversation.send_message(input).await {
            Ok(ticket) => ticket,
            Err(e @ (TurnError::Input(_) | TurnError::Busy { .. })) => {
                println!("{} {}", "!".yellow(), e);
                return Ok(());
            }
            Err(e) => return Err(eyre::eyre!("Conversation error: {}", e)),
        };
        debug!(thread_id = %ticket.thread_id, kind = %ticket.kind, "process_user_input: turn dispatched");

        println!("{}", "Thinking...".dimmed());
        let mut printed = 0;
        while let Some(snapshot) = ticket.snapshots.recv().await {
            printed = print_delta(&snapshot, printed);
        }

        let outcome = ticket
            .outcome
            .await
            .map_err(|_| eyre::eyre!("Conversation closed before the reply finished"))?;
        match outcome {
            TurnOutcome::Completed(turn) => {
                print_delta(&turn.content, printed);
                println!();
                println!("{}", turn.timestamp.dimmed());
            }
            TurnOutcome::Failed(turn) => {
                if printed > 0 {
                    println!();
                }
                println!("{}", turn.content.red());
            }
            TurnOutcome::Abandoned { .. } => {
                println!();
                println!("{}", "(reply dropped, conversation was reset)".dimmed());
            }
        }
        println!();
        Ok(())
    }
}

/// Print the part of `text` beyond the first `printed` bytes
fn print_delta(text: &str, printed: usize) -> usize {
    if let Some(delta) = text.get(printed..) {
        print!("{}", delta);
        let _ = io::stdout().flush();
    }
    text.len()
}

fn print_history(turns: &[Turn]) {
    if turns.is_empty() {
        println!("{}", "No conversation history.".dimmed());
        return;
    }

    println!();
    println!("{}", "Conversation History:".bright_cyan());
    for (i, turn) in turns.iter().enumerate() {
        let role = match turn.role {
            Role::User => "You".bright_green(),
            Role::Assistant => "Planner".bright_blue(),
        };
        let preview: String = turn.content.chars().take(60).collect();
        let preview = if turn.content.chars().count() > 60 {
            format!("{}...", preview)
        } else {
            preview
        };
        println!("  {}. [{}] {}: {}", i + 1, turn.timestamp.dimmed(), role, preview);
    }
    println!();
}

/// Print preferences the way `tp prefs show` does
pub fn print_preferences(prefs: &Preferences) {
    let list = |items: &std::collections::BTreeSet<String>| {
        if items.is_empty() {
            "no preference".dimmed().to_string()
        } else {
            items.iter().cloned().collect::<Vec<_>>().join(", ")
        }
    };
    println!("{}", "Travel Preferences:".bright_cyan());
    println!("  {:20} {}", "Preferred airlines:", list(&prefs.preferred_airlines));
    println!("  {:20} {}", "Hotel amenities:", list(&prefs.hotel_amenities));
    println!("  {:20} {}", "Budget level:", prefs.budget_level);
}

/// Apply one `/prefs <field> <value>` edit to the current preferences
fn edit_preferences(current: &Preferences, field: &str, value: &str) -> Result<Preferences, PreferenceError> {
    let list = || {
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect::<Vec<_>>()
    };
    match field {
        "airlines" | "airline" => current.with_updates(Some(list()), None, None),
        "amenities" | "amenity" => current.with_updates(None, Some(list()), None),
        "budget" => current.with_updates(None, None, Some(value.parse::<BudgetLevel>()?)),
        other => Err(PreferenceError::UnknownOption {
            field: "preference",
            value: other.to_string(),
        }),
    }
}

/// Print the numbered example requests
pub fn print_examples() {
    println!("{}", "Need help? Try these examples:".bright_cyan());
    for (i, query) in EXAMPLE_QUERIES.iter().enumerate() {
        println!("  {}. {}", i + 1, query);
    }
}

enum SlashResult {
    Continue,
    Send(String),
    Quit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversationConfig;
    use crate::conversation::TranscriptLogger;
    use crate::engine::{Invocation, ScriptedEngine};
    use crate::preferences::FilePreferenceStore;
    use tempfile::TempDir;

    #[test]
    fn test_print_delta_tracks_offset() {
        assert_eq!(print_delta("Hello", 0), 5);
        assert_eq!(print_delta("Hello world", 5), 11);
    }

    #[test]
    fn test_print_delta_ignores_bad_offset() {
        // offset inside a multi-byte char prints nothing
        assert_eq!(print_delta("é", 1), 2);
    }

    #[test]
    fn test_edit_preferences_fields() {
        let current = Preferences::validated(["Delta"], ["Spa"], BudgetLevel::Luxury).unwrap();

        let prefs = edit_preferences(&current, "amenities", "wifi, Free Breakfast").unwrap();
        assert_eq!(
            prefs.hotel_amenities.iter().collect::<Vec<_>>(),
            vec!["Free Breakfast", "WiFi"]
        );
        assert!(prefs.preferred_airlines.contains("Delta"));

        let prefs = edit_preferences(&current, "airlines", "").unwrap();
        assert!(prefs.preferred_airlines.is_empty());

        let prefs = edit_preferences(&current, "budget", "mid-range").unwrap();
        assert_eq!(prefs.budget_level, BudgetLevel::MidRange);
    }

    #[test]
    fn test_edit_preferences_rejects_unknown_values() {
        let current = Preferences::default();
        assert!(edit_preferences(&current, "airlines", "Concorde").is_err());
        assert!(edit_preferences(&current, "budget", "cheap").is_err());
        assert!(matches!(
            edit_preferences(&current, "seat", "window"),
            Err(PreferenceError::UnknownOption { field: "preference", .. })
        ));
    }

    #[tokio::test]
    async fn test_prefs_edit_updates_live_conversation_and_store() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(FilePreferenceStore::new(temp.path().join("prefs.json")));
        let engine = Arc::new(ScriptedEngine::new());
        let handle = ConversationHandle::spawn(
            engine.clone(),
            ConversationConfig::default(),
            UserContext::default(),
            TranscriptLogger::disabled(),
        );
        let user_id = handle.user_context().await.unwrap().user_id;
        let mut repl = ReplSession::new(handle.clone(), store.clone());

        repl.handle_slash_command("/prefs airlines delta, OceanAir").await.unwrap();
        repl.handle_slash_command("/prefs budget luxury").await.unwrap();

        let context = handle.user_context().await.unwrap();
        assert_eq!(context.user_id, user_id);
        assert!(context.preferences.preferred_airlines.contains("OceanAir"));
        assert_eq!(context.preferences.budget_level, BudgetLevel::Luxury);
        assert_eq!(store.load().unwrap(), context.preferences);

        handle.send_message("Trip to Lisbon").await.unwrap().finish().await.unwrap();
        match &engine.invocations()[0] {
            Invocation::Start { payload, .. } => {
                assert_eq!(payload.preferred_airlines, vec!["Delta", "OceanAir"]);
                assert_eq!(payload.budget_level, BudgetLevel::Luxury);
            }
            other => panic!("expected start invocation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_prefs_reload_and_bad_edit() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(FilePreferenceStore::new(temp.path().join("prefs.json")));
        let handle = ConversationHandle::spawn(
            Arc::new(ScriptedEngine::new()),
            ConversationConfig::default(),
            UserContext::default(),
            TranscriptLogger::disabled(),
        );
        let mut repl = ReplSession::new(handle.clone(), store.clone());

        repl.handle_slash_command("/prefs airlines Concorde").await.unwrap();
        assert!(handle.user_context().await.unwrap().preferences.preferred_airlines.is_empty());
        assert!(!store.path().exists());

        store
            .save(&Preferences::validated(["United"], ["Gym"], BudgetLevel::Budget).unwrap())
            .unwrap();
        repl.handle_slash_command("/prefs reload").await.unwrap();
        let prefs = handle.user_context().await.unwrap().preferences;
        assert!(prefs.hotel_amenities.contains("Gym"));
        assert_eq!(prefs.budget_level, BudgetLevel::Budget);
    }

    #[test]
    fn test_example_queries_present() {
        assert_eq!(EXAMPLE_QUERIES.len(), 4);
        assert!(EXAMPLE_QUERIES[0].contains("Paris"));
    }
}
