//! Start-or-resume decision for each user message

use tracing::debug;

use super::history::HistoryLog;
use super::messages::InputError;
use super::session::Session;
use crate::engine::{Invocation, StartPayload};
use crate::preferences::UserContext;

/// Reject empty and whitespace-only messages
pub fn validate_message(message: &str) -> Result<(), InputError> {
    if message.trim().is_empty() {
        return Err(InputError::EmptyMessage);
    }
    Ok(())
}

/// Builds the engine invocation for a user message
pub struct TurnDispatcher;

impl TurnDispatcher {
    /// Choose start or resume and build the payload
    ///
    /// `history` must already hold the user turn for `user_message`. A history
    /// with exactly one user entry starts the workflow with a copy of the
    /// preferences; anything else resumes `session`'s thread with the message
    /// alone.
    pub fn dispatch(
        session: &Session,
        history: &HistoryLog,
        user_message: &str,
        user_context: &UserContext,
    ) -> Result<Invocation, InputError> {
        validate_message(user_message)?;
        let thread_id = session.thread_id();

        if history.is_first_turn() {
            debug!(%thread_id, "dispatch: first turn, starting workflow");
            let prefs = &user_context.preferences;
            return Ok(Invocation::Start {
                thread_id,
                payload: StartPayload {
                    user_input: user_message.to_string(),
                    preferred_airlines: prefs.preferred_airlines.iter().cloned().collect(),
                    hotel_amenities: prefs.hotel_amenities.iter().cloned().collect(),
                    budget_level: prefs.budget_level,
                },
            });
        }

        debug!(%thread_id, user_turns = history.user_turn_count(), "dispatch: resuming workflow");
        Ok(Invocation::Resume {
            thread_id,
            reply: user_message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::history::{Role, Turn};
    use crate::conversation::session::SessionRegistry;
    use crate::engine::InvocationKind;
    use crate::preferences::{BudgetLevel, Preferences};
    use proptest::prelude::*;

    fn context() -> UserContext {
        UserContext::new(Preferences::validated(["Delta"], ["WiFi", "Pool"], BudgetLevel::Luxury).unwrap())
    }

    fn user(content: &str) -> Turn {
        Turn::new(Role::User, content, "%H:%M")
    }

    #[test]
    fn test_first_message_starts_with_preferences() {
        let session = SessionRegistry::new().create();
        let mut history = HistoryLog::new();
        history.append(user("Plan a trip to Paris"));

        let invocation = TurnDispatcher::dispatch(&session, &history, "Plan a trip to Paris", &context()).unwrap();
        match invocation {
            Invocation::Start { thread_id, payload } => {
                assert_eq!(thread_id, session.thread_id());
                assert_eq!(payload.user_input, "Plan a trip to Paris");
                assert_eq!(payload.preferred_airlines, vec!["Delta"]);
                assert_eq!(payload.hotel_amenities, vec!["Pool", "WiFi"]);
                assert_eq!(payload.budget_level, BudgetLevel::Luxury);
            }
            other => panic!("expected start, got {:?}", other),
        }
    }

    #[test]
    fn test_later_message_resumes_without_preferences() {
        let session = SessionRegistry::new().create();
        let mut history = HistoryLog::new();
        history.append(user("Plan a trip"));
        history.append(Turn::new(Role::Assistant, "When?", "%H:%M"));
        history.append(user("WiFi and free breakfast please"));

        let invocation =
            TurnDispatcher::dispatch(&session, &history, "WiFi and free breakfast please", &context()).unwrap();
        assert_eq!(
            invocation,
            Invocation::Resume {
                thread_id: session.thread_id(),
                reply: "WiFi and free breakfast please".to_string(),
            }
        );
    }

    #[test]
    fn test_error_turn_does_not_reset_to_start() {
        let session = SessionRegistry::new().create();
        let mut history = HistoryLog::new();
        history.append(user("first"));
        history.append(Turn::new(Role::Assistant, "Sorry, I encountered an error: boom", "%H:%M"));
        history.append(user("second"));

        let invocation = TurnDispatcher::dispatch(&session, &history, "second", &context()).unwrap();
        assert_eq!(invocation.kind(), InvocationKind::Resume);
    }

    proptest! {
        #[test]
        fn prop_whitespace_only_is_rejected(message in "[ \t\r\n]{0,16}") {
            let session = SessionRegistry::new().create();
            let mut history = HistoryLog::new();
            history.append(user("earlier"));
            let result = TurnDispatcher::dispatch(&session, &history, &message, &context());
            prop_assert_eq!(result, Err(InputError::EmptyMessage));
        }

        #[test]
        fn prop_non_blank_is_accepted(message in "[ ]{0,3}[a-zA-Z0-9]{1,20}[ ]{0,3}") {
            prop_assert!(validate_message(&message).is_ok());
        }
    }
}
