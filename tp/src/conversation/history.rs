//! Ordered record of conversation turns

use std::fmt;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Who spoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// One message in the conversation, immutable once recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

impl Turn {
    /// Build a turn stamped with the local time in `timestamp_format`
    pub fn new(role: Role, content: impl Into<String>, timestamp_format: &str) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Local::now().format(timestamp_format).to_string(),
        }
    }
}

/// Append-only turn log for one conversation
#[derive(Debug, Clone, Default)]
pub struct HistoryLog {
    turns: Vec<Turn>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        debug!(role = %turn.role, len = turn.content.len(), "append: called");
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn user_turn_count(&self) -> usize {
        self.turns.iter().filter(|t| t.role == Role::User).count()
    }

    /// True when exactly one user message has been recorded
    pub fn is_first_turn(&self) -> bool {
        self.user_turn_count() == 1
    }

    /// Drop every turn; only for starting a new conversation
    pub(crate) fn clear(&mut self) {
        debug!(len = self.turns.len(), "clear: called");
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: Role, content: &str) -> Turn {
        Turn::new(role, content, "%I:%M %p")
    }

    #[test]
    fn test_append_preserves_order() {
        let mut log = HistoryLog::new();
        log.append(turn(Role::User, "one"));
        log.append(turn(Role::Assistant, "two"));
        log.append(turn(Role::User, "three"));

        let contents: Vec<&str> = log.turns().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        assert_eq!(log.last().unwrap().role, Role::User);
    }

    #[test]
    fn test_first_turn_detection() {
        let mut log = HistoryLog::new();
        assert!(!log.is_first_turn());

        log.append(turn(Role::User, "hello"));
        assert!(log.is_first_turn());

        log.append(turn(Role::Assistant, "hi"));
        assert!(log.is_first_turn());

        log.append(turn(Role::User, "again"));
        assert!(!log.is_first_turn());
        assert_eq!(log.user_turn_count(), 2);
    }

    #[test]
    fn test_clear() {
        let mut log = HistoryLog::new();
        log.append(turn(Role::User, "hello"));
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_timestamp_uses_format() {
        let t = Turn::new(Role::User, "x", "%Y");
        assert_eq!(t.timestamp.len(), 4);
        assert!(t.timestamp.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_role_wire_format() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }
}
