//! Session identity and resumability state

use std::fmt;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

/// Where a session is in its turn cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    /// No turn dispatched yet
    Fresh,
    /// A workflow run is in flight
    AwaitingEngine,
    /// The last run ended normally; the next message resumes it
    Suspended,
    /// The last run failed; the next message resumes it
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Fresh => "fresh",
            SessionState::AwaitingEngine => "awaiting-engine",
            SessionState::Suspended => "suspended",
            SessionState::Error => "error",
        };
        f.write_str(s)
    }
}

/// One logical conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    thread_id: Uuid,
    turn_count: u32,
    state: SessionState,
}

impl Session {
    fn new() -> Self {
        Self {
            thread_id: Uuid::now_v7(),
            turn_count: 0,
            state: SessionState::Fresh,
        }
    }

    pub fn thread_id(&self) -> Uuid {
        self.thread_id
    }

    /// Turns dispatched to the engine so far
    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True when the last run ended normally and is waiting for the user
    pub fn is_suspended(&self) -> bool {
        self.state == SessionState::Suspended
    }

    /// True while a run owns this session
    pub fn is_busy(&self) -> bool {
        self.state == SessionState::AwaitingEngine
    }

    pub(crate) fn begin_turn(&mut self) {
        debug!(thread_id = %self.thread_id, from = %self.state, "begin_turn: called");
        self.turn_count += 1;
        self.state = SessionState::AwaitingEngine;
    }

    pub(crate) fn complete(&mut self) {
        debug!(thread_id = %self.thread_id, "complete: called");
        self.state = SessionState::Suspended;
    }

    pub(crate) fn fail(&mut self) {
        debug!(thread_id = %self.thread_id, "fail: called");
        self.state = SessionState::Error;
    }
}

/// Hands out session identities
#[derive(Debug, Default)]
pub struct SessionRegistry {
    created: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A brand new session with no turns
    pub fn create(&mut self) -> Session {
        let session = Session::new();
        self.created += 1;
        debug!(thread_id = %session.thread_id, created = self.created, "create: called");
        session
    }

    /// Abandon `session` and return a fresh one
    ///
    /// Any run still streaming for the old thread is left alone; its result is
    /// dropped when it reports back.
    pub fn reset(&mut self, session: Session) -> Session {
        info!(abandoned = %session.thread_id, turn_count = session.turn_count, "Session reset");
        self.create()
    }

    /// Sessions created over the registry's lifetime
    pub fn created(&self) -> u64 {
        self.created
    }
}
