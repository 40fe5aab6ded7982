//! Deterministic workflow engine
//!
//! Plays back scripted replies, one script per invocation. Used by the tests
//! and by `tp chat --offline`; when the script runs out it answers with a
//! short canned reply built from the invocation.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use super::{ChunkStream, EngineError, Invocation, WorkflowEngine};

/// One step of a scripted reply
#[derive(Debug, Clone)]
pub enum Step {
    /// Emit a text fragment
    Text(String),

    /// Raise an engine error; the stream ends here
    Fail(String),

    /// Hold the stream until the gate is notified
    Gate(Arc<Notify>),

    /// Never produce another item
    Stall,
}

impl Step {
    pub fn text(s: impl Into<String>) -> Self {
        Step::Text(s.into())
    }
}

#[derive(Default)]
struct ScriptState {
    replies: VecDeque<Vec<Step>>,
    invocations: Vec<Invocation>,
    threads: HashSet<Uuid>,
}

/// Engine that replays queued scripts
#[derive(Default)]
pub struct ScriptedEngine {
    state: Mutex<ScriptState>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the reply for the next invocation
    pub fn push_reply(&self, steps: Vec<Step>) -> &Self {
        debug!(step_count = %steps.len(), "push_reply: called");
        self.lock().replies.push_back(steps);
        self
    }

    /// Queue a reply made only of text fragments
    pub fn push_text_reply<I, S>(&self, chunks: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_reply(chunks.into_iter().map(Step::text).collect())
    }

    /// Every invocation received so far, in order
    pub fn invocations(&self) -> Vec<Invocation> {
        self.lock().invocations.clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.lock().invocations.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Canned reply used once the script is exhausted
fn default_reply(invocation: &Invocation) -> Vec<Step> {
    let text = match invocation {
        Invocation::Start { payload, .. } => {
            let airlines = if payload.preferred_airlines.is_empty() {
                "any airline".to_string()
            } else {
                payload.preferred_airlines.join(", ")
            };
            format!(
                "Planning your trip: {}\nFlights: looking at {} with a {} budget.\nWhich hotel amenities matter most to you?",
                payload.user_input, airlines, payload.budget_level
            )
        }
        Invocation::Resume { reply, .. } => {
            format!("Noted: {}. I have updated the plan. Anything else you would like to change?", reply)
        }
    };
    text.split_inclusive(' ').map(Step::text).collect()
}

fn play(steps: Vec<Step>) -> ChunkStream {
    futures::stream::unfold(steps.into_iter(), |mut steps| async move {
        loop {
            match steps.next()? {
                Step::Text(text) => return Some((Ok(text), steps)),
                Step::Fail(message) => {
                    // Nothing after a failure is ever delivered
                    let rest: Vec<Step> = Vec::new();
                    return Some((Err(EngineError::Failed(message)), rest.into_iter()));
                }
                Step::Gate(gate) => gate.notified().await,
                Step::Stall => futures::future::pending::<()>().await,
            }
        }
    })
    .boxed()
}

#[async_trait]
impl WorkflowEngine for ScriptedEngine {
    async fn invoke(&self, invocation: Invocation) -> Result<ChunkStream, EngineError> {
        let thread_id = invocation.thread_id();
        debug!(%thread_id, kind = %invocation.kind(), "invoke: called");

        let steps = {
            let mut state = self.lock();
            state.invocations.push(invocation.clone());

            match &invocation {
                Invocation::Start { .. } => {
                    state.threads.insert(thread_id);
                }
                Invocation::Resume { .. } => {
                    if !state.threads.contains(&thread_id) {
                        debug!(%thread_id, "invoke: resume on unknown thread");
                        return Err(EngineError::UnknownThread(thread_id));
                    }
                }
            }

            state.replies.pop_front()
        };

        let steps = steps.unwrap_or_else(|| {
            debug!("invoke: script exhausted, using default reply");
            default_reply(&invocation)
        });
        Ok(play(steps))
    }
}
