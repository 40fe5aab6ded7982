//! LLM-backed planning workflow
//!
//! Each workflow thread is a system prompt plus the message history for that
//! thread. Start seeds the thread from the traveler's request and preferences;
//! resume appends the reply. Every run ends waiting for the traveler.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use handlebars::Handlebars;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ChunkStream, EngineError, Invocation, StartPayload, WorkflowEngine};
use crate::llm::{CompletionRequest, LlmClient, Message};

/// Planner system prompt template
pub const PLANNER_PROMPT: &str = include_str!("../../prompts/planner.pmt");

/// Render the planner system prompt for a new thread
pub fn render_system_prompt(payload: &StartPayload) -> Result<String, EngineError> {
    debug!(airline_count = %payload.preferred_airlines.len(), amenity_count = %payload.hotel_amenities.len(), "render_system_prompt: called");
    let mut hb = Handlebars::new();
    hb.register_escape_fn(handlebars::no_escape);
    hb.render_template(PLANNER_PROMPT, payload)
        .map_err(|e| EngineError::Prompt(e.to_string()))
}

struct PlannerThread {
    system_prompt: String,
    messages: Vec<Message>,
}

/// Threads in creation order; the oldest is dropped past `max_threads`
struct ThreadTable {
    threads: HashMap<Uuid, PlannerThread>,
    order: VecDeque<Uuid>,
    max_threads: usize,
}

impl ThreadTable {
    fn new(max_threads: usize) -> Self {
        Self {
            threads: HashMap::new(),
            order: VecDeque::new(),
            max_threads: max_threads.max(1),
        }
    }

    fn insert(&mut self, thread_id: Uuid, thread: PlannerThread) {
        if self.threads.insert(thread_id, thread).is_none() {
            self.order.push_back(thread_id);
        }
        while self.order.len() > self.max_threads {
            if let Some(oldest) = self.order.pop_front() {
                debug!(%oldest, "ThreadTable::insert: evicting oldest thread");
                self.threads.remove(&oldest);
            }
        }
    }
}

/// Workflow engine that plans trips with a chat-completion model
pub struct PlannerEngine {
    llm: Arc<dyn LlmClient>,
    threads: Arc<Mutex<ThreadTable>>,
    max_tokens: u32,
}

impl PlannerEngine {
    pub fn new(llm: Arc<dyn LlmClient>, max_threads: usize, max_tokens: u32) -> Self {
        info!(max_threads, max_tokens, "PlannerEngine created");
        Self {
            llm,
            threads: Arc::new(Mutex::new(ThreadTable::new(max_threads))),
            max_tokens,
        }
    }

    /// Number of threads currently retained
    pub fn thread_count(&self) -> usize {
        lock(&self.threads).threads.len()
    }

    /// Update the thread for this invocation and build the request to send
    fn prepare(&self, invocation: &Invocation) -> Result<CompletionRequest, EngineError> {
        let mut table = lock(&self.threads);
        let thread_id = invocation.thread_id();

        let thread = match invocation {
            Invocation::Start { payload, .. } => {
                debug!(%thread_id, "prepare: starting thread");
                let system_prompt = render_system_prompt(payload)?;
                table.insert(
                    thread_id,
                    PlannerThread {
                        system_prompt,
                        messages: vec![Message::user(payload.user_input.clone())],
                    },
                );
                table.threads.get(&thread_id)
            }
            Invocation::Resume { reply, .. } => {
                debug!(%thread_id, "prepare: resuming thread");
                let thread = table
                    .threads
                    .get_mut(&thread_id)
                    .ok_or(EngineError::UnknownThread(thread_id))?;
                thread.messages.push(Message::user(reply.clone()));
                table.threads.get(&thread_id)
            }
        };

        let thread = thread.ok_or(EngineError::UnknownThread(thread_id))?;
        Ok(CompletionRequest {
            system_prompt: thread.system_prompt.clone(),
            messages: thread.messages.clone(),
            max_tokens: self.max_tokens,
        })
    }
}

fn lock(threads: &Mutex<ThreadTable>) -> std::sync::MutexGuard<'_, ThreadTable> {
    threads.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl WorkflowEngine for PlannerEngine {
    async fn invoke(&self, invocation: Invocation) -> Result<ChunkStream, EngineError> {
        let thread_id = invocation.thread_id();
        debug!(%thread_id, kind = %invocation.kind(), "invoke: called");
        let request = self.prepare(&invocation)?;

        let (out_tx, out_rx) = mpsc::channel::<Result<String, EngineError>>(64);
        let llm = self.llm.clone();
        let threads = self.threads.clone();

        tokio::spawn(async move {
            let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(64);
            let forward_tx = out_tx.clone();
            let forward = async move {
                while let Some(text) = chunk_rx.recv().await {
                    if forward_tx.send(Ok(text)).await.is_err() {
                        debug!("invoke: consumer went away, dropping remaining chunks");
                        return false;
                    }
                }
                true
            };

            let (result, forwarded) = tokio::join!(llm.stream(request, chunk_tx), forward);

            match result {
                Ok(response) => {
                    debug!(%thread_id, stop_reason = ?response.stop_reason, input_tokens = response.usage.input_tokens, output_tokens = response.usage.output_tokens, "invoke: run finished");
                    // The thread only keeps replies the traveler was shown in full
                    if !forwarded || out_tx.is_closed() {
                        debug!(%thread_id, "invoke: reply not delivered, leaving thread unchanged");
                        return;
                    }
                    if let Some(content) = response.content {
                        let mut table = lock(&threads);
                        match table.threads.get_mut(&thread_id) {
                            Some(thread) => thread.messages.push(Message::assistant(content)),
                            None => debug!(%thread_id, "invoke: thread evicted before reply was recorded"),
                        }
                    }
                }
                Err(e) => {
                    warn!(%thread_id, error = %e, "invoke: LLM stream failed");
                    let _ = out_tx.send(Err(EngineError::Llm(e))).await;
                }
            }
        });

        Ok(futures::stream::unfold(out_rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::llm::client::mock::MockLlmClient;
    use crate::preferences::BudgetLevel;

    fn payload() -> StartPayload {
        StartPayload {
            user_input: "Plan a trip to Paris from New York".to_string(),
            preferred_airlines: vec!["Delta".to_string(), "United".to_string()],
            hotel_amenities: vec!["WiFi".to_string()],
            budget_level: BudgetLevel::Luxury,
        }
    }

    async fn drain(stream: ChunkStream) -> Result<String, EngineError> {
        let items: Vec<Result<String, EngineError>> = stream.collect().await;
        items.into_iter().collect()
    }

    #[test]
    fn test_render_system_prompt() {
        let prompt = render_system_prompt(&payload()).unwrap();
        assert!(prompt.contains("Plan a trip to Paris from New York"));
        assert!(prompt.contains("Delta, United"));
        assert!(prompt.contains("WiFi"));
        assert!(prompt.contains("luxury"));
    }

    #[test]
    fn test_render_system_prompt_without_preferences() {
        let prompt = render_system_prompt(&StartPayload {
            preferred_airlines: vec![],
            hotel_amenities: vec![],
            ..payload()
        })
        .unwrap();
        assert!(prompt.contains("Preferred airlines: no preference"));
    }

    #[tokio::test]
    async fn test_start_then_resume_carries_history() {
        let llm = Arc::new(MockLlmClient::new(vec![
            Ok("When are you travelling?".to_string()),
            Ok("Great, here is your plan.".to_string()),
        ]));
        let engine = PlannerEngine::new(llm.clone(), 8, 1024);
        let thread_id = Uuid::now_v7();

        let first = drain(
            engine
                .invoke(Invocation::Start {
                    thread_id,
                    payload: payload(),
                })
                .await
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(first, "When are you travelling?");

        let second = drain(
            engine
                .invoke(Invocation::Resume {
                    thread_id,
                    reply: "June 10 to June 20".to_string(),
                })
                .await
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(second, "Great, here is your plan.");

        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        let roles: Vec<Role> = requests[1].messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(requests[1].messages[2].content, "June 10 to June 20");
    }

    #[tokio::test]
    async fn test_llm_failure_surfaces_in_stream() {
        let llm = Arc::new(MockLlmClient::new(vec![Err("upstream exploded".to_string())]));
        let engine = PlannerEngine::new(llm, 8, 1024);

        let result = drain(
            engine
                .invoke(Invocation::Start {
                    thread_id: Uuid::now_v7(),
                    payload: payload(),
                })
                .await
                .unwrap(),
        )
        .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("upstream exploded"));
    }

    #[tokio::test]
    async fn test_resume_unknown_thread() {
        let engine = PlannerEngine::new(Arc::new(MockLlmClient::new(vec![])), 8, 1024);
        let result = engine
            .invoke(Invocation::Resume {
                thread_id: Uuid::now_v7(),
                reply: "hello".to_string(),
            })
            .await;
        assert!(matches!(result, Err(EngineError::UnknownThread(_))));
    }

    #[tokio::test]
    async fn test_undelivered_reply_not_recorded() {
        let llm = Arc::new(MockLlmClient::new(vec![
            Ok("A long plan nobody read".to_string()),
            Ok("Here you go.".to_string()),
        ]));
        let engine = PlannerEngine::new(llm.clone(), 8, 1024);
        let thread_id = Uuid::now_v7();

        let stream = engine
            .invoke(Invocation::Start {
                thread_id,
                payload: payload(),
            })
            .await
            .unwrap();
        drop(stream);
        // let the run task finish
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let reply = drain(
            engine
                .invoke(Invocation::Resume {
                    thread_id,
                    reply: "Are you there?".to_string(),
                })
                .await
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(reply, "Here you go.");

        let requests = llm.requests();
        let roles: Vec<Role> = requests[1].messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::User]);
    }

    #[tokio::test]
    async fn test_oldest_thread_evicted() {
        let llm = Arc::new(MockLlmClient::new(vec![Ok("a".to_string()), Ok("b".to_string())]));
        let engine = PlannerEngine::new(llm, 1, 1024);
        let first = Uuid::now_v7();
        let second = Uuid::now_v7();

        for thread_id in [first, second] {
            let stream = engine
                .invoke(Invocation::Start {
                    thread_id,
                    payload: payload(),
                })
                .await
                .unwrap();
            drain(stream).await.unwrap();
        }

        assert_eq!(engine.thread_count(), 1);
        let result = engine
            .invoke(Invocation::Resume {
                thread_id: first,
                reply: "still there?".to_string(),
            })
            .await;
        assert!(matches!(result, Err(EngineError::UnknownThread(_))));
    }
}
