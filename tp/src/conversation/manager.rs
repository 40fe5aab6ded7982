//! Conversation actor
//!
//! Owns the session, its history and the user context. Turns run as their own
//! tasks and report back through the command channel tagged with the thread
//! they ran for, so results from an abandoned thread never touch the current
//! history.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::aggregate::{StreamAggregator, error_content};
use super::dispatch::{TurnDispatcher, validate_message};
use super::history::{HistoryLog, Role, Turn};
use super::messages::{ConversationCommand, TurnError, TurnOutcome, TurnTicket};
use super::session::{Session, SessionRegistry};
use super::transcript::TranscriptLogger;
use crate::config::ConversationConfig;
use crate::engine::{Invocation, WorkflowEngine};
use crate::preferences::UserContext;

/// Handle to send commands to the conversation actor
#[derive(Clone)]
pub struct ConversationHandle {
    tx: mpsc::Sender<ConversationCommand>,
}

impl ConversationHandle {
    /// Spawn a new conversation actor with a fresh session
    pub fn spawn(
        engine: Arc<dyn WorkflowEngine>,
        config: ConversationConfig,
        user_context: UserContext,
        transcript: TranscriptLogger,
    ) -> Self {
        debug!(user_id = %user_context.user_id, "spawn: called");
        let (tx, rx) = mpsc::channel(64);

        let mut registry = SessionRegistry::new();
        let session = registry.create();
        let mut actor = ConversationActor {
            engine,
            aggregator: StreamAggregator::new(config.chunk_timeout()),
            config,
            registry,
            session,
            history: HistoryLog::new(),
            user_context,
            transcript,
            pending: HashMap::new(),
            self_tx: tx.downgrade(),
        };
        actor.transcript.log_session_start(actor.session.thread_id());

        tokio::spawn(actor.run(rx));
        info!("Conversation actor spawned");

        Self { tx }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> ConversationCommand) -> Result<T, TurnError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(make(reply_tx)).await.map_err(|_| TurnError::Channel)?;
        reply_rx.await.map_err(|_| TurnError::Channel)
    }

    /// Record a user message and start the run answering it
    pub async fn send_message(&self, text: impl Into<String>) -> Result<TurnTicket, TurnError> {
        let text = text.into();
        debug!(len = text.len(), "send_message: called");
        self.request(|reply| ConversationCommand::SendMessage { text, reply }).await?
    }

    /// Clear the history and switch to a new session
    ///
    /// A run still in flight is not cancelled; its result is discarded.
    pub async fn new_conversation(&self) -> Result<Session, TurnError> {
        debug!("new_conversation: called");
        self.request(|reply| ConversationCommand::NewConversation { reply }).await
    }

    pub async fn history(&self) -> Result<Vec<Turn>, TurnError> {
        self.request(|reply| ConversationCommand::GetHistory { reply }).await
    }

    pub async fn session(&self) -> Result<Session, TurnError> {
        self.request(|reply| ConversationCommand::GetSession { reply }).await
    }

    pub async fn user_context(&self) -> Result<UserContext, TurnError> {
        self.request(|reply| ConversationCommand::GetUserContext { reply }).await
    }

    /// Replace the preferences used when the next workflow starts
    pub async fn set_user_context(&self, context: UserContext) -> Result<(), TurnError> {
        debug!(user_id = %context.user_id, "set_user_context: called");
        self.request(|reply| ConversationCommand::SetUserContext { context, reply })
            .await
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> Result<(), TurnError> {
        debug!("shutdown: called");
        self.tx
            .send(ConversationCommand::Shutdown)
            .await
            .map_err(|_| TurnError::Channel)
    }
}

struct ConversationActor {
    engine: Arc<dyn WorkflowEngine>,
    aggregator: StreamAggregator,
    config: ConversationConfig,
    registry: SessionRegistry,
    session: Session,
    history: HistoryLog,
    user_context: UserContext,
    transcript: TranscriptLogger,
    /// Outcome senders for runs still streaming, by thread
    pending: HashMap<Uuid, oneshot::Sender<TurnOutcome>>,
    self_tx: mpsc::WeakSender<ConversationCommand>,
}

impl ConversationActor {
    async fn run(mut self, mut rx: mpsc::Receiver<ConversationCommand>) {
        debug!("Conversation actor started");

        while let Some(cmd) = rx.recv().await {
            match cmd {
                ConversationCommand::SendMessage { text, reply } => {
                    let _ = reply.send(self.send_message(text));
                }

                ConversationCommand::NewConversation { reply } => {
                    let _ = reply.send(self.new_conversation());
                }

                ConversationCommand::GetHistory { reply } => {
                    let _ = reply.send(self.history.turns().to_vec());
                }

                ConversationCommand::GetSession { reply } => {
                    let _ = reply.send(self.session.clone());
                }

                ConversationCommand::GetUserContext { reply } => {
                    let _ = reply.send(self.user_context.clone());
                }

                ConversationCommand::SetUserContext { context, reply } => {
                    self.user_context = context;
                    let _ = reply.send(());
                }

                ConversationCommand::RunFinished { thread_id, result } => {
                    self.finish_run(thread_id, result);
                }

                ConversationCommand::Shutdown => {
                    info!("Conversation actor shutting down");
                    break;
                }
            }
        }

        debug!("Conversation actor stopped");
    }

    fn send_message(&mut self, text: String) -> Result<TurnTicket, TurnError> {
        let thread_id = self.session.thread_id();
        debug!(%thread_id, state = %self.session.state(), "send_message: called");

        validate_message(&text)?;
        if self.session.is_busy() {
            debug!(%thread_id, "send_message: run already in flight");
            return Err(TurnError::Busy { thread_id });
        }

        let turn = Turn::new(Role::User, text.as_str(), &self.config.timestamp_format);
        self.transcript.log_turn(thread_id, &turn, false);
        self.history.append(turn);

        let invocation = TurnDispatcher::dispatch(&self.session, &self.history, &text, &self.user_context)?;
        let kind = invocation.kind();
        self.session.begin_turn();

        let (snapshot_tx, snapshot_rx) = mpsc::channel(self.config.snapshot_buffer.max(1));
        let (outcome_tx, outcome_rx) = oneshot::channel();
        self.pending.insert(thread_id, outcome_tx);
        self.spawn_run(invocation, snapshot_tx);

        info!(%thread_id, %kind, turn = self.session.turn_count(), "Turn dispatched");
        Ok(TurnTicket {
            thread_id,
            kind,
            snapshots: snapshot_rx,
            outcome: outcome_rx,
        })
    }

    fn spawn_run(&self, invocation: Invocation, snapshots: mpsc::Sender<String>) {
        let engine = self.engine.clone();
        let aggregator = self.aggregator;
        let self_tx = self.self_tx.clone();
        let thread_id = invocation.thread_id();

        tokio::spawn(async move {
            let result = run_turn(engine, aggregator, invocation, snapshots).await;
            match self_tx.upgrade() {
                Some(tx) => {
                    let _ = tx.send(ConversationCommand::RunFinished { thread_id, result }).await;
                }
                None => debug!(%thread_id, "spawn_run: actor gone, dropping result"),
            }
        });
    }

    fn finish_run(&mut self, thread_id: Uuid, result: Result<String, TurnError>) {
        debug!(%thread_id, ok = result.is_ok(), "finish_run: called");
        let outcome_tx = self.pending.remove(&thread_id);

        if thread_id != self.session.thread_id() {
            debug!(%thread_id, current = %self.session.thread_id(), "finish_run: result from abandoned thread discarded");
            if let Some(tx) = outcome_tx {
                let _ = tx.send(TurnOutcome::Abandoned { thread_id });
            }
            return;
        }

        let format = &self.config.timestamp_format;
        let outcome = match result {
            Ok(text) => {
                self.session.complete();
                let turn = Turn::new(Role::Assistant, text, format);
                self.transcript.log_turn(thread_id, &turn, false);
                TurnOutcome::Completed(turn)
            }
            Err(e) => {
                warn!(%thread_id, error = %e, "Turn failed");
                self.session.fail();
                let turn = Turn::new(Role::Assistant, error_content(&e), format);
                self.transcript.log_turn(thread_id, &turn, true);
                TurnOutcome::Failed(turn)
            }
        };

        if let Some(turn) = outcome.turn() {
            self.history.append(turn.clone());
        }
        if let Some(tx) = outcome_tx {
            let _ = tx.send(outcome);
        }
    }

    fn new_conversation(&mut self) -> Session {
        let abandoned = self.session.thread_id();
        debug!(%abandoned, "new_conversation: called");

        self.history.clear();
        self.session = self.registry.reset(self.session.clone());
        self.transcript.log_reset(abandoned, self.session.thread_id());
        self.session.clone()
    }
}

/// Invoke the engine and aggregate its stream, forwarding snapshots
///
/// Snapshots are offered without waiting; a full or closed channel only
/// loses intermediate progress.
async fn run_turn(
    engine: Arc<dyn WorkflowEngine>,
    aggregator: StreamAggregator,
    invocation: Invocation,
    snapshots: mpsc::Sender<String>,
) -> Result<String, TurnError> {
    let thread_id = invocation.thread_id();
    debug!(%thread_id, kind = %invocation.kind(), "run_turn: called");

    let stream = match aggregator.chunk_timeout() {
        Some(limit) => tokio::time::timeout(limit, engine.invoke(invocation))
            .await
            .map_err(|_| {
                warn!(%thread_id, ?limit, "run_turn: engine did not start streaming in time");
                TurnError::Timeout(limit)
            })??,
        None => engine.invoke(invocation).await?,
    };
    let mut aggregation = aggregator.run(stream);
    while let Some(snapshot) = aggregation.next_snapshot().await? {
        if snapshots.try_send(snapshot.to_string()).is_err() {
            debug!(%thread_id, "run_turn: snapshot skipped");
        }
    }
    Ok(aggregation.snapshot().to_string())
}
