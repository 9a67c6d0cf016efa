//! Command intake: one run at a time, journaled from creation to outcome.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::callbacks::RunCallbacks;
use crate::domain::{Command, JournalEvent, RunResult, RunState, as_sentence};
use crate::id::generate_run_id;
use crate::journal::{JournalWriter, RunJournal};
use crate::llm::Usage;
use crate::runner::{ReactiveLoop, RunTarget};

pub const BUSY_MESSAGE: &str = "Another run is already in progress.";

/// Supplies skill or memory text relevant to a goal.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn context_for(&self, goal: &str) -> Option<String>;
}

/// Provides no extra context.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContext;

#[async_trait]
impl ContextProvider for NoContext {
    async fn context_for(&self, _goal: &str) -> Option<String> {
        None
    }
}

/// Accepts commands and drives them through the reactive loop.
pub struct Orchestrator {
    reactive: ReactiveLoop,
    journal: Arc<RunJournal>,
    context: Arc<dyn ContextProvider>,
    active: tokio::sync::Mutex<()>,
    current: Mutex<Option<CancellationToken>>,
}

impl Orchestrator {
    pub fn new(reactive: ReactiveLoop, journal: Arc<RunJournal>) -> Self {
        Self {
            reactive,
            journal,
            context: Arc::new(NoContext),
            active: tokio::sync::Mutex::new(()),
            current: Mutex::new(None),
        }
    }

    pub fn with_context_provider(mut self, context: Arc<dyn ContextProvider>) -> Self {
        self.context = context;
        self
    }

    pub fn journal(&self) -> &RunJournal {
        &self.journal
    }

    /// Whether a run is in flight.
    pub fn is_busy(&self) -> bool {
        self.active.try_lock().is_err()
    }

    /// Cancel the run in flight, if any.
    pub fn cancel_current(&self) -> bool {
        match self.current.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(token) => {
                log::info!("Cancelling the current run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run `command` to completion and answer its reply channel.
    pub async fn handle(&self, mut command: Command, callbacks: &dyn RunCallbacks) -> RunResult {
        let reply = command.reply.take();
        let result = self.start(command, callbacks).await;
        if let Some(tx) = reply
            && tx.send(result.clone()).is_err()
        {
            log::debug!("Reply receiver for run {} was dropped", result.run_id);
        }
        result
    }

    async fn start(&self, command: Command, callbacks: &dyn RunCallbacks) -> RunResult {
        let Ok(_guard) = self.active.try_lock() else {
            log::warn!("Rejected command from {}: a run is active", command.source);
            return RunResult::failed("", BUSY_MESSAGE, 0, Usage::default());
        };

        let run_id = generate_run_id();
        let mut writer = match self.journal.open(&run_id) {
            Ok(writer) => writer,
            Err(e) => {
                log::error!("Failed to open journal for {}: {}", run_id, e);
                return RunResult::failed(
                    run_id,
                    as_sentence(&format!("could not open the run journal: {}", e)),
                    0,
                    Usage::default(),
                );
            }
        };
        if let Err(e) = writer.append(&JournalEvent::created(
            &run_id,
            &command.text,
            command.source,
            command.target_pid,
        )) {
            log::error!("Failed to journal creation of {}: {}", run_id, e);
        }
        log::info!("Run {} created from {}: {}", run_id, command.source, command.text);

        let budgets = self.reactive.budgets();
        let state = RunState::new(
            &run_id,
            &command.text,
            budgets.progress_log_lines,
            budgets.fingerprint_window,
        );
        self.drive(state, &command.text, command.target_pid, writer, callbacks).await
    }

    /// Continue an incomplete run from its journal.
    pub async fn resume(&self, run_id: &str, callbacks: &dyn RunCallbacks) -> RunResult {
        let Ok(_guard) = self.active.try_lock() else {
            return RunResult::failed(run_id, BUSY_MESSAGE, 0, Usage::default());
        };

        let snapshot = match self.journal.replay_run_state(run_id) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                return RunResult::failed(
                    run_id,
                    as_sentence(&format!("run {} could not be replayed: {}", run_id, e)),
                    0,
                    Usage::default(),
                );
            }
        };
        if let Some(terminal) = &snapshot.terminal {
            return RunResult::failed(
                run_id,
                as_sentence(&format!("run {} already {}", run_id, terminal.label())),
                snapshot.iterations,
                snapshot.tokens,
            );
        }
        if snapshot.command.is_empty() {
            return RunResult::failed(
                run_id,
                as_sentence(&format!("run {} has no recorded command", run_id)),
                snapshot.iterations,
                snapshot.tokens,
            );
        }

        let writer = match self.journal.open(run_id) {
            Ok(writer) => writer,
            Err(e) => {
                return RunResult::failed(
                    run_id,
                    as_sentence(&format!("could not open the run journal: {}", e)),
                    snapshot.iterations,
                    snapshot.tokens,
                );
            }
        };

        let budgets = self.reactive.budgets();
        let mut state = RunState::new(
            run_id,
            &snapshot.command,
            budgets.progress_log_lines,
            budgets.fingerprint_window,
        );
        state.resume_from(
            snapshot.iterations,
            &snapshot.progress_lines(),
            snapshot.last_score,
            snapshot.tokens,
        );
        log::info!("Resuming run {} at iteration {}", run_id, snapshot.iterations);

        self.drive(state, &snapshot.command, snapshot.target_pid, writer, callbacks)
            .await
    }

    async fn drive(
        &self,
        state: RunState,
        goal: &str,
        target_pid: Option<u32>,
        mut writer: JournalWriter,
        callbacks: &dyn RunCallbacks,
    ) -> RunResult {
        self.reactive.dispatcher().gate().clear_session();

        let token = self.reactive.cancellation_token().child_token();
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());

        let context = self.context.context_for(goal).await;
        let target = RunTarget::new(goal)
            .with_target_pid(target_pid)
            .with_context(context)
            .with_cancellation(token);
        let result = self.reactive.run(state, &target, &mut writer, callbacks).await;

        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = None;
        if let Err(e) = writer.close() {
            log::warn!("Failed to close journal for {}: {}", result.run_id, e);
        }
        result
    }
}
