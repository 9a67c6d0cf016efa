//! The observe-think-act loop.
//!
//! Each iteration:
//! 1. Capture a fresh observation
//! 2. Build a fresh prompt from the goal and the rolling progress log
//! 3. Ask the model for one JSON action (with classified retries)
//! 4. Gate and dispatch the action, fold the result into RunState
//!
//! Every failure is absorbed into RunState counters. The run ends on
//! completion, cancellation, or an exhausted budget, and a [`RunResult`] is
//! always returned.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::LoopBudgets;
use super::prompt::{PromptInput, build_system_prompt, build_user_text};
use crate::callbacks::RunCallbacks;
use crate::config::Config;
use crate::domain::{
    ActionFingerprint, JournalEvent, RunOutcome, RunPhase, RunResult, RunState, as_sentence, parse_action,
};
use crate::journal::JournalWriter;
use crate::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Message};
use crate::observe::{CaptureSettings, Observation, ObservationSource};
use crate::retry::{RetryPolicy, classify};
use crate::tools::{ToolContext, ToolDispatcher};

const DEFAULT_COMPLETION_NOTE: &str = "Goal achieved";

/// What the loop is pointed at.
#[derive(Debug, Clone, Default)]
pub struct RunTarget {
    pub goal: String,
    pub target_pid: Option<u32>,
    /// Extra knowledge injected into every prompt
    pub external_context: Option<String>,
    /// Per-run cancellation; the loop's own token still applies
    pub cancel: Option<CancellationToken>,
}

impl RunTarget {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            ..Default::default()
        }
    }

    pub fn with_target_pid(mut self, pid: Option<u32>) -> Self {
        self.target_pid = pid;
        self
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.external_context = context;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

enum CallOutcome {
    Reply(CompletionResponse),
    Exhausted(LlmError),
    Cancelled,
}

/// Drives one run to completion.
pub struct ReactiveLoop {
    llm: Arc<dyn LlmClient>,
    capture: Arc<dyn ObservationSource>,
    dispatcher: Arc<ToolDispatcher>,
    retry: RetryPolicy,
    budgets: LoopBudgets,
    capture_settings: CaptureSettings,
    model: Option<String>,
    max_tokens: u32,
    save_observations: bool,
    cancel: CancellationToken,
}

impl ReactiveLoop {
    pub fn new(llm: Arc<dyn LlmClient>, capture: Arc<dyn ObservationSource>, dispatcher: Arc<ToolDispatcher>) -> Self {
        Self {
            llm,
            capture,
            dispatcher,
            retry: RetryPolicy::default(),
            budgets: LoopBudgets::default(),
            capture_settings: CaptureSettings::default(),
            model: None,
            max_tokens: 1024,
            save_observations: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_budgets(mut self, budgets: LoopBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    pub fn with_capture_settings(mut self, settings: CaptureSettings) -> Self {
        self.capture_settings = settings;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Write each captured frame next to the journal.
    pub fn with_observation_persistence(mut self, enabled: bool) -> Self {
        self.save_observations = enabled;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Apply budgets, retry timings, capture and model settings from `config`.
    pub fn with_config(self, config: &Config) -> Self {
        self.with_budgets(config.budgets())
            .with_retry_policy(RetryPolicy::new(config.retry_config()))
            .with_capture_settings(config.capture_settings())
            .with_model(config.llm.model.clone())
            .with_max_tokens(config.llm.max_tokens)
            .with_observation_persistence(config.journal.save_observations)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn budgets(&self) -> &LoopBudgets {
        &self.budgets
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Run until done, cancelled, or out of budget.
    ///
    /// `state` may carry iterations and progress from a resumed run.
    pub async fn run(
        &self,
        mut state: RunState,
        target: &RunTarget,
        journal: &mut JournalWriter,
        callbacks: &dyn RunCallbacks,
    ) -> RunResult {
        let budgets = self.budgets;
        let cancel = match &target.cancel {
            Some(token) => token.clone(),
            None => self.cancel.child_token(),
        };
        let mut ctx = ToolContext::new(target.target_pid);
        callbacks.on_state_change(RunPhase::Starting);
        log::info!("Run {} started: {}", state.run_id, target.goal);

        loop {
            if cancel.is_cancelled() || self.cancel.is_cancelled() {
                state.fail("cancelled");
                break;
            }
            if state.iteration() >= budgets.max_iterations {
                state.fail(format!(
                    "Reached the limit of {} iterations without finishing the goal",
                    budgets.max_iterations
                ));
                break;
            }

            let iteration = state.begin_iteration();
            ctx.set_iteration(iteration);

            // Observe
            callbacks.on_state_change(RunPhase::Observing);
            let settings = self.capture_settings;
            match self
                .capture
                .capture(target.target_pid, settings.max_dimension, settings.quality)
                .await
            {
                Ok(observation) => {
                    let file = self.persist_observation(journal, iteration, &observation);
                    record(journal, &JournalEvent::iteration_start(iteration, file));
                    ctx.set_observation(Some(observation));
                }
                Err(e) => {
                    record(journal, &JournalEvent::iteration_start(iteration, None));
                    ctx.set_observation(None);
                    let failures = state.record_failure();
                    log::warn!("Run {} iteration {}: capture failed: {}", state.run_id, iteration, e);
                    callbacks.on_message(&format!("Screen capture failed: {}", e));
                    state.push_progress(format!("#{} screen capture failed: {}", iteration, e));
                    record(
                        journal,
                        &JournalEvent::iteration_end(
                            iteration,
                            Some("screen capture failed".to_string()),
                            None,
                            state.tokens(),
                        ),
                    );
                    if failures >= budgets.max_consecutive_failures {
                        state.fail(format!("Screen capture failed {} times in a row ({})", failures, e));
                        break;
                    }
                    if !self.pause(&cancel).await {
                        state.fail("cancelled");
                        break;
                    }
                    continue;
                }
            }

            // Think
            let stuck = state.is_stuck(budgets.consecutive_repeat_threshold, budgets.window_repeat_threshold);
            if stuck && let Some(last) = state.fingerprints().last() {
                log::info!("Run {} is repeating {}; adding escape hatch", state.run_id, last);
                record(journal, &JournalEvent::stuck(iteration, last.as_str()));
                callbacks.on_message("Repeating the same action; asking the model for a different approach.");
            }

            callbacks.on_state_change(RunPhase::Thinking);
            let tools = self.dispatcher.tool_specs();
            let system = build_system_prompt(&PromptInput {
                goal: &target.goal,
                tools: &tools,
                progress: state.progress(),
                last_action: state.last_action(),
                stuck,
                external_context: target.external_context.as_deref(),
                iteration,
                max_iterations: budgets.max_iterations,
            });
            let request = self.build_request(system, &target.goal, &ctx);

            let response = match self.complete_with_retry(request, &cancel).await {
                CallOutcome::Reply(response) => response,
                CallOutcome::Cancelled => {
                    state.fail("cancelled");
                    break;
                }
                CallOutcome::Exhausted(e) => {
                    let failures = state.record_failure();
                    callbacks.on_message(&format!("The model could not be reached: {}", e));
                    state.push_progress(format!("#{} model call failed: {}", iteration, e));
                    record(
                        journal,
                        &JournalEvent::iteration_end(
                            iteration,
                            Some("model call failed".to_string()),
                            None,
                            state.tokens(),
                        ),
                    );
                    if failures >= budgets.max_consecutive_failures {
                        state.fail(format!("The model could not be reached {} times in a row ({})", failures, e));
                        break;
                    }
                    if !self.pause(&cancel).await {
                        state.fail("cancelled");
                        break;
                    }
                    continue;
                }
            };
            state.add_usage(&response.usage);

            let action = match parse_action(&response.content) {
                Ok(action) => action,
                Err(e) => {
                    let failures = state.record_failure();
                    log::warn!("Run {} iteration {}: unparsable reply: {}", state.run_id, iteration, e);
                    callbacks.on_message(&format!("Could not understand the model's reply: {}", e));
                    state.push_progress(format!(
                        "#{} reply was not a valid JSON action ({}); reply with one JSON object",
                        iteration, e
                    ));
                    record(
                        journal,
                        &JournalEvent::iteration_end(
                            iteration,
                            Some(format!("unparsable reply: {}", e)),
                            None,
                            state.tokens(),
                        ),
                    );
                    if failures >= budgets.max_consecutive_failures {
                        state.fail(format!(
                            "The model's reply could not be understood {} times in a row",
                            failures
                        ));
                        break;
                    }
                    if !self.pause(&cancel).await {
                        state.fail("cancelled");
                        break;
                    }
                    continue;
                }
            };
            state.set_score(action.score);

            if action.done {
                let note = action
                    .progress_note
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_COMPLETION_NOTE.to_string());
                record(
                    journal,
                    &JournalEvent::iteration_end(iteration, Some(note.clone()), action.score, state.tokens()),
                );
                state.complete(note);
                break;
            }

            // Act
            callbacks.on_state_change(RunPhase::Acting);
            let summary = action.summary();
            state.record_fingerprint(ActionFingerprint::of(
                &action.tool,
                &action.params,
                budgets.coordinate_tolerance_px,
            ));
            callbacks.on_message(&summary);

            let outcome = self
                .dispatcher
                .dispatch(&action.tool, &action.params, &mut ctx, callbacks)
                .await;
            let result = &outcome.result;
            record(
                journal,
                &JournalEvent::tool_executed(
                    iteration,
                    &action.tool,
                    &action.params,
                    &result.text,
                    result.is_error,
                    outcome.tier,
                ),
            );
            state.record_tool_result(&summary, &result.text, result.is_error, action.progress_note.as_deref());
            if result.is_error {
                callbacks.on_message(&format!("{} failed: {}", action.tool, first_line(&result.text)));
            }
            record(
                journal,
                &JournalEvent::iteration_end(iteration, action.progress_note.clone(), action.score, state.tokens()),
            );

            if result.is_error && state.consecutive_failures() >= budgets.max_consecutive_failures {
                state.fail(format!(
                    "Actions failed {} times in a row; last error: {}",
                    state.consecutive_failures(),
                    first_line(&result.text)
                ));
                break;
            }

            if !self.pause(&cancel).await {
                state.fail("cancelled");
                break;
            }
        }

        self.finish(state, journal, callbacks)
    }

    fn build_request(&self, system: String, goal: &str, ctx: &ToolContext) -> CompletionRequest {
        let text = build_user_text(goal, ctx.observation());
        let message = match ctx.observation() {
            Some(obs) => Message::user_with_image(text, obs.media_type.clone(), obs.image.clone()),
            None => Message::user(text),
        };
        let request = CompletionRequest::new(system)
            .with_message(message)
            .with_max_tokens(self.max_tokens);
        match &self.model {
            Some(model) => request.with_model(model.clone()),
            None => request,
        }
    }

    async fn complete_with_retry(&self, request: CompletionRequest, cancel: &CancellationToken) -> CallOutcome {
        let mut attempt = 0;
        loop {
            let error = match self.llm.complete(request.clone()).await {
                Ok(response) => return CallOutcome::Reply(response),
                Err(e) => e,
            };
            let class = classify(&error);
            let Some(delay) = self.retry.strategy_for(&class).next_delay(attempt) else {
                log::warn!("LLM call failed ({}), giving up after {} retries: {}", class.label(), attempt, error);
                return CallOutcome::Exhausted(error);
            };
            tracing::warn!(
                error = %error,
                class = class.label(),
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "LLM call failed, retrying"
            );
            if !sleep(delay, cancel).await {
                return CallOutcome::Cancelled;
            }
            attempt += 1;
        }
    }

    fn persist_observation(
        &self,
        journal: &JournalWriter,
        iteration: u32,
        observation: &Observation,
    ) -> Option<String> {
        if !self.save_observations {
            return None;
        }
        match journal.save_observation(iteration, observation) {
            Ok(name) => Some(name),
            Err(e) => {
                log::warn!("Failed to save observation for iteration {}: {}", iteration, e);
                None
            }
        }
    }

    async fn pause(&self, cancel: &CancellationToken) -> bool {
        sleep(self.budgets.iteration_pause, cancel).await
    }

    fn finish(&self, state: RunState, journal: &mut JournalWriter, callbacks: &dyn RunCallbacks) -> RunResult {
        let iterations = state.iteration();
        let tokens = state.tokens();
        let (success, reason) = match state.outcome() {
            Some(RunOutcome::Completed(reason)) => (true, reason.clone()),
            Some(RunOutcome::Failed(reason)) => (false, reason.clone()),
            None => (false, "stopped without an outcome".to_string()),
        };

        if success {
            record(journal, &JournalEvent::complete(&reason, iterations, tokens));
            callbacks.on_state_change(RunPhase::Completed);
            log::info!("Run {} completed after {} iterations: {}", state.run_id, iterations, reason);
        } else {
            record(journal, &JournalEvent::fail(&reason, iterations, tokens));
            callbacks.on_state_change(RunPhase::Failed);
            log::warn!("Run {} failed after {} iterations: {}", state.run_id, iterations, reason);
        }

        let summary = as_sentence(&reason);
        callbacks.on_message(&summary);
        if success {
            RunResult::succeeded(&state.run_id, summary, iterations, tokens)
        } else {
            RunResult::failed(&state.run_id, summary, iterations, tokens)
        }
    }
}

/// Sleep unless cancelled first. Returns false on cancellation.
async fn sleep(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

fn record(journal: &mut JournalWriter, event: &JournalEvent) {
    if let Err(e) = journal.append(event) {
        log::error!("Failed to journal {} for run {}: {}", event.kind(), journal.run_id(), e);
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::FixedAnswer;
    use crate::journal::RunJournal;
    use crate::llm::MockLlmClient;
    use crate::observe::CaptureError;
    use crate::retry::RetryConfig;
    use crate::safety::SafetyGate;
    use crate::tools::{ActionExecutor, ExecuteOptions, ExecutorKind, ToolCatalog, ToolRegistry, ToolResult};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Screens {
        script: Mutex<VecDeque<Result<Observation, CaptureError>>>,
    }

    impl Screens {
        fn always_ok() -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
            }
        }

        fn failing(n: usize) -> Self {
            Self {
                script: Mutex::new((0..n).map(|_| Err(CaptureError::PermissionDenied)).collect()),
            }
        }
    }

    #[async_trait]
    impl ObservationSource for Screens {
        async fn capture(&self, _: Option<u32>, _: u32, _: u8) -> Result<Observation, CaptureError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Observation::jpeg(vec![0xff, 0xd8], 640, 480)))
        }
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ActionExecutor for Recorder {
        async fn execute(&self, name: &str, _: &Value, _: &ExecuteOptions) -> ToolResult {
            self.calls.lock().unwrap().push(name.to_string());
            ToolResult::success("ok")
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            transient_base: Duration::from_millis(1),
            transient_max_delay: Duration::from_millis(2),
            transient_max_attempts: 2,
            rate_limit_default: Duration::from_millis(1),
            rate_limit_max_attempts: 1,
            unknown_base: Duration::from_millis(1),
            unknown_max_delay: Duration::from_millis(2),
            unknown_max_attempts: 1,
        })
    }

    fn harness(llm: Arc<MockLlmClient>, screens: Screens, recorder: Arc<Recorder>) -> ReactiveLoop {
        let registry = Arc::new(ToolRegistry::from_catalog(&ToolCatalog::builtin().unwrap()));
        let dispatcher = ToolDispatcher::new(registry, Arc::new(SafetyGate::new()), "/tmp/deskloop-loop-test")
            .with_executor(ExecutorKind::Input, recorder);
        ReactiveLoop::new(llm, Arc::new(screens), Arc::new(dispatcher))
            .with_retry_policy(fast_retry())
            .with_budgets(LoopBudgets {
                iteration_pause: Duration::ZERO,
                ..LoopBudgets::default()
            })
    }

    async fn run(reactive: &ReactiveLoop, dir: &TempDir) -> (RunResult, Vec<JournalEvent>) {
        let journal = RunJournal::new(dir.path()).unwrap();
        let mut writer = journal.open("run-test").unwrap();
        let state = RunState::new("run-test", "Open Calculator", 12, 8);
        let result = reactive
            .run(state, &RunTarget::new("Open Calculator"), &mut writer, &FixedAnswer::approve())
            .await;
        (result, journal.replay("run-test").unwrap())
    }

    #[tokio::test]
    async fn test_done_on_first_reply() {
        let llm = Arc::new(MockLlmClient::new());
        llm.push_text(r#"{"done": true, "note": "Calculator is open", "score": 10}"#);
        let dir = TempDir::new().unwrap();
        let (result, events) = run(&harness(llm, Screens::always_ok(), Arc::default()), &dir).await;

        assert!(result.success);
        assert_eq!(result.summary, "Calculator is open.");
        assert_eq!(result.iterations, 1);
        assert_eq!(result.tokens.input_tokens, 100);
        assert!(matches!(events.last(), Some(JournalEvent::Complete { .. })));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let llm = Arc::new(MockLlmClient::new());
        llm.push_error(LlmError::http(503, "overloaded"));
        llm.push_text(r#"{"done": true}"#);
        let dir = TempDir::new().unwrap();
        let (result, _) = run(&harness(llm.clone(), Screens::always_ok(), Arc::default()), &dir).await;

        assert!(result.success);
        assert_eq!(result.summary, "Goal achieved.");
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_spend_failure_budget() {
        let llm = Arc::new(MockLlmClient::new());
        for _ in 0..3 {
            llm.push_error(LlmError::Unauthenticated);
        }
        let dir = TempDir::new().unwrap();
        let (result, _) = run(&harness(llm.clone(), Screens::always_ok(), Arc::default()), &dir).await;

        assert!(!result.success);
        assert!(result.summary.contains("3 times"));
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_capture_failures_end_run() {
        let llm = Arc::new(MockLlmClient::new());
        let dir = TempDir::new().unwrap();
        let (result, events) = run(&harness(llm.clone(), Screens::failing(3), Arc::default()), &dir).await;

        assert!(!result.success);
        assert!(result.summary.contains("3 times"));
        assert_eq!(result.iterations, 3);
        assert_eq!(llm.call_count(), 0);
        assert!(matches!(events.last(), Some(JournalEvent::Fail { .. })));
    }

    #[tokio::test]
    async fn test_iteration_budget() {
        let llm = Arc::new(MockLlmClient::new());
        for x in 0..3 {
            llm.push_text(format!(r#"{{"action": "click", "params": {{"x": {}, "y": 10}}}}"#, x * 100));
        }
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let reactive = harness(llm, Screens::always_ok(), recorder.clone()).with_budgets(LoopBudgets {
            max_iterations: 3,
            iteration_pause: Duration::ZERO,
            ..LoopBudgets::default()
        });
        let (result, _) = run(&reactive, &dir).await;

        assert!(!result.success);
        assert!(result.summary.contains("limit of 3 iterations"));
        assert_eq!(recorder.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let llm = Arc::new(MockLlmClient::new());
        let reactive = harness(llm.clone(), Screens::always_ok(), Arc::default());
        reactive.cancellation_token().cancel();
        let dir = TempDir::new().unwrap();
        let (result, _) = run(&reactive, &dir).await;

        assert!(!result.success);
        assert_eq!(result.summary, "Cancelled.");
        assert_eq!(result.iterations, 0);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_config_is_applied() {
        let llm = Arc::new(MockLlmClient::new());
        llm.push_text(r#"{"done": true}"#);
        let mut config = Config::default();
        config.budgets.max_iterations = 5;
        config.llm.model = "claude-test".to_string();
        config.llm.max_tokens = 256;
        config.journal.save_observations = false;
        let reactive = harness(llm.clone(), Screens::always_ok(), Arc::default()).with_config(&config);
        assert_eq!(reactive.budgets().max_iterations, 5);

        let dir = TempDir::new().unwrap();
        run(&reactive, &dir).await;
        let request = &llm.requests()[0];
        assert_eq!(request.model.as_deref(), Some("claude-test"));
        assert_eq!(request.max_tokens, Some(256));
        assert!(request.system.contains("1 of 5"));
    }

    #[tokio::test]
    async fn test_observations_are_persisted() {
        let llm = Arc::new(MockLlmClient::new());
        llm.push_text(r#"{"done": true}"#);
        let dir = TempDir::new().unwrap();
        let reactive = harness(llm, Screens::always_ok(), Arc::default()).with_observation_persistence(true);
        let (_, events) = run(&reactive, &dir).await;

        let Some(JournalEvent::IterationStart { observation, .. }) = events.first() else {
            panic!("expected iteration start first");
        };
        let name = observation.clone().unwrap();
        assert_eq!(name, "obs-0001.jpg");
        assert!(dir.path().join("run-test").join(name).exists());
    }
}
