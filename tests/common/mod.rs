//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use deskloop::callbacks::RunCallbacks;
use deskloop::domain::RunPhase;
use deskloop::journal::RunJournal;
use deskloop::llm::MockLlmClient;
use deskloop::observe::{CaptureError, Observation, ObservationSource};
use deskloop::orchestrator::Orchestrator;
use deskloop::retry::{RetryConfig, RetryPolicy};
use deskloop::runner::{LoopBudgets, ReactiveLoop};
use deskloop::safety::{ConfirmationRequest, SafetyGate};
use deskloop::tools::{
    ActionExecutor, ExecuteOptions, ExecutorKind, ToolCatalog, ToolDispatcher, ToolRegistry, ToolResult,
};

/// Capture source replaying a script, then returning a blank frame forever.
#[derive(Default)]
pub struct ScriptedScreens {
    script: Mutex<VecDeque<Result<Observation, CaptureError>>>,
    delay: Duration,
    pub captures: Mutex<u32>,
}

impl ScriptedScreens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(times: usize) -> Self {
        let screens = Self::new();
        for _ in 0..times {
            screens.push(Err(CaptureError::Failed("display asleep".to_string())));
        }
        screens
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push(&self, result: Result<Observation, CaptureError>) {
        self.script.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl ObservationSource for ScriptedScreens {
    async fn capture(&self, _pid: Option<u32>, _max: u32, _quality: u8) -> Result<Observation, CaptureError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        *self.captures.lock().unwrap() += 1;
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Observation::jpeg(vec![0xff, 0xd8, 0xff], 1280, 800)))
    }
}

/// Executor that records each call and answers "ok".
#[derive(Default)]
pub struct RecordingExecutor {
    pub calls: Mutex<Vec<(String, Value, ExecuteOptions)>>,
}

impl RecordingExecutor {
    pub fn names(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(n, _, _)| n.clone()).collect()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, name: &str, params: &Value, options: &ExecuteOptions) -> ToolResult {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), params.clone(), *options));
        ToolResult::success(format!("{} ok", name))
    }
}

/// Callbacks recording every phase, message and confirmation.
#[derive(Default)]
pub struct RecordingCallbacks {
    pub approve: bool,
    pub phases: Mutex<Vec<RunPhase>>,
    pub messages: Mutex<Vec<String>>,
    pub confirmations: Mutex<Vec<ConfirmationRequest>>,
}

impl RecordingCallbacks {
    pub fn approving() -> Self {
        Self {
            approve: true,
            ..Default::default()
        }
    }

    pub fn declining() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunCallbacks for RecordingCallbacks {
    fn on_state_change(&self, phase: RunPhase) {
        self.phases.lock().unwrap().push(phase);
    }

    fn on_message(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }

    async fn confirm(&self, request: &ConfirmationRequest) -> bool {
        self.confirmations.lock().unwrap().push(request.clone());
        self.approve
    }
}

pub fn fast_budgets() -> LoopBudgets {
    LoopBudgets {
        iteration_pause: Duration::ZERO,
        ..LoopBudgets::default()
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(RetryConfig {
        transient_base: Duration::from_millis(1),
        transient_max_delay: Duration::from_millis(4),
        transient_max_attempts: 3,
        rate_limit_default: Duration::from_millis(1),
        rate_limit_max_attempts: 2,
        unknown_base: Duration::from_millis(1),
        unknown_max_delay: Duration::from_millis(2),
        unknown_max_attempts: 1,
    })
}

/// Dispatcher over the built-in catalog with one recorder for every executor.
pub fn dispatcher(executor: Arc<RecordingExecutor>, data_dir: &std::path::Path) -> ToolDispatcher {
    let registry = Arc::new(ToolRegistry::from_catalog(&ToolCatalog::builtin().unwrap()));
    let mut dispatcher = ToolDispatcher::new(registry, Arc::new(SafetyGate::new()), data_dir);
    for kind in [
        ExecutorKind::Input,
        ExecutorKind::Launch,
        ExecutorKind::Shell,
        ExecutorKind::Vault,
    ] {
        dispatcher = dispatcher.with_executor(kind, executor.clone());
    }
    dispatcher
}

pub fn reactive_loop(
    llm: Arc<MockLlmClient>,
    screens: Arc<ScriptedScreens>,
    executor: Arc<RecordingExecutor>,
    data_dir: &std::path::Path,
) -> ReactiveLoop {
    ReactiveLoop::new(llm, screens, Arc::new(dispatcher(executor, data_dir)))
        .with_budgets(fast_budgets())
        .with_retry_policy(fast_retry())
}

pub struct Harness {
    pub llm: Arc<MockLlmClient>,
    pub screens: Arc<ScriptedScreens>,
    pub executor: Arc<RecordingExecutor>,
    pub journal: Arc<RunJournal>,
    pub orchestrator: Arc<Orchestrator>,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_screens(ScriptedScreens::new())
    }

    pub fn with_screens(screens: ScriptedScreens) -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        let llm = Arc::new(MockLlmClient::new());
        let screens = Arc::new(screens);
        let executor = Arc::new(RecordingExecutor::default());
        let journal = Arc::new(RunJournal::new(dir.path().join("runs")).unwrap());
        let reactive = reactive_loop(llm.clone(), screens.clone(), executor.clone(), &dir.path().join("data"));
        let orchestrator = Arc::new(Orchestrator::new(reactive, journal.clone()));
        Self {
            llm,
            screens,
            executor,
            journal,
            orchestrator,
            _dir: dir,
        }
    }
}
