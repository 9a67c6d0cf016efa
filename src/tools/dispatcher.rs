//! Tool dispatch through the safety gate
//!
//! Every call is resolved in the registry, tiered, confirmed when the gate
//! asks, then handed to a first-party executor or a plugin process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::callbacks::RunCallbacks;
use crate::domain::{RiskTier, RunPhase};
use crate::error::Result;
use crate::plugin::{PluginLimits, discover_plugins, invoke_plugin};
use crate::safety::{Decision, SafetyGate};

use super::context::ToolContext;
use super::definition::{ExecutorKind, ToolSpec};
use super::executor::{ActionExecutor, ExecuteOptions};
use super::registry::{HandlerKind, ToolRegistry};
use super::result::ToolResult;

/// Result plus the tier the gate placed the call in
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub result: ToolResult,
    /// `None` when the call never reached the gate
    pub tier: Option<RiskTier>,
}

impl DispatchOutcome {
    fn ungated(result: ToolResult) -> Self {
        Self { result, tier: None }
    }
}

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    executors: HashMap<ExecutorKind, Arc<dyn ActionExecutor>>,
    gate: Arc<SafetyGate>,
    plugin_limits: PluginLimits,
    plugin_data_dir: PathBuf,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, gate: Arc<SafetyGate>, plugin_data_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            executors: HashMap::new(),
            gate,
            plugin_limits: PluginLimits::default(),
            plugin_data_dir: plugin_data_dir.into(),
        }
    }

    pub fn with_executor(mut self, kind: ExecutorKind, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executors.insert(kind, executor);
        self
    }

    pub fn with_plugin_limits(mut self, limits: PluginLimits) -> Self {
        self.plugin_limits = limits;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn gate(&self) -> &SafetyGate {
        &self.gate
    }

    /// Tools offered to the model.
    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    /// Rescan `plugin_dir` and swap the plugin tools in one step.
    pub fn reload_plugins(&self, plugin_dir: &Path) -> Result<usize> {
        let plugins = discover_plugins(plugin_dir)?;
        let count = self.registry.replace_plugins(plugins);
        log::info!("Registered {} plugin tools from {}", count, plugin_dir.display());
        Ok(count)
    }

    /// Gate and execute one tool call.
    ///
    /// Failures never escape: they come back as error results.
    pub async fn dispatch(
        &self,
        name: &str,
        params: &Value,
        ctx: &mut ToolContext,
        callbacks: &dyn RunCallbacks,
    ) -> DispatchOutcome {
        let Some(entry) = self.registry.resolve(name) else {
            return DispatchOutcome::ungated(ToolResult::error(format!(
                "Unknown tool '{}'. Available tools: {}",
                name,
                self.registry.names().join(", ")
            )));
        };

        let manifest_tier = match &entry.handler {
            HandlerKind::Plugin(plugin) => Some(plugin.manifest.risk_tier()),
            HandlerKind::Builtin(_) => None,
        };

        let assessment = match self.gate.evaluate(name, params, manifest_tier, ctx.observation()).await {
            Decision::Allow(assessment) => assessment,
            Decision::Deny(reason) => {
                return DispatchOutcome::ungated(ToolResult::error(format!("Blocked: {}", reason)));
            }
            Decision::Ask(assessment) => {
                let request = SafetyGate::confirmation_request(name, params, &assessment);
                callbacks.on_state_change(RunPhase::AwaitingConfirmation);
                let approved = callbacks.confirm(&request).await;
                callbacks.on_state_change(RunPhase::Acting);
                if !approved {
                    log::info!("User declined {} ({})", name, assessment.tier);
                    return DispatchOutcome {
                        result: ToolResult::error(format!(
                            "User declined {} ({}: {}). Choose a different approach.",
                            name, assessment.tier, assessment.reason
                        )),
                        tier: Some(assessment.tier),
                    };
                }
                self.gate.record_approval(name, params, assessment.tier);
                assessment
            }
        };

        let result = match &entry.handler {
            HandlerKind::Builtin(kind) => {
                let Some(executor) = self.executors.get(kind) else {
                    return DispatchOutcome {
                        result: ToolResult::error(format!("No {} executor is available for {}", kind, name)),
                        tier: Some(assessment.tier),
                    };
                };
                let options = ExecuteOptions {
                    synthetic_input: kind.injects_input(),
                    target_pid: ctx.target_pid(),
                };
                executor.execute(name, params, &options).await
            }
            HandlerKind::Plugin(plugin) => {
                let data_dir = plugin.data_dir(&self.plugin_data_dir);
                match invoke_plugin(&plugin.entrypoint, &plugin.dir, &data_dir, name, params, &self.plugin_limits).await
                {
                    Ok(response) if response.is_error => ToolResult::error(response.result),
                    Ok(response) => ToolResult::success(response.result),
                    Err(e) => ToolResult::error(format!("{} ({})", e, plugin.manifest.name)),
                }
            }
        };

        if let Some(observation) = &result.updated_observation {
            ctx.set_observation(Some(observation.clone()));
        }

        log::debug!(
            "Dispatched {} [{}] -> {}",
            name,
            assessment.tier,
            if result.is_error { "error" } else { "ok" }
        );
        DispatchOutcome {
            result,
            tier: Some(assessment.tier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::FixedAnswer;
    use crate::observe::Observation;
    use crate::safety::ConfirmationRequest;
    use crate::tools::ToolCatalog;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, ExecuteOptions)>>,
    }

    #[async_trait]
    impl ActionExecutor for Recorder {
        async fn execute(&self, name: &str, _params: &Value, options: &ExecuteOptions) -> ToolResult {
            self.calls.lock().unwrap().push((name.to_string(), *options));
            ToolResult::success(format!("{} done", name)).with_observation(Observation::jpeg(vec![1], 1, 1))
        }
    }

    #[derive(Default)]
    struct CountingConfirm {
        asked: Mutex<Vec<ConfirmationRequest>>,
        approve: bool,
    }

    #[async_trait]
    impl RunCallbacks for CountingConfirm {
        async fn confirm(&self, request: &ConfirmationRequest) -> bool {
            self.asked.lock().unwrap().push(request.clone());
            self.approve
        }
    }

    fn dispatcher(recorder: Arc<Recorder>) -> ToolDispatcher {
        let registry = Arc::new(ToolRegistry::from_catalog(&ToolCatalog::builtin().unwrap()));
        ToolDispatcher::new(registry, Arc::new(SafetyGate::new()), "/tmp/deskloop-test-data")
            .with_executor(ExecutorKind::Input, recorder.clone())
            .with_executor(ExecutorKind::Shell, recorder)
    }

    #[tokio::test]
    async fn test_unknown_tool_lists_available() {
        let d = dispatcher(Arc::new(Recorder::default()));
        let mut ctx = ToolContext::new(None);
        let out = d.dispatch("teleport", &json!({}), &mut ctx, &FixedAnswer::approve()).await;
        assert!(out.result.is_error);
        assert!(out.result.text.contains("click"));
        assert_eq!(out.tier, None);
    }

    #[tokio::test]
    async fn test_tier1_runs_without_confirmation() {
        let recorder = Arc::new(Recorder::default());
        let d = dispatcher(recorder.clone());
        let confirm = CountingConfirm::default();
        let mut ctx = ToolContext::new(Some(42));
        let out = d.dispatch("click", &json!({"x": 1, "y": 2}), &mut ctx, &confirm).await;

        assert!(!out.result.is_error);
        assert_eq!(out.tier, Some(RiskTier::Tier1));
        assert!(confirm.asked.lock().unwrap().is_empty());
        let calls = recorder.calls.lock().unwrap();
        assert!(calls[0].1.synthetic_input);
        assert_eq!(calls[0].1.target_pid, Some(42));
        assert!(ctx.observation().is_some());
    }

    #[tokio::test]
    async fn test_declined_tier3_is_error_and_not_executed() {
        let recorder = Arc::new(Recorder::default());
        let d = dispatcher(recorder.clone());
        let confirm = CountingConfirm::default();
        let mut ctx = ToolContext::new(None);
        let out = d
            .dispatch("run_shell", &json!({"command": "rm -rf ./build"}), &mut ctx, &confirm)
            .await;

        assert!(out.result.is_error);
        assert!(out.result.text.contains("declined"));
        assert_eq!(out.tier, Some(RiskTier::Tier3));
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tier2_approval_is_remembered() {
        let recorder = Arc::new(Recorder::default());
        let d = dispatcher(recorder.clone());
        let confirm = CountingConfirm {
            approve: true,
            ..Default::default()
        };
        let mut ctx = ToolContext::new(None);
        let params = json!({"command": "git commit -m wip"});
        d.dispatch("run_shell", &params, &mut ctx, &confirm).await;
        d.dispatch("run_shell", &params, &mut ctx, &confirm).await;

        assert_eq!(confirm.asked.lock().unwrap().len(), 1);
        assert_eq!(recorder.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_tier3_asks_every_time() {
        let recorder = Arc::new(Recorder::default());
        let d = dispatcher(recorder);
        let confirm = CountingConfirm {
            approve: true,
            ..Default::default()
        };
        let mut ctx = ToolContext::new(None);
        let params = json!({"command": "sudo reboot"});
        d.dispatch("run_shell", &params, &mut ctx, &confirm).await;
        d.dispatch("run_shell", &params, &mut ctx, &confirm).await;
        assert_eq!(confirm.asked.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_blocked_never_asks() {
        let d = dispatcher(Arc::new(Recorder::default()));
        let confirm = CountingConfirm {
            approve: true,
            ..Default::default()
        };
        let mut ctx = ToolContext::new(None);
        let out = d.dispatch("run_shell", &json!({"command": "rm -rf /"}), &mut ctx, &confirm).await;
        assert!(out.result.text.starts_with("Blocked"));
        assert!(confirm.asked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_executor() {
        let d = dispatcher(Arc::new(Recorder::default()));
        let mut ctx = ToolContext::new(None);
        let out = d
            .dispatch("open_application", &json!({"name": "Calculator"}), &mut ctx, &FixedAnswer::approve())
            .await;
        assert!(out.result.is_error);
        assert!(out.result.text.contains("launch executor"));
    }
}
