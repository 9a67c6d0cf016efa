use async_trait::async_trait;
use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use serde_json::Value;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use deskloop::callbacks::RunCallbacks;
use deskloop::config::Config;
use deskloop::domain::{RiskTier, RunPhase};
use deskloop::journal::{RunJournal, TerminalState};
use deskloop::llm::{AnthropicClient, LlmClient};
use deskloop::orchestrator::{RecoveryManager, RecoveryResult};
use deskloop::plugin::discover_plugins;
use deskloop::safety::{Classification, ConfirmationRequest, LlmRiskScorer, SafetyGate, classify};
use deskloop::tools::{
    ExecutorKind, LaunchExecutor, ShellExecutor, ToolCatalog, ToolContext, ToolDispatcher, ToolRegistry,
};

fn setup_logging(verbose: bool, level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deskloop")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("deskloop.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let default_level = if verbose { "debug" } else { level.unwrap_or("info") };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Prompts on the terminal for gated actions.
struct ConsoleCallbacks {
    assume_yes: bool,
}

#[async_trait]
impl RunCallbacks for ConsoleCallbacks {
    fn on_state_change(&self, phase: RunPhase) {
        info!("Phase: {}", phase);
    }

    fn on_message(&self, message: &str) {
        println!("{} {}", "•".cyan(), message);
    }

    async fn confirm(&self, request: &ConfirmationRequest) -> bool {
        let tier = tier_label(request.tier);
        if self.assume_yes {
            println!("{} {} {}", tier, request.prompt(), "(auto-approved)".dimmed());
            return true;
        }
        let prompt = format!("{} {} [y/N] ", tier, request.prompt());
        let answer = tokio::task::spawn_blocking(move || {
            print!("{}", prompt);
            let _ = io::stdout().flush();
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;
        matches!(answer, Ok(Ok(line)) if matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}

fn tier_label(tier: RiskTier) -> ColoredString {
    match tier {
        RiskTier::Tier1 => tier.to_string().green(),
        RiskTier::Tier2 => tier.to_string().yellow(),
        RiskTier::Tier3 => tier.to_string().red().bold(),
    }
}

fn terminal_label(terminal: Option<&TerminalState>) -> ColoredString {
    match terminal {
        Some(TerminalState::Completed { .. }) => "completed".green(),
        Some(TerminalState::Failed { .. }) => "failed".red(),
        Some(TerminalState::Abandoned { .. }) => "abandoned".dimmed(),
        None => "incomplete".yellow(),
    }
}

fn parse_params(params: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(params).context("Failed to parse --params as JSON")?;
    if !value.is_object() {
        eyre::bail!("--params must be a JSON object");
    }
    Ok(value)
}

fn open_journal(config: &Config) -> Result<RunJournal> {
    RunJournal::new(&config.journal.journal_dir).context("Failed to open run journal")
}

fn handle_runs_command(config: &Config) -> Result<()> {
    let journal = open_journal(config)?;
    let runs = journal.list_runs()?;
    if runs.is_empty() {
        println!("{}", "No runs recorded".dimmed());
        return Ok(());
    }
    for run_id in runs {
        match journal.replay_run_state(&run_id) {
            Ok(snapshot) => println!(
                "{}  {:<10}  {:>3} iterations  {}",
                run_id.bold(),
                terminal_label(snapshot.terminal.as_ref()),
                snapshot.iterations,
                snapshot.command
            ),
            Err(e) => println!("{}  {}  {}", run_id.bold(), "unreadable".red(), e),
        }
    }
    Ok(())
}

fn handle_status_command(run_id: &str, config: &Config) -> Result<()> {
    let journal = open_journal(config)?;
    let snapshot = journal
        .replay_run_state(run_id)
        .context(format!("Failed to replay run {}", run_id))?;
    println!("{}", snapshot.status_message());
    for call in &snapshot.tool_calls {
        let status = if call.is_error { "error".red() } else { "ok".green() };
        println!("  #{:<3} {:<20} {}", call.iteration, call.tool, status);
    }
    Ok(())
}

fn handle_incomplete_command(config: &Config) -> Result<()> {
    let journal = Arc::new(open_journal(config)?);
    let snapshots = RecoveryManager::new(journal).find_incomplete()?;
    if snapshots.is_empty() {
        println!("{}", "No incomplete runs".green());
    }
    for snapshot in snapshots {
        println!(
            "{}  {:>3} iterations  {}",
            snapshot.run_id.yellow(),
            snapshot.iterations,
            snapshot.command
        );
    }
    Ok(())
}

fn handle_recover_command(reason: &str, config: &Config) -> Result<()> {
    let journal = Arc::new(open_journal(config)?);
    let (results, stats) = RecoveryManager::new(journal).abandon_all(reason)?;
    for result in &results {
        match result {
            RecoveryResult::Abandoned { run_id } => println!("{} {}", "Abandoned:".yellow(), run_id),
            RecoveryResult::Failed { run_id, error } => println!("{} {} ({})", "Failed:".red(), run_id, error),
            RecoveryResult::Resumed { run_id, .. } => println!("{} {}", "Resumed:".green(), run_id),
        }
    }
    println!("{} run(s) abandoned, {} failed", stats.abandoned, stats.failed);
    Ok(())
}

fn handle_classify_command(tool: &str, params: &str) -> Result<()> {
    let params = parse_params(params)?;
    match classify(tool, &params) {
        Classification::Tier(tier, category) => println!("{} {}", tier_label(tier), category),
        Classification::Blocked(category) => println!("{} {}", "blocked".red().bold(), category),
        Classification::Inconclusive => println!(
            "{} (the gate falls back to a model score, else {})",
            "inconclusive".yellow(),
            RiskTier::Tier2
        ),
    }
    Ok(())
}

fn handle_plugins_command(config: &Config) -> Result<()> {
    let plugins = discover_plugins(&config.plugins.plugin_dir)?;
    if plugins.is_empty() {
        println!(
            "{} {}",
            "No plugins found in".dimmed(),
            config.plugins.plugin_dir.display()
        );
        return Ok(());
    }
    for plugin in plugins {
        let manifest = &plugin.manifest;
        println!(
            "{} {} [{}]",
            manifest.name.bold(),
            manifest.version,
            tier_label(manifest.risk_tier())
        );
        for tool in &manifest.tools {
            println!("  {}", tool.prompt_line());
        }
    }
    Ok(())
}

fn build_dispatcher(config: &Config) -> Result<ToolDispatcher> {
    let registry = Arc::new(ToolRegistry::from_catalog(&ToolCatalog::builtin()?));

    let mut gate = SafetyGate::new().with_audit(config.safety.audit_log);
    if config.safety.llm_fallback {
        let transport = config.anthropic(config.llm.risk_model.as_deref());
        let model = transport.model.clone();
        match AnthropicClient::new(transport) {
            Ok(client) => {
                let client: Arc<dyn LlmClient> = Arc::new(client);
                gate = gate.with_scorer(Arc::new(LlmRiskScorer::new(client).with_model(model)));
            }
            Err(e) => log::warn!("Risk scorer disabled: {}", e),
        }
    }

    let dispatcher = ToolDispatcher::new(registry, Arc::new(gate), &config.plugins.data_dir)
        .with_plugin_limits(config.plugin_limits())
        .with_executor(ExecutorKind::Shell, Arc::new(ShellExecutor::new()))
        .with_executor(ExecutorKind::Launch, Arc::new(LaunchExecutor));
    dispatcher.reload_plugins(&config.plugins.plugin_dir)?;
    Ok(dispatcher)
}

async fn handle_invoke_command(tool: &str, params: &str, yes: bool, config: &Config) -> Result<()> {
    let params = parse_params(params)?;
    let dispatcher = build_dispatcher(config)?;
    let callbacks = ConsoleCallbacks { assume_yes: yes };
    let mut ctx = ToolContext::new(None);

    let outcome = dispatcher.dispatch(tool, &params, &mut ctx, &callbacks).await;
    let tier = outcome.tier.map(tier_label).unwrap_or_else(|| "ungated".dimmed());
    if outcome.result.is_error {
        println!("{} [{}]", "Error".red().bold(), tier);
    } else {
        println!("{} [{}]", "OK".green().bold(), tier);
    }
    println!("{}", outcome.result.text);
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Runs => handle_runs_command(config),
        Commands::Status { run_id } => handle_status_command(run_id, config),
        Commands::Incomplete => handle_incomplete_command(config),
        Commands::Recover { reason } => handle_recover_command(reason, config),
        Commands::Classify { tool, params } => handle_classify_command(tool, params),
        Commands::Plugins => handle_plugins_command(config),
        Commands::Invoke { tool, params, yes } => handle_invoke_command(tool, params, *yes, config).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.is_verbose(), config.log_level.as_deref()).context("Failed to setup logging")?;
    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
