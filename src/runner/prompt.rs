//! Prompt assembly
//!
//! Every iteration gets a fresh, self-contained prompt. There is no
//! conversation history; what the model needs to know about earlier
//! iterations is carried by the progress log and the last-action summary.

use crate::domain::{LastAction, ProgressLog};
use crate::observe::Observation;
use crate::tools::ToolSpec;

/// Everything the system prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub goal: &'a str,
    pub tools: &'a [ToolSpec],
    pub progress: &'a ProgressLog,
    pub last_action: Option<&'a LastAction>,
    /// Repetition detected; add the escape hatch
    pub stuck: bool,
    /// Skill or memory text from a context provider
    pub external_context: Option<&'a str>,
    pub iteration: u32,
    pub max_iterations: u32,
}

const REPLY_FORMAT: &str = r#"Reply with exactly one JSON object and nothing else:
{"action": "<tool name>", "params": {...}, "note": "<what you did and why>", "score": <0-10 progress toward the goal>, "done": false}
When the goal is achieved reply with {"done": true, "note": "<summary of the result>", "score": 10}."#;

const ESCAPE_HATCH: &str = "You are repeating the same action and it is not working. Do NOT repeat it. \
Pick a different approach: use a keyboard shortcut instead of clicking, open the application or URL directly, \
scroll to reveal hidden controls, use run_shell or applescript if the task allows it, \
or declare done with a note explaining what is blocking you.";

/// System text for one iteration.
pub fn build_system_prompt(input: &PromptInput<'_>) -> String {
    let mut out = String::new();
    out.push_str("You control a desktop computer to accomplish the user's goal. ");
    out.push_str("Each turn you see a fresh screenshot and choose ONE next action.\n\n");

    out.push_str(&format!("## Goal\n{}\n\n", input.goal.trim()));
    out.push_str(&format!(
        "## Iteration\n{} of {}\n\n",
        input.iteration, input.max_iterations
    ));

    out.push_str("## Tools\n");
    for tool in input.tools {
        out.push_str(&tool.prompt_line());
        out.push('\n');
    }
    out.push('\n');

    if let Some(context) = input.external_context.map(str::trim).filter(|c| !c.is_empty()) {
        out.push_str(&format!("## Relevant knowledge\n{}\n\n", context));
    }

    if !input.progress.is_empty() {
        out.push_str(&format!("## Progress so far\n{}\n\n", input.progress.render()));
    }

    if let Some(last) = input.last_action {
        let status = if last.is_error { "FAILED" } else { "succeeded" };
        out.push_str(&format!(
            "## Last action\n#{} {} {}: {}\n\n",
            last.iteration, last.summary, status, last.result
        ));
    }

    if input.stuck {
        out.push_str(&format!("## Warning\n{}\n\n", ESCAPE_HATCH));
    }

    out.push_str(REPLY_FORMAT);
    out
}

/// Text of the single user turn that accompanies the observation image.
pub fn build_user_text(goal: &str, observation: Option<&Observation>) -> String {
    match observation {
        Some(obs) => {
            let mut text = format!("Goal: {}\nCurrent screen: {}", goal.trim(), obs.summary());
            if let Some(description) = &obs.description {
                text.push_str(&format!("\n{}", description));
            }
            text
        }
        None => format!("Goal: {}\nNo screenshot is available this turn.", goal.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(progress: &'a ProgressLog, tools: &'a [ToolSpec]) -> PromptInput<'a> {
        PromptInput {
            goal: "Open Calculator",
            tools,
            progress,
            last_action: None,
            stuck: false,
            external_context: None,
            iteration: 1,
            max_iterations: 35,
        }
    }

    #[test]
    fn test_prompt_has_goal_tools_and_format() {
        let progress = ProgressLog::new(12);
        let tools = vec![ToolSpec::new("wait", "Pause briefly")];
        let prompt = build_system_prompt(&input(&progress, &tools));
        assert!(prompt.contains("Open Calculator"));
        assert!(prompt.contains("- wait: Pause briefly"));
        assert!(prompt.contains("\"done\": true"));
        assert!(prompt.contains("1 of 35"));
        assert!(!prompt.contains("Do NOT repeat"));
        assert!(!prompt.contains("Progress so far"));
    }

    #[test]
    fn test_escape_hatch_only_when_stuck() {
        let progress = ProgressLog::new(12);
        let tools = Vec::new();
        let mut stuck = input(&progress, &tools);
        stuck.stuck = true;
        assert!(build_system_prompt(&stuck).contains("Do NOT repeat"));
    }

    #[test]
    fn test_progress_last_action_and_context() {
        let mut progress = ProgressLog::new(12);
        progress.push("#1 click -> ok: clicked");
        let last = LastAction {
            iteration: 1,
            summary: "click".to_string(),
            result: "clicked".to_string(),
            is_error: true,
        };
        let tools = Vec::new();
        let mut with_all = input(&progress, &tools);
        with_all.last_action = Some(&last);
        with_all.external_context = Some("Calculator lives in /Applications");

        let prompt = build_system_prompt(&with_all);
        assert!(prompt.contains("#1 click -> ok: clicked"));
        assert!(prompt.contains("#1 click FAILED: clicked"));
        assert!(prompt.contains("Calculator lives in /Applications"));
    }

    #[test]
    fn test_user_text() {
        let obs = Observation::jpeg(vec![0], 800, 600).with_description("Finder is frontmost");
        let text = build_user_text("Open Calculator", Some(&obs));
        assert!(text.contains("800x600"));
        assert!(text.contains("Finder is frontmost"));
        assert!(build_user_text("x", None).contains("No screenshot"));
    }
}
