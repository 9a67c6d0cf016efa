//! The single next action proposed by the model, and its parser.
//!
//! The model is asked for a small JSON object in plain text rather than a
//! tool-calling schema. Replies are often wrapped in prose or code fences, so
//! the parser extracts the first balanced JSON object before deserializing.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// One parsed model decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// Tool to dispatch; empty when `done` is set without an action
    pub tool: String,
    /// Tool parameters, always a JSON object
    pub params: Value,
    /// The model considers the goal achieved
    pub done: bool,
    /// Short note appended to the progress log
    pub progress_note: Option<String>,
    /// Self-reported progress score, 0-10
    pub score: Option<f64>,
}

impl Action {
    /// One-line description used in progress lines and prompts.
    pub fn summary(&self) -> String {
        if self.tool.is_empty() {
            return "(no action)".to_string();
        }
        match self.params.as_object() {
            Some(map) if !map.is_empty() => format!("{} {}", self.tool, self.params),
            _ => self.tool.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionParseError {
    #[error("reply was empty")]
    Empty,

    #[error("reply contained no JSON object")]
    NoJson,

    #[error("reply JSON was invalid: {0}")]
    InvalidJson(String),

    #[error("reply named no action and was not done")]
    MissingAction,

    #[error("action params must be an object")]
    ParamsNotObject,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    #[serde(default, alias = "tool", alias = "tool_name")]
    action: Option<String>,
    #[serde(default, alias = "parameters", alias = "input", alias = "args")]
    params: Option<Value>,
    #[serde(default)]
    done: bool,
    #[serde(default, alias = "note", alias = "progress")]
    progress_note: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

/// Parse one model reply into an [`Action`].
pub fn parse_action(text: &str) -> Result<Action, ActionParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ActionParseError::Empty);
    }

    let json = extract_json_object(trimmed).ok_or(ActionParseError::NoJson)?;
    let raw: RawAction =
        serde_json::from_str(json).map_err(|e| ActionParseError::InvalidJson(e.to_string()))?;

    let params = match raw.params {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(Value::Object(map)) => Value::Object(map),
        Some(_) => return Err(ActionParseError::ParamsNotObject),
    };

    let tool = raw.action.map(|a| a.trim().to_string()).unwrap_or_default();
    if tool.is_empty() && !raw.done {
        return Err(ActionParseError::MissingAction);
    }

    let progress_note = raw
        .progress_note
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    Ok(Action {
        tool,
        params,
        done: raw.done,
        progress_note,
        score: raw.score.filter(|s| s.is_finite()).map(|s| s.clamp(0.0, 10.0)),
    })
}

/// Return the first balanced `{...}` span, honouring JSON string escapes.
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain_object() {
        let action =
            parse_action(r#"{"action":"open_application","params":{"name":"Calculator"},"done":false}"#).unwrap();
        assert_eq!(action.tool, "open_application");
        assert_eq!(action.params, json!({"name": "Calculator"}));
        assert!(!action.done);
        assert!(action.progress_note.is_none());
    }

    #[test]
    fn test_parse_done_without_action() {
        let action = parse_action(r#"{"done":true,"progress_note":"Calculator opened"}"#).unwrap();
        assert!(action.done);
        assert!(action.tool.is_empty());
        assert_eq!(action.progress_note.as_deref(), Some("Calculator opened"));
    }

    #[test]
    fn test_parse_code_fenced_with_prose() {
        let reply = "Sure, here is the next step:\n```json\n{\"tool\": \"click\", \"parameters\": {\"x\": 10, \"y\": 20}, \"note\": \"clicking\"}\n```";
        let action = parse_action(reply).unwrap();
        assert_eq!(action.tool, "click");
        assert_eq!(action.params["x"], 10);
        assert_eq!(action.progress_note.as_deref(), Some("clicking"));
    }

    #[test]
    fn test_parse_braces_inside_strings() {
        let reply = r#"{"action":"type_text","params":{"text":"a } b { c"}}"#;
        let action = parse_action(reply).unwrap();
        assert_eq!(action.params["text"], "a } b { c");
    }

    #[test]
    fn test_parse_escaped_quote_in_string() {
        let reply = r#"{"action":"type_text","params":{"text":"say \"hi\" }"}}"#;
        let action = parse_action(reply).unwrap();
        assert_eq!(action.params["text"], "say \"hi\" }");
    }

    #[test]
    fn test_parse_missing_params_defaults_to_object() {
        let action = parse_action(r#"{"action":"screenshot"}"#).unwrap();
        assert_eq!(action.params, json!({}));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_action("   "), Err(ActionParseError::Empty));
        assert_eq!(parse_action("I am not sure what to do"), Err(ActionParseError::NoJson));
        assert_eq!(parse_action(r#"{"done": false}"#), Err(ActionParseError::MissingAction));
        assert_eq!(
            parse_action(r#"{"action":"click","params":[1,2]}"#),
            Err(ActionParseError::ParamsNotObject)
        );
        assert!(matches!(parse_action("{ broken"), Err(ActionParseError::NoJson)));
        assert!(matches!(
            parse_action(r#"{"action": 5}"#),
            Err(ActionParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_score_is_clamped() {
        let action = parse_action(r#"{"action":"wait","score":14}"#).unwrap();
        assert_eq!(action.score, Some(10.0));
    }

    #[test]
    fn test_summary() {
        let action = parse_action(r#"{"action":"key","params":{"combo":"cmd+space"}}"#).unwrap();
        assert_eq!(action.summary(), r#"key {"combo":"cmd+space"}"#);
        let bare = parse_action(r#"{"action":"wait"}"#).unwrap();
        assert_eq!(bare.summary(), "wait");
    }
}
