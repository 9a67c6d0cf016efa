//! Heuristic risk classification.
//!
//! Pattern-matches tool names and command text against known categories.
//! Anything the patterns cannot place is reported as inconclusive so the
//! gate can fall back to a model-based score.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::domain::RiskTier;

/// Heuristic verdict for one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Placed in a tier, with the matching category
    Tier(RiskTier, &'static str),
    /// Never runs, even with confirmation
    Blocked(&'static str),
    /// No pattern matched
    Inconclusive,
}

impl Classification {
    pub fn tier(&self) -> Option<RiskTier> {
        match self {
            Classification::Tier(tier, _) => Some(*tier),
            Classification::Blocked(_) => Some(RiskTier::Tier3),
            Classification::Inconclusive => None,
        }
    }
}

struct Rule {
    pattern: Regex,
    category: &'static str,
}

fn rules(specs: &[(&str, &'static str)]) -> Vec<Rule> {
    specs
        .iter()
        .map(|(pattern, category)| Rule {
            pattern: Regex::new(pattern).expect("valid regex"),
            category,
        })
        .collect()
}

static BLOCKED: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    rules(&[
        (r"\brm\s+(-[a-zA-Z]*[rR][a-zA-Z]*\s+)+(/|~|\$HOME)/?(\s|$)", "recursive delete of root or home"),
        (r":\(\)\s*\{\s*:\|:&\s*\};:", "fork bomb"),
        (r"\bmkfs(\.\w+)?\b", "filesystem format"),
        (r"\bdd\s+.*\bof=/dev/(disk|sd|nvme|rdisk)", "raw disk write"),
        (r"\bdiskutil\s+(erase|zero|secureErase)", "disk erase"),
    ])
});

static DESTRUCTIVE: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    rules(&[
        (r"\brm\s+-[a-zA-Z]*[rRf]", "recursive or forced delete"),
        (r"\bsudo\b", "privilege escalation"),
        (r"\b(shutdown|reboot|halt)\b", "power state change"),
        (r"\bchmod\s+(-R\s+)?[0-7]*777\b", "permission widening"),
        (r"\bchown\s+-R\b", "recursive ownership change"),
        (r"\bgit\s+(push\s+.*--force|push\s+-f|reset\s+--hard|clean\s+-[a-z]*f)", "destructive git operation"),
        (r"\b(killall|pkill)\b", "mass process kill"),
        (r"\blaunchctl\s+(unload|remove|bootout)", "service removal"),
        (
            r"\b(curl|wget)\b[^|]*\|\s*(sudo\s+)?(ba|z|da|fi)?sh\b",
            "remote script piped to shell",
        ),
        (
            r"\bbase64\s+(-d|--decode|-D)\b[^|]*\|\s*(ba|z)?sh\b",
            "encoded payload piped to shell",
        ),
        (r"\|\s*(python3?|perl|ruby|node)\s+-?\s*$", "payload piped to interpreter"),
        (r"\beval\s+\$\(", "dynamic evaluation"),
        (r"\bsecurity\s+(dump-keychain|find-generic-password|find-internet-password)", "keychain read"),
        (r"\bcrontab\s+-r\b", "crontab removal"),
        (r"\bfind\b[^|;&]*\s-delete\b", "find with delete"),
        (r"\bfind\b[^|;&]*\s-(exec|execdir|ok|okdir)\s+(sudo\s+)?(rm|rmdir|unlink|shred)\b", "find with delete"),
        (r"\bgit\s+branch\b[^|;&]*\s(-[a-zA-Z]*[dD][a-zA-Z]*|--delete)\b", "branch deletion"),
    ])
});

static SENSITIVE_PATHS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(~|\$HOME|/Users/[^/\s]+|/home/[^/\s]+)?/?\.(ssh|aws|gnupg|netrc|env)\b|id_(rsa|ed25519|ecdsa)\b|/etc/(shadow|sudoers)|Keychains?/")
        .expect("valid regex")
});

static STATE_CHANGING: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    rules(&[
        (
            r"\b(brew|pip3?|npm|pnpm|yarn|cargo|gem|apt(-get)?|port)\s+(install|add|upgrade|uninstall|remove)\b",
            "package install",
        ),
        (r"\b(curl|wget|ssh|scp|rsync|nc|ftp|sftp|telnet)\b", "network call"),
        (r"(^|[^<>])>>?\s*[^\s&|>]", "file write by redirection"),
        (r"\b(mv|cp|mkdir|touch|tee|ln|rm|rmdir|truncate|unzip|tar\s+-?x)\b", "filesystem write"),
        (r"\bsed\s+-i\b", "in-place edit"),
        (r"\bgit\s+(commit|push|merge|rebase|checkout|pull|stash)\b", "repository change"),
        (r"\b(kill|open|osascript|defaults\s+write)\b", "system state change"),
        (r"\bfind\b[^|]*\s-(exec|execdir|ok|okdir|fprint0?|fprintf|fls)\b", "read-only verb with write flag"),
        (r"\bsort\b[^|]*\s(-[a-zA-Z]*o|--output)", "read-only verb with write flag"),
        (r"\buniq\b(\s+-\S+)*\s+[^-\s|>]\S*\s+[^-\s|>]", "read-only verb with write flag"),
        (r"\bdate\b[^|]*\s(-[a-zA-Z]*s|--set)\b", "read-only verb with write flag"),
        (r"\bhostname\s+[^-\s|>]", "read-only verb with write flag"),
        (r"\bgit\s+branch\s+(-[mMcCfu]\b|--(move|copy|force|set-upstream-to|unset-upstream)\b|[^-\s|>])", "repository change"),
    ])
});

static READ_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(ls|cat|pwd|echo|printf|grep|rg|find|head|tail|wc|date|whoami|which|ps|df|du|uname|file|stat|sort|uniq|cut|tr|hostname|uptime|git\s+(status|log|diff|show|branch))\b",
    )
    .expect("valid regex")
});

static SCRIPT_STATE_CHANGING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(delete|quit|close|set|make|move|duplicate|empty\s+trash|restart|shut\s+down|log\s+out|do\s+shell\s+script|keystroke|click)\b")
        .expect("valid regex")
});

static SCRIPT_READ_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(tell\s+application\s+.+?\s+to\s+)?(get|count|exists|return)\b|(?i)\b(name|count|properties|exists)\s+of\b")
        .expect("valid regex")
});

static DISCARDED_OUTPUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d|&)?>>?\s*/dev/null\b").expect("valid regex"));

static SEGMENT_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&&|\|\||;|\n").expect("valid regex"));

const VISUAL_TOOLS: &[&str] = &[
    "screenshot",
    "wait",
    "click",
    "double_click",
    "right_click",
    "move_mouse",
    "scroll",
    "drag",
    "type_text",
    "key",
    "hotkey",
    "focus_window",
    "open_application",
    "read_screen",
];

const SHELL_TOOLS: &[&str] = &["shell", "run_shell", "bash", "run_command"];
const SCRIPT_TOOLS: &[&str] = &["applescript", "run_applescript", "run_script"];
const READ_TOOLS: &[&str] = &["read_file", "vault_read", "list_files"];
const WRITE_TOOLS: &[&str] = &["write_file", "vault_write", "append_file"];
const DELETE_TOOLS: &[&str] = &["delete_file", "vault_delete"];

/// Classify one named action and its parameters.
pub fn classify(tool: &str, params: &Value) -> Classification {
    let name = tool.trim().to_ascii_lowercase();
    let name = name.as_str();

    if SHELL_TOOLS.contains(&name) {
        return match param_text(params, &["command", "cmd", "script"]) {
            Some(command) => classify_command(command),
            None => Classification::Inconclusive,
        };
    }
    if SCRIPT_TOOLS.contains(&name) {
        return match param_text(params, &["script", "source", "code"]) {
            Some(script) => classify_script(script),
            None => Classification::Inconclusive,
        };
    }
    if READ_TOOLS.contains(&name) {
        return match param_text(params, &["path", "file", "name"]) {
            Some(path) if SENSITIVE_PATHS.is_match(path) => Classification::Tier(RiskTier::Tier3, "sensitive path read"),
            _ => Classification::Tier(RiskTier::Tier1, "read"),
        };
    }
    if WRITE_TOOLS.contains(&name) {
        return match param_text(params, &["path", "file", "name"]) {
            Some(path) if SENSITIVE_PATHS.is_match(path) => {
                Classification::Tier(RiskTier::Tier3, "sensitive path write")
            }
            _ => Classification::Tier(RiskTier::Tier2, "filesystem write"),
        };
    }
    if DELETE_TOOLS.contains(&name) {
        return Classification::Tier(RiskTier::Tier3, "filesystem delete");
    }
    if name == "open_url" {
        return match param_text(params, &["url"]) {
            Some(url) if url.trim_start().starts_with("file:") => Classification::Tier(RiskTier::Tier2, "local file url"),
            _ => Classification::Tier(RiskTier::Tier1, "visual"),
        };
    }
    if VISUAL_TOOLS.contains(&name) {
        return Classification::Tier(RiskTier::Tier1, "visual");
    }
    Classification::Inconclusive
}

/// Classify shell command text.
///
/// Compound commands are split into segments; a tier3 segment decides the
/// whole command, otherwise any unplaced segment makes it inconclusive.
pub fn classify_command(command: &str) -> Classification {
    if let Some(rule) = BLOCKED.iter().find(|r| r.pattern.is_match(command)) {
        return Classification::Blocked(rule.category);
    }
    if let Some(rule) = DESTRUCTIVE.iter().find(|r| r.pattern.is_match(command)) {
        return Classification::Tier(RiskTier::Tier3, rule.category);
    }
    if SENSITIVE_PATHS.is_match(command) {
        return Classification::Tier(RiskTier::Tier3, "sensitive path access");
    }

    let mut worst: Option<(RiskTier, &'static str)> = None;
    for segment in SEGMENT_SPLIT.split(command) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let verdict = classify_segment(segment);
        match verdict {
            Some(found) if worst.is_none_or(|w| found.0 > w.0) => worst = Some(found),
            Some(_) => {}
            None => return Classification::Inconclusive,
        }
    }
    match worst {
        Some((tier, category)) => Classification::Tier(tier, category),
        None => Classification::Inconclusive,
    }
}

fn classify_segment(segment: &str) -> Option<(RiskTier, &'static str)> {
    let segment = DISCARDED_OUTPUT.replace_all(segment, "");
    let segment = segment.as_ref();
    if let Some(rule) = STATE_CHANGING.iter().find(|r| r.pattern.is_match(segment)) {
        return Some((RiskTier::Tier2, rule.category));
    }
    // Pipes between read-only commands stay read-only
    if segment.split('|').all(|part| READ_ONLY.is_match(part)) {
        return Some((RiskTier::Tier1, "read-only command"));
    }
    None
}

/// Classify AppleScript-style source by its verbs.
pub fn classify_script(script: &str) -> Classification {
    if script.contains("do shell script") {
        return match extract_shell_from_script(script) {
            Some(inner) => match classify_command(&inner) {
                Classification::Tier(tier, category) => Classification::Tier(tier.max(RiskTier::Tier2), category),
                other => other,
            },
            None => Classification::Tier(RiskTier::Tier3, "embedded shell script"),
        };
    }
    if SCRIPT_STATE_CHANGING.is_match(script) {
        return Classification::Tier(RiskTier::Tier2, "state-changing script");
    }
    if SCRIPT_READ_ONLY.is_match(script) {
        return Classification::Tier(RiskTier::Tier1, "read-only script");
    }
    Classification::Inconclusive
}

fn extract_shell_from_script(script: &str) -> Option<String> {
    let start = script.find("do shell script")? + "do shell script".len();
    let rest = script[start..].trim_start().strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

fn param_text<'a>(params: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| params.get(*k).and_then(Value::as_str))
}

/// Map a plugin manifest permission string onto a tier.
pub fn permission_tier(permission: &str) -> RiskTier {
    match permission.trim().to_ascii_lowercase().as_str() {
        "read" | "screen" | "filesystem:read" => RiskTier::Tier1,
        "network" | "filesystem:write" | "input" | "clipboard" => RiskTier::Tier2,
        "shell" | "filesystem:delete" | "system" => RiskTier::Tier3,
        other => {
            log::debug!("Unknown plugin permission {:?}, treating as tier2", other);
            RiskTier::Tier2
        }
    }
}

/// Tier for a set of declared permissions: the riskiest wins, none is tier1.
pub fn permissions_tier<S: AsRef<str>>(permissions: &[S]) -> RiskTier {
    permissions
        .iter()
        .map(|p| permission_tier(p.as_ref()))
        .max()
        .unwrap_or(RiskTier::Tier1)
}
