//! Action fingerprints for repetition detection.
//!
//! A fingerprint is a short digest of the tool name plus canonicalized
//! non-coordinate parameters, together with the raw coordinates. Two
//! fingerprints match when their digests agree and every coordinate is
//! within `tolerance_px`, so clicks a few pixels apart collide on purpose.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

const COORDINATE_KEYS: &[&str] = &["x", "y", "dx", "dy", "left", "top", "width", "height"];
const POINT_KEYS: &[&str] = &["point", "position", "coordinates", "coordinate", "from", "to", "start", "end"];

/// Normalized signature of one dispatched action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionFingerprint {
    digest: String,
    coords: Vec<f64>,
    tolerance: f64,
}

impl ActionFingerprint {
    /// Fingerprint `tool` with `params`, ignoring coordinate jitter up to `tolerance_px`.
    pub fn of(tool: &str, params: &Value, tolerance_px: u32) -> Self {
        let mut canonical = String::new();
        let mut coords = Vec::new();
        canonical.push_str(tool.trim());
        canonical.push('|');
        write_canonical(params, None, &mut canonical, &mut coords);

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        Self {
            digest: hex::encode(&result[..8]),
            coords,
            tolerance: f64::from(tolerance_px.max(1)),
        }
    }

    /// Same action, with every coordinate within tolerance of `other`'s.
    pub fn matches(&self, other: &ActionFingerprint) -> bool {
        let tolerance = self.tolerance.max(other.tolerance);
        self.digest == other.digest
            && self.coords.len() == other.coords.len()
            && self
                .coords
                .iter()
                .zip(&other.coords)
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    pub fn as_str(&self) -> &str {
        &self.digest
    }

    pub fn coords(&self) -> &[f64] {
        &self.coords
    }
}

impl fmt::Display for ActionFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digest)
    }
}

fn is_coordinate_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    if COORDINATE_KEYS.contains(&lower.as_str()) {
        return true;
    }
    // x1, y2, start_x, end_y
    let trimmed = lower.trim_end_matches(|c: char| c.is_ascii_digit());
    trimmed == "x" || trimmed == "y" || lower.ends_with("_x") || lower.ends_with("_y")
}

fn is_point_key(key: &str) -> bool {
    POINT_KEYS.contains(&key.to_ascii_lowercase().as_str())
}

/// Serialize `value` with sorted keys; coordinates become `~` placeholders
/// and their values are collected in traversal order.
fn write_canonical(value: &Value, key: Option<&str>, out: &mut String, coords: &mut Vec<f64>) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(k);
                out.push(':');
                write_canonical(&map[k.as_str()], Some(k.as_str()), out, coords);
            }
            out.push('}');
        }
        Value::Array(items) => {
            // Arrays under point keys are [x, y] pairs
            let child_key = match key {
                Some(k) if is_point_key(k) => Some("x"),
                _ => None,
            };
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, child_key, out, coords);
            }
            out.push(']');
        }
        Value::Number(n) => match (key, n.as_f64()) {
            (Some(k), Some(v)) if is_coordinate_key(k) => {
                out.push('~');
                coords.push(v);
            }
            _ => out.push_str(&n.to_string()),
        },
        Value::String(s) => {
            out.push('"');
            out.push_str(s.trim());
            out.push('"');
        }
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => out.push_str("null"),
    }
}

/// Fixed-capacity window of recent fingerprints; oldest entries are evicted.
#[derive(Debug, Clone)]
pub struct FingerprintRing {
    capacity: usize,
    entries: VecDeque<ActionFingerprint>,
}

impl FingerprintRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, fingerprint: ActionFingerprint) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(fingerprint);
    }

    /// Entries in the window matching `fingerprint`.
    pub fn count(&self, fingerprint: &ActionFingerprint) -> usize {
        self.entries.iter().filter(|f| f.matches(fingerprint)).count()
    }

    pub fn last(&self) -> Option<&ActionFingerprint> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionFingerprint> {
        self.entries.iter()
    }
}
