//! ID generation utilities for deskloop
//!
//! Provides functions for generating run identifiers and observation file names.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a unique run ID
///
/// Format: `{timestamp_ms}-{random_hex}`
/// Example: `1738300800123-a1b2`
///
/// The timestamp prefix keeps run directories sorted by creation time.
pub fn generate_run_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("{}-{:04x}", timestamp, random)
}

/// Check that a run ID is safe to use as a directory name.
pub fn is_valid_run_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// File name for an observation captured on the given iteration
///
/// Format: `obs-{iteration:04}.{ext}`
pub fn observation_file_name(iteration: u32, extension: &str) -> String {
    format!("obs-{:04}.{}", iteration, extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        assert!(ts > 1577836800000); // 2020-01-01
        assert!(ts < 4102444800000); // 2100-01-01
    }

    #[test]
    fn test_generate_run_id_format() {
        let id = generate_run_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[1].len(), 4);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generated_run_id_is_valid() {
        assert!(is_valid_run_id(&generate_run_id()));
    }

    #[test]
    fn test_is_valid_run_id_rejects_paths() {
        assert!(!is_valid_run_id(""));
        assert!(!is_valid_run_id("../etc"));
        assert!(!is_valid_run_id("a/b"));
        assert!(is_valid_run_id("run_01-abc"));
    }

    #[test]
    fn test_observation_file_name_padding() {
        assert_eq!(observation_file_name(3, "jpg"), "obs-0003.jpg");
        assert_eq!(observation_file_name(1234, "png"), "obs-1234.png");
    }
}
