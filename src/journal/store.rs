//! Per-run append-only JSONL journal.
//!
//! Layout: `<base_dir>/<run_id>/events.jsonl`, with saved observations as
//! sibling files (`obs-0001.jpg`). Every append is a single write of one
//! line followed by an fsync, so a crash loses at most the in-flight event.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::replay::{RunSnapshot, TerminalState};
use crate::domain::JournalEvent;
use crate::error::{DeskloopError, Result};
use crate::id::{is_valid_run_id, observation_file_name};
use crate::observe::Observation;

pub const EVENTS_FILE: &str = "events.jsonl";

/// Root of all run journals.
#[derive(Debug, Clone)]
pub struct RunJournal {
    base_dir: PathBuf,
}

impl RunJournal {
    /// Create a journal rooted at `base_dir`, creating it if needed.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.base_dir.join(run_id)
    }

    fn events_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(EVENTS_FILE)
    }

    /// Open (or create) the journal for `run_id` for appending.
    pub fn open(&self, run_id: &str) -> Result<JournalWriter> {
        if !is_valid_run_id(run_id) {
            return Err(DeskloopError::Journal(format!("Invalid run id: {:?}", run_id)));
        }
        let dir = self.run_dir(run_id);
        fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(EVENTS_FILE))?;
        log::debug!("Opened journal for run {}", run_id);
        Ok(JournalWriter {
            run_id: run_id.to_string(),
            dir,
            file,
        })
    }

    /// Whether a journal exists for `run_id`.
    pub fn exists(&self, run_id: &str) -> bool {
        is_valid_run_id(run_id) && self.events_path(run_id).is_file()
    }

    /// Read every event for `run_id` in append order.
    ///
    /// An unparsable final line is a torn write from a crash and is skipped;
    /// an unparsable earlier line is corruption and is an error.
    pub fn replay(&self, run_id: &str) -> Result<Vec<JournalEvent>> {
        if !self.exists(run_id) {
            return Err(DeskloopError::RunNotFound(run_id.to_string()));
        }
        let content = fs::read_to_string(self.events_path(run_id))?;
        let lines: Vec<(usize, &str)> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .collect();

        let mut events = Vec::with_capacity(lines.len());
        for (pos, (line_no, line)) in lines.iter().enumerate() {
            match serde_json::from_str::<JournalEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) if pos + 1 == lines.len() => {
                    log::warn!("Skipping torn final line {} in journal {}: {}", line_no + 1, run_id, e);
                }
                Err(e) => {
                    return Err(DeskloopError::Journal(format!(
                        "Corrupt line {} in journal {}: {}",
                        line_no + 1,
                        run_id,
                        e
                    )));
                }
            }
        }
        Ok(events)
    }

    /// All run ids with a journal, oldest first.
    pub fn list_runs(&self) -> Result<Vec<String>> {
        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if self.exists(&name) {
                runs.push(name);
            }
        }
        runs.sort();
        Ok(runs)
    }

    /// Runs whose journal has no terminal event.
    pub fn find_incomplete(&self) -> Result<Vec<String>> {
        let mut incomplete = Vec::new();
        for run_id in self.list_runs()? {
            match self.replay(&run_id) {
                Ok(events) => {
                    if !events.iter().any(JournalEvent::is_terminal) {
                        incomplete.push(run_id);
                    }
                }
                Err(e) => log::warn!("Skipping unreadable journal {}: {}", run_id, e),
            }
        }
        Ok(incomplete)
    }

    /// How a run ended, or `None` while it is incomplete.
    pub fn terminal_state(&self, run_id: &str) -> Result<Option<TerminalState>> {
        let events = self.replay(run_id)?;
        Ok(events.iter().find_map(TerminalState::from_event))
    }

    /// Reconstruct a run's snapshot purely from its journal.
    pub fn replay_run_state(&self, run_id: &str) -> Result<RunSnapshot> {
        let events = self.replay(run_id)?;
        Ok(RunSnapshot::from_events(run_id, &events))
    }
}

/// Append handle for one run's journal.
#[derive(Debug)]
pub struct JournalWriter {
    run_id: String,
    dir: PathBuf,
    file: File,
}

impl JournalWriter {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one event as a single flushed and synced line.
    pub fn append(&mut self, event: &JournalEvent) -> Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        self.file.sync_data()?;
        log::debug!("Journal {}: {}", self.run_id, event.kind());
        Ok(())
    }

    /// Write an observation next to the journal and return its file name.
    pub fn save_observation(&self, iteration: u32, observation: &Observation) -> Result<String> {
        let name = observation_file_name(iteration, observation.extension());
        fs::write(self.dir.join(&name), &observation.image)?;
        Ok(name)
    }

    /// Sync and release the journal.
    pub fn close(self) -> Result<()> {
        self.file.sync_all()?;
        log::debug!("Closed journal for run {}", self.run_id);
        Ok(())
    }
}
