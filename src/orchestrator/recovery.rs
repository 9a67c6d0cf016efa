//! Start-up recovery of runs interrupted by a crash.
//!
//! An incomplete run is one whose journal has no terminal event. Each is
//! either resumed through the orchestrator (iterations continue from the
//! journal, so the global budget still holds) or marked abandoned.

use std::sync::Arc;

use crate::callbacks::RunCallbacks;
use crate::domain::{JournalEvent, RunResult};
use crate::error::Result;
use crate::journal::{RunJournal, RunSnapshot};

use super::service::Orchestrator;

/// What to do with one incomplete run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    Resume,
    Abandon,
}

/// Result of recovering a single run.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryResult {
    Resumed { run_id: String, result: RunResult },
    Abandoned { run_id: String },
    Failed { run_id: String, error: String },
}

impl RecoveryResult {
    pub fn run_id(&self) -> &str {
        match self {
            RecoveryResult::Resumed { run_id, .. }
            | RecoveryResult::Abandoned { run_id }
            | RecoveryResult::Failed { run_id, .. } => run_id,
        }
    }
}

/// Counts from one recovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    pub resumed: usize,
    pub abandoned: usize,
    pub failed: usize,
}

impl RecoveryStats {
    pub fn total(&self) -> usize {
        self.resumed + self.abandoned + self.failed
    }

    fn tally(results: &[RecoveryResult]) -> Self {
        let mut stats = Self::default();
        for result in results {
            match result {
                RecoveryResult::Resumed { .. } => stats.resumed += 1,
                RecoveryResult::Abandoned { .. } => stats.abandoned += 1,
                RecoveryResult::Failed { .. } => stats.failed += 1,
            }
        }
        stats
    }
}

pub struct RecoveryManager {
    journal: Arc<RunJournal>,
}

impl RecoveryManager {
    pub fn new(journal: Arc<RunJournal>) -> Self {
        Self { journal }
    }

    /// Snapshots of every run lacking a terminal event, oldest first.
    pub fn find_incomplete(&self) -> Result<Vec<RunSnapshot>> {
        let mut snapshots = Vec::new();
        for run_id in self.journal.find_incomplete()? {
            match self.journal.replay_run_state(&run_id) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => log::warn!("Skipping unreadable run {}: {}", run_id, e),
            }
        }
        Ok(snapshots)
    }

    /// Journal an `abandoned` event for `run_id`.
    pub fn abandon(&self, run_id: &str, reason: &str) -> Result<()> {
        let mut writer = self.journal.open(run_id)?;
        writer.append(&JournalEvent::abandoned(reason))?;
        writer.close()?;
        log::info!("Marked run {} abandoned: {}", run_id, reason);
        Ok(())
    }

    /// Mark every incomplete run abandoned.
    pub fn abandon_all(&self, reason: &str) -> Result<(Vec<RecoveryResult>, RecoveryStats)> {
        let results: Vec<RecoveryResult> = self
            .find_incomplete()?
            .into_iter()
            .map(|snapshot| self.abandon_one(&snapshot.run_id, reason))
            .collect();
        let stats = RecoveryStats::tally(&results);
        Ok((results, stats))
    }

    /// Resume or abandon each incomplete run as `decide` says.
    ///
    /// Runs are handled one at a time; the orchestrator runs only one at once.
    pub async fn recover<F>(
        &self,
        orchestrator: &Orchestrator,
        callbacks: &dyn RunCallbacks,
        decide: F,
    ) -> Result<(Vec<RecoveryResult>, RecoveryStats)>
    where
        F: Fn(&RunSnapshot) -> RecoveryAction,
    {
        let mut results = Vec::new();
        for snapshot in self.find_incomplete()? {
            let result = match decide(&snapshot) {
                RecoveryAction::Abandon => self.abandon_one(&snapshot.run_id, "abandoned after restart"),
                RecoveryAction::Resume => {
                    log::info!("Recovering run {}: {}", snapshot.run_id, snapshot.command);
                    let result = orchestrator.resume(&snapshot.run_id, callbacks).await;
                    RecoveryResult::Resumed {
                        run_id: snapshot.run_id.clone(),
                        result,
                    }
                }
            };
            results.push(result);
        }
        let stats = RecoveryStats::tally(&results);
        if stats.total() > 0 {
            log::info!(
                "Recovery finished: {} resumed, {} abandoned, {} failed",
                stats.resumed,
                stats.abandoned,
                stats.failed
            );
        }
        Ok((results, stats))
    }

    /// Start-up policy: abandon every incomplete run, or resume each in turn.
    pub async fn on_startup(
        &self,
        orchestrator: &Orchestrator,
        callbacks: &dyn RunCallbacks,
        auto_abandon: bool,
    ) -> Result<(Vec<RecoveryResult>, RecoveryStats)> {
        if auto_abandon {
            return self.abandon_all("abandoned at start-up");
        }
        self.recover(orchestrator, callbacks, |_| RecoveryAction::Resume).await
    }

    fn abandon_one(&self, run_id: &str, reason: &str) -> RecoveryResult {
        match self.abandon(run_id, reason) {
            Ok(()) => RecoveryResult::Abandoned {
                run_id: run_id.to_string(),
            },
            Err(e) => RecoveryResult::Failed {
                run_id: run_id.to_string(),
                error: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CommandSource;
    use crate::llm::Usage;
    use tempfile::TempDir;

    fn seed(journal: &RunJournal, run_id: &str, finished: bool) {
        let mut writer = journal.open(run_id).unwrap();
        writer
            .append(&JournalEvent::created(run_id, "Open Calculator", CommandSource::Cli, None))
            .unwrap();
        writer.append(&JournalEvent::iteration_start(1, None)).unwrap();
        if finished {
            writer
                .append(&JournalEvent::complete("done", 1, Usage::default()))
                .unwrap();
        }
    }

    #[test]
    fn test_find_incomplete_snapshots() {
        let temp = TempDir::new().unwrap();
        let journal = Arc::new(RunJournal::new(temp.path()).unwrap());
        seed(&journal, "run-a", true);
        seed(&journal, "run-b", false);

        let manager = RecoveryManager::new(journal);
        let incomplete = manager.find_incomplete().unwrap();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].run_id, "run-b");
        assert_eq!(incomplete[0].command, "Open Calculator");
    }

    #[test]
    fn test_abandon_all() {
        let temp = TempDir::new().unwrap();
        let journal = Arc::new(RunJournal::new(temp.path()).unwrap());
        seed(&journal, "run-a", false);
        seed(&journal, "run-b", false);
        seed(&journal, "run-c", true);

        let manager = RecoveryManager::new(journal.clone());
        let (results, stats) = manager.abandon_all("operator request").unwrap();
        assert_eq!(stats.abandoned, 2);
        assert_eq!(results[0].run_id(), "run-a");
        assert!(journal.find_incomplete().unwrap().is_empty());

        let (_, again) = manager.abandon_all("operator request").unwrap();
        assert_eq!(again.total(), 0);
    }
}
