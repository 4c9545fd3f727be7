//! Batch execution of a command file.
//!
//! Opens the event log and result file, loads every command, then hands the
//! whole list to the [`Dispatcher`]. Any setup failure aborts the run before a
//! single worker starts.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::{
    commands::{load_commands, Command, CommandKind},
    dispatcher::{DispatchReport, Dispatcher, ThreadSpawner},
    events::EventLog,
    guard::Directory,
    results::ResultLog,
    settings::Settings,
};

/// Execute the configured command file.
///
/// Returns `None` when the file holds no commands.
#[instrument(skip(settings))]
pub fn run(settings: &Settings) -> Result<Option<DispatchReport>> {
    let paths = &settings.paths;
    info!("Starting batch execution from {:?}", paths.commands);

    let events = Arc::new(
        EventLog::create(&paths.event_log)
            .with_context(|| format!("Failed to initialize event log at {:?}", paths.event_log))?,
    );
    let results = Arc::new(
        ResultLog::create(&paths.output)
            .with_context(|| format!("Failed to initialize output file at {:?}", paths.output))?,
    );
    let commands = load_commands(&paths.commands).context("Error loading commands")?;

    if commands.is_empty() {
        println!("No commands to execute.");
        return Ok(None);
    }

    let spawner = match settings.worker_stack_size() {
        Some(stack_size) => ThreadSpawner::with_stack_size(stack_size),
        None => ThreadSpawner::default(),
    };
    let dispatcher = Dispatcher::new(Arc::new(Directory::new()), events, results)
        .with_mode(settings.dispatch.mode)
        .with_spawner(Arc::new(spawner));

    let start_time = Instant::now();
    let total = commands.len();
    let report = dispatcher.run(commands);
    info!(
        total,
        spawned = report.spawned,
        inline = report.inline,
        "Batch execution completed in {:?}",
        start_time.elapsed()
    );

    if report.failed() > 0 {
        warn!("{} of {} commands failed", report.failed(), total);
    }

    Ok(Some(report))
}

/// Per-kind command counts of a parsed file
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub inserts: usize,
    pub deletes: usize,
    pub searches: usize,
    pub prints: usize,
}

impl CheckSummary {
    fn tally(commands: &[Command]) -> Self {
        let mut summary = Self::default();
        for command in commands {
            match command.kind {
                CommandKind::Insert { .. } => summary.inserts += 1,
                CommandKind::Delete { .. } => summary.deletes += 1,
                CommandKind::Search { .. } => summary.searches += 1,
                CommandKind::Print => summary.prints += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.inserts + self.deletes + self.searches + self.prints
    }
}

/// Parse a command file without executing it.
pub fn check(path: &Path) -> Result<CheckSummary> {
    let commands = load_commands(path).context("Error loading commands")?;
    let summary = CheckSummary::tally(&commands);

    println!("{}: {} commands", path.display(), summary.total());
    println!("  INSERT: {}", summary.inserts);
    println!("  DELETE: {}", summary.deletes);
    println!("  SEARCH: {}", summary.searches);
    println!("  PRINT:  {}", summary.prints);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_check_counts_kinds() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("commands.txt");
        fs::write(
            &path,
            "INSERT,a,1,1\nINSERT,b,2,2\nDELETE,a,3\nSEARCH,b,4\nPRINT,5\n",
        )
        .unwrap();

        let summary = check(&path).unwrap();
        assert_eq!(
            summary,
            CheckSummary {
                inserts: 2,
                deletes: 1,
                searches: 1,
                prints: 1
            }
        );
        assert_eq!(summary.total(), 5);
    }

    #[test]
    fn test_check_reports_bad_line() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("commands.txt");
        fs::write(&path, "PRINT,1\nPRINT,x\n").unwrap();

        let err = check(&path).unwrap_err();
        assert_eq!(format!("{:#}", err), "Error loading commands: Line 2: Invalid priority value");
    }
}
