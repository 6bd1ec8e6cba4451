//! Status command implementation.

use fieldsync_model::SyncState;
use fieldsync_store::Store;
use serde::Serialize;
use std::path::Path;

/// Store status snapshot.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Store directory path.
    pub path: String,
    /// Actions waiting to drain.
    pub pending: usize,
    /// Actions that were in flight (demoted to pending on open).
    pub syncing: usize,
    /// Terminal failures awaiting user action.
    pub failed: usize,
    /// Conflicts awaiting a manual choice.
    pub conflict: usize,
    /// Entities in the mirror cache.
    pub cached_entities: usize,
    /// Cached entities still keyed by a provisional local id.
    pub awaiting_remap: usize,
    /// Queue journal size in bytes.
    pub queue_log_bytes: u64,
    /// Cache journal size in bytes.
    pub cache_log_bytes: u64,
    /// True if nothing is queued, failed, or conflicted.
    pub settled: bool,
}

/// Runs the status command.
pub fn run(path: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open(path, false)?;
    let counts = store.queue.counts();
    let state = SyncState::from_counts(counts, false, None);

    let report = StatusReport {
        path: path.display().to_string(),
        pending: counts.pending,
        syncing: counts.syncing,
        failed: counts.failed,
        conflict: counts.conflict,
        cached_entities: store.cache.len(),
        awaiting_remap: store.cache.query(|e| e.awaiting_remap()).len(),
        queue_log_bytes: file_size(&path.join("queue.log")),
        cache_log_bytes: file_size(&path.join("cache.log")),
        settled: state.is_settled(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text_output(&report, state.needs_attention());
    }

    Ok(())
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn print_text_output(report: &StatusReport, needs_attention: bool) {
    println!("FieldSync Store Status");
    println!("======================");
    println!();
    println!("Path: {}", report.path);
    println!();
    println!("Queue:");
    println!("  Pending:  {}", report.pending);
    println!("  Syncing:  {}", report.syncing);
    println!("  Failed:   {}", report.failed);
    println!("  Conflict: {}", report.conflict);
    println!();
    println!("Cache:");
    println!("  Entities:       {}", report.cached_entities);
    println!("  Awaiting remap: {}", report.awaiting_remap);
    println!();
    println!("Journals:");
    println!("  queue.log: {}", format_size(report.queue_log_bytes));
    println!("  cache.log: {}", format_size(report.cache_log_bytes));
    println!();

    if report.settled {
        println!("State: settled");
    } else if needs_attention {
        println!("State: needs attention");
    } else {
        println!("State: work queued");
    }
}

pub(crate) fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_model::{ActionKind, EntityKind, Payload, PendingAction, ResourceId};
    use tempfile::tempdir;

    #[test]
    fn status_runs_on_populated_store() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("store");
        {
            let store = Store::open(&root, true).unwrap();
            let action = PendingAction::new(
                ActionKind::Update,
                EntityKind::TimeEntry,
                ResourceId::server("srv_1"),
                Payload::empty(),
                0,
                100,
            );
            store.queue.enqueue(action).unwrap();
        }

        assert!(run(&root, false).is_ok());
        assert!(run(&root, true).is_ok());
    }

    #[test]
    fn status_fails_on_missing_store() {
        let dir = tempdir().unwrap();
        assert!(run(&dir.path().join("nope"), false).is_err());
    }

    #[test]
    fn size_formatting() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
