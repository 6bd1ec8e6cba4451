//! Verify command implementation.

use fieldsync_store::{
    CacheRecord, FileBackend, Journal, QueueRecord, StoreError, JOURNAL_TAG_CACHE,
    JOURNAL_TAG_QUEUE,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Result of replaying one journal.
#[derive(Debug)]
pub struct JournalReport {
    /// Complete records replayed.
    pub records: usize,
    /// Bytes of valid record prefix.
    pub valid_bytes: u64,
    /// Bytes of torn tail past the valid prefix.
    pub torn_bytes: u64,
    /// Corruption found during replay, if any.
    pub error: Option<String>,
}

impl JournalReport {
    fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs the verify command.
///
/// Replays both journals exactly as a store open would. A torn tail is
/// reported but passes (the store sheds it on open); corruption anywhere
/// else fails verification.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying store at {}", path.display());
    println!();

    let queue_report = replay_journal::<QueueRecord>(&path.join("queue.log"), JOURNAL_TAG_QUEUE)?;
    print_report("queue.log", &queue_report);

    let cache_report = replay_journal::<CacheRecord>(&path.join("cache.log"), JOURNAL_TAG_CACHE)?;
    print_report("cache.log", &cache_report);

    println!();
    if queue_report.is_ok() && cache_report.is_ok() {
        println!("Store verification passed");
        Ok(())
    } else {
        println!("Store verification FAILED");
        Err("verification failed".into())
    }
}

fn replay_journal<R>(
    path: &Path,
    tag: u8,
) -> Result<JournalReport, Box<dyn std::error::Error>>
where
    R: Serialize + DeserializeOwned,
{
    if !path.exists() {
        return Err(format!("journal not found: {}", path.display()).into());
    }

    let journal: Journal<R> = Journal::new(Box::new(FileBackend::open(path)?), tag, false);

    match journal.replay() {
        Ok(replay) => Ok(JournalReport {
            records: replay.records.len(),
            valid_bytes: replay.valid_len,
            torn_bytes: replay.trailing_bytes,
            error: None,
        }),
        Err(
            err @ (StoreError::Corrupted { .. }
            | StoreError::ChecksumMismatch { .. }
            | StoreError::Codec { .. }),
        ) => Ok(JournalReport {
            records: 0,
            valid_bytes: 0,
            torn_bytes: 0,
            error: Some(err.to_string()),
        }),
        Err(other) => Err(other.into()),
    }
}

fn print_report(name: &str, report: &JournalReport) {
    match &report.error {
        Some(error) => {
            println!("  {name}: CORRUPT");
            println!("    {error}");
        }
        None => {
            print!(
                "  {name}: {} records, {} valid bytes",
                report.records, report.valid_bytes
            );
            if report.torn_bytes > 0 {
                print!(" ({} torn tail bytes, recoverable)", report.torn_bytes);
            }
            println!();
        }
    }
}
