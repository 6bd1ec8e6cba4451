//! Compact command implementation.

use super::status::format_size;
use fieldsync_store::Store;
use std::path::Path;

/// Runs the compact command.
///
/// Opens the store (replaying both journals), rewrites each journal down
/// to its live records, and reports the space reclaimed.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let queue_log = path.join("queue.log");
    let cache_log = path.join("cache.log");

    let store = Store::open(path, false)?;

    let queue_before = file_size(&queue_log)?;
    let cache_before = file_size(&cache_log)?;

    println!("Compacting store at {}", path.display());
    println!();
    println!(
        "  Live state: {} queued actions, {} cached entities",
        store.queue.len(),
        store.cache.len()
    );

    store.compact()?;

    let queue_after = file_size(&queue_log)?;
    let cache_after = file_size(&cache_log)?;

    println!();
    print_shrink("queue.log", queue_before, queue_after);
    print_shrink("cache.log", cache_before, cache_after);
    println!();
    println!(
        "Reclaimed {}",
        format_size((queue_before + cache_before).saturating_sub(queue_after + cache_after))
    );

    Ok(())
}

fn file_size(path: &Path) -> std::io::Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}

fn print_shrink(name: &str, before: u64, after: u64) {
    println!(
        "  {name}: {} -> {}",
        format_size(before),
        format_size(after)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_model::{EntityKind, Payload, ResourceId};
    use tempfile::tempdir;

    #[test]
    fn compact_shrinks_rewritten_cache() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("store");

        {
            let store = Store::open(&root, true).unwrap();
            let resource = ResourceId::server("srv_1");
            for i in 0..20 {
                store
                    .cache
                    .apply_local(&resource, EntityKind::DailyLog, Payload::empty(), i)
                    .unwrap();
            }
        }

        let before = file_size(&root.join("cache.log")).unwrap();
        run(&root).unwrap();
        let after = file_size(&root.join("cache.log")).unwrap();

        assert!(after < before);
    }
}
