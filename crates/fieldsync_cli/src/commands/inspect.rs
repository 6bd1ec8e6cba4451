//! Inspect command implementation.

use fieldsync_store::Store;
use std::path::Path;

/// Runs the inspect command.
///
/// Lists queued actions in dispatch order: priority descending, then age,
/// so the first line is the next action a drain would pick up.
pub fn run(path: &Path, limit: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open(path, false)?;

    let mut actions = store.queue.actions();
    actions.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });

    let total = actions.len();
    let shown = limit.unwrap_or(total).min(total);

    println!("Queued actions at {}", path.display());
    println!();

    if total == 0 {
        println!("  (queue is empty)");
        return Ok(());
    }

    for action in actions.iter().take(shown) {
        println!(
            "  {} {:10} {:14} {:8} prio={:<4} retries={}",
            action.id,
            format!("{}", action.kind),
            format!("{}", action.entity_kind),
            format!("{}", action.status),
            action.priority,
            action.retry_count,
        );
        println!("      resource: {}", action.resource_id);
        if let Some(error) = &action.last_error {
            println!("      last error: {error}");
        }
        if let Some(at) = action.next_attempt_at {
            println!("      next attempt at: {at}");
        }
    }

    if shown < total {
        println!();
        println!("  ... and {} more", total - shown);
    }

    Ok(())
}
