//! Pure conflict resolution.
//!
//! The resolver maps one conflicted action to an outcome; it touches no
//! store and makes no network calls, so every policy path is testable with
//! plain values. Which policy applies to which entity kind is configuration
//! ([`PolicyTable`]), not resolver logic.
//!
//! [`PolicyTable`]: fieldsync_model::PolicyTable

use fieldsync_model::{FieldMerge, MergeRules, Payload, RemoteEntity, ResolutionOutcome, ResolutionPolicy};
use serde_json::{Map, Value};

/// Decides the outcome of one conflicted action.
///
/// `local` is the payload the action queued; `remote` is the server entity
/// the gateway reported in the conflict. A `MergeFields` policy over
/// payloads that are not JSON objects cannot merge and falls back to
/// [`ResolutionOutcome::RequireManualChoice`].
#[must_use]
pub fn resolve(
    local: &Payload,
    remote: &RemoteEntity,
    policy: ResolutionPolicy,
    rules: &MergeRules,
) -> ResolutionOutcome {
    match policy {
        ResolutionPolicy::AcceptRemote => ResolutionOutcome::AcceptRemote,
        ResolutionPolicy::ForceLocal => ResolutionOutcome::ForceLocal,
        ResolutionPolicy::MergeFields => match merge_payloads(local, &remote.body, rules) {
            Some(merged) => ResolutionOutcome::Merge(merged),
            None => manual(local, remote),
        },
        ResolutionPolicy::Manual => manual(local, remote),
    }
}

fn manual(local: &Payload, remote: &RemoteEntity) -> ResolutionOutcome {
    ResolutionOutcome::RequireManualChoice {
        local: local.clone(),
        remote: remote.clone(),
    }
}

/// Merges two JSON object payloads field by field.
///
/// Fields present on only one side are kept. Fields that differ on both
/// sides resolve per the field's [`FieldMerge`] strategy. Returns `None`
/// when either payload is not a JSON object (an empty payload counts as an
/// empty object).
#[must_use]
pub fn merge_payloads(local: &Payload, remote: &Payload, rules: &MergeRules) -> Option<Payload> {
    let local_map = parse_object(local)?;
    let remote_map = parse_object(remote)?;

    let mut merged = remote_map;
    for (key, local_value) in local_map {
        match merged.get(&key) {
            None => {
                merged.insert(key, local_value);
            }
            Some(remote_value) if *remote_value == local_value => {}
            Some(remote_value) => {
                let resolved =
                    merge_field(rules.strategy_for(&key), local_value, remote_value.clone());
                merged.insert(key, resolved);
            }
        }
    }

    Payload::from_json(&Value::Object(merged)).ok()
}

fn parse_object(payload: &Payload) -> Option<Map<String, Value>> {
    if payload.is_empty() {
        return Some(Map::new());
    }
    match payload.to_json().ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn merge_field(strategy: FieldMerge, local: Value, remote: Value) -> Value {
    match strategy {
        FieldMerge::PreferLocal => local,
        FieldMerge::PreferRemote => remote,
        FieldMerge::UnionList => match (local, remote) {
            (Value::Array(local_items), Value::Array(remote_items)) => {
                let mut union = remote_items;
                for item in local_items {
                    if !union.contains(&item) {
                        union.push(item);
                    }
                }
                Value::Array(union)
            }
            // Not lists on both sides: keep the local edit
            (local, _) => local,
        },
        FieldMerge::NumericMax => match (local.as_f64(), remote.as_f64()) {
            (Some(l), Some(r)) if r > l => remote,
            (Some(_), Some(_)) => local,
            // Not numbers on both sides: keep the local edit
            _ => local,
        },
    }
}
