//! Property-based test generators using proptest.
//!
//! Strategies for the domain values sync properties range over:
//! priorities, timestamps, payloads, and whole queue shapes.

use fieldsync_model::{ActionKind, EntityKind, Payload};
use proptest::prelude::*;

/// Strategy for generating an entity kind.
pub fn entity_kind_strategy() -> impl Strategy<Value = EntityKind> {
    prop_oneof![
        Just(EntityKind::DailyLog),
        Just(EntityKind::TimeEntry),
        Just(EntityKind::SafetyIncident),
    ]
}

/// Strategy for generating an action kind.
pub fn action_kind_strategy() -> impl Strategy<Value = ActionKind> {
    prop_oneof![
        Just(ActionKind::Create),
        Just(ActionKind::Update),
        Just(ActionKind::Transition),
        Just(ActionKind::Delete),
    ]
}

/// Strategy for generating a sync priority.
///
/// Spans negative and positive values so ordering tests cover both
/// below-default and above-default priorities.
pub fn priority_strategy() -> impl Strategy<Value = i32> {
    -100..=100i32
}

/// Strategy for generating a small JSON object payload.
pub fn payload_strategy() -> impl Strategy<Value = Payload> {
    prop::collection::btree_map("[a-z]{1,8}", any::<i32>(), 0..5).prop_map(|fields| {
        let object: serde_json::Map<String, serde_json::Value> = fields
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::from(v)))
            .collect();
        Payload::from_json(&serde_json::Value::Object(object)).expect("valid JSON object")
    })
}

/// Strategy for generating a queue shape: one `(priority, created_at)`
/// pair per action, with distinct creation times so expected dequeue
/// order is total.
pub fn queue_shape_strategy(max_len: usize) -> impl Strategy<Value = Vec<(i32, u64)>> {
    prop::collection::vec((priority_strategy(), 0..10_000u64), 1..max_len).prop_map(|mut shape| {
        // Deduplicate created_at so age tiebreaks are deterministic
        for (index, entry) in shape.iter_mut().enumerate() {
            entry.1 = entry.1 * 1000 + index as u64;
        }
        shape
    })
}

/// Configuration presets for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Preset for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Preset for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to a proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn payloads_are_json_objects(payload in payload_strategy()) {
            let value = payload.to_json().unwrap();
            prop_assert!(value.is_object());
        }

        #[test]
        fn queue_shapes_have_distinct_ages(shape in queue_shape_strategy(16)) {
            let mut ages: Vec<u64> = shape.iter().map(|(_, at)| *at).collect();
            ages.sort_unstable();
            ages.dedup();
            prop_assert_eq!(ages.len(), shape.len());
        }
    }
}
