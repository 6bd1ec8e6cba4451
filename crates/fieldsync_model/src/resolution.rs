//! Conflict resolution policies and outcomes.

use crate::entity::{EntityKind, RemoteEntity};
use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What the resolver decided for one conflicted action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// Discard the local payload and take the remote entity.
    AcceptRemote,
    /// Re-submit the local payload with the force flag set.
    ForceLocal,
    /// Re-submit a field-level combination of both sides as an update.
    Merge(Payload),
    /// Park the action until the user picks a side.
    RequireManualChoice {
        /// The local payload as it was queued.
        local: Payload,
        /// The remote entity the server reported.
        remote: RemoteEntity,
    },
}

/// The user's decision for a parked conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualChoice {
    /// Take the remote entity, dropping the local edit.
    AcceptRemote,
    /// Re-submit the local edit with the force flag.
    ForceLocal,
}

/// Per-entity-kind conflict resolution policy.
///
/// Selected from a [`PolicyTable`], never hardcoded in the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionPolicy {
    /// Remote always wins.
    AcceptRemote,
    /// Local always wins (forced re-submission).
    ForceLocal,
    /// Merge field-by-field under the kind's [`MergeRules`].
    MergeFields,
    /// Park for a manual choice.
    Manual,
}

impl ResolutionPolicy {
    /// Returns true if this policy resolves conflicts without user input.
    #[must_use]
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, ResolutionPolicy::Manual)
    }
}

/// Maps entity kinds to their conflict resolution policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTable {
    default: ResolutionPolicy,
    overrides: HashMap<EntityKind, ResolutionPolicy>,
}

impl PolicyTable {
    /// Creates a table where every kind uses `default`.
    #[must_use]
    pub fn new(default: ResolutionPolicy) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Sets the policy for one entity kind.
    #[must_use]
    pub fn with_policy(mut self, kind: EntityKind, policy: ResolutionPolicy) -> Self {
        self.overrides.insert(kind, policy);
        self
    }

    /// Returns the policy for an entity kind.
    #[must_use]
    pub fn policy_for(&self, kind: EntityKind) -> ResolutionPolicy {
        self.overrides.get(&kind).copied().unwrap_or(self.default)
    }
}

impl Default for PolicyTable {
    /// Field-data defaults: logs and time entries merge automatically;
    /// safety incidents always go to a person.
    fn default() -> Self {
        Self::new(ResolutionPolicy::MergeFields)
            .with_policy(EntityKind::SafetyIncident, ResolutionPolicy::Manual)
    }
}

/// Per-field strategy applied by the `MergeFields` policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldMerge {
    /// Keep the locally edited value.
    PreferLocal,
    /// Keep the remote value.
    PreferRemote,
    /// Union both sides of a list field, preserving remote order first.
    UnionList,
    /// Take the numeric maximum of both sides.
    NumericMax,
}

/// Field-level merge rules for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRules {
    default: FieldMerge,
    fields: HashMap<String, FieldMerge>,
}

impl MergeRules {
    /// Creates rules where every field uses `default`.
    #[must_use]
    pub fn new(default: FieldMerge) -> Self {
        Self {
            default,
            fields: HashMap::new(),
        }
    }

    /// Sets the strategy for one field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, strategy: FieldMerge) -> Self {
        self.fields.insert(name.into(), strategy);
        self
    }

    /// Returns the strategy for a field name.
    #[must_use]
    pub fn strategy_for(&self, field: &str) -> FieldMerge {
        self.fields.get(field).copied().unwrap_or(self.default)
    }

    /// Built-in rules for a domain entity kind.
    ///
    /// Daily logs union their roster and note lists; time entries keep the
    /// larger of concurrently reported quantities. Safety incidents default
    /// to prefer-local because their policy table entry is `Manual` anyway;
    /// the rules only apply if an operator overrides that policy.
    #[must_use]
    pub fn defaults_for(kind: EntityKind) -> Self {
        match kind {
            EntityKind::DailyLog => Self::new(FieldMerge::PreferLocal)
                .with_field("crew", FieldMerge::UnionList)
                .with_field("equipment", FieldMerge::UnionList)
                .with_field("notes", FieldMerge::UnionList),
            EntityKind::TimeEntry => Self::new(FieldMerge::PreferLocal)
                .with_field("hours", FieldMerge::NumericMax)
                .with_field("quantity", FieldMerge::NumericMax),
            EntityKind::SafetyIncident => Self::new(FieldMerge::PreferLocal),
        }
    }
}
