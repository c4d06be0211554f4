//! Acknowledgment state storage and group-level merge logic.
//!
//! State is keyed by alert id; because ids are content-derived and survive
//! re-polling, acknowledgments stick to their alerts across refreshes. The
//! store is a trait so the engine stays testable without a real persistence
//! layer; single-process deployments can use [`MemoryAckStore`], distributed
//! ones need a shared store with per-key atomic upsert.

use alertdeck_common::types::{AckState, AckStatus};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Pluggable acknowledgment store. Each write is atomic per alert id; bulk
/// operations are sets of independent per-id writes, not transactions.
pub trait AckStore: Send + Sync {
    fn get_state(&self, alert_id: &str) -> Option<AckState>;

    /// Create or update the state row for one alert. Transition semantics
    /// are those of [`apply_transition`].
    fn upsert_state(
        &self,
        alert_id: &str,
        status: AckStatus,
        note: &str,
        updated_by: Option<&str>,
    ) -> AckState;

    /// Apply the same transition to many alerts. Partial application on
    /// error is acceptable; each per-id write is atomic.
    fn upsert_states_bulk(
        &self,
        alert_ids: &[String],
        status: AckStatus,
        note: &str,
        updated_by: Option<&str>,
    ) -> Vec<AckState> {
        alert_ids
            .iter()
            .map(|id| self.upsert_state(id, status, note, updated_by))
            .collect()
    }

    /// All alert ids with a stored state row.
    fn tracked_ids(&self) -> Vec<String>;

    /// Auto-resolve tracked alerts that no longer appear in the current
    /// poll: the upstream condition presumably cleared. Already-resolved
    /// rows are left alone; notes are preserved and no operator is
    /// attributed. Returns how many rows were transitioned.
    fn resolve_missing_states(&self, observed_ids: &HashSet<String>) -> usize;
}

/// Compute the successor state for an upsert. Always refreshes note,
/// `updated_at`, and `updated_by`; records `acknowledged_at`/`resolved_at`
/// the first time the alert enters that status and never erases them
/// afterwards, not even on a transition back to active.
pub fn apply_transition(
    existing: Option<&AckState>,
    status: AckStatus,
    note: &str,
    updated_by: Option<&str>,
    now: DateTime<Utc>,
) -> AckState {
    let mut state = existing.cloned().unwrap_or(AckState {
        status: AckStatus::Active,
        note: String::new(),
        updated_at: now,
        updated_by: None,
        acknowledged_at: None,
        resolved_at: None,
    });

    state.status = status;
    state.note = note.to_string();
    state.updated_at = now;
    state.updated_by = updated_by.map(str::to_string);
    if status == AckStatus::Acknowledged && state.acknowledged_at.is_none() {
        state.acknowledged_at = Some(now);
    }
    if status == AckStatus::Resolved && state.resolved_at.is_none() {
        state.resolved_at = Some(now);
    }
    state
}

/// Aggregated acknowledgment state for one alert group.
#[derive(Debug, Clone)]
pub struct GroupAckState {
    pub status: AckStatus,
    pub note: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Merge the members' states into one display state for the group.
///
/// Status priority is `active > acknowledged > resolved`; a member with no
/// stored state counts as active, and a group with no stored state at all
/// defaults to active. Note, attribution, and timestamps come from the
/// member state with the latest `updated_at`.
pub fn aggregate_group_state(store: &dyn AckStore, member_ids: &[String]) -> GroupAckState {
    let mut states = Vec::new();
    let mut missing = member_ids.is_empty();
    for id in member_ids {
        match store.get_state(id) {
            Some(state) => states.push(state),
            None => missing = true,
        }
    }

    let status = if missing || states.iter().any(|s| s.status == AckStatus::Active) {
        AckStatus::Active
    } else if states.iter().any(|s| s.status == AckStatus::Acknowledged) {
        AckStatus::Acknowledged
    } else if states.is_empty() {
        AckStatus::Active
    } else {
        AckStatus::Resolved
    };

    let latest = states.iter().max_by_key(|s| s.updated_at);
    GroupAckState {
        status,
        note: latest.map(|s| s.note.clone()).unwrap_or_default(),
        updated_at: latest.map(|s| s.updated_at),
        updated_by: latest.and_then(|s| s.updated_by.clone()),
        acknowledged_at: latest.and_then(|s| s.acknowledged_at),
        resolved_at: latest.and_then(|s| s.resolved_at),
    }
}

/// In-memory reference implementation.
#[derive(Default)]
pub struct MemoryAckStore {
    rows: RwLock<HashMap<String, AckState>>,
}

impl MemoryAckStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AckStore for MemoryAckStore {
    fn get_state(&self, alert_id: &str) -> Option<AckState> {
        let rows = self.rows.read().expect("ack lock poisoned");
        rows.get(alert_id).cloned()
    }

    fn upsert_state(
        &self,
        alert_id: &str,
        status: AckStatus,
        note: &str,
        updated_by: Option<&str>,
    ) -> AckState {
        let mut rows = self.rows.write().expect("ack lock poisoned");
        let next = apply_transition(rows.get(alert_id), status, note, updated_by, Utc::now());
        rows.insert(alert_id.to_string(), next.clone());
        next
    }

    fn tracked_ids(&self) -> Vec<String> {
        let rows = self.rows.read().expect("ack lock poisoned");
        rows.keys().cloned().collect()
    }

    fn resolve_missing_states(&self, observed_ids: &HashSet<String>) -> usize {
        let now = Utc::now();
        let mut rows = self.rows.write().expect("ack lock poisoned");
        let mut resolved = 0;
        for (id, state) in rows.iter_mut() {
            if observed_ids.contains(id) || state.status == AckStatus::Resolved {
                continue;
            }
            state.status = AckStatus::Resolved;
            state.updated_at = now;
            state.updated_by = None;
            if state.resolved_at.is_none() {
                state.resolved_at = Some(now);
            }
            resolved += 1;
        }
        resolved
    }
}
