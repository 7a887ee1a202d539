//! Production queue mechanics.
//!
//! Queue discipline: the first entry for a participant starts immediately
//! (`in_progress`); later entries are appended as `queued` with completion
//! estimated behind everything ahead of them. Promotion of finished work
//! deposits output into inventory but never starts the next queued entry;
//! that is a separate, participant-initiated action.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use orc_domain::{ActionError, ErrorKind, ProductionEntry, ProductionStatus, Result};

use crate::store::Store;

impl Store {
    /// Enqueue a production run, deducting its cost and counting it against
    /// the production cap in the same critical section.
    pub fn enqueue_production(
        &self,
        participant_id: Uuid,
        shape: &str,
        quantity: u32,
        unit_duration_secs: i64,
        total_cost: i64,
        max_production: u32,
    ) -> Result<ProductionEntry> {
        if quantity == 0 {
            return Err(ActionError::new(
                ErrorKind::InvalidQuantity,
                "production quantity must be at least 1",
            ));
        }

        let mut state = self.state.write();
        let participant = state.participants.get_mut(&participant_id).ok_or_else(|| {
            ActionError::new(
                ErrorKind::ParticipantNotFound,
                format!("participant id {participant_id} not found"),
            )
        })?;

        let used = participant.specialty_production_used;
        if used + quantity > max_production {
            return Err(ActionError::new(
                ErrorKind::ProductionLimitReached,
                format!(
                    "cannot produce {quantity}x {shape}: {used}/{max_production} production used, {} remaining",
                    max_production - used
                ),
            ));
        }
        if participant.money < total_cost {
            return Err(ActionError::new(
                ErrorKind::InsufficientFunds,
                format!("insufficient funds: need ${total_cost}, have ${}", participant.money),
            ));
        }

        participant.money -= total_cost;
        participant.specialty_production_used += quantity;

        let ahead: Vec<&ProductionEntry> = state
            .production
            .values()
            .filter(|e| {
                e.participant_id == participant_id
                    && matches!(e.status, ProductionStatus::Queued | ProductionStatus::InProgress)
            })
            .collect();
        let next_position = ahead.iter().map(|e| e.queue_position).max().unwrap_or(0) + 1;
        let seconds_ahead: i64 = ahead
            .iter()
            .map(|e| unit_duration_secs * i64::from(e.quantity))
            .sum();

        let now = Utc::now();
        let own_duration = unit_duration_secs * i64::from(quantity);
        let (status, started_at) = if next_position == 1 {
            (ProductionStatus::InProgress, now)
        } else {
            (ProductionStatus::Queued, now + Duration::seconds(seconds_ahead))
        };
        let entry = ProductionEntry {
            queue_id: Uuid::new_v4(),
            participant_id,
            shape: shape.to_owned(),
            quantity,
            status,
            queue_position: next_position,
            started_at,
            estimated_completion: started_at + Duration::seconds(own_duration),
        };
        state.production.insert(entry.queue_id, entry.clone());
        Ok(entry)
    }

    /// Flip every `in_progress` entry past its completion time to
    /// `completed` and deposit its output. Queued entries are left alone.
    pub fn promote_completed_productions(&self, now: DateTime<Utc>) -> Vec<ProductionEntry> {
        let mut state = self.state.write();
        let due: Vec<Uuid> = state
            .production
            .values()
            .filter(|e| e.status == ProductionStatus::InProgress && e.estimated_completion <= now)
            .map(|e| e.queue_id)
            .collect();

        let mut promoted = Vec::with_capacity(due.len());
        for queue_id in due {
            let entry = state.production.get_mut(&queue_id).expect("entry exists");
            entry.status = ProductionStatus::Completed;
            let entry = entry.clone();
            let inventory = state.inventories.entry(entry.participant_id).or_default();
            for _ in 0..entry.quantity {
                inventory.push(entry.shape.clone());
            }
            promoted.push(entry);
        }
        promoted
    }

    /// Explicitly start the eldest queued entry, re-anchoring its window to
    /// now. Refused while another entry is still `in_progress`.
    pub fn start_next_production(&self, participant_id: Uuid) -> Result<Option<ProductionEntry>> {
        let mut state = self.state.write();
        let in_progress = state
            .production
            .values()
            .any(|e| e.participant_id == participant_id && e.status == ProductionStatus::InProgress);
        if in_progress {
            return Err(ActionError::new(
                ErrorKind::InvalidState,
                "a production is already in progress",
            ));
        }

        let next = state
            .production
            .values()
            .filter(|e| e.participant_id == participant_id && e.status == ProductionStatus::Queued)
            .min_by_key(|e| e.queue_position)
            .map(|e| e.queue_id);
        let Some(queue_id) = next else {
            return Ok(None);
        };

        let now = Utc::now();
        let entry = state.production.get_mut(&queue_id).expect("entry exists");
        let duration = entry.estimated_completion - entry.started_at;
        entry.status = ProductionStatus::InProgress;
        entry.started_at = now;
        entry.estimated_completion = now + duration;
        Ok(Some(entry.clone()))
    }

    /// A participant's queue ordered by position (all states).
    pub fn production_queue(&self, participant_id: Uuid) -> Vec<ProductionEntry> {
        let mut queue: Vec<_> = self
            .state
            .read()
            .production
            .values()
            .filter(|e| e.participant_id == participant_id)
            .cloned()
            .collect();
        queue.sort_by_key(|e| e.queue_position);
        queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testutil::demo_session;

    fn setup() -> (Store, Uuid) {
        let store = Store::new();
        let session = demo_session(&store, &["Alice"]);
        let alice = store
            .get_participant(&session.session_code, "Alice")
            .unwrap()
            .participant_id;
        (store, alice)
    }

    #[test]
    fn first_entry_starts_immediately_second_queues() {
        let (store, alice) = setup();
        let first = store
            .enqueue_production(alice, "circle", 2, 5, 20, 6)
            .unwrap();
        let second = store
            .enqueue_production(alice, "square", 1, 5, 25, 6)
            .unwrap();

        assert_eq!(first.status, ProductionStatus::InProgress);
        assert_eq!(first.queue_position, 1);
        assert_eq!(second.status, ProductionStatus::Queued);
        assert_eq!(second.queue_position, 2);
        // Second completes behind the first: 10s ahead + 5s own.
        let lag = (second.estimated_completion - first.started_at).num_seconds();
        assert_eq!(lag, 15);
    }

    #[test]
    fn promotion_deposits_output_but_never_advances_the_queue() {
        let (store, alice) = setup();
        store.enqueue_production(alice, "circle", 2, 5, 20, 6).unwrap();
        store.enqueue_production(alice, "square", 1, 5, 25, 6).unwrap();

        let later = Utc::now() + Duration::seconds(11);
        let promoted = store.promote_completed_productions(later);
        assert_eq!(promoted.len(), 1);
        assert_eq!(store.count_in_inventory(alice, "circle"), 2);

        // The queued entry is untouched even though its estimate has passed.
        let queue = store.production_queue(alice);
        assert_eq!(queue[1].status, ProductionStatus::Queued);
        let much_later = Utc::now() + Duration::seconds(1000);
        assert!(store.promote_completed_productions(much_later).is_empty());
        assert_eq!(store.count_in_inventory(alice, "square"), 0);
    }

    #[test]
    fn promotion_is_idempotent() {
        let (store, alice) = setup();
        store.enqueue_production(alice, "circle", 1, 5, 10, 6).unwrap();
        let later = Utc::now() + Duration::seconds(6);
        assert_eq!(store.promote_completed_productions(later).len(), 1);
        assert!(store.promote_completed_productions(later).is_empty());
        assert_eq!(store.count_in_inventory(alice, "circle"), 1);
    }

    #[test]
    fn start_next_requires_nothing_in_progress() {
        let (store, alice) = setup();
        store.enqueue_production(alice, "circle", 1, 5, 10, 6).unwrap();
        store.enqueue_production(alice, "square", 1, 5, 25, 6).unwrap();

        let err = store.start_next_production(alice).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);

        store.promote_completed_productions(Utc::now() + Duration::seconds(6));
        let started = store.start_next_production(alice).unwrap().unwrap();
        assert_eq!(started.status, ProductionStatus::InProgress);
        assert_eq!(started.shape, "square");

        // Queue drained: a further start is a no-op success.
        store.promote_completed_productions(Utc::now() + Duration::seconds(20));
        assert!(store.start_next_production(alice).unwrap().is_none());
    }

    #[test]
    fn production_cap_is_enforced_at_the_boundary() {
        let (store, alice) = setup();
        // Cap 6: producing exactly the remaining slots succeeds.
        store.enqueue_production(alice, "circle", 4, 5, 40, 6).unwrap();
        store.enqueue_production(alice, "circle", 2, 5, 20, 6).unwrap();
        let err = store
            .enqueue_production(alice, "circle", 1, 5, 10, 6)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProductionLimitReached);
        let p = store.participant_by_id(alice).unwrap();
        assert_eq!(p.specialty_production_used, 6);
    }

    #[test]
    fn at_most_one_in_progress_per_participant() {
        let (store, alice) = setup();
        for _ in 0..3 {
            store.enqueue_production(alice, "circle", 1, 5, 10, 6).unwrap();
        }
        let in_progress = store
            .production_queue(alice)
            .into_iter()
            .filter(|e| e.status == ProductionStatus::InProgress)
            .count();
        assert_eq!(in_progress, 1);
    }
}
