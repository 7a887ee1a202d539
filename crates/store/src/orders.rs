//! Order generation and fulfilment for ShapeFactory.
//!
//! Orders are generated once per participant from a stable seed, drawing
//! only shapes the participant cannot produce as a specialty, so fulfilment
//! therefore requires trade. Fulfilment is all-or-nothing: if any requested
//! index cannot be covered by inventory, nothing changes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use orc_domain::{ActionError, ErrorKind, Result};

use crate::store::Store;

/// The result of a successful fulfilment batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FulfillOutcome {
    pub fulfilled_count: u32,
    pub score_gained: i64,
    pub new_money: i64,
    pub new_orders: Vec<String>,
    pub new_inventory: Vec<String>,
    pub orders_completed: u32,
}

impl Store {
    /// Return the participant's orders, generating them on first read.
    ///
    /// Orders are only generated while none have been fulfilled: an empty
    /// list with `orders_completed > 0` means the participant finished them
    /// all, and regeneration would hand out free work.
    pub fn ensure_orders(&self, participant_id: Uuid) -> Result<Vec<String>> {
        let mut state = self.state.write();
        let participant = state.participants.get(&participant_id).ok_or_else(|| {
            ActionError::new(
                ErrorKind::ParticipantNotFound,
                format!("participant id {participant_id} not found"),
            )
        })?;
        if !participant.orders.is_empty() || participant.orders_completed > 0 {
            return Ok(participant.orders.clone());
        }

        let session = state
            .sessions
            .get(&participant.session_code)
            .ok_or_else(|| ActionError::session_not_found(&participant.session_code))?;
        let specialty = participant
            .specialty_shape
            .clone()
            .unwrap_or_else(|| "circle".to_owned());
        let available: Vec<String> = session.config.available_shapes().to_vec();
        let session_code = participant.session_code.clone();
        let session_id = session.session_id;
        let total = session.config.shapes_per_order;

        // Pool: specialties present in the session, minus this participant's
        // own, restricted to the available shapes. Fall back to all available
        // shapes minus the specialty when the roster is too thin.
        let mut pool: Vec<String> = state
            .participants
            .values()
            .filter(|p| p.session_code == session_code)
            .filter_map(|p| p.specialty_shape.clone())
            .filter(|s| s != &specialty && available.contains(s))
            .collect();
        pool.sort();
        pool.dedup();
        if pool.is_empty() {
            pool = available.into_iter().filter(|s| s != &specialty).collect();
        }
        if pool.is_empty() {
            tracing::warn!(participant_id = %participant_id, "no shapes available for orders");
            return Ok(Vec::new());
        }

        let orders = draw_orders(&specialty, session_id, &pool, total);
        let participant = state
            .participants
            .get_mut(&participant_id)
            .expect("participant exists");
        participant.orders = orders.clone();
        Ok(orders)
    }

    /// Fulfil the orders at `indices`, consuming one inventory tag per index
    /// and crediting `incentive_money` per order. Fails whole on any invalid
    /// index or missing tag.
    pub fn fulfill_orders(
        &self,
        participant_id: Uuid,
        indices: &[usize],
        incentive_money: i64,
    ) -> Result<FulfillOutcome> {
        let mut state = self.state.write();
        let participant = state.participants.get(&participant_id).ok_or_else(|| {
            ActionError::new(
                ErrorKind::ParticipantNotFound,
                format!("participant id {participant_id} not found"),
            )
        })?;
        let orders = participant.orders.clone();
        if orders.is_empty() {
            return Err(ActionError::new(
                ErrorKind::InvalidOrderIndex,
                "no orders to fulfil",
            ));
        }

        let mut seen = std::collections::HashSet::new();
        let mut needed: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for &index in indices {
            if index >= orders.len() {
                return Err(ActionError::new(
                    ErrorKind::InvalidOrderIndex,
                    format!("invalid order index {index}: valid range 0-{}", orders.len() - 1),
                ));
            }
            if !seen.insert(index) {
                return Err(ActionError::new(
                    ErrorKind::InvalidOrderIndex,
                    format!("duplicate order index {index}"),
                ));
            }
            *needed.entry(orders[index].as_str()).or_default() += 1;
        }
        if indices.is_empty() {
            return Err(ActionError::new(
                ErrorKind::InvalidOrderIndex,
                "no order indices supplied",
            ));
        }

        let inventory = state
            .inventories
            .get(&participant_id)
            .cloned()
            .unwrap_or_default();
        for (shape, count) in &needed {
            let available = inventory.iter().filter(|tag| tag.as_str() == *shape).count();
            if available < *count {
                return Err(ActionError::new(
                    ErrorKind::InsufficientInventory,
                    format!("insufficient {shape} in inventory: need {count}, have {available}"),
                ));
            }
        }

        // Consume tags and drop the fulfilled order entries.
        let mut new_inventory = inventory;
        for &index in indices {
            let shape = orders[index].as_str();
            if let Some(pos) = new_inventory.iter().position(|tag| tag == shape) {
                new_inventory.remove(pos);
            }
        }
        let new_orders: Vec<String> = orders
            .iter()
            .enumerate()
            .filter(|(i, _)| !seen.contains(i))
            .map(|(_, shape)| shape.clone())
            .collect();

        let fulfilled_count = indices.len() as u32;
        let reward = incentive_money * i64::from(fulfilled_count);

        let participant = state
            .participants
            .get_mut(&participant_id)
            .expect("participant exists");
        participant.orders = new_orders.clone();
        participant.orders_completed += fulfilled_count;
        participant.money += reward;
        let new_money = participant.money;
        let orders_completed = participant.orders_completed;
        state.inventories.insert(participant_id, new_inventory.clone());

        Ok(FulfillOutcome {
            fulfilled_count,
            score_gained: reward,
            new_money,
            new_orders,
            new_inventory,
            orders_completed,
        })
    }
}

/// Draw a deterministic order composition from the pool. The seed depends
/// only on `(specialty, session_id)`, so regeneration always yields the same
/// list; drawn tags are sorted so equal shapes group together.
fn draw_orders(specialty: &str, session_id: Uuid, pool: &[String], total: usize) -> Vec<String> {
    let digest = Sha256::digest(format!("{specialty}_{session_id}").as_bytes());
    let seed = u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"));
    let mut rng = StdRng::seed_from_u64(seed);
    let mut orders: Vec<String> = (0..total)
        .map(|_| pool[rng.gen_range(0..pool.len())].clone())
        .collect();
    orders.sort();
    orders
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testutil::demo_session;

    #[test]
    fn orders_are_deterministic_and_exclude_own_specialty() {
        let store = Store::new();
        let session = demo_session(&store, &["Alice", "Bob", "Carol"]);
        let alice = store
            .get_participant(&session.session_code, "Alice")
            .unwrap();
        let first = store.ensure_orders(alice.participant_id).unwrap();
        let second = store.ensure_orders(alice.participant_id).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
        let specialty = alice.specialty_shape.unwrap();
        assert!(first.iter().all(|shape| shape != &specialty));
    }

    #[test]
    fn completed_participants_are_not_regenerated() {
        let store = Store::new();
        let session = demo_session(&store, &["Alice", "Bob"]);
        let alice = store
            .get_participant(&session.session_code, "Alice")
            .unwrap()
            .participant_id;
        store
            .update_participant(alice, |p| {
                p.orders = Vec::new();
                p.orders_completed = 4;
            })
            .unwrap();
        assert!(store.ensure_orders(alice).unwrap().is_empty());
    }

    #[test]
    fn partial_fulfilment_consumes_exact_tags() {
        // Scenario S3: orders [square, square, triangle, triangle],
        // inventory [square].
        let store = Store::new();
        let session = demo_session(&store, &["Alice", "Bob"]);
        let alice = store
            .get_participant(&session.session_code, "Alice")
            .unwrap()
            .participant_id;
        store
            .update_participant(alice, |p| {
                p.orders = vec![
                    "square".into(),
                    "square".into(),
                    "triangle".into(),
                    "triangle".into(),
                ];
            })
            .unwrap();
        store.deposit_shapes(alice, "square", 1);

        // Two squares requested, one held: the whole batch fails unchanged.
        let err = store.fulfill_orders(alice, &[0, 1], 50).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientInventory);
        let p = store.participant_by_id(alice).unwrap();
        assert_eq!(p.orders.len(), 4);
        assert_eq!(store.count_in_inventory(alice, "square"), 1);

        // One square succeeds.
        let outcome = store.fulfill_orders(alice, &[0], 50).unwrap();
        assert_eq!(outcome.fulfilled_count, 1);
        assert_eq!(outcome.score_gained, 50);
        assert_eq!(outcome.new_money, 350);
        assert_eq!(
            outcome.new_orders,
            vec!["square".to_string(), "triangle".into(), "triangle".into()]
        );
        assert!(outcome.new_inventory.is_empty());
    }

    #[test]
    fn invalid_and_duplicate_indices_are_rejected() {
        let store = Store::new();
        let session = demo_session(&store, &["Alice", "Bob"]);
        let alice = store
            .get_participant(&session.session_code, "Alice")
            .unwrap()
            .participant_id;
        store
            .update_participant(alice, |p| p.orders = vec!["square".into()])
            .unwrap();
        store.deposit_shapes(alice, "square", 2);

        let err = store.fulfill_orders(alice, &[3], 50).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidOrderIndex);
        let err = store.fulfill_orders(alice, &[0, 0], 50).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidOrderIndex);
        let err = store.fulfill_orders(alice, &[], 50).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidOrderIndex);
    }
}
