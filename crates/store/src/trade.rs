//! Trade lifecycle: proposal, single-winner acceptance, rejection and
//! proposer cancellation.
//!
//! `proposed` is the only state a transaction can leave. Acceptance is a
//! check-and-set under the store lock: of two concurrent accepts exactly one
//! observes `proposed`, and the loser's call has no side effect on money or
//! inventory.

use chrono::Utc;
use uuid::Uuid;

use orc_domain::{
    ActionError, ErrorKind, OfferType, Result, Transaction, TransactionStatus,
};

use crate::store::Store;

impl Store {
    /// Create a trade offer from `proposer` to `recipient`.
    ///
    /// Buy offers require the proposer to hold the total cost; sell offers
    /// require the proposer to hold the offered quantity.
    pub fn create_transaction(
        &self,
        session_code: &str,
        proposer_id: Uuid,
        recipient_id: Uuid,
        offer_type: OfferType,
        shape: &str,
        quantity: u32,
        price_per_unit: i64,
    ) -> Result<Transaction> {
        if quantity == 0 {
            return Err(ActionError::new(
                ErrorKind::InvalidQuantity,
                "trade quantity must be at least 1",
            ));
        }
        if proposer_id == recipient_id {
            return Err(ActionError::new(
                ErrorKind::SelfOfferForbidden,
                "cannot create a trade offer to yourself",
            ));
        }

        let mut state = self.state.write();
        let proposer = state
            .participants
            .get(&proposer_id)
            .ok_or_else(|| ActionError::participant_not_found("proposer", session_code))?;
        if proposer.session_code != session_code {
            return Err(ActionError::missing_session_scope("create_trade_offer"));
        }

        let total_cost = price_per_unit * i64::from(quantity);
        match offer_type {
            OfferType::Buy => {
                if proposer.money < total_cost {
                    return Err(ActionError::new(
                        ErrorKind::InsufficientFunds,
                        format!(
                            "insufficient funds for purchase: need ${total_cost}, have ${}",
                            proposer.money
                        ),
                    ));
                }
            }
            OfferType::Sell => {
                let available = state
                    .inventories
                    .get(&proposer_id)
                    .map(|inv| inv.iter().filter(|tag| *tag == shape).count())
                    .unwrap_or(0);
                if available < quantity as usize {
                    return Err(ActionError::new(
                        ErrorKind::InsufficientInventory,
                        format!(
                            "insufficient inventory for sale: need {quantity} {shape}, have {available}"
                        ),
                    ));
                }
            }
        }

        let seq = state
            .trade_seq
            .entry(session_code.to_owned())
            .and_modify(|s| *s += 1)
            .or_insert(1);
        let short_id = short_id_for(session_code, *seq);

        let (seller, buyer) = match offer_type {
            OfferType::Sell => (proposer_id, recipient_id),
            OfferType::Buy => (recipient_id, proposer_id),
        };
        let transaction = Transaction {
            transaction_id: Uuid::new_v4(),
            short_id: short_id.clone(),
            session_code: session_code.to_owned(),
            seller,
            buyer,
            proposer: proposer_id,
            recipient: recipient_id,
            offer_type,
            shape: shape.to_owned(),
            quantity,
            price_per_unit,
            status: TransactionStatus::Proposed,
            proposed_at: Utc::now(),
            resolved_at: None,
        };
        state
            .short_ids
            .insert((session_code.to_owned(), short_id), transaction.transaction_id);
        state
            .transactions
            .insert(transaction.transaction_id, transaction.clone());
        Ok(transaction)
    }

    /// Resolve a transaction token (the UUID or the human-readable
    /// short id) to the transaction UUID within one session.
    pub fn resolve_transaction(&self, session_code: &str, token: &str) -> Result<Uuid> {
        let state = self.state.read();
        let key = (session_code.to_owned(), token.to_owned());
        if let Some(id) = state.short_ids.get(&key) {
            return Ok(*id);
        }
        if let Ok(id) = Uuid::parse_str(token) {
            if let Some(tx) = state.transactions.get(&id) {
                if tx.session_code == session_code {
                    return Ok(id);
                }
            }
            return Err(ActionError::new(
                ErrorKind::NotInProposedState,
                format!("transaction {token} not found in session {session_code}"),
            ));
        }
        Err(ActionError::new(
            ErrorKind::InvalidState,
            format!("invalid transaction id format: {token}"),
        ))
    }

    /// Accept a trade. Exactly one concurrent accepter wins; every later
    /// call returns `AlreadyProcessed` without side effects. Hard validation
    /// failures (buyer funds, seller inventory) flip the row to `cancelled`.
    pub fn accept_trade(&self, transaction_id: Uuid, accepter_id: Uuid) -> Result<Transaction> {
        let mut state = self.state.write();

        let tx = state
            .transactions
            .get(&transaction_id)
            .ok_or_else(|| {
                ActionError::new(
                    ErrorKind::NotInProposedState,
                    format!("transaction {transaction_id} not found"),
                )
            })?
            .clone();

        if tx.status != TransactionStatus::Proposed {
            return Err(ActionError::new(
                ErrorKind::AlreadyProcessed,
                "trade already processed",
            ));
        }
        if tx.proposer == accepter_id {
            return Err(ActionError::new(
                ErrorKind::SelfAcceptForbidden,
                "cannot accept your own trade offer",
            ));
        }

        let total_cost = tx.total_cost();
        let buyer_money = state
            .participants
            .get(&tx.buyer)
            .map(|p| p.money)
            .unwrap_or(0);
        if buyer_money < total_cost {
            let entry = state.transactions.get_mut(&transaction_id).expect("row exists");
            entry.status = TransactionStatus::Cancelled;
            entry.resolved_at = Some(Utc::now());
            return Err(ActionError::new(
                ErrorKind::InsufficientFunds,
                format!("insufficient funds: need ${total_cost}, have ${buyer_money}"),
            ));
        }

        let seller_count = state
            .inventories
            .get(&tx.seller)
            .map(|inv| inv.iter().filter(|tag| **tag == tx.shape).count())
            .unwrap_or(0);
        if seller_count < tx.quantity as usize {
            let entry = state.transactions.get_mut(&transaction_id).expect("row exists");
            entry.status = TransactionStatus::Cancelled;
            entry.resolved_at = Some(Utc::now());
            return Err(ActionError::new(
                ErrorKind::InsufficientInventory,
                format!(
                    "seller has insufficient {}: need {}, have {seller_count}",
                    tx.shape, tx.quantity
                ),
            ));
        }

        // Validations passed: flip the row and move money and shapes in one
        // critical section.
        let now = Utc::now();
        {
            let entry = state.transactions.get_mut(&transaction_id).expect("row exists");
            entry.status = TransactionStatus::Completed;
            entry.resolved_at = Some(now);
        }
        if let Some(buyer) = state.participants.get_mut(&tx.buyer) {
            buyer.money -= total_cost;
        }
        if let Some(seller) = state.participants.get_mut(&tx.seller) {
            seller.money += total_cost;
        }
        if let Some(inv) = state.inventories.get_mut(&tx.seller) {
            for _ in 0..tx.quantity {
                if let Some(pos) = inv.iter().position(|tag| *tag == tx.shape) {
                    inv.remove(pos);
                }
            }
        }
        let buyer_inv = state.inventories.entry(tx.buyer).or_default();
        for _ in 0..tx.quantity {
            buyer_inv.push(tx.shape.clone());
        }

        let completed = state
            .transactions
            .get(&transaction_id)
            .cloned()
            .expect("row exists");
        tracing::info!(
            transaction_id = %transaction_id,
            short_id = %completed.short_id,
            "trade accepted"
        );
        Ok(completed)
    }

    /// Reject a proposed trade, flipping it to `cancelled`. The proposer may
    /// reject their own offer.
    pub fn reject_trade(&self, transaction_id: Uuid) -> Result<Transaction> {
        let mut state = self.state.write();
        let tx = state.transactions.get_mut(&transaction_id).ok_or_else(|| {
            ActionError::new(
                ErrorKind::NotInProposedState,
                format!("transaction {transaction_id} not found"),
            )
        })?;
        if tx.status != TransactionStatus::Proposed {
            return Err(ActionError::new(
                ErrorKind::NotInProposedState,
                "transaction is not in proposed state",
            ));
        }
        tx.status = TransactionStatus::Cancelled;
        tx.resolved_at = Some(Utc::now());
        Ok(tx.clone())
    }

    /// Cancel a proposed trade. Only the proposer may cancel.
    pub fn cancel_trade(&self, transaction_id: Uuid, caller_id: Uuid) -> Result<Transaction> {
        let mut state = self.state.write();
        let tx = state.transactions.get_mut(&transaction_id).ok_or_else(|| {
            ActionError::new(
                ErrorKind::NotInProposedState,
                format!("transaction {transaction_id} not found"),
            )
        })?;
        if tx.status != TransactionStatus::Proposed {
            return Err(ActionError::new(
                ErrorKind::NotInProposedState,
                "transaction is not in proposed state",
            ));
        }
        if tx.proposer != caller_id {
            return Err(ActionError::new(
                ErrorKind::InvalidState,
                "only the proposer can cancel a trade offer",
            ));
        }
        tx.status = TransactionStatus::Cancelled;
        tx.resolved_at = Some(Utc::now());
        Ok(tx.clone())
    }
}

/// Human-readable short id: a stable per-session prefix plus a sequence
/// number, e.g. `S482-001`.
fn short_id_for(session_code: &str, seq: u32) -> String {
    let mut hash: u32 = 0;
    for byte in session_code.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(u32::from(byte));
    }
    format!("S{:03}-{:03}", hash % 1000, seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testutil::demo_session;

    fn setup() -> (Store, String, Uuid, Uuid) {
        let store = Store::new();
        let session = demo_session(&store, &["Alice", "Bob"]);
        let alice = store
            .get_participant(&session.session_code, "Alice")
            .unwrap()
            .participant_id;
        let bob = store
            .get_participant(&session.session_code, "Bob")
            .unwrap()
            .participant_id;
        (store, session.session_code, alice, bob)
    }

    #[test]
    fn sell_offer_requires_inventory() {
        let (store, code, alice, bob) = setup();
        let err = store
            .create_transaction(&code, alice, bob, OfferType::Sell, "circle", 1, 20)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientInventory);
    }

    #[test]
    fn accept_moves_money_and_shapes() {
        let (store, code, alice, bob) = setup();
        store.deposit_shapes(alice, "circle", 4);
        let tx = store
            .create_transaction(&code, alice, bob, OfferType::Sell, "circle", 1, 20)
            .unwrap();
        let completed = store.accept_trade(tx.transaction_id, bob).unwrap();
        assert_eq!(completed.status, TransactionStatus::Completed);
        assert_eq!(store.participant_by_id(alice).unwrap().money, 320);
        assert_eq!(store.participant_by_id(bob).unwrap().money, 280);
        assert_eq!(store.count_in_inventory(alice, "circle"), 3);
        assert_eq!(store.count_in_inventory(bob, "circle"), 1);
    }

    #[test]
    fn second_accept_is_already_processed_without_side_effects() {
        let (store, code, alice, bob) = setup();
        store.deposit_shapes(alice, "circle", 1);
        let tx = store
            .create_transaction(&code, alice, bob, OfferType::Sell, "circle", 1, 20)
            .unwrap();
        store.accept_trade(tx.transaction_id, bob).unwrap();
        let money_before = store.participant_by_id(bob).unwrap().money;

        let err = store.accept_trade(tx.transaction_id, bob).unwrap_err();
        assert_eq!(err.kind, ErrorKind::AlreadyProcessed);
        assert_eq!(store.participant_by_id(bob).unwrap().money, money_before);
    }

    #[test]
    fn concurrent_accepts_have_one_winner() {
        let (store, code, alice, bob) = setup();
        let store = std::sync::Arc::new(store);
        let session = store.get_session(&code).unwrap();
        let carol = store
            .add_participant(&session.session_code, "Carol", orc_domain::ParticipantType::AiAgent)
            .unwrap()
            .participant_id;
        store.deposit_shapes(alice, "circle", 1);
        let tx = store
            .create_transaction(&code, alice, bob, OfferType::Sell, "circle", 1, 20)
            .unwrap();

        let mut handles = Vec::new();
        for accepter in [bob, carol] {
            let store = store.clone();
            let id = tx.transaction_id;
            handles.push(std::thread::spawn(move || store.accept_trade(id, accepter)));
        }
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        let already = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.kind == ErrorKind::AlreadyProcessed))
            .count();
        assert_eq!(winners, 1);
        assert_eq!(already, 1);
        // Alice is paid exactly once.
        assert_eq!(store.participant_by_id(alice).unwrap().money, 320);
    }

    #[test]
    fn parallel_offers_on_different_transactions_both_settle() {
        // Two individually-addressed offers accepted at the same time are
        // independent: both complete and the seller is paid twice.
        let (store, code, alice, bob) = setup();
        let store = std::sync::Arc::new(store);
        let carol = store
            .add_participant(&code, "Carol", orc_domain::ParticipantType::AiAgent)
            .unwrap()
            .participant_id;
        store.deposit_shapes(alice, "circle", 2);
        let to_bob = store
            .create_transaction(&code, alice, bob, OfferType::Sell, "circle", 1, 20)
            .unwrap();
        let to_carol = store
            .create_transaction(&code, alice, carol, OfferType::Sell, "circle", 1, 20)
            .unwrap();

        let handles = [(to_bob.transaction_id, bob), (to_carol.transaction_id, carol)]
            .map(|(tx, accepter)| {
                let store = store.clone();
                std::thread::spawn(move || store.accept_trade(tx, accepter))
            });
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
        assert_eq!(store.participant_by_id(alice).unwrap().money, 340);
        assert_eq!(store.count_in_inventory(alice, "circle"), 0);
        assert_eq!(store.count_in_inventory(bob, "circle"), 1);
        assert_eq!(store.count_in_inventory(carol, "circle"), 1);
    }

    #[test]
    fn self_accept_forbidden_but_self_cancel_allowed() {
        let (store, code, alice, bob) = setup();
        store.deposit_shapes(alice, "circle", 1);
        let tx = store
            .create_transaction(&code, alice, bob, OfferType::Sell, "circle", 1, 20)
            .unwrap();
        let err = store.accept_trade(tx.transaction_id, alice).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SelfAcceptForbidden);
        store.cancel_trade(tx.transaction_id, alice).unwrap();
    }

    #[test]
    fn double_cancel_reports_not_in_proposed_state() {
        let (store, code, alice, bob) = setup();
        store.deposit_shapes(alice, "circle", 1);
        let tx = store
            .create_transaction(&code, alice, bob, OfferType::Sell, "circle", 1, 20)
            .unwrap();
        store.cancel_trade(tx.transaction_id, alice).unwrap();
        let err = store.cancel_trade(tx.transaction_id, alice).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotInProposedState);
    }

    #[test]
    fn only_proposer_cancels() {
        let (store, code, alice, bob) = setup();
        store.deposit_shapes(alice, "circle", 1);
        let tx = store
            .create_transaction(&code, alice, bob, OfferType::Sell, "circle", 1, 20)
            .unwrap();
        let err = store.cancel_trade(tx.transaction_id, bob).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
    }

    #[test]
    fn buyer_without_funds_cancels_the_trade() {
        let (store, code, alice, bob) = setup();
        store.deposit_shapes(alice, "circle", 20);
        // Drain Bob's money first.
        store
            .update_participant(bob, |p| p.money = 5)
            .unwrap();
        let tx = store
            .create_transaction(&code, alice, bob, OfferType::Sell, "circle", 1, 20)
            .unwrap();
        let err = store.accept_trade(tx.transaction_id, bob).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientFunds);
        let tx = store.get_transaction(tx.transaction_id).unwrap();
        assert_eq!(tx.status, TransactionStatus::Cancelled);
    }

    #[test]
    fn short_and_uuid_tokens_both_resolve() {
        let (store, code, alice, bob) = setup();
        store.deposit_shapes(alice, "circle", 1);
        let tx = store
            .create_transaction(&code, alice, bob, OfferType::Sell, "circle", 1, 20)
            .unwrap();
        assert_eq!(
            store.resolve_transaction(&code, &tx.short_id).unwrap(),
            tx.transaction_id
        );
        assert_eq!(
            store
                .resolve_transaction(&code, &tx.transaction_id.to_string())
                .unwrap(),
            tx.transaction_id
        );
        assert!(store.resolve_transaction(&code, "nonsense").is_err());
    }
}
