//! Message persistence and read-state tracking.
//!
//! Direct messages flip to `read` when the recipient marks them. Broadcasts
//! track a `seen_by` set under the store lock (read-modify-write, so
//! concurrent markers never lose an update) and become `read` only once
//! every participant in the session has seen them; they never become unread
//! again.

use chrono::Utc;
use uuid::Uuid;

use orc_domain::{ActionError, DeliveredStatus, ErrorKind, Message, Result};

use crate::store::Store;

impl Store {
    /// Insert a chat message. `recipient` absent means broadcast.
    pub fn insert_message(
        &self,
        session_code: &str,
        sender: Uuid,
        recipient: Option<Uuid>,
        content: &str,
    ) -> Result<Message> {
        let mut state = self.state.write();
        if !state.sessions.contains_key(session_code) {
            return Err(ActionError::session_not_found(session_code));
        }
        let message = Message {
            message_id: Uuid::new_v4(),
            session_code: session_code.to_owned(),
            sender,
            recipient,
            content: content.to_owned(),
            timestamp: Utc::now(),
            delivered_status: DeliveredStatus::Sent,
            seen_by: Default::default(),
        };
        state.messages.insert(message.message_id, message.clone());
        Ok(message)
    }

    /// Messages the participant has not yet consumed: direct messages to
    /// them that are not `read`, plus broadcasts from others they have not
    /// seen. Ordered by timestamp.
    pub fn unread_messages_for(&self, session_code: &str, participant_id: Uuid) -> Vec<Message> {
        let state = self.state.read();
        let mut unread: Vec<Message> = state
            .messages
            .values()
            .filter(|m| m.session_code == session_code)
            .filter(|m| match m.recipient {
                Some(recipient) => {
                    recipient == participant_id && m.delivered_status != DeliveredStatus::Read
                }
                None => m.sender != participant_id && !m.seen_by.contains(&participant_id),
            })
            .cloned()
            .collect();
        unread.sort_by_key(|m| m.timestamp);
        unread
    }

    /// Mark direct messages addressed to the participant as `read`. With no
    /// explicit ids, everything unread is marked. Returns the count marked.
    pub fn mark_messages_read(
        &self,
        session_code: &str,
        participant_id: Uuid,
        message_ids: Option<&[Uuid]>,
    ) -> usize {
        let mut state = self.state.write();
        let mut marked = 0;
        for message in state.messages.values_mut() {
            if message.session_code != session_code
                || message.recipient != Some(participant_id)
                || message.delivered_status == DeliveredStatus::Read
            {
                continue;
            }
            if let Some(ids) = message_ids {
                if !ids.contains(&message.message_id) {
                    continue;
                }
            }
            message.delivered_status = DeliveredStatus::Read;
            marked += 1;
        }
        marked
    }

    /// Record that a participant has seen a broadcast. Idempotent per
    /// `(message, participant)` pair; a no-op for direct messages.
    pub fn mark_broadcast_seen(&self, message_id: Uuid, participant_id: Uuid) -> Result<()> {
        let mut state = self.state.write();
        let message = state.messages.get_mut(&message_id).ok_or_else(|| {
            ActionError::new(ErrorKind::StoreError, format!("message {message_id} not found"))
        })?;
        if message.is_broadcast() {
            message.seen_by.insert(participant_id);
        }
        Ok(())
    }

    /// Flip a broadcast to `read` iff its `seen_by` covers every participant
    /// in the session. Idempotent; returns whether the message is `read`
    /// afterwards.
    pub fn maybe_mark_broadcast_read(&self, message_id: Uuid) -> Result<bool> {
        let mut state = self.state.write();
        let message = state.messages.get(&message_id).ok_or_else(|| {
            ActionError::new(ErrorKind::StoreError, format!("message {message_id} not found"))
        })?;
        if !message.is_broadcast() {
            return Ok(false);
        }
        if message.delivered_status == DeliveredStatus::Read {
            return Ok(true);
        }
        let session_code = message.session_code.clone();
        let seen_by = message.seen_by.clone();
        let all_seen = state
            .participants
            .values()
            .filter(|p| p.session_code == session_code)
            .all(|p| seen_by.contains(&p.participant_id));
        if all_seen {
            let message = state.messages.get_mut(&message_id).expect("message exists");
            message.delivered_status = DeliveredStatus::Read;
        }
        Ok(all_seen)
    }

    pub fn get_message(&self, message_id: Uuid) -> Result<Message> {
        self.state
            .read()
            .messages
            .get(&message_id)
            .cloned()
            .ok_or_else(|| {
                ActionError::new(ErrorKind::StoreError, format!("message {message_id} not found"))
            })
    }
}
