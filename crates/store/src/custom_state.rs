//! State tables for declaratively-defined (custom) experiments.
//!
//! Custom engines keep per-participant attribute bags and per-session
//! variable bags here instead of dedicated columns. Effect application is
//! one critical section so an action's writes land together or not at all.

use serde_json::{Map, Value};
use uuid::Uuid;

use orc_domain::{ActionError, ErrorKind, Result};

use crate::store::Store;

impl Store {
    /// Seed a participant's attribute bag (called once at join).
    pub fn init_custom_attrs(&self, participant_id: Uuid, attrs: Map<String, Value>) {
        self.state.write().custom_attrs.insert(participant_id, attrs);
    }

    pub fn custom_attrs(&self, participant_id: Uuid) -> Map<String, Value> {
        self.state
            .read()
            .custom_attrs
            .get(&participant_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Seed the session's variable bag (no-op when already present).
    pub fn init_custom_vars(&self, session_code: &str, vars: Map<String, Value>) {
        self.state
            .write()
            .custom_vars
            .entry(session_code.to_owned())
            .or_insert(vars);
    }

    pub fn custom_vars(&self, session_code: &str) -> Map<String, Value> {
        self.state
            .read()
            .custom_vars
            .get(session_code)
            .cloned()
            .unwrap_or_default()
    }

    /// Apply one action's writes atomically: every attribute and variable
    /// write lands in the same critical section. Returns the updated
    /// `(attrs, vars)` snapshots.
    pub fn apply_custom_effects(
        &self,
        session_code: &str,
        participant_id: Uuid,
        attr_writes: Map<String, Value>,
        var_writes: Map<String, Value>,
    ) -> Result<(Map<String, Value>, Map<String, Value>)> {
        let mut state = self.state.write();
        if !state.participants.contains_key(&participant_id) {
            return Err(ActionError::new(
                ErrorKind::ParticipantNotFound,
                format!("participant id {participant_id} not found"),
            ));
        }
        let attrs = state.custom_attrs.entry(participant_id).or_default();
        for (key, value) in attr_writes {
            attrs.insert(key, value);
        }
        let attrs = attrs.clone();

        let vars = state
            .custom_vars
            .entry(session_code.to_owned())
            .or_default();
        for (key, value) in var_writes {
            vars.insert(key, value);
        }
        Ok((attrs, vars.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testutil::demo_session;
    use serde_json::json;

    fn map(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn effects_apply_together_and_snapshots_reflect_them() {
        let store = Store::new();
        let session = demo_session(&store, &["Alice"]);
        let alice = store
            .get_participant(&session.session_code, "Alice")
            .unwrap()
            .participant_id;
        store.init_custom_attrs(alice, map(&[("wallet.balance", json!(100.0))]));
        store.init_custom_vars(&session.session_code, map(&[("pot", json!(0.0))]));

        let (attrs, vars) = store
            .apply_custom_effects(
                &session.session_code,
                alice,
                map(&[("wallet.balance", json!(90.0))]),
                map(&[("pot", json!(10.0))]),
            )
            .unwrap();
        assert_eq!(attrs["wallet.balance"], json!(90.0));
        assert_eq!(vars["pot"], json!(10.0));
        assert_eq!(store.custom_attrs(alice)["wallet.balance"], json!(90.0));
        assert_eq!(store.custom_vars(&session.session_code)["pot"], json!(10.0));
    }

    #[test]
    fn var_seeding_does_not_clobber_existing_state() {
        let store = Store::new();
        let session = demo_session(&store, &["Alice"]);
        store.init_custom_vars(&session.session_code, map(&[("pot", json!(5.0))]));
        store.init_custom_vars(&session.session_code, map(&[("pot", json!(0.0))]));
        assert_eq!(store.custom_vars(&session.session_code)["pot"], json!(5.0));
    }

    #[test]
    fn unknown_participant_is_rejected() {
        let store = Store::new();
        let session = demo_session(&store, &["Alice"]);
        let err = store
            .apply_custom_effects(&session.session_code, Uuid::new_v4(), Map::new(), Map::new())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParticipantNotFound);
    }
}
