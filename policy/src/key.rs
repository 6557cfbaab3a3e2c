//! Canonical identity of an action intent.
//!
//! Two intents are the same action iff their `(type, params, route)` tuples
//! serialize identically. Params are held in a sorted map and routes have a
//! fixed field order, so the key does not depend on insertion order and is
//! stable across runs and restarts.

use serde::{Deserialize, Serialize};

use crate::types::ActionIntent;

/// Canonical aggregation key for an action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionKey(String);

impl ActionKey {
    /// Compute the key of an intent.
    pub fn of(intent: &ActionIntent) -> Self {
        let params = serde_json::to_string(&intent.params).unwrap_or_default();
        let route = match &intent.route {
            Some(route) => serde_json::to_string(route).unwrap_or_default(),
            None => "{}".to_string(),
        };
        Self(format!("{}|{}|{}", intent.action_type.as_str(), params, route))
    }

    /// The canonical string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SHA-256 of the canonical string, hex encoded.
    pub fn digest(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// First 12 hex characters of the digest, for logs.
    pub fn short_id(&self) -> String {
        self.digest()[..12].to_string()
    }
}

impl std::fmt::Display for ActionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{param_keys, ActionParams, ActionType};

    #[test]
    fn test_key_is_insertion_order_independent() {
        let a = ActionIntent::new(ActionType::Rebalance, "first").with_params(
            ActionParams::new()
                .with(param_keys::TURNOVER, 0.04)
                .with(param_keys::SLIPPAGE_BPS, 30.0)
                .with(param_keys::ASSET_CLASS, "real-estate"),
        );
        let b = ActionIntent::new(ActionType::Rebalance, "second, different reason").with_params(
            ActionParams::new()
                .with(param_keys::ASSET_CLASS, "real-estate")
                .with(param_keys::SLIPPAGE_BPS, 30.0)
                .with(param_keys::TURNOVER, 0.04),
        );
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().digest(), b.key().digest());
    }

    #[test]
    fn test_key_from_json_field_order() {
        let first: ActionIntent = serde_json::from_str(
            r#"{"type":"HEDGE","reason":"x","params":{"b":1,"a":"two"},"route":{"venue":"DEX","chainId":14}}"#,
        )
        .unwrap();
        let second: ActionIntent = serde_json::from_str(
            r#"{"type":"HEDGE","reason":"y","params":{"a":"two","b":1},"route":{"chainId":14,"venue":"DEX"}}"#,
        )
        .unwrap();
        assert_eq!(first.key(), second.key());
    }

    #[test]
    fn test_key_distinguishes_type_params_route() {
        let base = ActionIntent::new(ActionType::Rebalance, "r")
            .with_params(ActionParams::new().with(param_keys::TURNOVER, 0.03));

        let other_type = ActionIntent { action_type: ActionType::Hedge, ..base.clone() };
        let other_params = base
            .clone()
            .with_params(ActionParams::new().with(param_keys::TURNOVER, 0.05));
        let routed = base.clone().with_route(114, Some("DEX"));

        assert_ne!(base.key(), other_type.key());
        assert_ne!(base.key(), other_params.key());
        assert_ne!(base.key(), routed.key());
        assert!(base.key().as_str().ends_with("|{}"));
    }

    #[test]
    fn test_short_id_is_stable() {
        let intent = ActionIntent::new(ActionType::Pause, "halt");
        assert_eq!(intent.key().short_id().len(), 12);
        assert_eq!(intent.key().as_str(), "PAUSE|{}|{}");
        assert_eq!(intent.key().short_id(), ActionKey::of(&intent).short_id());
    }
}
