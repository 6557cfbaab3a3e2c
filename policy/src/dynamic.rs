//! Dynamic policy values served by the execution venue.
//!
//! The venue hands back a loose key/value map. [`DynamicPolicy::from_values`]
//! reads the recognized keys with explicit defaults and keeps everything else
//! in `extra` so it still shows up in audit records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Default defensive-mode turnover cap.
pub const DEFAULT_MAX_TURNOVER: f64 = 0.05;

/// Default slippage cap in basis points.
pub const DEFAULT_MAX_SLIPPAGE_BPS: f64 = 50.0;

/// Recognized dynamic policy keys.
pub mod policy_keys {
    pub const INVESTOR_ACCREDITED: &str = "investorAccredited";
    pub const DEFENSIVE_MODE: &str = "defensiveMode";
    pub const MAX_TURNOVER: &str = "maxTurnover";
    pub const MAX_SLIPPAGE_BPS: &str = "maxSlippageBps";
}

/// Typed view of the venue's policy map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DynamicPolicy {
    /// Recognized key-set version
    pub version: u32,
    /// Investor may redeem; only a literal `true` enables it
    pub investor_accredited: bool,
    /// Restrict trading aggressiveness
    pub defensive_mode: bool,
    /// Turnover cap applied in defensive mode
    pub max_turnover: f64,
    /// Slippage cap in basis points
    pub max_slippage_bps: f64,
    /// Unrecognized keys, kept for audit
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for DynamicPolicy {
    fn default() -> Self {
        Self {
            version: 1,
            investor_accredited: false,
            defensive_mode: false,
            max_turnover: DEFAULT_MAX_TURNOVER,
            max_slippage_bps: DEFAULT_MAX_SLIPPAGE_BPS,
            extra: BTreeMap::new(),
        }
    }
}

impl DynamicPolicy {
    /// Interpret a loose policy map.
    ///
    /// Flags are on only for a JSON `true`. Caps must be finite numbers,
    /// otherwise the default applies.
    pub fn from_values(values: BTreeMap<String, serde_json::Value>) -> Self {
        let mut policy = Self::default();

        for (key, value) in values {
            match key.as_str() {
                policy_keys::INVESTOR_ACCREDITED => {
                    policy.investor_accredited = value == serde_json::Value::Bool(true);
                }
                policy_keys::DEFENSIVE_MODE => {
                    policy.defensive_mode = value == serde_json::Value::Bool(true);
                }
                policy_keys::MAX_TURNOVER => {
                    policy.max_turnover = finite_or(&key, &value, DEFAULT_MAX_TURNOVER);
                }
                policy_keys::MAX_SLIPPAGE_BPS => {
                    policy.max_slippage_bps = finite_or(&key, &value, DEFAULT_MAX_SLIPPAGE_BPS);
                }
                _ => {
                    debug!(key = %key, "Keeping unrecognized dynamic policy key");
                    policy.extra.insert(key, value);
                }
            }
        }

        policy
    }

    /// Enable defensive mode with a turnover cap.
    pub fn defensive(mut self, max_turnover: f64) -> Self {
        self.defensive_mode = true;
        self.max_turnover = max_turnover;
        self
    }

    /// Mark the investor accredited.
    pub fn accredited(mut self) -> Self {
        self.investor_accredited = true;
        self
    }

    /// Set the slippage cap.
    pub fn with_max_slippage_bps(mut self, bps: f64) -> Self {
        self.max_slippage_bps = bps;
        self
    }
}

fn finite_or(key: &str, value: &serde_json::Value, default: f64) -> f64 {
    match value.as_f64() {
        Some(n) if n.is_finite() => n,
        _ => {
            warn!(key = %key, value = %value, default, "Dynamic policy value is not a finite number, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, serde_json::Value)]) -> BTreeMap<String, serde_json::Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_defaults_when_empty() {
        let policy = DynamicPolicy::from_values(BTreeMap::new());
        assert_eq!(policy, DynamicPolicy::default());
        assert_eq!(policy.max_turnover, 0.05);
        assert_eq!(policy.max_slippage_bps, 50.0);
        assert!(!policy.investor_accredited);
    }

    #[test]
    fn test_flags_need_literal_true() {
        let truthy = DynamicPolicy::from_values(map(&[
            ("investorAccredited", json!("true")),
            ("defensiveMode", json!(1)),
        ]));
        assert!(!truthy.investor_accredited);
        assert!(!truthy.defensive_mode);

        let real = DynamicPolicy::from_values(map(&[
            ("investorAccredited", json!(true)),
            ("defensiveMode", json!(true)),
        ]));
        assert!(real.investor_accredited);
        assert!(real.defensive_mode);
    }

    #[test]
    fn test_caps_and_extra_keys() {
        let policy = DynamicPolicy::from_values(map(&[
            ("maxTurnover", json!(0.1)),
            ("maxSlippageBps", json!("lots")),
            ("jurisdiction", json!("EU")),
        ]));
        assert_eq!(policy.max_turnover, 0.1);
        assert_eq!(policy.max_slippage_bps, DEFAULT_MAX_SLIPPAGE_BPS);
        assert_eq!(policy.extra.get("jurisdiction"), Some(&json!("EU")));
    }

    #[test]
    fn test_yaml_config_shape() {
        let yaml = "defensiveMode: true\nmaxTurnover: 0.02\n";
        let policy: DynamicPolicy = serde_yaml::from_str(yaml).unwrap();
        assert!(policy.defensive_mode);
        assert_eq!(policy.max_turnover, 0.02);
        assert_eq!(policy.max_slippage_bps, 50.0);
    }
}
