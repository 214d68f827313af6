//! Engine and gateway configuration.
//!
//! Values come from `EQUB_*` environment variables (a `.env` file is loaded by
//! the binary first) and fall back to defaults. The CLI may override some of
//! them afterwards.

use crate::error::{EqubError, Result};
use std::str::FromStr;
use std::time::Duration;

/// How a cycle's end date is derived from its start date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeriodPolicy {
    /// Always one calendar month, whatever the declared frequency.
    #[default]
    FixedMonth,
    /// Weekly, bi-weekly or monthly, as declared on the group.
    FollowFrequency,
}

/// What happens when the rotation wraps back to payout order 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationPolicy {
    /// Keep rotating; the group never completes on its own.
    #[default]
    Continue,
    /// Complete the group once every member has been paid out once.
    CompleteAfterFullRotation,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on a single gateway round trip.
    pub gateway_timeout: Duration,
    /// Re-reads allowed after a concurrent modification of the same group.
    pub max_commit_retries: u32,
    /// Age after which a pending transaction is considered abandoned.
    pub pending_expiry: Duration,
    pub period_policy: PeriodPolicy,
    pub rotation_policy: RotationPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(10),
            max_commit_retries: 5,
            pending_expiry: Duration::from_secs(15 * 60),
            period_policy: PeriodPolicy::default(),
            rotation_policy: RotationPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let gateway_timeout = parse_or(&lookup, "EQUB_GATEWAY_TIMEOUT_MS", None)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.gateway_timeout);
        let max_commit_retries = parse_or(
            &lookup,
            "EQUB_MAX_COMMIT_RETRIES",
            Some(defaults.max_commit_retries),
        )?
        .unwrap_or(defaults.max_commit_retries);
        let pending_expiry = parse_or(&lookup, "EQUB_PENDING_EXPIRY_SECS", None)?
            .map(Duration::from_secs)
            .unwrap_or(defaults.pending_expiry);

        let period_policy = match lookup("EQUB_PERIOD_POLICY").as_deref() {
            None | Some("fixed-month") => PeriodPolicy::FixedMonth,
            Some("follow-frequency") => PeriodPolicy::FollowFrequency,
            Some(other) => {
                return Err(EqubError::ConfigError(format!(
                    "EQUB_PERIOD_POLICY: unknown policy '{other}'"
                )));
            }
        };
        let rotation_policy = match lookup("EQUB_ROTATION_POLICY").as_deref() {
            None | Some("continue") => RotationPolicy::Continue,
            Some("complete") => RotationPolicy::CompleteAfterFullRotation,
            Some(other) => {
                return Err(EqubError::ConfigError(format!(
                    "EQUB_ROTATION_POLICY: unknown policy '{other}'"
                )));
            }
        };

        Self {
            gateway_timeout,
            max_commit_retries,
            pending_expiry,
            period_policy,
            rotation_policy,
        }
        .validated()
    }

    /// A pending attempt may only expire once its gateway call can no longer answer.
    pub fn validated(self) -> Result<Self> {
        if self.pending_expiry <= self.gateway_timeout {
            return Err(EqubError::ConfigError(format!(
                "pending expiry ({:?}) must exceed the gateway timeout ({:?})",
                self.pending_expiry, self.gateway_timeout
            )));
        }
        Ok(self)
    }
}

/// Behaviour of the simulated payment gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub latency: Duration,
    /// Probability in [0, 1] that a payment is accepted.
    pub success_rate: f64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(1500),
            success_rate: 0.9,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let latency = parse_or(&lookup, "EQUB_GATEWAY_LATENCY_MS", None)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.latency);
        let success_rate = parse_or(&lookup, "EQUB_GATEWAY_SUCCESS_RATE", None)?
            .unwrap_or(defaults.success_rate);

        Self {
            latency,
            success_rate,
        }
        .validated()
    }

    pub fn validated(self) -> Result<Self> {
        if !(0.0..=1.0).contains(&self.success_rate) {
            return Err(EqubError::ConfigError(format!(
                "gateway success rate must lie in [0, 1], got {}",
                self.success_rate
            )));
        }
        Ok(self)
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Option<T>,
) -> Result<Option<T>> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| EqubError::ConfigError(format!("{key}: invalid value '{raw}'"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.max_commit_retries, 5);
        assert_eq!(config.period_policy, PeriodPolicy::FixedMonth);
        assert_eq!(config.rotation_policy, RotationPolicy::Continue);
    }

    #[test]
    fn test_engine_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("EQUB_GATEWAY_TIMEOUT_MS", "250"),
            ("EQUB_ROTATION_POLICY", "complete"),
            ("EQUB_PERIOD_POLICY", "follow-frequency"),
        ]))
        .unwrap();
        assert_eq!(config.gateway_timeout, Duration::from_millis(250));
        assert_eq!(
            config.rotation_policy,
            RotationPolicy::CompleteAfterFullRotation
        );
        assert_eq!(config.period_policy, PeriodPolicy::FollowFrequency);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            EngineConfig::from_lookup(lookup(&[("EQUB_MAX_COMMIT_RETRIES", "many")])),
            Err(EqubError::ConfigError(_))
        ));
        assert!(matches!(
            GatewayConfig::from_lookup(lookup(&[("EQUB_GATEWAY_SUCCESS_RATE", "1.5")])),
            Err(EqubError::ConfigError(_))
        ));
    }

    #[test]
    fn test_expiry_must_outlast_gateway_timeout() {
        let err = EngineConfig::from_lookup(lookup(&[
            ("EQUB_GATEWAY_TIMEOUT_MS", "10000"),
            ("EQUB_PENDING_EXPIRY_SECS", "10"),
        ]))
        .unwrap_err();
        assert!(matches!(err, EqubError::ConfigError(_)));

        let overridden = EngineConfig {
            gateway_timeout: Duration::from_secs(60 * 60),
            ..EngineConfig::default()
        };
        assert!(overridden.validated().is_err());
        assert!(EngineConfig::default().validated().is_ok());
    }

    #[test]
    fn test_gateway_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("EQUB_GATEWAY_LATENCY_MS", "0"),
            ("EQUB_GATEWAY_SUCCESS_RATE", "1"),
        ]))
        .unwrap();
        assert_eq!(config.latency, Duration::ZERO);
        assert_eq!(config.success_rate, 1.0);
    }
}
