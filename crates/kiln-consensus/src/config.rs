//! Engine configuration.

use std::time::Duration;

use kiln_core::constants::TEST_DATASET_SIZE;
use serde::{Deserialize, Serialize};

/// How the engine treats proof-of-work.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowMode {
    /// Full PoW verification and mining.
    #[default]
    Normal,
    /// Real PoW over a shrunken dataset.
    Test,
    /// Seals are accepted without PoW; optional delay and forced failure.
    Fake,
    /// Every check is skipped.
    FullFake,
}

impl PowMode {
    /// Whether seal verification and mining are stubbed out.
    pub fn is_fake(self) -> bool {
        matches!(self, Self::Fake | Self::FullFake)
    }
}

/// Construction-time engine configuration. Immutable once the engine is
/// built, except for the worker count (see `PowEngine::set_threads`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub pow_mode: PowMode,
    /// Initial mining worker count. 0 = one per CPU, negative = mining disabled.
    pub threads: i32,
    /// Fake-mode seal-verification delay in milliseconds.
    pub fake_delay_ms: u64,
    /// Height at which fake seal verification fails.
    pub fake_fail: Option<u64>,
    /// Dataset size used by light verification in test mode.
    pub test_dataset_size: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pow_mode: PowMode::Normal,
            threads: 0,
            fake_delay_ms: 0,
            fake_fail: None,
            test_dataset_size: TEST_DATASET_SIZE,
        }
    }
}

impl EngineConfig {
    /// Production configuration.
    pub fn normal() -> Self {
        Self::default()
    }

    /// Real PoW over the small test dataset.
    pub fn test() -> Self {
        Self {
            pow_mode: PowMode::Test,
            ..Self::default()
        }
    }

    /// Accept every seal, instantly.
    pub fn fake() -> Self {
        Self {
            pow_mode: PowMode::Fake,
            ..Self::default()
        }
    }

    /// Accept seals after `delay`, except at height `fail_at`.
    pub fn fake_with(delay: Duration, fail_at: Option<u64>) -> Self {
        Self {
            pow_mode: PowMode::Fake,
            fake_delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            fake_fail: fail_at,
            ..Self::default()
        }
    }

    /// Skip all verification.
    pub fn full_fake() -> Self {
        Self {
            pow_mode: PowMode::FullFake,
            ..Self::default()
        }
    }

    pub fn fake_delay(&self) -> Duration {
        Duration::from_millis(self.fake_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_normal() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg, EngineConfig::normal());
        assert_eq!(cfg.pow_mode, PowMode::Normal);
        assert_eq!(cfg.threads, 0);
        assert_eq!(cfg.test_dataset_size, 32 * 1024);
    }

    #[test]
    fn fake_modes_flagged() {
        assert!(!PowMode::Normal.is_fake());
        assert!(!PowMode::Test.is_fake());
        assert!(PowMode::Fake.is_fake());
        assert!(PowMode::FullFake.is_fake());
    }

    #[test]
    fn fake_with_records_delay_and_failure() {
        let cfg = EngineConfig::fake_with(Duration::from_millis(25), Some(7));
        assert_eq!(cfg.pow_mode, PowMode::Fake);
        assert_eq!(cfg.fake_delay(), Duration::from_millis(25));
        assert_eq!(cfg.fake_fail, Some(7));
    }

    #[test]
    fn deserializes_partial_config() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"pow_mode": "Test", "threads": -1}"#).unwrap();
        assert_eq!(cfg.pow_mode, PowMode::Test);
        assert_eq!(cfg.threads, -1);
        assert_eq!(cfg.fake_fail, None);
        assert_eq!(cfg.test_dataset_size, TEST_DATASET_SIZE);
    }
}
