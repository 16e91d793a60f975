//! [`ChassisConfig`] – the pipeline's configuration bundle.
//!
//! Built once at startup and passed by reference; nothing reads global
//! state.  [`ChassisConfig::default`] describes the stock chassis layout and
//! [`ChassisConfig::validate`] enforces the invariants the store and the
//! scheduler rely on.

use std::collections::HashSet;
use std::time::Duration;

use chassis_kernel::{DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_DENY_LIMIT_SECS};
use chassis_store::{DEFAULT_BLOCK_CAPACITY, DEFAULT_MAX_BLOCKS};
use chassis_types::{ChassisError, ComponentFamily};
use serde::{Deserialize, Serialize};

/// Default scheduler period.
pub const DEFAULT_TICK_PERIOD_SECS: u64 = 3;
/// Default EIR window length in samples.
pub const DEFAULT_POWER_WINDOW_LEN: usize = 10;
/// Default staleness window for most families.
pub const DEFAULT_MAX_STALENESS_SECS: u64 = 60;

// ─────────────────────────────────────────────────────────────────────────────
// FamilyConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Per-family layout and timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyConfig {
    pub family: ComponentFamily,
    /// Bytes reserved per instance in the component store.
    pub record_size: usize,
    /// Fixed instance count.  When `None` the count is discovered from the
    /// hardware at specialization.
    #[serde(default)]
    pub instance_count: Option<usize>,
    /// Staleness window in seconds.
    pub max_staleness_secs: u64,
    /// Slow sub-period.  When set the family is read at most once per
    /// interval instead of every tick.
    #[serde(default)]
    pub sample_interval_secs: Option<u64>,
}

impl FamilyConfig {
    pub fn new(family: ComponentFamily, record_size: usize, max_staleness_secs: u64) -> Self {
        Self {
            family,
            record_size,
            instance_count: None,
            max_staleness_secs,
            sample_interval_secs: None,
        }
    }

    pub fn with_instance_count(mut self, count: usize) -> Self {
        self.instance_count = Some(count);
        self
    }

    pub fn with_sample_interval(mut self, secs: u64) -> Self {
        self.sample_interval_secs = Some(secs);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ChassisConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for the [`Scheduler`][crate::scheduler::Scheduler].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChassisConfig {
    pub tick_period_secs: u64,
    /// Bytes per store block.
    pub block_capacity: usize,
    /// Upper bound on the store's block chain.
    pub max_blocks: usize,
    /// Age after which a held FUP lock may be reclaimed.
    pub fup_deny_limit_secs: u64,
    /// EIR rolling-average window, in samples.
    pub power_window_len: usize,
    /// Time a tracked command may take to become visible.
    pub command_timeout_secs: u64,
    pub families: Vec<FamilyConfig>,
}

impl Default for ChassisConfig {
    fn default() -> Self {
        use ComponentFamily as F;
        let stale = DEFAULT_MAX_STALENESS_SECS;
        Self {
            tick_period_secs: DEFAULT_TICK_PERIOD_SECS,
            block_capacity: DEFAULT_BLOCK_CAPACITY,
            max_blocks: DEFAULT_MAX_BLOCKS,
            fup_deny_limit_secs: DEFAULT_DENY_LIMIT_SECS,
            power_window_len: DEFAULT_POWER_WINDOW_LEN,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            families: vec![
                FamilyConfig::new(F::BoardIdentity, 64, stale).with_instance_count(1),
                FamilyConfig::new(F::PowerSupply, 256, stale),
                FamilyConfig::new(F::Fan, 96, stale),
                FamilyConfig::new(F::ManagementModule, 512, stale),
                FamilyConfig::new(F::ResumeId, 128, stale),
                FamilyConfig::new(F::TemperatureSensor, 48, stale),
                FamilyConfig::new(F::FirmwareUpgrade, 192, stale),
                FamilyConfig::new(F::PowerConsumer, 96, stale),
                FamilyConfig::new(F::SolidStateDevice, 256, 300).with_sample_interval(60),
            ],
        }
    }
}

impl ChassisConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(self.tick_period_secs)
    }

    pub fn family(&self, family: ComponentFamily) -> Option<&FamilyConfig> {
        self.families.iter().find(|f| f.family == family)
    }

    /// Check the configuration invariants.
    ///
    /// # Errors
    ///
    /// [`ChassisError::Config`] for zero periods/capacities, duplicate or
    /// missing families, and a zero-sized record;
    /// [`ChassisError::RecordTooLarge`] when a record cannot fit one block.
    pub fn validate(&self) -> Result<(), ChassisError> {
        let invalid = |msg: &str| Err(ChassisError::Config(msg.to_string()));
        if self.tick_period_secs == 0 {
            return invalid("tick_period_secs must be non-zero");
        }
        if self.block_capacity == 0 {
            return invalid("block_capacity must be non-zero");
        }
        if self.max_blocks == 0 {
            return invalid("max_blocks must be non-zero");
        }
        if self.power_window_len == 0 {
            return invalid("power_window_len must be non-zero");
        }
        if self.command_timeout_secs == 0 {
            return invalid("command_timeout_secs must be non-zero");
        }
        if self.family(ComponentFamily::BoardIdentity).is_none() {
            return invalid("the board_identity family must be configured");
        }

        let mut seen = HashSet::new();
        for fc in &self.families {
            if !seen.insert(fc.family) {
                return Err(ChassisError::DuplicateFamily(fc.family));
            }
            if fc.record_size == 0 {
                return Err(ChassisError::Config(format!(
                    "{}: record_size must be non-zero",
                    fc.family
                )));
            }
            if fc.record_size > self.block_capacity {
                return Err(ChassisError::RecordTooLarge {
                    family: fc.family,
                    record_size: fc.record_size,
                    block_capacity: self.block_capacity,
                });
            }
            if fc.sample_interval_secs == Some(0) {
                return Err(ChassisError::Config(format!(
                    "{}: sample_interval_secs must be non-zero",
                    fc.family
                )));
            }
        }
        Ok(())
    }
}
