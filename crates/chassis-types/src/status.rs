//! Status vocabulary shared by the store, the classifier and consumers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// Consumer-visible classification of a component record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceStatus {
    /// The last read succeeded, or failures are still within tolerance.
    #[default]
    Good,
    /// The source handed back data older than the family's staleness window.
    Stale,
    /// Reads have been failing for at least the staleness window.
    TransactionFailed,
    /// The device is known to be absent or powered off.
    Absent,
}

impl InterfaceStatus {
    pub fn is_good(&self) -> bool {
        matches!(self, InterfaceStatus::Good)
    }
}

impl fmt::Display for InterfaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InterfaceStatus::Good => "good",
            InterfaceStatus::Stale => "stale",
            InterfaceStatus::TransactionFailed => "transaction_failed",
            InterfaceStatus::Absent => "absent",
        };
        f.write_str(s)
    }
}

/// Outcome of one hardware transaction as reported by the status source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RawOutcome {
    Success,
    /// The device is intentionally absent or powered off.
    DeviceAbsent,
    /// The bus transaction failed with a transport-specific code.
    Failed { code: u32 },
    /// The transaction did not complete within the source's latency bound.
    Timeout,
}

impl RawOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RawOutcome::Success)
    }

    /// `true` for outcomes that are transaction failures rather than
    /// legitimate terminal states.
    pub fn is_failure(&self) -> bool {
        matches!(self, RawOutcome::Failed { .. } | RawOutcome::Timeout)
    }
}

/// Coarse lifecycle state of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardState {
    Specialize,
    Activate,
    Ready,
    Hibernate,
    Offline,
    Fail,
    Destroy,
}

impl fmt::Display for BoardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Terminal result delivered to the issuer of a tracked write command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CommandOutcome {
    Succeeded,
    Failed { reason: CommandFailure },
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Succeeded)
    }
}

/// Why a tracked command did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandFailure {
    /// The opcode has no verification rule.
    UnrecognizedOpcode(u16),
    /// The expected value was not observed before the deadline.
    TimedOut,
    /// The target record became absent or unreadable.
    TargetUnavailable(InterfaceStatus),
    /// The target record does not exist in the store.
    InvalidTarget(String),
    /// The queue was drained at teardown.
    Drained,
}
