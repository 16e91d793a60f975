//! Staleness/error classification of hardware reads.
//!
//! [`classify`] is a pure function: given the record's previous status, the
//! raw outcome of this tick's transaction and the failure-run bookkeeping, it
//! returns the new consumer-visible [`InterfaceStatus`].
//!
//! | Condition | Result |
//! |---|---|
//! | sample older than the staleness window | `Stale` |
//! | `Success` | `Good`, failure run cleared |
//! | `DeviceAbsent` | `Absent`, failure run cleared |
//! | failure, run shorter than the window | previous status kept |
//! | failure, run at least the window | `TransactionFailed` |
//!
//! # Example
//!
//! ```
//! use chassis_kernel::classifier::classify;
//! use chassis_types::{InterfaceStatus, RawOutcome};
//!
//! let timeout = RawOutcome::Timeout;
//! let c = classify(InterfaceStatus::Good, &timeout, 0, 0, 60, None);
//! assert_eq!(c.status, InterfaceStatus::Good);
//! assert_eq!(c.first_bad_ts, Some(0));
//!
//! let c = classify(c.status, &timeout, 65, 65, 60, c.first_bad_ts);
//! assert_eq!(c.status, InterfaceStatus::TransactionFailed);
//! ```

use chassis_types::{InterfaceStatus, RawOutcome, Timestamp};

/// Result of one classification step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub status: InterfaceStatus,
    /// Start of the current failure run; `None` while healthy.
    pub first_bad_ts: Option<Timestamp>,
}

/// Classify one hardware read.
///
/// `sampled_at` is the capture time the source reported for the data; a
/// failed transaction carries the time of the attempt.
pub fn classify(
    prev_status: InterfaceStatus,
    outcome: &RawOutcome,
    sampled_at: Timestamp,
    now: Timestamp,
    max_staleness_secs: u64,
    first_bad_ts: Option<Timestamp>,
) -> Classification {
    if now.saturating_sub(sampled_at) > max_staleness_secs {
        return Classification {
            status: InterfaceStatus::Stale,
            first_bad_ts,
        };
    }

    match outcome {
        RawOutcome::Success => Classification {
            status: InterfaceStatus::Good,
            first_bad_ts: None,
        },
        RawOutcome::DeviceAbsent => Classification {
            status: InterfaceStatus::Absent,
            first_bad_ts: None,
        },
        RawOutcome::Failed { .. } | RawOutcome::Timeout => {
            let since = first_bad_ts.unwrap_or(now);
            let status = if now.saturating_sub(since) >= max_staleness_secs {
                InterfaceStatus::TransactionFailed
            } else {
                prev_status
            };
            Classification {
                status,
                first_bad_ts: Some(since),
            }
        }
    }
}
