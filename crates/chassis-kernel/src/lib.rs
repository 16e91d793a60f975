//! `chassis-kernel` – Rules & Arbitration
//!
//! The decision logic of the status pipeline.  Nothing here touches hardware;
//! every function takes the current time explicitly so it can be driven by a
//! [`ManualClock`][chassis_types::ManualClock] in tests.
//!
//! # Modules
//!
//! - [`classifier`] – [`classify`][classifier::classify]: turns a raw read
//!   outcome plus the failure-run bookkeeping into an
//!   [`InterfaceStatus`][chassis_types::InterfaceStatus], tolerating
//!   transient failures for up to the family's staleness window.
//! - [`lifecycle`] – [`BoardLifecycle`][lifecycle::BoardLifecycle]: the
//!   SPECIALIZE → ACTIVATE → READY state machine and its side exits.
//! - [`fup_arbiter`] – [`FupArbiter`][fup_arbiter::FupArbiter]: single-holder
//!   firmware-upgrade permission with forced reclaim of stale holders.
//! - [`command_tracker`] – [`CommandTracker`][command_tracker::CommandTracker]:
//!   FIFO of in-flight hardware writes, resolved by observing their effect in
//!   the component store.

pub mod classifier;
pub mod command_tracker;
pub mod fup_arbiter;
pub mod lifecycle;

pub use classifier::{Classification, classify};
pub use command_tracker::{
    CommandTicket, CommandTracker, DEFAULT_COMMAND_TIMEOUT_SECS, Expectation, Opcode,
    PendingCommand,
};
pub use fup_arbiter::{DEFAULT_DENY_LIMIT_SECS, FupArbiter, FupGrant, Requester};
pub use lifecycle::{BoardEvent, BoardLifecycle};
