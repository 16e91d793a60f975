//! `chassis-runtime` – The Tick Engine
//!
//! Wires the store, the kernel rules and the hardware source into the
//! periodic status pipeline: read every family, classify, write the store,
//! notify on change, resolve pending commands.
//!
//! # Modules
//!
//! - [`config`] – [`ChassisConfig`][config::ChassisConfig]: tick period, store
//!   limits, and the per-family record size, staleness window and sampling
//!   interval.
//! - [`synchronizer`] – [`StatusSynchronizer`][synchronizer::StatusSynchronizer]:
//!   one pass over every family in dependency order (identity first,
//!   chassis-wide families next, local-slot families last), translating raw
//!   reads into store records and maintaining the power averaging windows.
//! - [`change_detector`] – [`ChangeDetector`][change_detector::ChangeDetector]:
//!   drains the dirty flags the synchronizer left behind and publishes one
//!   [`ChangeDescriptor`][chassis_types::ChangeDescriptor] per changed record.
//! - [`commands`] – [`CommandDispatcher`][commands::CommandDispatcher]: issues
//!   hardware writes and hands back a ticket that resolves once the write is
//!   observed in the store.
//! - [`scheduler`] – [`Scheduler`][scheduler::Scheduler]: the board lifecycle,
//!   FUP arbitration front end and the fixed-period async driver.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console or
//!   JSON logs plus optional OTLP span export.
//!
//! # Tick order
//!
//! Within one READY tick the steps always run in the same order:
//! synchronize → scan → recheck.  A command is therefore confirmed on the
//! first tick whose read reflects the write, never earlier.

pub mod change_detector;
pub mod commands;
pub mod config;
pub mod scheduler;
pub mod synchronizer;
pub mod telemetry;

pub use change_detector::{ChangeDetector, ScanReport};
pub use commands::{CommandDispatcher, verification_for};
pub use config::{
    ChassisConfig, DEFAULT_MAX_STALENESS_SECS, DEFAULT_POWER_WINDOW_LEN, DEFAULT_TICK_PERIOD_SECS,
    FamilyConfig,
};
pub use scheduler::{FUP_DOMAIN, Scheduler, TickReport};
pub use synchronizer::{StatusSynchronizer, SyncReport};
pub use telemetry::{TelemetryConfig, TracerProviderGuard, init_tracing};
