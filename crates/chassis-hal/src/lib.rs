//! `chassis-hal` – Hardware Boundary
//!
//! The status pipeline never talks to buses or registers directly.  It reads
//! through a [`HardwareStatusSource`] and writes through a
//! [`HardwareCommandSink`]; concrete transports implement those traits.
//!
//! # Modules
//!
//! - [`source`] – [`HardwareStatusSource`][source::HardwareStatusSource],
//!   [`StatusSummary`][source::StatusSummary] and the slot-major
//!   [`locations`][source::locations] iterator.
//! - [`command_sink`] – [`HardwareCommandSink`][command_sink::HardwareCommandSink]
//!   and the [`HardwareCommand`][command_sink::HardwareCommand] setters.
//! - [`sim`] – [`SimChassis`][sim::SimChassis]: an in-process chassis model
//!   implementing both traits, with fault injection for tests.

pub mod command_sink;
pub mod sim;
pub mod source;

pub use command_sink::{HardwareCommand, HardwareCommandSink};
pub use sim::{SimChassis, SimChassisBuilder};
pub use source::{HardwareStatusSource, InstanceStatus, PlatformInfo, StatusSummary, locations};
