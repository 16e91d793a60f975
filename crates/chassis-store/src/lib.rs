//! `chassis-store` – in-memory component state.
//!
//! # Modules
//!
//! - [`store`] – [`ComponentStore`][store::ComponentStore]: the block-chained
//!   arena of component records, addressed by `(family, index, attribute)`,
//!   with per-record dirty flags and family/global revision counters.
//! - [`record`] – [`ComponentRecord`][record::ComponentRecord]: one
//!   component's attributes plus its classification bookkeeping.
//! - [`power_window`] – [`PowerSampleWindow`][power_window::PowerSampleWindow]:
//!   the EIR rolling input-power average.
//!
//! Nothing here is persisted; the store is rebuilt from the hardware on every
//! start.

pub mod power_window;
pub mod record;
pub mod store;

pub use power_window::PowerSampleWindow;
pub use record::ComponentRecord;
pub use store::{BlockId, ComponentStore, DEFAULT_BLOCK_CAPACITY, DEFAULT_MAX_BLOCKS, Extent};
