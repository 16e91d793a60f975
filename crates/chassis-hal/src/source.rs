//! [`HardwareStatusSource`] – the read side of the hardware boundary.
//!
//! A source answers one question per family per tick: "what does the
//! hardware say right now?"  The answer is a [`StatusSummary`] holding the
//! transaction outcome, the time the data was captured, and one
//! [`InstanceStatus`] per discovered instance.
//!
//! Instances are always reported in the same traversal order; the
//! synchronizer assigns store indices from that order, so a source must not
//! reorder them between calls.

use chassis_types::{AttrValue, Attribute, ChassisError, ComponentFamily, Location, RawOutcome, Timestamp};

/// What the source knows about one instance of a family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceStatus {
    pub location: Location,
    /// Outcome of the per-instance transaction.
    pub outcome: RawOutcome,
    /// Raw attribute readings.  Only meaningful when `outcome` is success.
    pub fields: Vec<(Attribute, AttrValue)>,
}

impl InstanceStatus {
    pub fn new(location: Location, outcome: RawOutcome) -> Self {
        Self {
            location,
            outcome,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, attribute: Attribute, value: impl Into<AttrValue>) -> Self {
        self.fields.push((attribute, value.into()));
        self
    }

    pub fn field(&self, attribute: Attribute) -> Option<&AttrValue> {
        self.fields.iter().find(|(a, _)| *a == attribute).map(|(_, v)| v)
    }
}

/// One family's status as read in a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSummary {
    pub family: ComponentFamily,
    /// Outcome of the family-level transaction.  When this is a failure the
    /// instance list carries no usable data.
    pub outcome: RawOutcome,
    /// When the data was captured.  A failed transaction carries the time of
    /// the attempt.
    pub sampled_at: Timestamp,
    pub instances: Vec<InstanceStatus>,
}

impl StatusSummary {
    /// A summary for a family-level failure.
    pub fn failed(family: ComponentFamily, outcome: RawOutcome, at: Timestamp) -> Self {
        Self {
            family,
            outcome,
            sampled_at: at,
            instances: Vec::new(),
        }
    }

    /// Instances in traversal order, restricted to `slot` when given.
    pub fn instances_in(&self, slot: Option<u8>) -> impl Iterator<Item = &InstanceStatus> {
        self.instances
            .iter()
            .filter(move |i| slot.is_none_or(|s| i.location.slot == s))
    }
}

/// What the platform reports about itself at identification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    /// Platform (chassis variant) name.
    pub platform: String,
    /// Number of controller slots in the chassis.
    pub slot_count: u8,
}

/// Read side of the hardware boundary.
pub trait HardwareStatusSource: Send {
    /// Identify the platform.  Fails when the hardware cannot be reached.
    fn identify(&mut self) -> Result<PlatformInfo, ChassisError>;

    /// Locations of every instance of `family`, in traversal order.
    fn instance_locations(&mut self, family: ComponentFamily) -> Result<Vec<Location>, ChassisError>;

    /// Number of instances of `family`, optionally restricted to one slot.
    fn instance_count(&mut self, family: ComponentFamily, slot: Option<u8>) -> Result<usize, ChassisError> {
        Ok(self
            .instance_locations(family)?
            .into_iter()
            .filter(|l| slot.is_none_or(|s| l.slot == s))
            .count())
    }

    /// Read the current status of `family`.  Transaction failures are
    /// reported in the summary's outcome, never as an error.
    fn read_status(&mut self, family: ComponentFamily) -> StatusSummary;
}

/// Slot-major iterator over `slots × sub_slots` locations.
///
/// ```
/// use chassis_hal::source::locations;
/// use chassis_types::Location;
///
/// let locs: Vec<Location> = locations(2, 2).collect();
/// assert_eq!(locs[1], Location::new(0, 1));
/// assert_eq!(locs[2], Location::new(1, 0));
/// ```
pub fn locations(slots: u8, sub_slots: u8) -> impl Iterator<Item = Location> {
    (0..slots).flat_map(move |slot| (0..sub_slots).map(move |sub| Location::new(slot, sub)))
}
