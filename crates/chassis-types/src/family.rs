//! Component families, their record attributes, and attribute values.
//!
//! A [`ComponentFamily`] is a category of chassis sub-assembly that is
//! tracked uniformly.  Each family declares the [`Attribute`]s its records
//! may carry; writes of attributes outside that set are rejected by the
//! component store.

use std::fmt;

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// ComponentFamily
// ────────────────────────────────────────────────────────────────────────────

/// Category of chassis sub-assembly tracked by the status pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentFamily {
    /// Which physical slot this controller occupies.  Synchronized first.
    BoardIdentity,
    /// Chassis power supply units.
    PowerSupply,
    /// Chassis fan trays.
    Fan,
    /// Management modules (one per controller slot).
    ManagementModule,
    /// Resume/FRU identity PROMs of the local slot's sub-assemblies.
    ResumeId,
    /// Temperature sensors.
    TemperatureSensor,
    /// Firmware-upgradeable sub-assemblies of the local slot.
    FirmwareUpgrade,
    /// Power-consuming loads sampled for the EIR rolling average.
    PowerConsumer,
    /// Attached solid-state diagnostic device.  Slow-changing.
    SolidStateDevice,
}

/// Whether a family's instances are counted across the whole chassis or
/// only within the slot this controller occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FamilyScope {
    Chassis,
    LocalSlot,
}

impl ComponentFamily {
    /// Every family, identity first.
    pub const ALL: [ComponentFamily; 9] = [
        ComponentFamily::BoardIdentity,
        ComponentFamily::PowerSupply,
        ComponentFamily::Fan,
        ComponentFamily::ManagementModule,
        ComponentFamily::ResumeId,
        ComponentFamily::TemperatureSensor,
        ComponentFamily::FirmwareUpgrade,
        ComponentFamily::PowerConsumer,
        ComponentFamily::SolidStateDevice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentFamily::BoardIdentity => "board_identity",
            ComponentFamily::PowerSupply => "power_supply",
            ComponentFamily::Fan => "fan",
            ComponentFamily::ManagementModule => "management_module",
            ComponentFamily::ResumeId => "resume_id",
            ComponentFamily::TemperatureSensor => "temperature_sensor",
            ComponentFamily::FirmwareUpgrade => "firmware_upgrade",
            ComponentFamily::PowerConsumer => "power_consumer",
            ComponentFamily::SolidStateDevice => "solid_state_device",
        }
    }

    /// `true` for the family that carries the controller's slot identity.
    pub fn is_identity(&self) -> bool {
        matches!(self, ComponentFamily::BoardIdentity)
    }

    pub fn scope(&self) -> FamilyScope {
        match self {
            ComponentFamily::ResumeId | ComponentFamily::FirmwareUpgrade => FamilyScope::LocalSlot,
            _ => FamilyScope::Chassis,
        }
    }

    /// Coarse payload tag attached to change descriptors for this family.
    pub fn payload_kind(&self) -> PayloadKind {
        match self {
            ComponentFamily::BoardIdentity => PayloadKind::Identity,
            ComponentFamily::PowerSupply | ComponentFamily::PowerConsumer => PayloadKind::Power,
            ComponentFamily::Fan => PayloadKind::Cooling,
            ComponentFamily::ManagementModule => PayloadKind::Management,
            ComponentFamily::ResumeId => PayloadKind::Inventory,
            ComponentFamily::TemperatureSensor => PayloadKind::Thermal,
            ComponentFamily::FirmwareUpgrade => PayloadKind::Firmware,
            ComponentFamily::SolidStateDevice => PayloadKind::Storage,
        }
    }

    /// The attributes a record of this family may carry.
    pub fn attributes(&self) -> &'static [Attribute] {
        use Attribute::*;
        match self {
            ComponentFamily::BoardIdentity => &[SlotId, ChassisSerial, PartNumber],
            ComponentFamily::PowerSupply => &[
                Presence,
                PowerGood,
                InputPowerMw,
                OutputPowerMw,
                AverageInputPowerMw,
                SerialNumber,
                LedState,
            ],
            ComponentFamily::Fan => &[Presence, FanSpeedRpm, TargetSpeedPercent, LedState],
            ComponentFamily::ManagementModule => &[
                Presence,
                OperStatus,
                FirmwareVersion,
                SerialNumber,
                PortSpeedMbps,
                LedState,
            ],
            ComponentFamily::ResumeId => &[Presence, SerialNumber, PartNumber],
            ComponentFamily::TemperatureSensor => &[Presence, TemperatureMilliC],
            ComponentFamily::FirmwareUpgrade => {
                &[Presence, FirmwareVersion, UpgradeState, LedState]
            }
            ComponentFamily::PowerConsumer => &[Presence, InputPowerMw, AverageInputPowerMw],
            ComponentFamily::SolidStateDevice => {
                &[Presence, HealthPercent, TemperatureMilliC, SerialNumber]
            }
        }
    }

    /// `true` when `attribute` belongs to this family's record layout.
    pub fn has_attribute(&self, attribute: Attribute) -> bool {
        self.attributes().contains(&attribute)
    }
}

impl fmt::Display for ComponentFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PayloadKind
// ────────────────────────────────────────────────────────────────────────────

/// Coarse classification of what a change descriptor is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Identity,
    Power,
    Cooling,
    Management,
    Inventory,
    Thermal,
    Firmware,
    Storage,
}

// ────────────────────────────────────────────────────────────────────────────
// Attributes and values
// ────────────────────────────────────────────────────────────────────────────

/// A named field of a component record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Presence,
    SlotId,
    ChassisSerial,
    SerialNumber,
    PartNumber,
    OperStatus,
    PowerGood,
    InputPowerMw,
    OutputPowerMw,
    AverageInputPowerMw,
    FanSpeedRpm,
    TargetSpeedPercent,
    TemperatureMilliC,
    FirmwareVersion,
    UpgradeState,
    PortSpeedMbps,
    HealthPercent,
    LedState,
}

/// Whether a component is physically installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Present,
    Absent,
    /// Written when reads have failed long enough that presence is no longer
    /// known.
    Unknown,
}

/// Front-panel LED state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedColor {
    Off,
    Green,
    Amber,
    Blue,
    BlinkingAmber,
}

/// Value stored under an [`Attribute`].
///
/// Only integer and text variants exist so that equality (and therefore
/// dirty-flag detection) is exact and deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Text(String),
    Presence(Presence),
    Led(LedColor),
}

impl AttrValue {
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            AttrValue::Unsigned(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        AttrValue::Unsigned(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Signed(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

impl From<Presence> for AttrValue {
    fn from(v: Presence) -> Self {
        AttrValue::Presence(v)
    }
}

impl From<LedColor> for AttrValue {
    fn from(v: LedColor) -> Self {
        AttrValue::Led(v)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Location
// ────────────────────────────────────────────────────────────────────────────

/// Physical position of a component: controller slot (blade) and sub-slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub slot: u8,
    pub sub_slot: u8,
}

impl Location {
    pub fn new(slot: u8, sub_slot: u8) -> Self {
        Self { slot, sub_slot }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot{}/{}", self.slot, self.sub_slot)
    }
}
