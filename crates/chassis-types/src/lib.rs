//! `chassis-types` – shared vocabulary of the chassis status pipeline.
//!
//! Families and attributes ([`family`]), classification and lifecycle states
//! ([`status`]), the time source ([`clock`]), bus events and the
//! workspace-wide [`ChassisError`].

pub mod clock;
pub mod family;
pub mod status;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use clock::{Clock, ManualClock, SystemClock};
pub use family::{
    AttrValue, Attribute, ComponentFamily, FamilyScope, LedColor, Location, PayloadKind, Presence,
};
pub use status::{
    BoardState, CommandFailure, CommandOutcome, InterfaceStatus, RawOutcome, Timestamp,
};

// ────────────────────────────────────────────────────────────────────────────
// Change descriptors and events
// ────────────────────────────────────────────────────────────────────────────

/// Describes one record whose dirty flag was observed during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDescriptor {
    pub family: ComponentFamily,
    pub index: usize,
    /// Physical cross-reference of the record.
    pub location: Location,
    pub kind: PayloadKind,
    /// Status of the record at scan time.
    pub status: InterfaceStatus,
    /// Family revision after the scan that produced this descriptor.
    pub revision: u64,
}

/// Envelope for everything routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"chassis-runtime::scheduler"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh envelope stamped with the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    ComponentChanged(ChangeDescriptor),
    LifecycleTransition {
        from: BoardState,
        to: BoardState,
    },
    FupGranted {
        domain: String,
        holder: String,
        /// Set when the lock was forcibly reclaimed from a stale holder.
        reclaimed_from: Option<String>,
    },
    FupReleased {
        domain: String,
        holder: String,
    },
    CommandCompleted {
        command_id: Uuid,
        outcome: CommandOutcome,
    },
    HardwareFault {
        component: String,
        code: u32,
        message: String,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Workspace-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChassisError {
    #[error("Unknown component family: {0}")]
    UnknownFamily(ComponentFamily),

    #[error("Index {index} out of range for {family} ({count} instances)")]
    IndexOutOfRange {
        family: ComponentFamily,
        index: usize,
        count: usize,
    },

    #[error("Attribute {attribute:?} is not part of the {family} record")]
    AttributeNotInFamily {
        family: ComponentFamily,
        attribute: Attribute,
    },

    #[error("{family} record of {record_size} bytes cannot fit an empty {block_capacity}-byte block")]
    RecordTooLarge {
        family: ComponentFamily,
        record_size: usize,
        block_capacity: usize,
    },

    #[error("Family {0} declared twice")]
    DuplicateFamily(ComponentFamily),

    #[error("Component store exhausted: {0}")]
    StoreExhausted(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("FUP lock in {domain} held by {holder} for {age_secs}s")]
    FupDenied {
        domain: String,
        holder: String,
        age_secs: u64,
    },

    #[error("Invalid lifecycle transition from {from} on {event}")]
    InvalidTransition { from: BoardState, event: String },

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Command rejected: {0}")]
    CommandRejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_serializes_snake_case() {
        let json = serde_json::to_string(&ComponentFamily::PowerSupply).unwrap();
        assert_eq!(json, "\"power_supply\"");
        let back: ComponentFamily = serde_json::from_str("\"solid_state_device\"").unwrap();
        assert_eq!(back, ComponentFamily::SolidStateDevice);
    }

    #[test]
    fn identity_family_is_listed_first() {
        assert!(ComponentFamily::ALL[0].is_identity());
        assert_eq!(
            ComponentFamily::ALL.iter().filter(|f| f.is_identity()).count(),
            1
        );
    }

    #[test]
    fn every_family_with_presence_can_report_unknown() {
        for family in ComponentFamily::ALL {
            if family.is_identity() {
                assert!(!family.has_attribute(Attribute::Presence));
            } else {
                assert!(family.has_attribute(Attribute::Presence), "{family}");
            }
        }
    }

    #[test]
    fn local_slot_families() {
        assert_eq!(ComponentFamily::ResumeId.scope(), FamilyScope::LocalSlot);
        assert_eq!(ComponentFamily::Fan.scope(), FamilyScope::Chassis);
    }

    #[test]
    fn change_event_carries_descriptor() {
        let change = ChangeDescriptor {
            family: ComponentFamily::Fan,
            index: 2,
            location: Location::new(0, 2),
            kind: ComponentFamily::Fan.payload_kind(),
            status: InterfaceStatus::TransactionFailed,
            revision: 7,
        };
        let event = Event::new("chassis-runtime::test", EventPayload::ComponentChanged(change.clone()));
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        match back.payload {
            EventPayload::ComponentChanged(c) => assert_eq!(c, change),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn chassis_error_display() {
        let err = ChassisError::IndexOutOfRange {
            family: ComponentFamily::Fan,
            index: 9,
            count: 4,
        };
        assert!(err.to_string().contains("fan"));

        let err = ChassisError::FupDenied {
            domain: "chassis".into(),
            holder: "mm0".into(),
            age_secs: 12,
        };
        assert!(err.to_string().contains("mm0"));
    }

    #[test]
    fn raw_outcome_failure_classes() {
        assert!(RawOutcome::Timeout.is_failure());
        assert!(RawOutcome::Failed { code: 5 }.is_failure());
        assert!(!RawOutcome::DeviceAbsent.is_failure());
        assert!(RawOutcome::Success.is_success());
    }
}
