//! [`ComponentRecord`] – the stored status snapshot of one component.

use std::collections::BTreeMap;

use chassis_types::{AttrValue, Attribute, ComponentFamily, InterfaceStatus, Location, Timestamp};

/// Last-known state of one instance of a [`ComponentFamily`].
///
/// Records are created once when their family is declared and overwritten in
/// place on every tick.  Mutation goes through the owning
/// [`ComponentStore`][crate::ComponentStore], which enforces the family's
/// attribute layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRecord {
    family: ComponentFamily,
    index: usize,
    location: Location,
    values: BTreeMap<Attribute, AttrValue>,
    status: InterfaceStatus,
    first_bad_ts: Option<Timestamp>,
    seeded: bool,
    dirty: bool,
}

impl ComponentRecord {
    pub(crate) fn new(family: ComponentFamily, index: usize) -> Self {
        Self {
            family,
            index,
            location: Location::default(),
            values: BTreeMap::new(),
            status: InterfaceStatus::default(),
            first_bad_ts: None,
            seeded: false,
            dirty: false,
        }
    }

    pub fn family(&self) -> ComponentFamily {
        self.family
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn status(&self) -> InterfaceStatus {
        self.status
    }

    /// Timestamp of the first failed transaction in the current failure run,
    /// `None` while healthy.
    pub fn first_bad_ts(&self) -> Option<Timestamp> {
        self.first_bad_ts
    }

    /// `true` once a read has reported the component as present or absent.
    /// Until then the stored status describes nothing.
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// `true` when the record changed since the last change scan.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn get(&self, attribute: Attribute) -> Option<&AttrValue> {
        self.values.get(&attribute)
    }

    /// Iterate over every attribute that has been written, in attribute order.
    pub fn values(&self) -> impl Iterator<Item = (&Attribute, &AttrValue)> {
        self.values.iter()
    }

    // ── mutation (store-internal) ────────────────────────────────────────────

    /// Returns `true` when the value differed and the record was marked dirty.
    pub(crate) fn write(&mut self, attribute: Attribute, value: AttrValue) -> bool {
        if self.values.get(&attribute) == Some(&value) {
            return false;
        }
        self.values.insert(attribute, value);
        self.dirty = true;
        true
    }

    pub(crate) fn write_location(&mut self, location: Location) -> bool {
        if self.location == location {
            return false;
        }
        self.location = location;
        self.dirty = true;
        true
    }

    /// Status changes are consumer-visible and mark the record dirty; the
    /// failure-run timestamp is bookkeeping and never does.
    pub(crate) fn write_status(
        &mut self,
        status: InterfaceStatus,
        first_bad_ts: Option<Timestamp>,
    ) -> bool {
        self.first_bad_ts = first_bad_ts;
        if matches!(status, InterfaceStatus::Good | InterfaceStatus::Absent) {
            self.seeded = true;
        }
        if self.status == status {
            return false;
        }
        self.status = status;
        self.dirty = true;
        true
    }

    /// Clear the dirty flag, returning its previous value.
    pub(crate) fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_write_does_not_dirty() {
        let mut rec = ComponentRecord::new(ComponentFamily::Fan, 0);
        assert!(rec.write(Attribute::FanSpeedRpm, AttrValue::Unsigned(4200)));
        assert!(rec.take_dirty());
        assert!(!rec.write(Attribute::FanSpeedRpm, AttrValue::Unsigned(4200)));
        assert!(!rec.is_dirty());
    }

    #[test]
    fn first_bad_ts_update_is_silent() {
        let mut rec = ComponentRecord::new(ComponentFamily::Fan, 0);
        assert!(!rec.write_status(InterfaceStatus::Good, Some(10)));
        assert_eq!(rec.first_bad_ts(), Some(10));
        assert!(!rec.is_dirty());
        assert!(rec.write_status(InterfaceStatus::TransactionFailed, Some(10)));
        assert!(rec.is_dirty());
    }

    #[test]
    fn seeded_by_good_or_absent_only() {
        let mut rec = ComponentRecord::new(ComponentFamily::Fan, 0);
        assert!(!rec.is_seeded());
        rec.write_status(InterfaceStatus::Stale, Some(5));
        assert!(!rec.is_seeded());
        rec.write_status(InterfaceStatus::Absent, None);
        assert!(rec.is_seeded());
        rec.write_status(InterfaceStatus::TransactionFailed, Some(9));
        assert!(rec.is_seeded());
    }
}
