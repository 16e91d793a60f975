//! [`ChangeDetector`] – dirty-flag scan and notification.
//!
//! After synchronization the detector walks every declared family with
//! [`ComponentStore::for_each_changed`], which clears each dirty flag and
//! bumps the family revision.  One [`ChangeDescriptor`] is published per
//! changed record; the global revision is bumped once per scan in which any
//! family changed.

use chassis_middleware::NotificationSink;
use chassis_store::ComponentStore;
use chassis_types::{ChangeDescriptor, ChassisError, ComponentFamily};
use tracing::{debug, instrument, warn};

/// Result of one [`ChangeDetector::scan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Descriptors produced (published or not).
    pub changes: usize,
    /// Families with at least one changed record.
    pub families_changed: Vec<ComponentFamily>,
    /// Global revision after the scan.
    pub revision: u64,
}

#[derive(Debug, Default)]
pub struct ChangeDetector {
    published: u64,
    publish_failures: u64,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total descriptors successfully handed to a sink.
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Total descriptors the sink refused.
    pub fn publish_failures(&self) -> u64 {
        self.publish_failures
    }

    /// Scan every family, publish one descriptor per changed record.
    ///
    /// A sink failure is logged and counted; it never stops the scan, and
    /// the dirty flag is cleared regardless.
    #[instrument(skip_all)]
    pub fn scan(
        &mut self,
        store: &mut ComponentStore,
        sink: &dyn NotificationSink,
    ) -> Result<ScanReport, ChassisError> {
        let families: Vec<ComponentFamily> = store.families().collect();
        let mut report = ScanReport::default();

        for family in families {
            let mut changes = Vec::new();
            let visited = store.for_each_changed(family, |record| {
                changes.push(ChangeDescriptor {
                    family,
                    index: record.index(),
                    location: record.location(),
                    kind: family.payload_kind(),
                    status: record.status(),
                    revision: 0,
                });
            })?;
            if visited == 0 {
                continue;
            }
            let revision = store.family_revision(family);
            debug!(%family, changed = visited, revision, "family changed");
            report.families_changed.push(family);
            for mut change in changes {
                change.revision = revision;
                report.changes += 1;
                match sink.publish(change) {
                    Ok(()) => self.published += 1,
                    Err(e) => {
                        self.publish_failures += 1;
                        warn!(%family, error = %e, "change notification failed");
                    }
                }
            }
        }

        report.revision = if report.families_changed.is_empty() {
            store.revision()
        } else {
            store.bump_revision()
        };
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chassis_middleware::RecordingSink;
    use chassis_types::{Attribute, ChangeDescriptor, InterfaceStatus, Location};

    struct RefusingSink;

    impl NotificationSink for RefusingSink {
        fn publish(&self, _change: ChangeDescriptor) -> Result<(), ChassisError> {
            Err(ChassisError::Channel("closed".into()))
        }
    }

    fn store() -> ComponentStore {
        let mut store = ComponentStore::new(4096).unwrap();
        store.declare_family(ComponentFamily::PowerSupply, 256, 2).unwrap();
        store.declare_family(ComponentFamily::Fan, 96, 4).unwrap();
        store
    }

    #[test]
    fn clean_store_publishes_nothing() {
        let mut store = store();
        let sink = RecordingSink::new();
        let mut det = ChangeDetector::new();
        let report = det.scan(&mut store, &sink).unwrap();
        assert_eq!(report.changes, 0);
        assert_eq!(report.revision, 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn one_descriptor_per_changed_record() {
        let mut store = store();
        store.set(ComponentFamily::Fan, 2, Attribute::FanSpeedRpm, 5_000u64).unwrap();
        store.set_location(ComponentFamily::Fan, 2, Location::new(0, 2)).unwrap();
        store
            .set_status(ComponentFamily::PowerSupply, 1, InterfaceStatus::TransactionFailed, Some(0))
            .unwrap();

        let sink = RecordingSink::new();
        let mut det = ChangeDetector::new();
        let report = det.scan(&mut store, &sink).unwrap();
        assert_eq!(report.changes, 2);
        assert_eq!(
            report.families_changed,
            vec![ComponentFamily::PowerSupply, ComponentFamily::Fan]
        );
        assert_eq!(report.revision, 1);

        let seen = sink.take();
        assert_eq!(seen[0].family, ComponentFamily::PowerSupply);
        assert_eq!(seen[0].status, InterfaceStatus::TransactionFailed);
        assert_eq!(seen[1].location, Location::new(0, 2));
        assert_eq!(seen[1].revision, 1);
        assert_eq!(det.published(), 2);

        // Flags were cleared: a second scan is silent.
        let report = det.scan(&mut store, &sink).unwrap();
        assert_eq!(report.changes, 0);
        assert_eq!(report.revision, 1);
    }

    #[test]
    fn sink_failure_does_not_stop_the_scan() {
        let mut store = store();
        store.set(ComponentFamily::Fan, 0, Attribute::FanSpeedRpm, 1u64).unwrap();
        let mut det = ChangeDetector::new();
        let report = det.scan(&mut store, &RefusingSink).unwrap();
        assert_eq!(report.changes, 1);
        assert_eq!(det.publish_failures(), 1);
        assert_eq!(store.dirty_count(ComponentFamily::Fan), 0);
    }
}
