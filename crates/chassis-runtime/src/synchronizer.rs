//! [`StatusSynchronizer`] – read → classify → translate → store.
//!
//! Once per tick every configured family is read from the
//! [`HardwareStatusSource`], each record is classified, and the recognised
//! fields are written into the [`ComponentStore`].  Store writes only set
//! dirty flags when a value actually changed, so an unchanged chassis
//! produces no work for the change detector.
//!
//! # Ordering
//!
//! The board-identity family is always read first: it tells us which slot
//! this controller occupies.  Chassis-wide families follow, then the
//! local-slot families whose instances are filtered to that slot.  Instance
//! traversal order from the source determines store indices.
//!
//! # Translation rules
//!
//! | Read | Classified | Store effect |
//! |---|---|---|
//! | success | GOOD | fields written, EIR window fed |
//! | device absent | ABSENT | presence = absent |
//! | failure | TRANSACTION-FAILED / STALE | presence = unknown, other fields kept |
//! | failure | tolerated (previous status) | nothing written |
//! | failure before any good or absent read | STALE | presence = unknown |
//! | aged success | STALE | nothing written |
//!
//! A record with no counterpart in a successful summary is treated as
//! absent.

use std::collections::HashMap;

use chassis_hal::{HardwareStatusSource, InstanceStatus, StatusSummary};
use chassis_kernel::classify;
use chassis_store::{ComponentStore, PowerSampleWindow};
use chassis_types::{
    AttrValue, Attribute, ChassisError, ComponentFamily, FamilyScope, InterfaceStatus, Presence,
    RawOutcome, Timestamp,
};
use tracing::{debug, instrument, warn};

use crate::config::ChassisConfig;

/// Outcome of one [`StatusSynchronizer::sync_all`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Families read from the source.
    pub families_read: usize,
    /// Families skipped because their slow sub-period has not elapsed.
    pub families_skipped: usize,
    /// Records whose stored state changed.
    pub records_changed: usize,
}

#[derive(Debug, Clone)]
struct FamilyPlan {
    family: ComponentFamily,
    max_staleness_secs: u64,
    sample_interval_secs: Option<u64>,
    last_read: Option<Timestamp>,
}

impl FamilyPlan {
    fn is_due(&self, now: Timestamp) -> bool {
        match (self.sample_interval_secs, self.last_read) {
            (Some(interval), Some(last)) => now.saturating_sub(last) >= interval,
            _ => true,
        }
    }
}

/// Per-tick synchronization of hardware status into the store.
#[derive(Debug)]
pub struct StatusSynchronizer {
    plans: Vec<FamilyPlan>,
    local_slot: Option<u8>,
    power_windows: HashMap<(ComponentFamily, usize), PowerSampleWindow>,
    power_window_len: usize,
}

impl StatusSynchronizer {
    pub fn new(config: &ChassisConfig) -> Self {
        let mut plans: Vec<FamilyPlan> = config
            .families
            .iter()
            .map(|fc| FamilyPlan {
                family: fc.family,
                max_staleness_secs: fc.max_staleness_secs,
                sample_interval_secs: fc.sample_interval_secs,
                last_read: None,
            })
            .collect();
        // Stable: identity, then chassis-wide, then local-slot families.
        plans.sort_by_key(|p| match (p.family.is_identity(), p.family.scope()) {
            (true, _) => 0,
            (false, FamilyScope::Chassis) => 1,
            (false, FamilyScope::LocalSlot) => 2,
        });
        Self {
            plans,
            local_slot: None,
            power_windows: HashMap::new(),
            power_window_len: config.power_window_len,
        }
    }

    /// Families in synchronization order.
    pub fn order(&self) -> impl Iterator<Item = ComponentFamily> + '_ {
        self.plans.iter().map(|p| p.family)
    }

    pub fn local_slot(&self) -> Option<u8> {
        self.local_slot
    }

    pub fn set_local_slot(&mut self, slot: u8) {
        self.local_slot = Some(slot);
    }

    /// Forget sampling history and EIR windows, e.g. after leaving
    /// hibernation.
    pub fn reset(&mut self) {
        for plan in &mut self.plans {
            plan.last_read = None;
        }
        self.power_windows.clear();
    }

    /// Rolling input-power average of one record, if its window is full.
    pub fn power_average(&self, family: ComponentFamily, index: usize) -> Option<u64> {
        self.power_windows.get(&(family, index)).and_then(|w| w.average())
    }

    /// Read and store every due family.  `force` ignores slow sub-periods.
    #[instrument(skip(self, source, store))]
    pub fn sync_all(
        &mut self,
        source: &mut dyn HardwareStatusSource,
        store: &mut ComponentStore,
        now: Timestamp,
        force: bool,
    ) -> Result<SyncReport, ChassisError> {
        let mut report = SyncReport::default();
        for i in 0..self.plans.len() {
            let plan = &self.plans[i];
            let family = plan.family;
            if !store.is_declared(family) {
                continue;
            }
            if !force && !plan.is_due(now) {
                report.families_skipped += 1;
                continue;
            }
            if family.scope() == FamilyScope::LocalSlot && self.local_slot.is_none() {
                warn!(%family, "local slot unknown; skipping local-slot family");
                report.families_skipped += 1;
                continue;
            }
            let max_staleness = plan.max_staleness_secs;

            let summary = source.read_status(family);
            report.records_changed += self.sync_family(store, &summary, max_staleness, now)?;
            report.families_read += 1;
            self.plans[i].last_read = Some(now);

            if family.is_identity() {
                self.refresh_local_slot(store);
            }
        }
        debug!(?report, "synchronization pass complete");
        Ok(report)
    }

    /// Apply one family summary to the store.  Returns the number of records
    /// whose stored state changed.
    pub fn sync_family(
        &mut self,
        store: &mut ComponentStore,
        summary: &StatusSummary,
        max_staleness_secs: u64,
        now: Timestamp,
    ) -> Result<usize, ChassisError> {
        let family = summary.family;
        let count = store.count(family);
        let slot = match family.scope() {
            FamilyScope::LocalSlot => self.local_slot,
            FamilyScope::Chassis => None,
        };
        let instances: Vec<&InstanceStatus> = if summary.outcome.is_success() {
            summary.instances_in(slot).collect()
        } else {
            Vec::new()
        };
        if instances.len() > count {
            debug!(
                %family,
                reported = instances.len(),
                declared = count,
                "ignoring instances beyond the declared count"
            );
        }

        let mut changed = 0;
        for index in 0..count {
            let (prev_status, first_bad_ts) = {
                let record = store.record(family, index)?;
                // Nothing to keep before the first real read.
                let prev = if record.is_seeded() {
                    record.status()
                } else {
                    InterfaceStatus::Stale
                };
                (prev, record.first_bad_ts())
            };
            let (outcome, instance) = if summary.outcome.is_success() {
                match instances.get(index) {
                    Some(inst) => (inst.outcome, Some(*inst)),
                    None => (RawOutcome::DeviceAbsent, None),
                }
            } else {
                (summary.outcome, None)
            };

            let c = classify(
                prev_status,
                &outcome,
                summary.sampled_at,
                now,
                max_staleness_secs,
                first_bad_ts,
            );

            let mut dirty = false;
            if let Some(inst) = instance {
                dirty |= store.set_location(family, index, inst.location)?;
            }
            match (outcome, c.status) {
                (RawOutcome::Success, InterfaceStatus::Good) => {
                    if let Some(inst) = instance {
                        dirty |= Self::write_fields(store, family, index, inst)?;
                    }
                }
                (RawOutcome::DeviceAbsent, InterfaceStatus::Absent) => {
                    dirty |= Self::write_presence(store, family, index, Presence::Absent)?;
                }
                (
                    RawOutcome::Failed { .. } | RawOutcome::Timeout,
                    InterfaceStatus::TransactionFailed | InterfaceStatus::Stale,
                ) => {
                    dirty |= Self::write_presence(store, family, index, Presence::Unknown)?;
                }
                _ => {}
            }
            dirty |= self.update_power(store, family, index, outcome, c.status, instance)?;

            if c.status != prev_status {
                debug!(%family, index, from = %prev_status, to = %c.status, "status changed");
            }
            dirty |= store.set_status(family, index, c.status, c.first_bad_ts)?;
            if dirty {
                changed += 1;
            }
        }
        Ok(changed)
    }

    // ── internals ────────────────────────────────────────────────────────────

    fn write_fields(
        store: &mut ComponentStore,
        family: ComponentFamily,
        index: usize,
        inst: &InstanceStatus,
    ) -> Result<bool, ChassisError> {
        let mut dirty = false;
        if inst.field(Attribute::Presence).is_none() {
            dirty |= Self::write_presence(store, family, index, Presence::Present)?;
        }
        for (attribute, value) in &inst.fields {
            // The average is derived here, never taken from the source.
            if *attribute == Attribute::AverageInputPowerMw {
                continue;
            }
            if !family.has_attribute(*attribute) {
                debug!(%family, ?attribute, "dropping unrecognised field");
                continue;
            }
            dirty |= store.set(family, index, *attribute, value.clone())?;
        }
        Ok(dirty)
    }

    fn write_presence(
        store: &mut ComponentStore,
        family: ComponentFamily,
        index: usize,
        presence: Presence,
    ) -> Result<bool, ChassisError> {
        if family.has_attribute(Attribute::Presence) {
            store.set(family, index, Attribute::Presence, presence)
        } else {
            Ok(false)
        }
    }

    fn update_power(
        &mut self,
        store: &mut ComponentStore,
        family: ComponentFamily,
        index: usize,
        outcome: RawOutcome,
        status: InterfaceStatus,
        instance: Option<&InstanceStatus>,
    ) -> Result<bool, ChassisError> {
        if !family.has_attribute(Attribute::AverageInputPowerMw) {
            return Ok(false);
        }
        let sample = instance
            .filter(|_| outcome.is_success() && status.is_good())
            .and_then(|i| i.field(Attribute::InputPowerMw))
            .and_then(AttrValue::as_unsigned);
        let len = self.power_window_len;
        let window = self
            .power_windows
            .entry((family, index))
            .or_insert_with(|| PowerSampleWindow::new(len));
        match sample.and_then(|mw| window.push(mw)) {
            Some(avg) => store.set(family, index, Attribute::AverageInputPowerMw, avg),
            None => {
                if sample.is_none() && window.is_valid() {
                    debug!(%family, index, "EIR window invalidated");
                    window.invalidate();
                }
                Ok(false)
            }
        }
    }

    fn refresh_local_slot(&mut self, store: &ComponentStore) {
        let Ok(record) = store.record(ComponentFamily::BoardIdentity, 0) else {
            return;
        };
        if !record.status().is_good() {
            return;
        }
        let slot = record
            .get(Attribute::SlotId)
            .and_then(AttrValue::as_unsigned)
            .and_then(|s| u8::try_from(s).ok());
        if let Some(slot) = slot {
            if self.local_slot != Some(slot) {
                debug!(slot, "local slot identified");
            }
            self.local_slot = Some(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chassis_hal::SimChassis;
    use chassis_types::{Clock, Location, ManualClock};
    use std::sync::Arc;

    fn setup(clock: &ManualClock) -> (ChassisConfig, SimChassis, ComponentStore, StatusSynchronizer) {
        let config = ChassisConfig {
            power_window_len: 3,
            ..ChassisConfig::default()
        };
        let mut sim = SimChassis::builder()
            .clock(Arc::new(clock.clone()))
            .slots(2)
            .local_slot(1)
            .fans(4)
            .build();
        let mut store = ComponentStore::new(config.block_capacity).unwrap();
        for fc in &config.families {
            let slot = match fc.family.scope() {
                FamilyScope::LocalSlot => Some(1),
                FamilyScope::Chassis => None,
            };
            let count = fc
                .instance_count
                .unwrap_or_else(|| sim.instance_count(fc.family, slot).unwrap());
            store.declare_family(fc.family, fc.record_size, count).unwrap();
        }
        let sync = StatusSynchronizer::new(&config);
        (config, sim, store, sync)
    }

    #[test]
    fn identity_is_synchronized_first() {
        let config = ChassisConfig::default();
        let sync = StatusSynchronizer::new(&config);
        let order: Vec<_> = sync.order().collect();
        assert_eq!(order[0], ComponentFamily::BoardIdentity);
        let first_local = order
            .iter()
            .position(|f| f.scope() == FamilyScope::LocalSlot)
            .unwrap();
        assert!(order[first_local..].iter().all(|f| f.scope() == FamilyScope::LocalSlot));
    }

    #[test]
    fn full_pass_populates_store_and_local_slot() {
        let clock = ManualClock::new(1_000);
        let (_, mut sim, mut store, mut sync) = setup(&clock);
        let report = sync.sync_all(&mut sim, &mut store, clock.now(), true).unwrap();
        assert_eq!(report.families_read, ComponentFamily::ALL.len());
        assert_eq!(sync.local_slot(), Some(1));

        assert_eq!(
            store.get(ComponentFamily::Fan, 3, Attribute::FanSpeedRpm).unwrap(),
            Some(&AttrValue::Unsigned(6_000))
        );
        // Local-slot families only hold the local slot's instances.
        assert_eq!(store.count(ComponentFamily::ResumeId), 2);
        assert_eq!(
            store.record(ComponentFamily::ResumeId, 0).unwrap().location(),
            Location::new(1, 0)
        );
    }

    #[test]
    fn identical_reads_leave_no_dirty_flags() {
        let clock = ManualClock::new(1_000);
        let (_, mut sim, mut store, mut sync) = setup(&clock);
        sync.sync_all(&mut sim, &mut store, clock.now(), true).unwrap();
        for f in ComponentFamily::ALL {
            store.for_each_changed(f, |_| {}).unwrap();
        }
        clock.advance(3);
        let report = sync.sync_all(&mut sim, &mut store, clock.now(), false).unwrap();
        assert_eq!(report.records_changed, 0);
        for f in ComponentFamily::ALL {
            assert_eq!(store.dirty_count(f), 0, "{f}");
        }
    }

    #[test]
    fn failure_preserves_values_and_marks_presence_unknown() {
        let clock = ManualClock::new(0);
        let (_, mut sim, mut store, mut sync) = setup(&clock);
        sync.sync_all(&mut sim, &mut store, 0, true).unwrap();

        sim.fail_family(ComponentFamily::Fan, RawOutcome::Timeout);
        for t in [3, 30, 59] {
            clock.set(t);
            sync.sync_all(&mut sim, &mut store, t, false).unwrap();
            assert_eq!(store.status(ComponentFamily::Fan, 0).unwrap(), InterfaceStatus::Good);
        }
        clock.set(63);
        sync.sync_all(&mut sim, &mut store, 63, false).unwrap();
        assert_eq!(
            store.status(ComponentFamily::Fan, 0).unwrap(),
            InterfaceStatus::TransactionFailed
        );
        assert_eq!(
            store.get(ComponentFamily::Fan, 0, Attribute::Presence).unwrap(),
            Some(&AttrValue::Presence(Presence::Unknown))
        );
        assert_eq!(
            store.get(ComponentFamily::Fan, 0, Attribute::FanSpeedRpm).unwrap(),
            Some(&AttrValue::Unsigned(6_000))
        );
    }

    #[test]
    fn failure_on_first_read_is_stale_with_unknown_presence() {
        let clock = ManualClock::new(0);
        let (_, mut sim, mut store, mut sync) = setup(&clock);
        sim.fail_family(ComponentFamily::Fan, RawOutcome::Timeout);
        let report = sync.sync_all(&mut sim, &mut store, 0, true).unwrap();
        assert!(report.records_changed >= 4);

        for index in 0..4 {
            assert_eq!(store.status(ComponentFamily::Fan, index).unwrap(), InterfaceStatus::Stale);
            assert_eq!(
                store.get(ComponentFamily::Fan, index, Attribute::Presence).unwrap(),
                Some(&AttrValue::Presence(Presence::Unknown))
            );
            assert!(!store.record(ComponentFamily::Fan, index).unwrap().is_seeded());
        }

        // Past the staleness window the failure escalates as usual.
        clock.set(60);
        sync.sync_all(&mut sim, &mut store, 60, false).unwrap();
        assert_eq!(
            store.status(ComponentFamily::Fan, 0).unwrap(),
            InterfaceStatus::TransactionFailed
        );

        sim.clear_family_fault(ComponentFamily::Fan);
        clock.set(63);
        sync.sync_all(&mut sim, &mut store, 63, false).unwrap();
        assert_eq!(store.status(ComponentFamily::Fan, 0).unwrap(), InterfaceStatus::Good);
        assert!(store.record(ComponentFamily::Fan, 0).unwrap().is_seeded());
    }

    #[test]
    fn aged_summary_is_stale() {
        let clock = ManualClock::new(500);
        let (_, mut sim, mut store, mut sync) = setup(&clock);
        sim.age_family(ComponentFamily::TemperatureSensor, 120);
        sync.sync_all(&mut sim, &mut store, 500, true).unwrap();
        assert_eq!(
            store.status(ComponentFamily::TemperatureSensor, 0).unwrap(),
            InterfaceStatus::Stale
        );
    }

    #[test]
    fn absent_and_missing_instances() {
        let clock = ManualClock::new(0);
        let (_, mut sim, mut store, mut sync) = setup(&clock);
        sim.set_instance_outcome(ComponentFamily::PowerSupply, 0, RawOutcome::DeviceAbsent);
        sim.remove_instance(ComponentFamily::Fan, 3);
        sync.sync_all(&mut sim, &mut store, 0, true).unwrap();

        assert_eq!(store.status(ComponentFamily::PowerSupply, 0).unwrap(), InterfaceStatus::Absent);
        assert_eq!(
            store.get(ComponentFamily::PowerSupply, 0, Attribute::Presence).unwrap(),
            Some(&AttrValue::Presence(Presence::Absent))
        );
        assert_eq!(store.status(ComponentFamily::Fan, 3).unwrap(), InterfaceStatus::Absent);
    }

    #[test]
    fn slow_family_waits_for_its_interval() {
        let clock = ManualClock::new(0);
        let (_, mut sim, mut store, mut sync) = setup(&clock);
        sync.sync_all(&mut sim, &mut store, 0, true).unwrap();
        assert_eq!(sim.read_count(ComponentFamily::SolidStateDevice), 1);

        for t in (3..60).step_by(3) {
            let report = sync.sync_all(&mut sim, &mut store, t, false).unwrap();
            assert_eq!(report.families_skipped, 1);
        }
        assert_eq!(sim.read_count(ComponentFamily::SolidStateDevice), 1);
        sync.sync_all(&mut sim, &mut store, 60, false).unwrap();
        assert_eq!(sim.read_count(ComponentFamily::SolidStateDevice), 2);
    }

    #[test]
    fn eir_average_after_full_window() {
        let clock = ManualClock::new(0);
        let (_, mut sim, mut store, mut sync) = setup(&clock);
        let avg = |store: &ComponentStore| {
            store
                .get(ComponentFamily::PowerConsumer, 0, Attribute::AverageInputPowerMw)
                .unwrap()
                .cloned()
        };
        for (t, mw) in [(0, 100_000u64), (3, 110_000), (6, 120_000)] {
            sim.set_field(ComponentFamily::PowerConsumer, 0, Attribute::InputPowerMw, mw);
            sync.sync_all(&mut sim, &mut store, t, t == 0).unwrap();
        }
        assert_eq!(avg(&store), Some(AttrValue::Unsigned(110_000)));
        assert_eq!(sync.power_average(ComponentFamily::PowerConsumer, 0), Some(110_000));

        // A failed read invalidates the window; the stored average stays.
        sim.fail_family(ComponentFamily::PowerConsumer, RawOutcome::Failed { code: 1 });
        sync.sync_all(&mut sim, &mut store, 9, false).unwrap();
        assert_eq!(sync.power_average(ComponentFamily::PowerConsumer, 0), None);
        assert_eq!(avg(&store), Some(AttrValue::Unsigned(110_000)));
    }

    #[test]
    fn local_slot_family_skipped_without_identity() {
        let clock = ManualClock::new(0);
        let (_, mut sim, mut store, mut sync) = setup(&clock);
        sim.fail_family(ComponentFamily::BoardIdentity, RawOutcome::Timeout);
        let report = sync.sync_all(&mut sim, &mut store, 0, true).unwrap();
        assert_eq!(sync.local_slot(), None);
        assert_eq!(report.families_skipped, 2);
    }
}
