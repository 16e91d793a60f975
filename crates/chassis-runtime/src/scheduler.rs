//! [`Scheduler`] – the board lifecycle and the fixed-period tick.
//!
//! The scheduler owns everything the tick context mutates: the
//! [`ComponentStore`], the [`StatusSynchronizer`], the [`ChangeDetector`] and
//! the lifecycle FSM.  The command tracker and the FUP arbiter are shared
//! with other contexts behind their own locks.
//!
//! # Lifecycle
//!
//! 1. **SPECIALIZE** – identify the platform, find the local slot, size and
//!    create the store from the configured record sizes and the discovered
//!    instance counts.
//! 2. **ACTIVATE** – one unconditional full read seeds every record.
//! 3. **READY** – every period: synchronize → scan and notify → recheck
//!    pending commands.
//!
//! HIBERNATE and OFFLINE suspend ticking; resuming goes back through
//! ACTIVATE.  Fatal initialization errors land in FAIL.  Shutdown drains the
//! pending commands before releasing the store.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use chassis_hal::SimChassis;
//! use chassis_middleware::EventBus;
//! use chassis_runtime::{ChassisConfig, Scheduler};
//! use chassis_types::{BoardState, ManualClock};
//!
//! let clock = Arc::new(ManualClock::new(0));
//! let sim = SimChassis::builder().clock(clock.clone()).build();
//! let mut scheduler =
//!     Scheduler::new(ChassisConfig::default(), Box::new(sim), clock, EventBus::default()).unwrap();
//! scheduler.step().unwrap(); // SPECIALIZE → ACTIVATE
//! scheduler.step().unwrap(); // ACTIVATE → READY
//! assert_eq!(scheduler.state(), BoardState::Ready);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chassis_hal::{HardwareCommandSink, HardwareStatusSource, PlatformInfo};
use chassis_kernel::{BoardEvent, BoardLifecycle, CommandTracker, FupArbiter, FupGrant, Requester};
use chassis_middleware::{EventBus, NotificationSink, Topic};
use chassis_store::ComponentStore;
use chassis_types::{
    AttrValue, Attribute, BoardState, ChassisError, Clock, CommandOutcome, ComponentFamily, Event,
    EventPayload, FamilyScope,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::change_detector::{ChangeDetector, ScanReport};
use crate::commands::CommandDispatcher;
use crate::config::ChassisConfig;
use crate::synchronizer::{StatusSynchronizer, SyncReport};

const EVENT_SOURCE: &str = "chassis-runtime::scheduler";
/// FUP arbitration domain for the whole chassis.
pub const FUP_DOMAIN: &str = "chassis";

/// What one READY tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub sync: SyncReport,
    pub scan: ScanReport,
    /// Commands resolved by this tick's recheck.
    pub resolved: Vec<(Uuid, CommandOutcome)>,
}

/// Board lifecycle driver and tick orchestrator.
pub struct Scheduler {
    config: ChassisConfig,
    clock: Arc<dyn Clock>,
    source: Box<dyn HardwareStatusSource>,
    bus: EventBus,
    sink: Arc<dyn NotificationSink>,
    lifecycle: BoardLifecycle,
    store: Option<ComponentStore>,
    synchronizer: StatusSynchronizer,
    detector: ChangeDetector,
    tracker: CommandTracker,
    fup: Arc<FupArbiter>,
    platform: Option<PlatformInfo>,
    ticks: u64,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.lifecycle.state())
            .field("ticks", &self.ticks)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Build a scheduler in SPECIALIZE.  Change notifications go to `bus`.
    ///
    /// # Errors
    ///
    /// Returns the first configuration invariant `config` violates.
    pub fn new(
        config: ChassisConfig,
        source: Box<dyn HardwareStatusSource>,
        clock: Arc<dyn Clock>,
        bus: EventBus,
    ) -> Result<Self, ChassisError> {
        if let Err(e) = config.validate() {
            error!(error = %e, "invalid chassis configuration");
            return Err(e);
        }
        let synchronizer = StatusSynchronizer::new(&config);
        let fup = Arc::new(FupArbiter::new(FUP_DOMAIN, config.fup_deny_limit_secs));
        Ok(Self {
            sink: Arc::new(bus.clone()),
            config,
            clock,
            source,
            bus,
            lifecycle: BoardLifecycle::new(),
            store: None,
            synchronizer,
            detector: ChangeDetector::new(),
            tracker: CommandTracker::new(),
            fup,
            platform: None,
            ticks: 0,
        })
    }

    /// Send change notifications to `sink` instead of the bus.
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    // ── accessors ────────────────────────────────────────────────────────────

    pub fn state(&self) -> BoardState {
        self.lifecycle.state()
    }

    pub fn config(&self) -> &ChassisConfig {
        &self.config
    }

    /// The store, once SPECIALIZE has created it.
    pub fn store(&self) -> Option<&ComponentStore> {
        self.store.as_ref()
    }

    pub fn platform(&self) -> Option<&PlatformInfo> {
        self.platform.as_ref()
    }

    pub fn local_slot(&self) -> Option<u8> {
        self.synchronizer.local_slot()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn tracker(&self) -> &CommandTracker {
        &self.tracker
    }

    pub fn fup_arbiter(&self) -> Arc<FupArbiter> {
        Arc::clone(&self.fup)
    }

    pub fn synchronizer(&self) -> &StatusSynchronizer {
        &self.synchronizer
    }

    /// A dispatcher that issues writes through `sink` and tracks them in
    /// this scheduler's queue.
    pub fn command_dispatcher(&self, sink: Box<dyn HardwareCommandSink>) -> CommandDispatcher {
        CommandDispatcher::new(
            sink,
            self.tracker.clone(),
            Arc::clone(&self.clock),
            self.config.command_timeout_secs,
        )
    }

    // ── lifecycle ────────────────────────────────────────────────────────────

    /// Advance by one step: specialize, activate or tick depending on the
    /// current state.  Returns the tick report for READY ticks.
    pub fn step(&mut self) -> Result<Option<TickReport>, ChassisError> {
        match self.state() {
            BoardState::Specialize => self.specialize().map(|_| None),
            BoardState::Activate => self.activate().map(|_| None),
            BoardState::Ready => self.tick().map(Some),
            BoardState::Hibernate | BoardState::Offline | BoardState::Fail | BoardState::Destroy => {
                Ok(None)
            }
        }
    }

    /// SPECIALIZE: identify, size and create the store.
    pub fn specialize(&mut self) -> Result<(), ChassisError> {
        self.expect_state(BoardState::Specialize, "specialize")?;
        match self.build_store() {
            Ok(store) => {
                self.store = Some(store);
                self.transition(BoardEvent::Specialized)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// ACTIVATE: unconditional full read of every family.
    pub fn activate(&mut self) -> Result<(), ChassisError> {
        self.expect_state(BoardState::Activate, "activate")?;
        match self.seed_store() {
            Ok(()) => self.transition(BoardEvent::Activated),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn seed_store(&mut self) -> Result<(), ChassisError> {
        if self.store.is_none() {
            // Resumed after the store was released; rebuild it.
            self.store = Some(self.build_store()?);
        }
        self.run_pipeline(true).map(|_| ())
    }

    /// One READY tick.
    pub fn tick(&mut self) -> Result<TickReport, ChassisError> {
        self.expect_state(BoardState::Ready, "tick")?;
        let report = self.run_pipeline(false)?;
        self.ticks += 1;
        Ok(report)
    }

    pub fn hibernate(&mut self) -> Result<(), ChassisError> {
        self.transition(BoardEvent::Hibernate)
    }

    pub fn go_offline(&mut self) -> Result<(), ChassisError> {
        self.transition(BoardEvent::GoOffline)
    }

    /// Leave HIBERNATE/OFFLINE.  The next step re-seeds the store.
    pub fn resume(&mut self) -> Result<(), ChassisError> {
        self.transition(BoardEvent::Resume)?;
        self.synchronizer.reset();
        Ok(())
    }

    /// Drain pending commands, release the store and enter DESTROY.
    /// Returns the number of commands drained.
    pub fn shutdown(&mut self) -> Result<usize, ChassisError> {
        let drained = self.tracker.drain();
        if let Some(store) = self.store.take() {
            store.release();
        }
        self.transition(BoardEvent::Shutdown)?;
        info!(drained, ticks = self.ticks, "scheduler shut down");
        Ok(drained)
    }

    /// Record a fatal error and enter FAIL.
    pub fn fail(&mut self, reason: &ChassisError) {
        error!(error = %reason, state = %self.state(), "fatal board error");
        let fault = Event::new(
            EVENT_SOURCE,
            EventPayload::HardwareFault {
                component: "board".to_string(),
                code: 0,
                message: reason.to_string(),
            },
        );
        let _ = self.bus.publish_to(Topic::Alerts, fault);
        if let Err(e) = self.transition(BoardEvent::Fatal) {
            warn!(error = %e, "could not enter FAIL");
        }
    }

    // ── FUP ──────────────────────────────────────────────────────────────────

    /// Ask for the chassis FUP lock on behalf of `requester`.
    pub fn request_fup(&self, requester: &Requester) -> Result<FupGrant, ChassisError> {
        let grant = self.fup.acquire(requester, self.clock.now())?;
        let reclaimed_from = match &grant {
            FupGrant::Reclaimed { from, .. } => Some(from.clone()),
            FupGrant::Fresh | FupGrant::Renewed => None,
        };
        let event = Event::new(
            EVENT_SOURCE,
            EventPayload::FupGranted {
                domain: FUP_DOMAIN.to_string(),
                holder: requester.name.clone(),
                reclaimed_from,
            },
        );
        let _ = self.bus.publish_to(Topic::Alerts, event);
        Ok(grant)
    }

    /// Release the chassis FUP lock.  Only the holder can release.
    pub fn release_fup(&self, requester: &Requester) -> bool {
        let released = self.fup.release(requester);
        if released {
            let event = Event::new(
                EVENT_SOURCE,
                EventPayload::FupReleased {
                    domain: FUP_DOMAIN.to_string(),
                    holder: requester.name.clone(),
                },
            );
            let _ = self.bus.publish_to(Topic::Alerts, event);
        }
        released
    }

    // ── async driver ─────────────────────────────────────────────────────────

    /// Step every tick period until `shutdown` is raised, `max_ticks` steps
    /// have run, or the board reaches a terminal state; then shut down.
    ///
    /// Returns the number of steps taken.
    pub async fn run(
        &mut self,
        shutdown: Arc<AtomicBool>,
        max_ticks: Option<u64>,
    ) -> Result<u64, ChassisError> {
        let mut interval = tokio::time::interval(self.config.tick_period());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut steps = 0u64;
        info!(period_secs = self.config.tick_period_secs, "scheduler running");

        loop {
            if max_ticks.is_some_and(|max| steps >= max) {
                break;
            }
            interval.tick().await;
            if shutdown.load(Ordering::SeqCst) {
                info!("shutdown requested");
                break;
            }
            if let Err(e) = self.step() {
                warn!(error = %e, state = %self.state(), "scheduler step failed");
            }
            steps += 1;
            if self.lifecycle.is_terminal() {
                break;
            }
        }

        if self.state() != BoardState::Destroy {
            self.shutdown()?;
        }
        Ok(steps)
    }

    // ── internals ────────────────────────────────────────────────────────────

    fn expect_state(&self, expected: BoardState, op: &str) -> Result<(), ChassisError> {
        if self.state() == expected {
            Ok(())
        } else {
            Err(ChassisError::InvalidTransition {
                from: self.state(),
                event: op.to_string(),
            })
        }
    }

    fn transition(&mut self, event: BoardEvent) -> Result<(), ChassisError> {
        let (from, to) = self.lifecycle.apply(event)?;
        let event = Event::new(EVENT_SOURCE, EventPayload::LifecycleTransition { from, to });
        let _ = self.bus.publish_to(Topic::Lifecycle, event);
        Ok(())
    }

    /// Identify the platform and lay out a fresh store.
    fn build_store(&mut self) -> Result<ComponentStore, ChassisError> {
        let platform = self.source.identify()?;
        info!(platform = %platform.platform, slots = platform.slot_count, "platform identified");

        let identity = self.source.read_status(ComponentFamily::BoardIdentity);
        let local_slot = identity
            .instances
            .first()
            .filter(|_| identity.outcome.is_success())
            .and_then(|i| i.field(Attribute::SlotId))
            .and_then(AttrValue::as_unsigned)
            .and_then(|s| u8::try_from(s).ok())
            .ok_or_else(|| ChassisError::HardwareFault {
                component: ComponentFamily::BoardIdentity.to_string(),
                details: "board identity unreadable".to_string(),
            })?;
        self.synchronizer.set_local_slot(local_slot);

        let mut store = ComponentStore::with_limits(self.config.block_capacity, self.config.max_blocks)?;
        let families: Vec<ComponentFamily> = self.synchronizer.order().collect();
        for family in families {
            let Some(fc) = self.config.family(family) else {
                continue;
            };
            let count = match fc.instance_count {
                Some(n) => n,
                None => {
                    let slot = match family.scope() {
                        FamilyScope::LocalSlot => Some(local_slot),
                        FamilyScope::Chassis => None,
                    };
                    self.source.instance_count(family, slot)?
                }
            };
            store.declare_family(family, fc.record_size, count)?;
        }
        info!(
            local_slot,
            blocks = store.block_count(),
            families = store.families().count(),
            "component store created"
        );
        self.platform = Some(platform);
        Ok(store)
    }

    #[instrument(skip(self))]
    fn run_pipeline(&mut self, force: bool) -> Result<TickReport, ChassisError> {
        let now = self.clock.now();
        let store = self
            .store
            .as_mut()
            .ok_or_else(|| ChassisError::Config("component store not created".to_string()))?;

        let sync = self
            .synchronizer
            .sync_all(self.source.as_mut(), store, now, force)?;
        let scan = self.detector.scan(store, self.sink.as_ref())?;
        let resolved = self.tracker.recheck_all(store, now);

        for (command_id, outcome) in &resolved {
            let event = Event::new(
                EVENT_SOURCE,
                EventPayload::CommandCompleted {
                    command_id: *command_id,
                    outcome: outcome.clone(),
                },
            );
            let _ = self.bus.publish_to(Topic::Commands, event);
        }
        Ok(TickReport {
            sync,
            scan,
            resolved,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chassis_hal::{HardwareCommand, SimChassis};
    use chassis_middleware::RecordingSink;
    use crate::config::DEFAULT_POWER_WINDOW_LEN;
    use chassis_kernel::CommandTicket;
    use chassis_types::{
        CommandFailure, InterfaceStatus, LedColor, Location, ManualClock, Presence, RawOutcome,
    };
    use std::collections::HashSet;

    struct Harness {
        clock: ManualClock,
        sim: SimChassis,
        sink: RecordingSink,
        scheduler: Scheduler,
    }

    fn harness_with(config: ChassisConfig, fans: u8) -> Harness {
        let clock = ManualClock::new(0);
        let sim = SimChassis::builder()
            .clock(Arc::new(clock.clone()))
            .slots(2)
            .local_slot(1)
            .fans(fans)
            .build();
        let sink = RecordingSink::new();
        let scheduler = Scheduler::new(
            config,
            Box::new(sim.clone()),
            Arc::new(clock.clone()),
            EventBus::default(),
        )
        .unwrap()
        .with_sink(Arc::new(sink.clone()));
        Harness {
            clock,
            sim,
            sink,
            scheduler,
        }
    }

    fn ready(fans: u8) -> Harness {
        let mut h = harness_with(ChassisConfig::default(), fans);
        h.scheduler.step().unwrap();
        h.scheduler.step().unwrap();
        assert_eq!(h.scheduler.state(), BoardState::Ready);
        h.sink.take();
        h
    }

    #[test]
    fn specialize_sizes_store_from_hardware() {
        let mut h = harness_with(ChassisConfig::default(), 4);
        h.scheduler.specialize().unwrap();
        assert_eq!(h.scheduler.state(), BoardState::Activate);
        assert_eq!(h.scheduler.local_slot(), Some(1));
        let store = h.scheduler.store().unwrap();
        assert_eq!(store.count(ComponentFamily::Fan), 4);
        assert_eq!(store.count(ComponentFamily::ManagementModule), 2);
        // Local-slot families only count the local slot's instances.
        assert_eq!(store.count(ComponentFamily::FirmwareUpgrade), 2);
        assert_eq!(store.count(ComponentFamily::BoardIdentity), 1);
        assert_eq!(h.scheduler.platform().unwrap().slot_count, 2);
    }

    #[test]
    fn activation_seeds_every_record() {
        let mut h = harness_with(ChassisConfig::default(), 4);
        h.scheduler.step().unwrap();
        h.scheduler.step().unwrap();
        assert_eq!(h.scheduler.state(), BoardState::Ready);
        // Every populated record changed exactly once during activation.
        let total: usize = ComponentFamily::ALL
            .iter()
            .map(|f| h.scheduler.store().unwrap().count(*f))
            .sum();
        assert_eq!(h.sink.len(), total);
        assert_eq!(h.scheduler.store().unwrap().revision(), 1);
    }

    #[test]
    fn unreachable_hardware_fails_initialization() {
        let mut h = harness_with(ChassisConfig::default(), 4);
        h.sim.set_reachable(false);
        let err = h.scheduler.step().unwrap_err();
        assert!(matches!(err, ChassisError::HardwareFault { .. }));
        assert_eq!(h.scheduler.state(), BoardState::Fail);
        assert!(h.scheduler.store().is_none());
        // Ticking a failed board is a no-op.
        assert!(h.scheduler.step().unwrap().is_none());
    }

    #[test]
    fn store_exhaustion_fails_initialization() {
        let config = ChassisConfig {
            block_capacity: 512,
            max_blocks: 2,
            ..ChassisConfig::default()
        };
        let mut h = harness_with(config, 4);
        let err = h.scheduler.specialize().unwrap_err();
        assert!(matches!(err, ChassisError::StoreExhausted(_)));
        assert_eq!(h.scheduler.state(), BoardState::Fail);
    }

    #[test]
    fn failed_activation_read_marks_records_unknown() {
        let mut h = harness_with(ChassisConfig::default(), 4);
        h.sim.fail_family(ComponentFamily::Fan, RawOutcome::Timeout);
        h.scheduler.step().unwrap();
        h.scheduler.step().unwrap();
        assert_eq!(h.scheduler.state(), BoardState::Ready);

        let store = h.scheduler.store().unwrap();
        for index in 0..4 {
            assert_eq!(store.status(ComponentFamily::Fan, index).unwrap(), InterfaceStatus::Stale);
            assert_eq!(
                store.get(ComponentFamily::Fan, index, Attribute::Presence).unwrap(),
                Some(&AttrValue::Presence(Presence::Unknown))
            );
        }
        let fan_changes: Vec<_> = h
            .sink
            .take()
            .into_iter()
            .filter(|c| c.family == ComponentFamily::Fan)
            .collect();
        assert_eq!(fan_changes.len(), 4, "one notification per fan");
        assert!(fan_changes.iter().all(|c| c.status == InterfaceStatus::Stale));
    }

    #[test]
    fn activation_error_enters_fail() {
        let mut h = harness_with(ChassisConfig::default(), 4);
        h.scheduler.specialize().unwrap();
        let mut alerts = h.scheduler.bus().subscribe_to(Topic::Alerts);
        h.sim.set_reachable(false);
        h.scheduler.store = None;

        assert!(h.scheduler.activate().is_err());
        assert_eq!(h.scheduler.state(), BoardState::Fail);
        assert!(h.scheduler.store().is_none());
        assert!(
            alerts
                .drain()
                .iter()
                .any(|e| matches!(e.payload, EventPayload::HardwareFault { .. }))
        );
    }

    #[test]
    fn unchanged_chassis_produces_no_notifications() {
        let mut h = ready(4);
        for _ in 0..5 {
            h.clock.advance(3);
            let report = h.scheduler.tick().unwrap();
            assert_eq!(report.scan.changes, 0);
        }
        assert!(h.sink.is_empty());
        assert_eq!(h.scheduler.ticks(), 5);
    }

    #[test]
    fn persistent_failure_flips_once_with_one_notification() {
        // Four fans, 60 s window; failures at t=0, 20, 45 keep GOOD, t=65
        // flips to TRANSACTION-FAILED.
        let mut h = ready(4);
        h.sim.fail_family(ComponentFamily::Fan, RawOutcome::Failed { code: 0x21 });

        let fan_status = |h: &Harness| h.scheduler.store().unwrap().status(ComponentFamily::Fan, 0).unwrap();
        for t in [0, 20, 45] {
            h.clock.set(t);
            h.scheduler.tick().unwrap();
            assert_eq!(fan_status(&h), InterfaceStatus::Good, "t={t}");
        }
        assert!(h.sink.take().iter().all(|c| c.family != ComponentFamily::Fan));

        h.clock.set(65);
        h.scheduler.tick().unwrap();
        assert_eq!(fan_status(&h), InterfaceStatus::TransactionFailed);
        let fan_changes: Vec<_> = h
            .sink
            .take()
            .into_iter()
            .filter(|c| c.family == ComponentFamily::Fan)
            .collect();
        assert_eq!(fan_changes.len(), 4, "one notification per fan");
        assert!(fan_changes.iter().all(|c| c.status == InterfaceStatus::TransactionFailed));

        // Staying failed is silent.
        h.clock.set(68);
        h.scheduler.tick().unwrap();
        assert!(h.sink.take().iter().all(|c| c.family != ComponentFamily::Fan));

        // Recovery reports GOOD again.
        h.sim.clear_family_fault(ComponentFamily::Fan);
        h.clock.set(71);
        h.scheduler.tick().unwrap();
        assert_eq!(fan_status(&h), InterfaceStatus::Good);
        assert_eq!(
            h.sink
                .take()
                .iter()
                .filter(|c| c.family == ComponentFamily::Fan)
                .count(),
            4
        );
    }

    #[test]
    fn descriptors_carry_location_and_kind() {
        let mut h = ready(4);
        h.sim.set_field(ComponentFamily::Fan, 2, Attribute::FanSpeedRpm, 7_000u64);
        h.clock.advance(3);
        h.scheduler.tick().unwrap();
        let changes = h.sink.take();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].index, 2);
        assert_eq!(changes[0].location, Location::new(0, 2));
        assert_eq!(changes[0].kind, ComponentFamily::Fan.payload_kind());
    }

    #[test]
    fn dispatched_command_completes_on_next_tick() {
        let mut h = ready(4);
        let dispatcher = h.scheduler.command_dispatcher(Box::new(h.sim.clone()));
        let mut ticket = dispatcher
            .submit(HardwareCommand::SetFanSpeed { index: 1, percent: 80 })
            .unwrap();
        assert_eq!(ticket.try_outcome(), None);

        h.clock.advance(3);
        let report = h.scheduler.tick().unwrap();
        assert_eq!(report.resolved, vec![(ticket.id(), CommandOutcome::Succeeded)]);
        assert_eq!(ticket.try_outcome(), Some(CommandOutcome::Succeeded));
        assert!(h.scheduler.tracker().is_empty());
    }

    #[test]
    fn commands_from_other_threads_resolve_exactly_once() {
        let mut h = ready(4);
        let dispatcher = h.scheduler.command_dispatcher(Box::new(h.sim.clone()));
        let mut resolved: Vec<(Uuid, CommandOutcome)> = Vec::new();

        let mut tickets: Vec<CommandTicket> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..4u64)
                .map(|t| {
                    let dispatcher = dispatcher.clone();
                    scope.spawn(move || {
                        (0..5)
                            .map(|_| {
                                dispatcher
                                    .submit(HardwareCommand::SetFanSpeed {
                                        index: t as usize,
                                        percent: 40 + t,
                                    })
                                    .unwrap()
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            while workers.iter().any(|w| !w.is_finished()) {
                resolved.extend(h.scheduler.tick().unwrap().resolved);
            }
            workers
                .into_iter()
                .flat_map(|w| w.join().unwrap())
                .collect()
        });
        resolved.extend(h.scheduler.tick().unwrap().resolved);

        assert_eq!(tickets.len(), 20);
        assert_eq!(resolved.len(), 20);
        let resolved_ids: HashSet<Uuid> = resolved.iter().map(|(id, _)| *id).collect();
        assert_eq!(resolved_ids.len(), 20, "no command resolved twice");
        let ticket_ids: HashSet<Uuid> = tickets.iter().map(CommandTicket::id).collect();
        assert_eq!(resolved_ids, ticket_ids);
        assert!(resolved.iter().all(|(_, o)| *o == CommandOutcome::Succeeded));
        for ticket in &mut tickets {
            assert_eq!(ticket.try_outcome(), Some(CommandOutcome::Succeeded));
        }
        assert!(h.scheduler.tracker().is_empty());
    }

    #[test]
    fn unconfirmed_command_times_out() {
        let mut h = ready(4);
        h.sim.set_apply_commands(false);
        let dispatcher = h.scheduler.command_dispatcher(Box::new(h.sim.clone()));
        let mut ticket = dispatcher
            .submit(HardwareCommand::SetLed {
                family: ComponentFamily::PowerSupply,
                index: 0,
                color: LedColor::Amber,
            })
            .unwrap();
        for _ in 0..9 {
            h.clock.advance(3);
            h.scheduler.tick().unwrap();
            assert_eq!(ticket.try_outcome(), None);
        }
        h.clock.advance(3);
        h.scheduler.tick().unwrap();
        assert_eq!(
            ticket.try_outcome(),
            Some(CommandOutcome::Failed {
                reason: CommandFailure::TimedOut
            })
        );
    }

    #[test]
    fn unrecognized_opcode_fails_on_next_recheck() {
        let mut h = ready(4);
        let dispatcher = h.scheduler.command_dispatcher(Box::new(h.sim.clone()));
        let mut ticket = dispatcher
            .submit(HardwareCommand::Raw {
                opcode: 0x7e,
                family: ComponentFamily::Fan,
                index: 0,
            })
            .unwrap();
        h.clock.advance(3);
        h.scheduler.tick().unwrap();
        assert_eq!(
            ticket.try_outcome(),
            Some(CommandOutcome::Failed {
                reason: CommandFailure::UnrecognizedOpcode(0x7e)
            })
        );
    }

    #[test]
    fn fup_is_arbitrated_and_announced() {
        let h = ready(4);
        let mut alerts = h.scheduler.bus().subscribe_to(Topic::Alerts);
        let mm0 = Requester::new("mm0", Location::new(0, 0));
        let mm1 = Requester::new("mm1", Location::new(1, 0));

        assert_eq!(h.scheduler.request_fup(&mm0).unwrap(), FupGrant::Fresh);
        h.clock.advance(599);
        assert!(matches!(
            h.scheduler.request_fup(&mm1),
            Err(ChassisError::FupDenied { .. })
        ));
        h.clock.advance(1);
        assert!(matches!(
            h.scheduler.request_fup(&mm1).unwrap(),
            FupGrant::Reclaimed { .. }
        ));
        assert!(!h.scheduler.release_fup(&mm0));
        assert!(h.scheduler.release_fup(&mm1));

        let events = alerts.drain();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[1].payload,
            EventPayload::FupGranted { reclaimed_from: Some(from), .. } if from == "mm0"
        ));
        assert!(matches!(events[2].payload, EventPayload::FupReleased { .. }));
    }

    #[test]
    fn hibernate_and_resume_reseed_through_activate() {
        let mut h = ready(4);
        for _ in 0..DEFAULT_POWER_WINDOW_LEN {
            h.clock.advance(3);
            h.scheduler.tick().unwrap();
        }
        let psu_average =
            |h: &Harness| h.scheduler.synchronizer().power_average(ComponentFamily::PowerSupply, 0);
        assert!(psu_average(&h).is_some());
        // The SSD is sampled once a minute and was last read at activation.
        let ssd_reads = h.sim.read_count(ComponentFamily::SolidStateDevice);

        h.scheduler.hibernate().unwrap();
        h.clock.advance(3);
        assert!(h.scheduler.step().unwrap().is_none());
        assert!(h.scheduler.tick().is_err());

        h.scheduler.resume().unwrap();
        assert_eq!(h.scheduler.state(), BoardState::Activate);
        assert_eq!(psu_average(&h), None);
        h.scheduler.step().unwrap();
        assert_eq!(h.scheduler.state(), BoardState::Ready);
        assert_eq!(h.sim.read_count(ComponentFamily::SolidStateDevice), ssd_reads + 1);
        assert_eq!(psu_average(&h), None);
    }

    #[test]
    fn shutdown_drains_pending_commands() {
        let mut h = ready(4);
        h.sim.set_apply_commands(false);
        let dispatcher = h.scheduler.command_dispatcher(Box::new(h.sim.clone()));
        let mut ticket = dispatcher
            .submit(HardwareCommand::SetFanSpeed { index: 0, percent: 90 })
            .unwrap();
        assert_eq!(h.scheduler.shutdown().unwrap(), 1);
        assert_eq!(h.scheduler.state(), BoardState::Destroy);
        assert!(h.scheduler.store().is_none());
        assert_eq!(
            ticket.try_outcome(),
            Some(CommandOutcome::Failed {
                reason: CommandFailure::Drained
            })
        );
    }

    #[test]
    fn lifecycle_transitions_are_published() {
        let mut h = harness_with(ChassisConfig::default(), 2);
        let mut lifecycle = h.scheduler.bus().subscribe_to(Topic::Lifecycle);
        h.scheduler.step().unwrap();
        h.scheduler.step().unwrap();
        let states: Vec<BoardState> = lifecycle
            .drain()
            .into_iter()
            .filter_map(|e| match e.payload {
                EventPayload::LifecycleTransition { to, .. } => Some(to),
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![BoardState::Activate, BoardState::Ready]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_after_max_ticks() {
        let mut h = harness_with(ChassisConfig::default(), 2);
        let steps = h
            .scheduler
            .run(Arc::new(AtomicBool::new(false)), Some(4))
            .await
            .unwrap();
        assert_eq!(steps, 4);
        // specialize + activate + two READY ticks.
        assert_eq!(h.scheduler.ticks(), 2);
        assert_eq!(h.scheduler.state(), BoardState::Destroy);
    }

    #[tokio::test(start_paused = true)]
    async fn run_with_zero_ticks_takes_no_step() {
        let mut h = harness_with(ChassisConfig::default(), 2);
        let steps = h
            .scheduler
            .run(Arc::new(AtomicBool::new(false)), Some(0))
            .await
            .unwrap();
        assert_eq!(steps, 0);
        assert_eq!(h.sim.read_count(ComponentFamily::BoardIdentity), 0);
        assert_eq!(h.scheduler.state(), BoardState::Destroy);
        assert!(h.scheduler.store().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn run_honours_shutdown_flag() {
        let mut h = harness_with(ChassisConfig::default(), 2);
        let flag = Arc::new(AtomicBool::new(true));
        let steps = h.scheduler.run(flag, None).await.unwrap();
        assert_eq!(steps, 0);
        assert_eq!(h.scheduler.state(), BoardState::Destroy);
    }
}
