//! In-process simulated chassis for headless testing.
//!
//! [`SimChassis`] implements both [`HardwareStatusSource`] and
//! [`HardwareCommandSink`] over a shared in-memory model of a chassis:
//! power supplies, fans, one management module per slot, resume PROMs and
//! firmware-upgradeable sub-assemblies per slot, temperature sensors, power
//! consumers and an optional solid-state device.
//!
//! Clones share the same model, so a test can hand one clone to the
//! scheduler and keep another to inject faults.
//!
//! # Stub behaviour
//!
//! | Operation | Behaviour |
//! |---|---|
//! | `read_status` | Returns the modelled fields, stamped with the clock time minus the family's injected age. |
//! | `execute` | Logs the command and, unless effects are held, writes its effect into the model.  Raw opcodes are accepted without effect. |
//! | `identify` | Fails with a hardware fault while the chassis is marked unreachable. |
//!
//! # Example
//!
//! ```rust
//! use chassis_hal::{HardwareStatusSource, SimChassis};
//! use chassis_types::{ComponentFamily, RawOutcome};
//!
//! let mut sim = SimChassis::builder().slots(2).fans(3).build();
//! let summary = sim.read_status(ComponentFamily::Fan);
//! assert_eq!(summary.outcome, RawOutcome::Success);
//! assert_eq!(summary.instances.len(), 3);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chassis_types::{
    AttrValue, Attribute, ChassisError, Clock, ComponentFamily, FamilyScope, LedColor, Location,
    Presence, RawOutcome, SystemClock,
};
use tracing::debug;

use crate::command_sink::{HardwareCommand, HardwareCommandSink};
use crate::source::{HardwareStatusSource, InstanceStatus, PlatformInfo, StatusSummary, locations};

// ────────────────────────────────────────────────────────────────────────────
// Model
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct SimInstance {
    location: Location,
    outcome: RawOutcome,
    fields: BTreeMap<Attribute, AttrValue>,
    removed: bool,
}

impl SimInstance {
    fn new(location: Location) -> Self {
        Self {
            location,
            outcome: RawOutcome::Success,
            fields: BTreeMap::new(),
            removed: false,
        }
    }

    fn with(mut self, attribute: Attribute, value: impl Into<AttrValue>) -> Self {
        self.fields.insert(attribute, value.into());
        self
    }
}

#[derive(Debug, Default)]
struct SimFamily {
    instances: Vec<SimInstance>,
    fault: Option<RawOutcome>,
    age_secs: u64,
    reads: u64,
}

#[derive(Debug)]
struct SimState {
    platform: String,
    slot_count: u8,
    local_slot: u8,
    reachable: bool,
    apply_commands: bool,
    families: HashMap<ComponentFamily, SimFamily>,
    command_log: Vec<HardwareCommand>,
}

impl SimState {
    /// Model instance addressed by a store index.  Local-slot families are
    /// indexed within the local slot only.
    fn instance_mut(&mut self, family: ComponentFamily, index: usize) -> Option<&mut SimInstance> {
        let local = self.local_slot;
        let fam = self.families.get_mut(&family)?;
        let mut live = fam.instances.iter_mut().filter(|i| !i.removed);
        match family.scope() {
            FamilyScope::Chassis => live.nth(index),
            FamilyScope::LocalSlot => live.filter(|i| i.location.slot == local).nth(index),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimChassis
// ────────────────────────────────────────────────────────────────────────────

/// Simulated chassis.  Clones share the same model.
#[derive(Clone)]
pub struct SimChassis {
    state: Arc<Mutex<SimState>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SimChassis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimChassis").finish_non_exhaustive()
    }
}

impl SimChassis {
    pub fn builder() -> SimChassisBuilder {
        SimChassisBuilder::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── fault injection ──────────────────────────────────────────────────────

    /// Make every read of `family` fail with `outcome` until cleared.
    pub fn fail_family(&self, family: ComponentFamily, outcome: RawOutcome) {
        debug!(%family, ?outcome, "sim: injecting family fault");
        self.lock().families.entry(family).or_default().fault = Some(outcome);
    }

    pub fn clear_family_fault(&self, family: ComponentFamily) {
        if let Some(fam) = self.lock().families.get_mut(&family) {
            fam.fault = None;
        }
    }

    /// Override the per-instance outcome of the `index`-th instance (in
    /// traversal order across the whole chassis).
    pub fn set_instance_outcome(&self, family: ComponentFamily, index: usize, outcome: RawOutcome) {
        if let Some(inst) = self
            .lock()
            .families
            .get_mut(&family)
            .and_then(|f| f.instances.get_mut(index))
        {
            inst.outcome = outcome;
        }
    }

    /// Overwrite one modelled field of the `index`-th instance.
    pub fn set_field(
        &self,
        family: ComponentFamily,
        index: usize,
        attribute: Attribute,
        value: impl Into<AttrValue>,
    ) {
        if let Some(inst) = self
            .lock()
            .families
            .get_mut(&family)
            .and_then(|f| f.instances.get_mut(index))
        {
            inst.fields.insert(attribute, value.into());
        }
    }

    /// Drop the `index`-th instance from future summaries.
    pub fn remove_instance(&self, family: ComponentFamily, index: usize) {
        if let Some(inst) = self
            .lock()
            .families
            .get_mut(&family)
            .and_then(|f| f.instances.get_mut(index))
        {
            inst.removed = true;
        }
    }

    /// Report `family`'s data as captured `secs` before the read.
    pub fn age_family(&self, family: ComponentFamily, secs: u64) {
        self.lock().families.entry(family).or_default().age_secs = secs;
    }

    /// Make `identify` fail (or succeed again).
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// When `false`, commands are logged but have no effect on the model.
    pub fn set_apply_commands(&self, apply: bool) {
        self.lock().apply_commands = apply;
    }

    // ── inspection ───────────────────────────────────────────────────────────

    /// Every command executed so far, oldest first.
    pub fn command_log(&self) -> Vec<HardwareCommand> {
        self.lock().command_log.clone()
    }

    /// Number of `read_status` calls made for `family`.
    pub fn read_count(&self, family: ComponentFamily) -> u64 {
        self.lock().families.get(&family).map_or(0, |f| f.reads)
    }

    pub fn local_slot(&self) -> u8 {
        self.lock().local_slot
    }
}

impl HardwareStatusSource for SimChassis {
    fn identify(&mut self) -> Result<PlatformInfo, ChassisError> {
        let state = self.lock();
        if !state.reachable {
            return Err(ChassisError::HardwareFault {
                component: "chassis".to_string(),
                details: "platform identification failed".to_string(),
            });
        }
        Ok(PlatformInfo {
            platform: state.platform.clone(),
            slot_count: state.slot_count,
        })
    }

    fn instance_locations(&mut self, family: ComponentFamily) -> Result<Vec<Location>, ChassisError> {
        let state = self.lock();
        if !state.reachable {
            return Err(ChassisError::HardwareFault {
                component: family.to_string(),
                details: "inventory unavailable".to_string(),
            });
        }
        Ok(state
            .families
            .get(&family)
            .map(|f| {
                f.instances
                    .iter()
                    .filter(|i| !i.removed)
                    .map(|i| i.location)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn read_status(&mut self, family: ComponentFamily) -> StatusSummary {
        let now = self.clock.now();
        let mut state = self.lock();
        let fam = state.families.entry(family).or_default();
        fam.reads += 1;
        if let Some(outcome) = fam.fault {
            return StatusSummary::failed(family, outcome, now);
        }
        let instances = fam
            .instances
            .iter()
            .filter(|i| !i.removed)
            .map(|i| InstanceStatus {
                location: i.location,
                outcome: i.outcome,
                fields: if i.outcome.is_success() {
                    i.fields.iter().map(|(a, v)| (*a, v.clone())).collect()
                } else {
                    Vec::new()
                },
            })
            .collect();
        StatusSummary {
            family,
            outcome: RawOutcome::Success,
            sampled_at: now.saturating_sub(fam.age_secs),
            instances,
        }
    }
}

impl HardwareCommandSink for SimChassis {
    fn execute(&mut self, command: &HardwareCommand) -> Result<(), ChassisError> {
        let mut state = self.lock();
        state.command_log.push(command.clone());
        debug!(?command, "sim: command executed");

        let (attr_writes, family, index): (Vec<(Attribute, AttrValue)>, _, _) = match command {
            HardwareCommand::SetLed { family, index, color } => {
                (vec![(Attribute::LedState, (*color).into())], *family, *index)
            }
            HardwareCommand::SetFanSpeed { index, percent } => (
                vec![
                    (Attribute::TargetSpeedPercent, (*percent).into()),
                    (Attribute::FanSpeedRpm, (percent * 120).into()),
                ],
                ComponentFamily::Fan,
                *index,
            ),
            HardwareCommand::SetPortSpeed { index, mbps } => (
                vec![(Attribute::PortSpeedMbps, (*mbps).into())],
                ComponentFamily::ManagementModule,
                *index,
            ),
            HardwareCommand::ActivateFirmware { index, version } => (
                vec![
                    (Attribute::FirmwareVersion, version.as_str().into()),
                    (Attribute::UpgradeState, "active".into()),
                ],
                ComponentFamily::FirmwareUpgrade,
                *index,
            ),
            HardwareCommand::Raw { family, index, .. } => (Vec::new(), *family, *index),
        };

        let apply = state.apply_commands;
        let inst = state.instance_mut(family, index).ok_or_else(|| {
            ChassisError::CommandRejected(format!("{family}[{index}] does not exist"))
        })?;
        if inst.outcome == RawOutcome::DeviceAbsent {
            return Err(ChassisError::CommandRejected(format!(
                "{family}[{index}] is absent"
            )));
        }
        if apply {
            inst.fields.extend(attr_writes);
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder for [`SimChassis`].
pub struct SimChassisBuilder {
    clock: Arc<dyn Clock>,
    platform: String,
    slots: u8,
    local_slot: u8,
    psus: u8,
    fans: u8,
    temperature_sensors: u8,
    sub_assemblies: u8,
    ssd: bool,
}

impl Default for SimChassisBuilder {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            platform: "sim-chassis".to_string(),
            slots: 2,
            local_slot: 0,
            psus: 2,
            fans: 4,
            temperature_sensors: 3,
            sub_assemblies: 2,
            ssd: true,
        }
    }
}

impl SimChassisBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn platform(mut self, name: impl Into<String>) -> Self {
        self.platform = name.into();
        self
    }

    /// Number of controller slots (at least one).
    pub fn slots(mut self, n: u8) -> Self {
        self.slots = n.max(1);
        self
    }

    /// Slot this controller occupies.
    pub fn local_slot(mut self, slot: u8) -> Self {
        self.local_slot = slot;
        self
    }

    pub fn psus(mut self, n: u8) -> Self {
        self.psus = n;
        self
    }

    pub fn fans(mut self, n: u8) -> Self {
        self.fans = n;
        self
    }

    pub fn temperature_sensors(mut self, n: u8) -> Self {
        self.temperature_sensors = n;
        self
    }

    /// Resume PROMs and firmware-upgradeable modules per slot.
    pub fn sub_assemblies(mut self, n: u8) -> Self {
        self.sub_assemblies = n;
        self
    }

    pub fn ssd(mut self, present: bool) -> Self {
        self.ssd = present;
        self
    }

    pub fn build(self) -> SimChassis {
        use ComponentFamily as F;
        let local_slot = self.local_slot.min(self.slots - 1);
        let mut families: HashMap<ComponentFamily, SimFamily> = HashMap::new();
        let mut put = |family: F, instances: Vec<SimInstance>| {
            families.insert(
                family,
                SimFamily {
                    instances,
                    ..SimFamily::default()
                },
            );
        };

        put(
            F::BoardIdentity,
            vec![SimInstance::new(Location::new(local_slot, 0))
                .with(Attribute::SlotId, u64::from(local_slot))
                .with(Attribute::ChassisSerial, "SIM0000001")
                .with(Attribute::PartNumber, "BRD-1000")],
        );
        put(
            F::PowerSupply,
            locations(1, self.psus)
                .map(|l| {
                    let n = u64::from(l.sub_slot);
                    SimInstance::new(l)
                        .with(Attribute::Presence, Presence::Present)
                        .with(Attribute::PowerGood, true)
                        .with(Attribute::InputPowerMw, 450_000 + n * 1_000)
                        .with(Attribute::OutputPowerMw, 410_000 + n * 1_000)
                        .with(Attribute::SerialNumber, format!("PSU{n:04}"))
                        .with(Attribute::LedState, LedColor::Green)
                })
                .collect(),
        );
        put(
            F::Fan,
            locations(1, self.fans)
                .map(|l| {
                    SimInstance::new(l)
                        .with(Attribute::Presence, Presence::Present)
                        .with(Attribute::FanSpeedRpm, 6_000u64)
                        .with(Attribute::TargetSpeedPercent, 50u64)
                        .with(Attribute::LedState, LedColor::Green)
                })
                .collect(),
        );
        put(
            F::ManagementModule,
            locations(self.slots, 1)
                .map(|l| {
                    SimInstance::new(l)
                        .with(Attribute::Presence, Presence::Present)
                        .with(Attribute::OperStatus, "up")
                        .with(Attribute::FirmwareVersion, "1.0.0")
                        .with(Attribute::SerialNumber, format!("MM{:04}", l.slot))
                        .with(Attribute::PortSpeedMbps, 1_000u64)
                        .with(Attribute::LedState, LedColor::Green)
                })
                .collect(),
        );
        put(
            F::ResumeId,
            locations(self.slots, self.sub_assemblies)
                .map(|l| {
                    SimInstance::new(l)
                        .with(Attribute::Presence, Presence::Present)
                        .with(Attribute::SerialNumber, format!("FRU{}{:03}", l.slot, l.sub_slot))
                        .with(Attribute::PartNumber, "FRU-200")
                })
                .collect(),
        );
        put(
            F::TemperatureSensor,
            locations(1, self.temperature_sensors)
                .map(|l| {
                    SimInstance::new(l)
                        .with(Attribute::Presence, Presence::Present)
                        .with(Attribute::TemperatureMilliC, 35_000 + i64::from(l.sub_slot) * 500)
                })
                .collect(),
        );
        put(
            F::FirmwareUpgrade,
            locations(self.slots, self.sub_assemblies)
                .map(|l| {
                    SimInstance::new(l)
                        .with(Attribute::Presence, Presence::Present)
                        .with(Attribute::FirmwareVersion, "1.0.0")
                        .with(Attribute::UpgradeState, "idle")
                        .with(Attribute::LedState, LedColor::Off)
                })
                .collect(),
        );
        put(
            F::PowerConsumer,
            locations(self.slots, 1)
                .map(|l| {
                    SimInstance::new(l)
                        .with(Attribute::Presence, Presence::Present)
                        .with(Attribute::InputPowerMw, 120_000u64)
                })
                .collect(),
        );
        put(
            F::SolidStateDevice,
            if self.ssd {
                vec![SimInstance::new(Location::new(local_slot, 0))
                    .with(Attribute::Presence, Presence::Present)
                    .with(Attribute::HealthPercent, 98u64)
                    .with(Attribute::TemperatureMilliC, 41_000i64)
                    .with(Attribute::SerialNumber, "SSD0001")]
            } else {
                Vec::new()
            },
        );

        SimChassis {
            state: Arc::new(Mutex::new(SimState {
                platform: self.platform,
                slot_count: self.slots,
                local_slot,
                reachable: true,
                apply_commands: true,
                families,
                command_log: Vec::new(),
            })),
            clock: self.clock,
        }
    }
}
