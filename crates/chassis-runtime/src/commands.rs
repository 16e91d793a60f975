//! [`CommandDispatcher`] – issue a hardware write and track its completion.
//!
//! [`CommandDispatcher::submit`] sends a [`HardwareCommand`] to the command
//! sink and, when the sink accepts it, enqueues a [`PendingCommand`]
//! describing the store value that will prove the write took effect.  The
//! returned [`CommandTicket`] resolves once the tick context's recheck sees
//! that value, the target becomes unavailable, or the timeout elapses.
//!
//! The dispatcher is cheap to clone and may be used from any task; only the
//! tracker queue and the sink are shared, both behind their own locks.

use std::sync::{Arc, Mutex};

use chassis_hal::{HardwareCommand, HardwareCommandSink};
use chassis_kernel::{CommandTicket, CommandTracker, Expectation, Opcode, PendingCommand};
use chassis_types::{Attribute, ChassisError, Clock, Presence};
use tracing::{info, warn};

/// Verification rule for a command: its opcode and the value that confirms
/// it.  Raw commands carry no rule and fail on the next recheck.
pub fn verification_for(command: &HardwareCommand) -> (Opcode, Expectation) {
    let family = command.family();
    let index = command.index();
    match command {
        HardwareCommand::SetLed { color, .. } => (
            Opcode::SetLed,
            Expectation::new(family, index, Attribute::LedState, *color),
        ),
        HardwareCommand::SetFanSpeed { percent, .. } => (
            Opcode::SetFanSpeed,
            Expectation::new(family, index, Attribute::TargetSpeedPercent, *percent),
        ),
        HardwareCommand::SetPortSpeed { mbps, .. } => (
            Opcode::SetPortSpeed,
            Expectation::new(family, index, Attribute::PortSpeedMbps, *mbps),
        ),
        HardwareCommand::ActivateFirmware { version, .. } => (
            Opcode::ActivateFirmware,
            Expectation::new(family, index, Attribute::FirmwareVersion, version.as_str()),
        ),
        HardwareCommand::Raw { opcode, .. } => (
            Opcode::Unrecognized(*opcode),
            Expectation::new(family, index, Attribute::Presence, Presence::Present),
        ),
    }
}

/// Front door for tracked hardware writes.
#[derive(Clone)]
pub struct CommandDispatcher {
    sink: Arc<Mutex<Box<dyn HardwareCommandSink>>>,
    tracker: CommandTracker,
    clock: Arc<dyn Clock>,
    timeout_secs: u64,
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("pending", &self.tracker.len())
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl CommandDispatcher {
    pub fn new(
        sink: Box<dyn HardwareCommandSink>,
        tracker: CommandTracker,
        clock: Arc<dyn Clock>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            tracker,
            clock,
            timeout_secs,
        }
    }

    /// Issue `command` and start tracking it.
    ///
    /// # Errors
    ///
    /// Returns the sink's error when the hardware refuses the write; nothing
    /// is enqueued in that case.
    pub fn submit(&self, command: HardwareCommand) -> Result<CommandTicket, ChassisError> {
        {
            let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = sink.execute(&command) {
                warn!(?command, error = %e, "hardware refused command");
                return Err(e);
            }
        }
        let (opcode, expectation) = verification_for(&command);
        let (pending, ticket) =
            PendingCommand::new(opcode, expectation, self.clock.now(), self.timeout_secs);
        info!(id = %pending.id(), ?command, "command issued");
        self.tracker.enqueue(pending);
        Ok(ticket)
    }

    pub fn pending(&self) -> usize {
        self.tracker.len()
    }
}
