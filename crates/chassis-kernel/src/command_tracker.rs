//! [`CommandTracker`] – completion tracking for asynchronous hardware writes.
//!
//! A write issued to the hardware is only considered done once its effect is
//! visible in the [`ComponentStore`] after a later read.  Each write is
//! enqueued as a [`PendingCommand`] carrying the value it expects to see; on
//! every tick [`CommandTracker::recheck_all`] compares expectations with the
//! store and resolves the ones that have settled.
//!
//! The issuer keeps a [`CommandTicket`] and is signalled exactly once, over a
//! `tokio::sync::oneshot` channel, with the terminal [`CommandOutcome`].
//!
//! # Example
//!
//! ```
//! use chassis_kernel::command_tracker::{CommandTracker, Expectation, Opcode, PendingCommand};
//! use chassis_store::ComponentStore;
//! use chassis_types::{Attribute, ComponentFamily, CommandOutcome};
//!
//! let mut store = ComponentStore::new(4096).unwrap();
//! store.declare_family(ComponentFamily::Fan, 96, 1).unwrap();
//!
//! let tracker = CommandTracker::new();
//! let (cmd, mut ticket) = PendingCommand::new(
//!     Opcode::SetFanSpeed,
//!     Expectation::new(ComponentFamily::Fan, 0, Attribute::TargetSpeedPercent, 80u64),
//!     0,
//!     30,
//! );
//! tracker.enqueue(cmd);
//!
//! store.set(ComponentFamily::Fan, 0, Attribute::TargetSpeedPercent, 80u64).unwrap();
//! tracker.recheck_all(&store, 3);
//! assert_eq!(ticket.try_outcome(), Some(CommandOutcome::Succeeded));
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chassis_store::ComponentStore;
use chassis_types::{
    AttrValue, Attribute, CommandFailure, CommandOutcome, ComponentFamily, InterfaceStatus,
    Timestamp,
};
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Default time a command may take to become visible.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

// ────────────────────────────────────────────────────────────────────────────
// Opcodes and expectations
// ────────────────────────────────────────────────────────────────────────────

/// Write operations the tracker knows how to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    SetLed,
    SetFanSpeed,
    SetPortSpeed,
    ActivateFirmware,
    /// Any code without a verification rule.  Fails on the next recheck.
    Unrecognized(u16),
}

impl Opcode {
    pub fn from_code(code: u16) -> Self {
        match code {
            0x01 => Opcode::SetLed,
            0x02 => Opcode::SetFanSpeed,
            0x03 => Opcode::SetPortSpeed,
            0x04 => Opcode::ActivateFirmware,
            other => Opcode::Unrecognized(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            Opcode::SetLed => 0x01,
            Opcode::SetFanSpeed => 0x02,
            Opcode::SetPortSpeed => 0x03,
            Opcode::ActivateFirmware => 0x04,
            Opcode::Unrecognized(code) => *code,
        }
    }
}

/// The store value that proves a command took effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    pub family: ComponentFamily,
    pub index: usize,
    pub attribute: Attribute,
    pub value: AttrValue,
}

impl Expectation {
    pub fn new(
        family: ComponentFamily,
        index: usize,
        attribute: Attribute,
        value: impl Into<AttrValue>,
    ) -> Self {
        Self {
            family,
            index,
            attribute,
            value: value.into(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pending commands and tickets
// ────────────────────────────────────────────────────────────────────────────

/// A queued write awaiting confirmation.
#[derive(Debug)]
pub struct PendingCommand {
    id: Uuid,
    opcode: Opcode,
    expectation: Expectation,
    issued_at: Timestamp,
    deadline: Timestamp,
    reply: Option<oneshot::Sender<CommandOutcome>>,
}

impl PendingCommand {
    /// Create a command and the ticket its issuer waits on.
    pub fn new(
        opcode: Opcode,
        expectation: Expectation,
        issued_at: Timestamp,
        timeout_secs: u64,
    ) -> (Self, CommandTicket) {
        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let cmd = Self {
            id,
            opcode,
            expectation,
            issued_at,
            deadline: issued_at.saturating_add(timeout_secs),
            reply: Some(tx),
        };
        (cmd, CommandTicket { id, rx })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn expectation(&self) -> &Expectation {
        &self.expectation
    }

    pub fn issued_at(&self) -> Timestamp {
        self.issued_at
    }

    pub fn deadline(&self) -> Timestamp {
        self.deadline
    }

    /// Deliver the terminal outcome.  A second call is a no-op.
    fn complete(&mut self, outcome: CommandOutcome) {
        if let Some(tx) = self.reply.take() {
            // The issuer may have dropped its ticket; nothing to do then.
            let _ = tx.send(outcome);
        }
    }

    /// Decide whether this command has settled given the store at `now`.
    fn evaluate(&self, store: &ComponentStore, now: Timestamp) -> Option<CommandOutcome> {
        let failed = |reason| Some(CommandOutcome::Failed { reason });
        if let Opcode::Unrecognized(code) = self.opcode {
            return failed(CommandFailure::UnrecognizedOpcode(code));
        }
        let exp = &self.expectation;
        let record = match store.record(exp.family, exp.index) {
            Ok(record) => record,
            Err(e) => return failed(CommandFailure::InvalidTarget(e.to_string())),
        };
        match record.status() {
            status @ (InterfaceStatus::Absent | InterfaceStatus::TransactionFailed) => {
                return failed(CommandFailure::TargetUnavailable(status));
            }
            InterfaceStatus::Good | InterfaceStatus::Stale => {}
        }
        if record.get(exp.attribute) == Some(&exp.value) {
            return Some(CommandOutcome::Succeeded);
        }
        if now >= self.deadline {
            return failed(CommandFailure::TimedOut);
        }
        None
    }
}

/// Handle the issuer of a command holds to learn its outcome.
#[derive(Debug)]
pub struct CommandTicket {
    id: Uuid,
    rx: oneshot::Receiver<CommandOutcome>,
}

impl CommandTicket {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the outcome.  A command dropped without being resolved is
    /// reported as drained.
    pub async fn wait(self) -> CommandOutcome {
        self.rx.await.unwrap_or(CommandOutcome::Failed {
            reason: CommandFailure::Drained,
        })
    }

    /// Non-blocking poll; `None` while the command is still pending.
    pub fn try_outcome(&mut self) -> Option<CommandOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(CommandOutcome::Failed {
                reason: CommandFailure::Drained,
            }),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CommandTracker
// ────────────────────────────────────────────────────────────────────────────

/// FIFO of pending commands.  Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct CommandTracker {
    queue: Arc<Mutex<VecDeque<PendingCommand>>>,
}

impl CommandTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, cmd: PendingCommand) {
        debug!(id = %cmd.id, opcode = ?cmd.opcode, deadline = cmd.deadline, "command enqueued");
        self.lock().push_back(cmd);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Re-evaluate every pending command against `store`, in FIFO order.
    ///
    /// Settled commands are removed and their issuers signalled; the rest
    /// keep their queue position.  Returns the outcomes resolved by this call.
    #[instrument(skip(self, store))]
    pub fn recheck_all(
        &self,
        store: &ComponentStore,
        now: Timestamp,
    ) -> Vec<(Uuid, CommandOutcome)> {
        let mut queue = self.lock();
        let mut resolved = Vec::new();
        let mut still_pending = VecDeque::with_capacity(queue.len());
        while let Some(mut cmd) = queue.pop_front() {
            match cmd.evaluate(store, now) {
                Some(outcome) => {
                    if outcome.is_success() {
                        debug!(id = %cmd.id, opcode = ?cmd.opcode, "command confirmed");
                    } else {
                        warn!(id = %cmd.id, opcode = ?cmd.opcode, ?outcome, "command failed");
                    }
                    cmd.complete(outcome.clone());
                    resolved.push((cmd.id, outcome));
                }
                None => still_pending.push_back(cmd),
            }
        }
        *queue = still_pending;
        resolved
    }

    /// Fail every pending command with [`CommandFailure::Drained`].  Returns
    /// how many were drained.
    pub fn drain(&self) -> usize {
        let mut queue = self.lock();
        let n = queue.len();
        for mut cmd in queue.drain(..) {
            cmd.complete(CommandOutcome::Failed {
                reason: CommandFailure::Drained,
            });
        }
        if n > 0 {
            warn!(drained = n, "pending commands drained");
        }
        n
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<PendingCommand>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}
