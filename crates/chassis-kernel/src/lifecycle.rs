//! [`BoardLifecycle`] – the board's coarse state machine.
//!
//! ```text
//! SPECIALIZE ──Specialized──▶ ACTIVATE ──Activated──▶ READY
//!      │                          ▲                      │
//!      │          Resume          │       Hibernate      │
//!      │       ┌──────────────────┴── HIBERNATE ◀────────┤
//!      │       └──────────────────┬── OFFLINE   ◀────────┤ GoOffline
//!      └─ Fatal ─▶ FAIL           │                      │
//!  any ─ Shutdown ─▶ DESTROY ◀────┘                      │
//! ```
//!
//! Transitions are an explicit `match` over `(state, event)`; anything not
//! listed is rejected with [`ChassisError::InvalidTransition`].

use chassis_types::{BoardState, ChassisError};
use tracing::info;

/// Inputs that drive the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardEvent {
    /// Platform identified and store created.
    Specialized,
    /// Initial full read seeded the store.
    Activated,
    Hibernate,
    GoOffline,
    /// Leave HIBERNATE/OFFLINE; the store is re-seeded through ACTIVATE.
    Resume,
    /// Unrecoverable error.
    Fatal,
    Shutdown,
}

/// Compute the successor of `state` on `event`.
pub fn next_state(state: BoardState, event: BoardEvent) -> Result<BoardState, ChassisError> {
    use BoardEvent as E;
    use BoardState as S;
    match (state, event) {
        (S::Specialize, E::Specialized) => Ok(S::Activate),
        (S::Activate, E::Activated) => Ok(S::Ready),
        (S::Specialize | S::Activate | S::Ready, E::Hibernate) => Ok(S::Hibernate),
        (S::Specialize | S::Activate | S::Ready | S::Hibernate, E::GoOffline) => Ok(S::Offline),
        (S::Hibernate | S::Offline, E::Resume) => Ok(S::Activate),
        (s, E::Shutdown) if s != S::Destroy => Ok(S::Destroy),
        (s, E::Fatal) if !matches!(s, S::Fail | S::Destroy) => Ok(S::Fail),
        _ => Err(ChassisError::InvalidTransition {
            from: state,
            event: format!("{event:?}"),
        }),
    }
}

/// Current lifecycle state plus the transition log.
#[derive(Debug)]
pub struct BoardLifecycle {
    state: BoardState,
    transitions: u64,
}

impl Default for BoardLifecycle {
    fn default() -> Self {
        Self {
            state: BoardState::Specialize,
            transitions: 0,
        }
    }
}

impl BoardLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BoardState {
        self.state
    }

    /// Number of transitions applied so far.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Apply `event`, returning `(from, to)` on success.  The state is left
    /// unchanged on an invalid transition.
    pub fn apply(&mut self, event: BoardEvent) -> Result<(BoardState, BoardState), ChassisError> {
        let from = self.state;
        let to = next_state(from, event)?;
        self.state = to;
        self.transitions += 1;
        info!(%from, %to, ?event, "board lifecycle transition");
        Ok((from, to))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, BoardState::Fail | BoardState::Destroy)
    }
}
