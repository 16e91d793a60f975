//! [`NotificationSink`] – where change descriptors go.
//!
//! The change detector only knows this trait.  The production sink is the
//! [`EventBus`]; tests use [`RecordingSink`] to assert on exactly what was
//! published.

use std::sync::{Arc, Mutex};

use chassis_types::{ChangeDescriptor, ChassisError, Event, EventPayload};

use crate::bus::{EventBus, Topic};

/// Event source tag used for change notifications.
pub const CHANGE_SOURCE: &str = "chassis-runtime::change_detector";

/// Consumer of change descriptors.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, change: ChangeDescriptor) -> Result<(), ChassisError>;
}

impl NotificationSink for EventBus {
    fn publish(&self, change: ChangeDescriptor) -> Result<(), ChassisError> {
        let event = Event::new(CHANGE_SOURCE, EventPayload::ComponentChanged(change));
        self.publish_to(Topic::ComponentStatus, event).map(|_| ())
    }
}

/// Sink that keeps every descriptor in memory.  Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<Vec<ChangeDescriptor>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<ChangeDescriptor> {
        std::mem::take(&mut *self.log.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn len(&self) -> usize {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationSink for RecordingSink {
    fn publish(&self, change: ChangeDescriptor) -> Result<(), ChassisError> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(change);
        Ok(())
    }
}
