//! `chassis-middleware` – Event Routing
//!
//! Carries change notifications, lifecycle transitions and alerts from the
//! tick context to whoever is listening, without caring about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – Headless, typed, topic-based publish/subscribe event bus built
//!   on Tokio broadcast channels.
//! - [`sink`] – The [`NotificationSink`][sink::NotificationSink] seam the
//!   change detector publishes through.

pub mod bus;
pub mod sink;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use sink::{CHANGE_SOURCE, NotificationSink, RecordingSink};
