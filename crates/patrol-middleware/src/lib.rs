//! `patrol-middleware` – status event routing.
//!
//! Delivers [`PatrolEvent`][patrol_types::PatrolEvent]s from the control loop
//! to external reporters (CLI, web front end, loggers) without ever blocking
//! the loop.
//!
//! # Modules
//!
//! - [`bus`] – topic-based publish/subscribe [`EventBus`] built on Tokio
//!   broadcast channels; implements
//!   [`StatusReporter`][patrol_types::StatusReporter].

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
