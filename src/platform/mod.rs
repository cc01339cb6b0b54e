//! Platform abstraction layer
//!
//! The engine never reaches for ambient globals. Everything external is
//! passed in as a capability:
//! - Counter: latest value of the external block counter
//! - Events: push-based chain event subscription with explicit teardown
//! - Commands: fire-and-forget outbound actions

pub mod commands;
pub mod counter;
pub mod events;

pub use commands::{CommandSink, OutboundCommand, RecordingSink};
pub use counter::{CounterSource, SharedCounter};
pub use events::{ChainEvent, EventHandler, EventSource, LocalEventSource, Subscription};
