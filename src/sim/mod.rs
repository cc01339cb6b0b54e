//! Deterministic engine core
//!
//! All gameplay logic lives here. This module must stay pure:
//! - Gameplay timing comes from the block counter only
//! - Wall-clock time drives the countdown and popups, nothing else
//! - No rendering or platform dependencies

pub mod bridge;
pub mod clock;
pub mod state;
pub mod tick;
pub mod timeline;

pub use bridge::{BridgeStats, DomainCommand, DropReason, EventBridge};
pub use clock::{BlockClock, ClockSample};
pub use state::{
    FeedbackToken, GameEvent, GamePhase, GameState, Identity, IgnoreReason, Outcome, Quality,
    Session, SessionSnapshot,
};
pub use tick::{TickInput, TickReport, tick};
pub use timeline::{ProjectedNote, distance_to_hit, project, project_all};
