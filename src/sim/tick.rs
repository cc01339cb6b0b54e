//! Per-frame local step
//!
//! Applies the player's one-shot inputs and advances the wall-clock timers.
//! Block-clocked gameplay is not touched here; it only moves when the
//! counter does.

use super::state::{GameState, Identity, Outcome};
use crate::platform::CommandSink;

/// Player inputs collected since the last frame (one-shot)
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Play pressed with this account connected
    pub begin: Option<Identity>,
    /// Hit key pressed
    pub attempt_hit: bool,
    /// Play-again / cancel pressed
    pub reset: bool,
}

/// What the local inputs did this frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub begin: Option<Outcome>,
    pub attempt_hit: Option<Outcome>,
    pub reset: Option<Outcome>,
}

/// Advance the local side of the game by `dt_ms` of wall-clock time
pub fn tick(
    state: &mut GameState,
    input: &TickInput,
    dt_ms: u32,
    sink: &mut dyn CommandSink,
) -> TickReport {
    let mut report = TickReport::default();

    if input.reset {
        report.reset = Some(state.reset());
    }
    if let Some(identity) = &input.begin {
        report.begin = Some(state.begin_session(identity.clone(), sink));
    }
    if input.attempt_hit {
        report.attempt_hit = Some(state.attempt_hit(sink));
    }

    state.advance_wall(dt_ms);
    report
}
