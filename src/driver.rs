//! Animation driver
//!
//! Once per scheduled frame: read the block clock and the state machine,
//! project the timeline and hand the result to the render sink. It owns no
//! game logic and never mutates game state.
//!
//! Stopping is synchronous: `on_frame` is a no-op once stopped and the
//! sink has already been told to release its per-note resources.

use crate::renderer::{Frame, RenderSink};
use crate::sim::{BlockClock, GameState, project};

pub struct AnimationDriver<R: RenderSink> {
    sink: R,
    running: bool,
    frames: u64,
    /// Note indices painted in the last frame
    painted: Vec<usize>,
    last: Option<Frame>,
}

impl<R: RenderSink> AnimationDriver<R> {
    pub fn new(sink: R) -> Self {
        Self {
            sink,
            running: false,
            frames: 0,
            painted: Vec::new(),
            last: None,
        }
    }

    pub fn sink(&self) -> &R {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut R {
        &mut self.sink
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Frames painted since the last start
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Note indices painted in the most recent frame
    pub fn painted(&self) -> &[usize] {
        &self.painted
    }

    /// Begin a new run
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        self.frames = 0;
        log::debug!("Animation driver started");
    }

    /// Halt the run and tell the sink to release per-note resources. Safe
    /// to call repeatedly.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.painted.clear();
        self.last = None;
        self.sink.release();
        log::debug!("Animation driver stopped after {} frames", self.frames);
    }

    /// Paint one frame. Returns the frame if one was painted.
    ///
    /// Reads `state` atomically (it is borrowed for the whole projection)
    /// and nothing is painted until the clock has produced a value.
    pub fn on_frame(&mut self, clock: &BlockClock, state: &GameState) -> Option<&Frame> {
        if !self.running {
            return None;
        }
        let counter = clock.current()?;

        let config = state.config();
        let frame = Frame {
            counter,
            current_index: state.consumed_index(),
            score: state.score(),
            notes: project(
                state.start_reference(),
                &config.song,
                counter,
                state.consumed_index(),
                config.display_margin,
            ),
            feedback: state.feedback(),
        };

        self.painted.clear();
        self.painted.extend(frame.notes.iter().map(|n| n.index));
        self.frames += 1;
        self.sink.frame(&frame);
        self.last = Some(frame);
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::RecordingSink;
    use crate::renderer::RecordingRenderer;
    use crate::settings::{EngineConfig, Song};
    use crate::sim::{DomainCommand, GamePhase, Identity};

    fn playing_state() -> GameState {
        let mut state = GameState::new(EngineConfig::with_song(Song::new(1, "Short", vec![0, 50, 120])));
        let mut sink = RecordingSink::new();
        state.begin_session(Identity::new("0xPlayer"), &mut sink);
        state.apply(DomainCommand::ArmSession {
            start_reference: 1000,
        });
        state.advance_wall(3000);
        assert_eq!(state.phase(), GamePhase::Playing);
        state
    }

    #[test]
    fn test_frame_projects_notes() {
        let state = playing_state();
        let mut clock = BlockClock::new();
        clock.observe(1000);

        let renderer = RecordingRenderer::new();
        let mut driver = AnimationDriver::new(renderer.clone());
        driver.start();
        let frame = driver.on_frame(&clock, &state).cloned().unwrap();

        assert_eq!(frame.counter, 1000);
        assert_eq!(frame.current_index, 0);
        assert_eq!(frame.notes[0].distance_to_hit, 0);
        assert_eq!(frame.notes[1].distance_to_hit, 50);
        assert_eq!(driver.painted(), &[0, 1, 2]);
        assert_eq!(renderer.frame_count(), 1);
    }

    #[test]
    fn test_no_frame_before_start_or_clock() {
        let state = playing_state();
        let renderer = RecordingRenderer::new();
        let mut driver = AnimationDriver::new(renderer.clone());

        let mut clock = BlockClock::new();
        clock.observe(1000);
        // Not started yet
        assert!(driver.on_frame(&clock, &state).is_none());

        driver.start();
        // Clock has no value yet
        assert!(driver.on_frame(&BlockClock::new(), &state).is_none());
        assert_eq!(renderer.frame_count(), 0);
    }

    #[test]
    fn test_stalled_clock_repeats_same_frame() {
        let state = playing_state();
        let mut clock = BlockClock::new();
        clock.observe(1010);
        let mut driver = AnimationDriver::new(RecordingRenderer::new());
        driver.start();

        let first = driver.on_frame(&clock, &state).cloned();
        clock.observe(1010);
        let second = driver.on_frame(&clock, &state).cloned();
        assert_eq!(first, second);
    }

    #[test]
    fn test_stop_halts_frames_and_releases_once() {
        let state = playing_state();
        let mut clock = BlockClock::new();
        clock.observe(1000);

        let renderer = RecordingRenderer::new();
        let mut driver = AnimationDriver::new(renderer.clone());
        driver.start();
        driver.on_frame(&clock, &state);
        assert!(driver.is_running());

        driver.stop();
        driver.stop();
        assert!(!driver.is_running());
        assert_eq!(renderer.releases(), 1);
        assert!(driver.painted().is_empty());
        assert!(driver.on_frame(&clock, &state).is_none());
        assert_eq!(renderer.frame_count(), 1);

        // A restart paints again and counts frames from zero
        driver.start();
        assert!(driver.on_frame(&clock, &state).is_some());
        assert_eq!(driver.frames(), 1);
    }
}
