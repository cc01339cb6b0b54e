//! Render boundary
//!
//! The engine decides where and when; a [`RenderSink`] decides how. Hosts
//! implement the trait (canvas painter on the web, a logger natively).

pub mod layout;

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

pub use layout::{Layout, NoteSprite};

use crate::sim::{FeedbackToken, ProjectedNote, SessionSnapshot};

/// Everything needed to paint one animation frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    /// Block counter value this frame was projected at
    pub counter: u64,
    /// Index of the note the player is expected to hit next
    pub current_index: usize,
    /// Confirmed score so far
    pub score: u64,
    pub notes: Vec<ProjectedNote>,
    pub feedback: Option<FeedbackToken>,
}

pub trait RenderSink {
    /// Paint one frame of notes
    fn frame(&mut self, frame: &Frame);

    /// A phase transition happened
    fn phase_changed(&mut self, _snapshot: &SessionSnapshot) {}

    /// Countdown display changed
    fn countdown(&mut self, _seconds: u32) {}

    /// The driver stopped; free any per-note resources
    fn release(&mut self) {}
}

/// What a [`RecordingRenderer`] has seen
#[derive(Debug, Default)]
pub struct RenderLog {
    pub frames: Vec<Frame>,
    pub phases: Vec<SessionSnapshot>,
    pub countdowns: Vec<u32>,
    pub releases: u32,
}

/// Records every call; clones share the log
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    log: Rc<RefCell<RenderLog>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_count(&self) -> usize {
        self.log.borrow().frames.len()
    }

    pub fn last_frame(&self) -> Option<Frame> {
        self.log.borrow().frames.last().cloned()
    }

    pub fn phases(&self) -> Vec<SessionSnapshot> {
        self.log.borrow().phases.clone()
    }

    pub fn countdowns(&self) -> Vec<u32> {
        self.log.borrow().countdowns.clone()
    }

    pub fn releases(&self) -> u32 {
        self.log.borrow().releases
    }
}

impl RenderSink for RecordingRenderer {
    fn frame(&mut self, frame: &Frame) {
        self.log.borrow_mut().frames.push(frame.clone());
    }

    fn phase_changed(&mut self, snapshot: &SessionSnapshot) {
        self.log.borrow_mut().phases.push(snapshot.clone());
    }

    fn countdown(&mut self, seconds: u32) {
        self.log.borrow_mut().countdowns.push(seconds);
    }

    fn release(&mut self) {
        self.log.borrow_mut().releases += 1;
    }
}
