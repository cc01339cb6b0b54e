//! MegaBeat - a rhythm game clocked by an external block counter
//!
//! Core modules:
//! - `sim`: Deterministic engine (block clock, note timeline, event bridge, game state)
//! - `platform`: Capability traits for the counter source, event source and command sink
//! - `driver`: Cancellable per-frame animation driver
//! - `renderer`: Render boundary and note layout
//! - `engine`: Owner that wires everything for one mounted game
//! - `settings`: Static song and scoring configuration

#[cfg(target_arch = "wasm32")]
pub mod audio;
pub mod driver;
pub mod engine;
pub mod platform;
pub mod renderer;
pub mod settings;
pub mod sim;

pub use driver::AnimationDriver;
pub use engine::{Engine, FrameTicket};
pub use settings::{ConfigError, EngineConfig, ScoreTable, Song};

/// Engine configuration defaults
pub mod consts {
    /// Half-width of the projection window around the hit line, in blocks
    pub const DISPLAY_MARGIN: u64 = 550;

    /// Local pre-game countdown (wall clock, not block driven)
    pub const COUNTDOWN_MS: u32 = 3000;
    /// Countdown display step
    pub const COUNTDOWN_STEP_MS: u32 = 1000;

    /// How long a quality popup stays on screen
    pub const FEEDBACK_MS: u32 = 1000;

    /// Points per quality
    pub const PERFECT_POINTS: u64 = 100;
    pub const GOOD_POINTS: u64 = 50;
    pub const MISS_POINTS: u64 = 0;

    /// Canvas geometry
    pub const CANVAS_WIDTH: f32 = 800.0;
    pub const CANVAS_HEIGHT: f32 = 600.0;
    pub const HIT_LINE_Y: f32 = 500.0;
    /// One block moves a note by one pixel
    pub const PIXELS_PER_BLOCK: f32 = 1.0;
    pub const NOTE_RADIUS: f32 = 30.0;

    /// Demo song: block offsets from the session start
    pub const DEMO_SONG_OFFSETS: [u64; 16] = [
        100, 200, 300, 400, 500, 600, 700, 800, 900, 1000, 1100, 1200, 1300, 1400, 1500, 1600,
    ];
}
