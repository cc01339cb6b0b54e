//! Game state machine and session types
//!
//! `GameState` is the only mutable shared resource in the engine. It is
//! written by bridge-forwarded commands and local player commands only;
//! the timeline and animation driver read it.
//!
//! Phase edges: Menu -> Countdown -> Playing -> Finished -> Menu. Anything
//! else is rejected as a no-op with an [`IgnoreReason`].

use serde::{Deserialize, Serialize};

use super::bridge::DomainCommand;
use crate::platform::{CommandSink, OutboundCommand};
use crate::settings::{EngineConfig, ScoreTable};

/// Opaque external account identifier, normalised to lowercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Identity {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Externally decided hit quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Perfect,
    Good,
    Miss,
}

impl Quality {
    /// Popup text
    pub fn label(&self) -> &'static str {
        match self {
            Quality::Perfect => "PERFECT!",
            Quality::Good => "GOOD!",
            Quality::Miss => "MISS!",
        }
    }

    pub fn points(&self, table: &ScoreTable) -> u64 {
        match self {
            Quality::Perfect => table.perfect,
            Quality::Good => table.good,
            Quality::Miss => table.miss,
        }
    }

    /// Map authority-awarded points back to a label
    /// Map authority-awarded points back to a label. Only the exact table
    /// values count; anything else is a miss.
    pub fn from_points(points: u64, table: &ScoreTable) -> Self {
        if points == table.perfect {
            Quality::Perfect
        } else if points == table.good {
            Quality::Good
        } else {
            Quality::Miss
        }
    }
}

/// Current phase of a play-through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    /// No session (or a start request awaiting confirmation)
    Menu,
    /// Local wall-clock countdown before play
    Countdown,
    /// Notes are live, clocked by the block counter
    Playing,
    /// Session frozen until reset
    Finished,
}

impl GamePhase {
    /// The only legal edges
    pub fn can_transition_to(self, next: GamePhase) -> bool {
        matches!(
            (self, next),
            (GamePhase::Menu, GamePhase::Countdown)
                | (GamePhase::Countdown, GamePhase::Playing)
                | (GamePhase::Playing, GamePhase::Finished)
                | (GamePhase::Finished, GamePhase::Menu)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GamePhase::Menu => "menu",
            GamePhase::Countdown => "countdown",
            GamePhase::Playing => "playing",
            GamePhase::Finished => "finished",
        }
    }
}

/// Short-lived quality popup. At most one is live; a newer one replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackToken {
    pub quality: Quality,
    /// Wall-clock time left on screen
    pub remaining_ms: u32,
}

/// One play-through's mutable state for one identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub identity: Identity,
    /// `None` until the authority confirms the start
    pub start_reference: Option<u64>,
    /// Next note expected; never decreases, never exceeds the song length
    pub consumed_index: usize,
    pub score: u64,
}

impl Session {
    fn new(identity: Identity) -> Self {
        Self {
            identity,
            start_reference: None,
            consumed_index: 0,
            score: 0,
        }
    }
}

/// What the render boundary sees on every transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: GamePhase,
    pub identity: Option<Identity>,
    pub start_reference: Option<u64>,
    pub score: u64,
    pub consumed_index: usize,
    pub song_len: usize,
    pub max_score: u64,
}

/// Notifications for the presentation layer, drained once per frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    PhaseChanged {
        from: GamePhase,
        to: GamePhase,
        snapshot: SessionSnapshot,
    },
    /// Countdown display moved to a new whole second
    Countdown(u32),
    /// A note result was applied
    NoteResolved { index: usize, quality: Quality },
}

/// Why a command or event was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not legal in the current phase
    WrongPhase(GamePhase),
    /// A start request is already waiting for confirmation
    AlreadyPending,
    /// Start reference already set for this session
    AlreadyArmed,
    /// Start reference 0 means "not started"
    SentinelStart,
    /// Note index already consumed
    StaleNote,
    /// Note index ahead of the expected one
    FutureNote,
    /// Every note of the song has been consumed
    SongComplete,
    /// No session exists
    NoSession,
}

/// Result of offering a command to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Ignored(IgnoreReason),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

/// The authoritative game state
#[derive(Debug, Clone)]
pub struct GameState {
    config: EngineConfig,
    phase: GamePhase,
    session: Option<Session>,
    feedback: Option<FeedbackToken>,
    /// Countdown timer (wall clock)
    countdown_ms: u32,
    events: Vec<GameEvent>,
}

impl GameState {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            phase: GamePhase::Menu,
            session: None,
            feedback: None,
            countdown_ms: 0,
            events: Vec::new(),
        }
    }

    // === Reads ===

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.as_ref().map(|s| &s.identity)
    }

    pub fn start_reference(&self) -> Option<u64> {
        self.session.as_ref().and_then(|s| s.start_reference)
    }

    pub fn consumed_index(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.consumed_index)
    }

    pub fn score(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.score)
    }

    pub fn feedback(&self) -> Option<FeedbackToken> {
        self.feedback
    }

    /// True while a start request waits for the authority's confirmation
    pub fn is_pending(&self) -> bool {
        self.phase == GamePhase::Menu && self.session.is_some()
    }

    pub fn countdown_remaining_ms(&self) -> u32 {
        self.countdown_ms
    }

    /// Whole seconds to show during the countdown
    pub fn countdown_display(&self) -> u32 {
        self.config.countdown_display(self.countdown_ms)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            identity: self.identity().cloned(),
            start_reference: self.start_reference(),
            score: self.score(),
            consumed_index: self.consumed_index(),
            song_len: self.config.song.len(),
            max_score: self.config.max_score(),
        }
    }

    /// Take the presentation notifications queued since the last call
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    // === Local commands ===

    /// Player asked to play: record a pending session and ask the authority
    /// to open it. The phase stays `Menu` until the start is confirmed.
    pub fn begin_session(&mut self, identity: Identity, sink: &mut dyn CommandSink) -> Outcome {
        if self.phase != GamePhase::Menu {
            return self.ignore("begin", IgnoreReason::WrongPhase(self.phase));
        }
        if self.session.is_some() {
            return self.ignore("begin", IgnoreReason::AlreadyPending);
        }

        log::info!("Requesting session start for {}", identity);
        sink.send(OutboundCommand::RequestSessionStart {
            identity: identity.clone(),
            song_id: self.config.song.id,
        });
        self.session = Some(Session::new(identity));
        Outcome::Applied
    }

    /// Forward a hit attempt for the currently expected note. Never scores
    /// locally; the result arrives later as a note-result event.
    pub fn attempt_hit(&mut self, sink: &mut dyn CommandSink) -> Outcome {
        if self.phase != GamePhase::Playing {
            return self.ignore("attempt_hit", IgnoreReason::WrongPhase(self.phase));
        }
        let Some(session) = self.session.as_ref() else {
            return self.ignore("attempt_hit", IgnoreReason::NoSession);
        };
        if session.consumed_index >= self.config.song.len() {
            return self.ignore("attempt_hit", IgnoreReason::SongComplete);
        }

        sink.send(OutboundCommand::AttemptNoteHit {
            identity: session.identity.clone(),
            note_index: session.consumed_index,
        });
        Outcome::Applied
    }

    /// Leave `Finished` for `Menu`. In `Menu`, drops an unconfirmed start
    /// request without changing phase.
    pub fn reset(&mut self) -> Outcome {
        match self.phase {
            GamePhase::Finished => {
                self.enter(GamePhase::Menu);
                Outcome::Applied
            }
            GamePhase::Menu if self.session.is_some() => {
                log::info!("Abandoning pending session request");
                self.session = None;
                Outcome::Applied
            }
            phase => self.ignore("reset", IgnoreReason::WrongPhase(phase)),
        }
    }

    // === Upstream commands ===

    /// Apply one typed command forwarded by the event bridge
    pub fn apply(&mut self, command: DomainCommand) -> Outcome {
        match command {
            DomainCommand::ArmSession { start_reference } => self.arm(start_reference),
            DomainCommand::ResolveNote { index, quality } => self.resolve_note(index, quality),
            DomainCommand::ScoreNote { index, points } => {
                let quality = Quality::from_points(points, &self.config.scoring);
                self.resolve_note(index, quality)
            }
            DomainCommand::FinishSession => self.finish(),
        }
    }

    fn arm(&mut self, start_reference: u64) -> Outcome {
        if !matches!(self.phase, GamePhase::Menu | GamePhase::Countdown) {
            return self.ignore("session_started", IgnoreReason::WrongPhase(self.phase));
        }
        if start_reference == 0 {
            return self.ignore("session_started", IgnoreReason::SentinelStart);
        }
        let Some(session) = self.session.as_mut() else {
            return self.ignore("session_started", IgnoreReason::NoSession);
        };
        if session.start_reference.is_some() {
            return self.ignore("session_started", IgnoreReason::AlreadyArmed);
        }

        session.start_reference = Some(start_reference);
        log::info!("Session armed at block {}", start_reference);
        if self.phase == GamePhase::Menu {
            self.enter(GamePhase::Countdown);
        }
        Outcome::Applied
    }

    fn resolve_note(&mut self, index: usize, quality: Quality) -> Outcome {
        if self.phase != GamePhase::Playing {
            return self.ignore("note_result", IgnoreReason::WrongPhase(self.phase));
        }
        let song_len = self.config.song.len();
        let points = quality.points(&self.config.scoring);
        let Some(session) = self.session.as_mut() else {
            return self.ignore("note_result", IgnoreReason::NoSession);
        };
        let reason = if index < session.consumed_index {
            Some(IgnoreReason::StaleNote)
        } else if index >= song_len {
            Some(IgnoreReason::SongComplete)
        } else if index > session.consumed_index {
            Some(IgnoreReason::FutureNote)
        } else {
            None
        };
        if let Some(reason) = reason {
            return self.ignore("note_result", reason);
        }

        session.score += points;
        session.consumed_index += 1;
        log::debug!(
            "Note {} resolved {:?} (+{}, score {})",
            index,
            quality,
            points,
            session.score
        );

        self.feedback = Some(FeedbackToken {
            quality,
            remaining_ms: self.config.feedback_ms,
        });
        self.events.push(GameEvent::NoteResolved { index, quality });
        Outcome::Applied
    }

    fn finish(&mut self) -> Outcome {
        if self.phase != GamePhase::Playing {
            return self.ignore("session_finished", IgnoreReason::WrongPhase(self.phase));
        }
        self.enter(GamePhase::Finished);
        Outcome::Applied
    }

    // === Wall clock ===

    /// Advance wall-clock timers: the countdown and the feedback popup.
    /// Gameplay timing never reads this.
    pub fn advance_wall(&mut self, dt_ms: u32) {
        if let Some(token) = self.feedback.as_mut() {
            token.remaining_ms = token.remaining_ms.saturating_sub(dt_ms);
            if token.remaining_ms == 0 {
                self.feedback = None;
            }
        }

        if self.phase == GamePhase::Countdown {
            let before = self.countdown_display();
            self.countdown_ms = self.countdown_ms.saturating_sub(dt_ms);
            if self.countdown_ms == 0 {
                self.enter(GamePhase::Playing);
            } else {
                let after = self.countdown_display();
                if after != before {
                    self.events.push(GameEvent::Countdown(after));
                }
            }
        }
    }

    // === Internals ===

    fn enter(&mut self, to: GamePhase) {
        let from = self.phase;
        debug_assert!(from.can_transition_to(to), "illegal edge {:?} -> {:?}", from, to);
        self.phase = to;

        // Entry actions
        match to {
            GamePhase::Menu => {
                self.session = None;
                self.feedback = None;
                self.countdown_ms = 0;
            }
            GamePhase::Countdown => {
                self.countdown_ms = self.config.countdown_ms;
            }
            GamePhase::Playing => {
                self.countdown_ms = 0;
            }
            GamePhase::Finished => {}
        }

        log::info!("Phase {} -> {}", from.as_str(), to.as_str());
        let snapshot = self.snapshot();
        self.events.push(GameEvent::PhaseChanged { from, to, snapshot });
        if to == GamePhase::Countdown && self.countdown_ms > 0 {
            self.events.push(GameEvent::Countdown(self.countdown_display()));
        }
        // A zero-length countdown goes straight to play
        if to == GamePhase::Countdown && self.countdown_ms == 0 {
            self.enter(GamePhase::Playing);
        }
    }

    fn ignore(&self, what: &str, reason: IgnoreReason) -> Outcome {
        log::debug!("Ignored {} in {}: {:?}", what, self.phase.as_str(), reason);
        Outcome::Ignored(reason)
    }
}
