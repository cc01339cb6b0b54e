//! Engine: one mounted game
//!
//! Owns the state machine, block clock, event bridge and animation driver,
//! plus the injected platform capabilities. A host calls [`Engine::frame`]
//! once per animation frame and forwards player input through the
//! `press_*` methods.
//!
//! Per frame, in order:
//! 1. Local inputs and wall-clock timers (`sim::tick`)
//! 2. Queued upstream events (`EventBridge::pump`)
//! 3. Block clock sample
//! 4. Phase notifications to the render sink (driver start/stop)
//! 5. Projection and paint (`AnimationDriver::on_frame`)

use std::cell::Cell;
use std::rc::Rc;

use crate::driver::AnimationDriver;
use crate::platform::{CommandSink, CounterSource, EventSource};
use crate::renderer::RenderSink;
use crate::settings::{ConfigError, EngineConfig};
use crate::sim::{
    BlockClock, ClockSample, EventBridge, GameEvent, GamePhase, GameState, Identity, TickInput,
    TickReport, tick,
};

/// Frames of a stalled clock before it is worth a log line
const CLOCK_IDLE_LOG_FRAMES: u32 = 300;

/// Liveness token for a host's frame scheduler. Goes dead on
/// [`Engine::shutdown`]; a callback holding a dead ticket must not call
/// back into the engine.
#[derive(Debug, Clone)]
pub struct FrameTicket {
    live: Rc<Cell<bool>>,
}

impl FrameTicket {
    #[inline]
    pub fn is_live(&self) -> bool {
        self.live.get()
    }
}

pub struct Engine<R: RenderSink> {
    state: GameState,
    clock: BlockClock,
    bridge: Option<EventBridge>,
    driver: AnimationDriver<R>,
    counter: Box<dyn CounterSource>,
    events: Box<dyn EventSource>,
    commands: Box<dyn CommandSink>,
    /// One-shot inputs gathered since the last frame
    input: TickInput,
    mounted: Rc<Cell<bool>>,
}

impl<R: RenderSink> Engine<R> {
    pub fn new(
        config: EngineConfig,
        counter: Box<dyn CounterSource>,
        events: Box<dyn EventSource>,
        commands: Box<dyn CommandSink>,
        renderer: R,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        log::info!(
            "Engine mounted: '{}' ({} notes)",
            config.song.title,
            config.song.len()
        );
        Ok(Self {
            state: GameState::new(config),
            clock: BlockClock::new(),
            bridge: None,
            driver: AnimationDriver::new(renderer),
            counter,
            events,
            commands,
            input: TickInput::default(),
            mounted: Rc::new(Cell::new(true)),
        })
    }

    // === Reads ===

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn clock(&self) -> &BlockClock {
        &self.clock
    }

    pub fn bridge(&self) -> Option<&EventBridge> {
        self.bridge.as_ref()
    }

    pub fn driver(&self) -> &AnimationDriver<R> {
        &self.driver
    }

    pub fn renderer(&self) -> &R {
        self.driver.sink()
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        self.driver.sink_mut()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }

    /// Ticket for a host frame loop; dies on shutdown
    pub fn ticket(&self) -> FrameTicket {
        FrameTicket {
            live: self.mounted.clone(),
        }
    }

    // === Player input (applied on the next frame) ===

    pub fn press_begin(&mut self, identity: Identity) {
        self.input.begin = Some(identity);
    }

    pub fn press_hit(&mut self) {
        self.input.attempt_hit = true;
    }

    pub fn press_reset(&mut self) {
        self.input.reset = true;
    }

    // === Frame ===

    /// Run one frame with `dt_ms` of wall-clock time elapsed
    pub fn frame(&mut self, dt_ms: u32) -> TickReport {
        if !self.is_mounted() {
            return TickReport::default();
        }

        let input = std::mem::take(&mut self.input);
        // Subscribe before the start request goes out so the confirmation
        // cannot slip past us
        if let Some(identity) = &input.begin {
            let accepts = match self.state.phase() {
                GamePhase::Menu => !self.state.is_pending() || input.reset,
                GamePhase::Finished => input.reset,
                _ => false,
            };
            let attached = self.bridge.as_ref().is_some_and(|b| b.identity() == identity);
            if accepts && (input.reset || !attached) {
                self.detach_bridge();
                self.bridge = Some(EventBridge::attach(self.events.as_ref(), identity.clone()));
            }
        }

        let report = tick(&mut self.state, &input, dt_ms, self.commands.as_mut());

        // Bridge identity must match the session's; anything else is stale
        let session_identity = self.state.identity().cloned();
        if self
            .bridge
            .as_ref()
            .is_some_and(|b| session_identity.as_ref() != Some(b.identity()))
        {
            self.detach_bridge();
        }

        if let Some(bridge) = self.bridge.as_mut() {
            bridge.pump(&mut self.state);
        }

        let sample = self.clock.sample(self.counter.as_ref());
        if !matches!(sample, ClockSample::Advanced(_))
            && self.clock.idle_frames() == CLOCK_IDLE_LOG_FRAMES
            && self.state.phase() == GamePhase::Playing
        {
            log::info!(
                "Block clock idle for {} frames at {:?}",
                CLOCK_IDLE_LOG_FRAMES,
                self.clock.current()
            );
        }
        self.dispatch_events();
        self.driver.on_frame(&self.clock, &self.state);
        report
    }

    /// Unmount: stop the driver and detach from the event source. After
    /// this, `frame` does nothing and no handler can reach the state.
    pub fn shutdown(&mut self) {
        if !self.is_mounted() {
            return;
        }
        self.mounted.set(false);
        self.driver.stop();
        self.detach_bridge();
        log::info!("Engine unmounted");
    }

    fn detach_bridge(&mut self) {
        if let Some(mut bridge) = self.bridge.take() {
            bridge.detach();
        }
    }

    fn dispatch_events(&mut self) {
        for event in self.state.drain_events() {
            match event {
                GameEvent::PhaseChanged { to, snapshot, .. } => {
                    match to {
                        GamePhase::Playing => self.driver.start(),
                        GamePhase::Finished => self.driver.stop(),
                        // The bridge is dropped in `frame` once it no longer
                        // matches the session, which also covers a begin
                        // queued in the same frame as the reset
                        GamePhase::Menu => self.driver.stop(),
                        GamePhase::Countdown => {}
                    }
                    self.driver.sink_mut().phase_changed(&snapshot);
                }
                GameEvent::Countdown(seconds) => self.driver.sink_mut().countdown(seconds),
                GameEvent::NoteResolved { index, quality } => {
                    log::debug!("Note {} -> {}", index, quality.label());
                }
            }
        }
    }
}

impl<R: RenderSink> Drop for Engine<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
