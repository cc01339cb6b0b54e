//! MegaBeat entry point
//!
//! Handles platform-specific initialization and runs the game loop.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_game {
    use std::cell::{Cell, RefCell};
    use std::f64::consts::TAU;
    use std::rc::Rc;

    use wasm_bindgen::prelude::*;
    use web_sys::{
        CanvasRenderingContext2d, CustomEvent, CustomEventInit, Event, HtmlCanvasElement,
        KeyboardEvent, Window,
    };

    use megabeat::audio::{AudioManager, SoundEffect};
    use megabeat::consts::*;
    use megabeat::platform::{ChainEvent, LocalEventSource, OutboundCommand, SharedCounter};
    use megabeat::renderer::layout::colors;
    use megabeat::renderer::{Frame, Layout, RenderSink};
    use megabeat::sim::{FeedbackToken, GamePhase, Identity, SessionSnapshot};
    use megabeat::{Engine, EngineConfig};

    /// Block counter updates, detail is a number
    const BLOCK_EVENT: &str = "megabeat-block";
    /// Decoded contract logs, detail is a JSON array of chain events
    const LOGS_EVENT: &str = "megabeat-logs";
    /// Outbound contract calls, detail is a JSON command
    const COMMAND_EVENT: &str = "megabeat-command";

    /// Canvas 2D painter plus audio cues
    struct CanvasPainter {
        ctx: CanvasRenderingContext2d,
        layout: Layout,
        audio: AudioManager,
        song_len: usize,
        max_score: u64,
        /// Head index of the last painted frame, for result cues
        last_index: usize,
    }

    impl CanvasPainter {
        fn new(ctx: CanvasRenderingContext2d, config: &EngineConfig) -> Self {
            Self {
                ctx,
                layout: Layout::from_config(config),
                audio: AudioManager::new(),
                song_len: config.song.len(),
                max_score: config.max_score(),
                last_index: 0,
            }
        }

        fn fill(&self, color: [f32; 4]) {
            self.ctx.set_fill_style_str(&colors::css(color));
        }

        fn clear(&self) {
            self.fill(colors::BACKGROUND);
            self.ctx
                .fill_rect(0.0, 0.0, self.layout.width as f64, self.layout.height as f64);
        }

        fn paint_track(&self) {
            let l = &self.layout;
            let lane_w = (l.note_radius * 3.0) as f64;
            self.fill(colors::TRACK);
            self.ctx
                .fill_rect(l.lane_x as f64 - lane_w / 2.0, 0.0, lane_w, l.height as f64);

            self.fill(colors::HIT_ZONE);
            self.ctx.fill_rect(
                0.0,
                (l.hit_line_y - l.note_radius) as f64,
                l.width as f64,
                (l.note_radius * 2.0) as f64,
            );
            self.fill(colors::HIT_LINE);
            self.ctx
                .fill_rect(0.0, l.hit_line_y as f64 - 2.0, l.width as f64, 4.0);
        }

        fn paint_text(&self, text: &str, x: f64, y: f64, size: u32, align: &str) {
            self.ctx.set_font(&format!("bold {}px sans-serif", size));
            self.ctx.set_text_align(align);
            let _ = self.ctx.fill_text(text, x, y);
        }

        fn paint_feedback(&self, token: FeedbackToken) {
            let alpha = token.remaining_ms as f64 / FEEDBACK_MS as f64;
            self.ctx.set_global_alpha(alpha.clamp(0.0, 1.0));
            self.fill(colors::quality(token.quality));
            self.paint_text(
                token.quality.label(),
                self.layout.lane_x as f64,
                self.layout.hit_line_y as f64 - 80.0,
                36,
                "center",
            );
            self.ctx.set_global_alpha(1.0);
        }

        /// Full-screen message over the empty track
        fn paint_banner(&self, title: &str, subtitle: &str) {
            self.clear();
            self.paint_track();
            let cx = self.layout.width as f64 / 2.0;
            let cy = self.layout.height as f64 / 2.0;
            self.fill(colors::TEXT);
            self.paint_text(title, cx, cy - 20.0, 48, "center");
            self.paint_text(subtitle, cx, cy + 30.0, 20, "center");
        }
    }

    impl RenderSink for CanvasPainter {
        fn frame(&mut self, frame: &Frame) {
            if frame.current_index > self.last_index
                && let Some(token) = frame.feedback
            {
                self.audio.play(token.quality.into());
            }
            self.last_index = frame.current_index;

            self.clear();
            self.paint_track();

            for sprite in self.layout.sprites(frame) {
                self.ctx.begin_path();
                let _ = self.ctx.arc(
                    sprite.pos.x as f64,
                    sprite.pos.y as f64,
                    sprite.radius as f64,
                    0.0,
                    TAU,
                );
                self.fill(sprite.color);
                self.ctx.fill();
            }

            if let Some(token) = frame.feedback {
                self.paint_feedback(token);
            }

            self.fill(colors::TEXT);
            self.paint_text(&format!("Score: {}", frame.score), 20.0, 40.0, 24, "left");
            self.paint_text(
                &format!("Note {}/{}", frame.current_index.min(self.song_len), self.song_len),
                20.0,
                70.0,
                18,
                "left",
            );
            if self.audio.is_muted() {
                self.paint_text("MUTED", self.layout.width as f64 - 20.0, 40.0, 18, "right");
            }
        }

        fn phase_changed(&mut self, snapshot: &SessionSnapshot) {
            match snapshot.phase {
                GamePhase::Menu => self.paint_banner("MegaBeat", "Press Enter to play"),
                GamePhase::Countdown => {}
                GamePhase::Playing => {
                    self.last_index = snapshot.consumed_index;
                    self.audio.play(SoundEffect::Go);
                }
                GamePhase::Finished => {
                    self.audio.play(SoundEffect::Finish);
                    self.paint_banner(
                        "Finished!",
                        &format!(
                            "Score {} out of {} - press Enter",
                            snapshot.score, self.max_score
                        ),
                    );
                }
            }
        }

        fn countdown(&mut self, seconds: u32) {
            self.audio.play(SoundEffect::CountdownTick);
            self.paint_banner(&seconds.to_string(), "Get ready");
        }

        fn release(&mut self) {
            self.last_index = 0;
        }
    }

    /// Game instance holding all state
    struct Host {
        engine: Engine<CanvasPainter>,
        identity: Option<Identity>,
        last_time: Option<f64>,
    }

    impl Host {
        fn on_key(&mut self, event: &KeyboardEvent) {
            self.engine.renderer().audio.resume();
            match event.code().as_str() {
                "Space" => {
                    event.prevent_default();
                    self.engine.press_hit();
                }
                "Enter" => match self.engine.state().phase() {
                    GamePhase::Menu if !self.engine.state().is_pending() => {
                        let Some(identity) = self.identity.clone() else {
                            log::warn!("No player identity set on the canvas (data-identity)");
                            return;
                        };
                        self.engine.press_begin(identity);
                        self.engine
                            .renderer()
                            .paint_banner("Starting...", "Waiting for the chain to confirm");
                    }
                    GamePhase::Menu | GamePhase::Finished => self.engine.press_reset(),
                    _ => {}
                },
                "KeyM" => {
                    self.engine.renderer_mut().audio.toggle_muted();
                }
                _ => {}
            }
        }

        fn update(&mut self, time: f64) {
            let dt_ms = self
                .last_time
                .map_or(0.0, |last| (time - last).clamp(0.0, 100.0));
            self.last_time = Some(time);
            self.engine.frame(dt_ms as u32);
        }
    }

    /// Send a command to the page's chain adapter
    fn dispatch_command(command: &OutboundCommand) {
        let Some(window) = web_sys::window() else { return };
        let json = match serde_json::to_string(command) {
            Ok(json) => json,
            Err(e) => {
                log::error!("Failed to encode command {:?}: {}", command, e);
                return;
            }
        };
        let init = CustomEventInit::new();
        init.set_detail(&JsValue::from_str(&json));
        match CustomEvent::new_with_event_init_dict(COMMAND_EVENT, &init) {
            Ok(event) => {
                if window.dispatch_event(&event).is_err() {
                    log::warn!("Failed to dispatch {}", COMMAND_EVENT);
                }
            }
            Err(e) => log::warn!("Failed to create {}: {:?}", COMMAND_EVENT, e),
        }
    }

    /// Window listeners removed together on unmount
    struct Listeners {
        window: Window,
        registered: Vec<(&'static str, Closure<dyn FnMut(Event)>)>,
    }

    impl Listeners {
        fn add(&mut self, name: &'static str, closure: Closure<dyn FnMut(Event)>) {
            let _ = self
                .window
                .add_event_listener_with_callback(name, closure.as_ref().unchecked_ref());
            self.registered.push((name, closure));
        }

        fn remove_all(&mut self) {
            for (name, closure) in self.registered.drain(..) {
                let _ = self
                    .window
                    .remove_event_listener_with_callback(name, closure.as_ref().unchecked_ref());
            }
        }
    }

    type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>>;

    pub fn run() -> Result<(), JsValue> {
        console_error_panic_hook::set_once();
        if console_log::init_with_level(log::Level::Info).is_err() {
            web_sys::console::warn_1(&"Logger already initialized".into());
        }

        log::info!("MegaBeat starting...");

        let window = web_sys::window().ok_or("no window")?;
        let document = window.document().ok_or("no document")?;

        let canvas: HtmlCanvasElement = document
            .get_element_by_id("canvas")
            .ok_or("no canvas")?
            .dyn_into()?;
        canvas.set_width(CANVAS_WIDTH as u32);
        canvas.set_height(CANVAS_HEIGHT as u32);
        let ctx: CanvasRenderingContext2d = canvas
            .get_context("2d")?
            .ok_or("no 2d context")?
            .dyn_into()?;

        let config = match canvas.get_attribute("data-config") {
            Some(json) => {
                EngineConfig::from_json(&json).map_err(|e| JsValue::from_str(&e.to_string()))?
            }
            None => EngineConfig::demo(),
        };
        let identity = canvas.get_attribute("data-identity").map(Identity::new);

        let counter = SharedCounter::new();
        let events = LocalEventSource::new();
        let painter = CanvasPainter::new(ctx, &config);
        painter.paint_banner("MegaBeat", "Press Enter to play");

        let engine = Engine::new(
            config,
            Box::new(counter.clone()),
            Box::new(events.clone()),
            Box::new(|command: OutboundCommand| dispatch_command(&command)),
            painter,
        )
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

        let host = Rc::new(RefCell::new(Host {
            engine,
            identity,
            last_time: None,
        }));

        // Upstream listeners never borrow the host: they only feed the
        // counter cell and the event source
        let mut listeners = Listeners {
            window: window.clone(),
            registered: Vec::new(),
        };
        listeners.add(
            BLOCK_EVENT,
            Closure::<dyn FnMut(_)>::new(move |event: Event| {
                let Some(custom) = event.dyn_ref::<CustomEvent>() else {
                    return;
                };
                match custom.detail().as_f64() {
                    Some(value) if value >= 0.0 && value.fract() == 0.0 => {
                        counter.push(value as u64)
                    }
                    _ => log::warn!("Ignoring malformed block counter {:?}", custom.detail()),
                }
            }),
        );
        listeners.add(
            LOGS_EVENT,
            Closure::<dyn FnMut(_)>::new(move |event: Event| {
                let Some(custom) = event.dyn_ref::<CustomEvent>() else {
                    return;
                };
                let detail = custom.detail();
                let json = match detail.as_string() {
                    Some(json) => json,
                    None => match js_sys::JSON::stringify(&detail) {
                        Ok(json) => String::from(json),
                        Err(_) => {
                            log::warn!("Unreadable {} detail", LOGS_EVENT);
                            return;
                        }
                    },
                };
                match ChainEvent::decode_batch(&json) {
                    Ok(batch) => events.deliver(&batch),
                    Err(e) => log::warn!("Dropping malformed event batch: {}", e),
                }
            }),
        );
        {
            let host = host.clone();
            listeners.add(
                "keydown",
                Closure::<dyn FnMut(_)>::new(move |event: Event| {
                    if let Some(key) = event.dyn_ref::<KeyboardEvent>() {
                        host.borrow_mut().on_key(key);
                    }
                }),
            );
        }

        // Animation loop; the id is kept so unmount can cancel it
        let ticket = host.borrow().engine.ticket();
        let raf_id: Rc<Cell<Option<i32>>> = Rc::new(Cell::new(None));
        let callback: FrameCallback = Rc::new(RefCell::new(None));
        {
            let host = host.clone();
            let ticket = ticket.clone();
            let raf_id = raf_id.clone();
            let callback_loop = callback.clone();
            let window_loop = window.clone();
            *callback.borrow_mut() = Some(Closure::<dyn FnMut(f64)>::new(move |time: f64| {
                if !ticket.is_live() {
                    return;
                }
                host.borrow_mut().update(time);
                if let Some(cb) = callback_loop.borrow().as_ref()
                    && let Ok(id) = window_loop.request_animation_frame(cb.as_ref().unchecked_ref())
                {
                    raf_id.set(Some(id));
                }
            }));
        }
        if let Some(cb) = callback.borrow().as_ref() {
            raf_id.set(Some(window.request_animation_frame(cb.as_ref().unchecked_ref())?));
        }

        // Unmount on page hide
        {
            let window_hide = window.clone();
            let closure = Closure::<dyn FnMut(_)>::new(move |_event: Event| {
                if !ticket.is_live() {
                    return;
                }
                if let Some(id) = raf_id.take() {
                    let _ = window_hide.cancel_animation_frame(id);
                }
                callback.borrow_mut().take();
                listeners.remove_all();
                host.borrow_mut().engine.shutdown();
            });
            window.add_event_listener_with_callback("pagehide", closure.as_ref().unchecked_ref())?;
            closure.forget();
        }

        log::info!("MegaBeat running!");
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn wasm_main() -> Result<(), JsValue> {
    wasm_game::run()
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("MegaBeat (native) starting...");
    log::info!("Native mode runs a scripted session - run with `trunk serve` for the web version");

    match demo::run() {
        Ok(score) => println!("Demo finished with score {}", score),
        Err(e) => {
            log::error!("Demo failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}

/// Headless session against a scripted authority
#[cfg(not(target_arch = "wasm32"))]
mod demo {
    use megabeat::platform::{
        ChainEvent, LocalEventSource, OutboundCommand, RecordingSink, SharedCounter,
    };
    use megabeat::renderer::RecordingRenderer;
    use megabeat::sim::{GamePhase, Identity, Quality};
    use megabeat::{ConfigError, Engine, EngineConfig, Song};

    const FRAME_MS: u32 = 16;
    const BLOCKS_PER_FRAME: u64 = 4;
    const MAX_FRAMES: u32 = 5000;
    const FIRST_BLOCK: u64 = 10_000;

    /// Judges hits the way the contract would
    struct Authority {
        song: Song,
        start: Option<u64>,
        next: usize,
        finished: bool,
    }

    impl Authority {
        fn judge(distance: i64) -> Quality {
            match distance.unsigned_abs() {
                0..=8 => Quality::Perfect,
                9..=30 => Quality::Good,
                _ => Quality::Miss,
            }
        }

        fn distance(&self, start: u64, counter: u64) -> Option<i64> {
            let offset = self.song.offset(self.next)?;
            Some((start + offset) as i64 - counter as i64)
        }

        /// Answer commands and expire passed notes; returns one batch
        fn respond(&mut self, commands: Vec<OutboundCommand>, counter: u64) -> Vec<ChainEvent> {
            let mut batch = Vec::new();
            for command in commands {
                match command {
                    OutboundCommand::RequestSessionStart { identity, .. } => {
                        self.start = Some(counter);
                        batch.push(ChainEvent::SessionStarted {
                            identity,
                            start_reference: counter,
                        });
                    }
                    OutboundCommand::AttemptNoteHit {
                        identity,
                        note_index,
                    } => {
                        let Some(start) = self.start else { continue };
                        if note_index != self.next {
                            continue;
                        }
                        let Some(distance) = self.distance(start, counter) else {
                            continue;
                        };
                        batch.push(ChainEvent::NoteResult {
                            identity,
                            note_index,
                            quality: Self::judge(distance),
                        });
                        self.next += 1;
                    }
                }
            }

            let Some(start) = self.start else {
                return batch;
            };
            let identity = Identity::new(super::DEMO_PLAYER);
            if self.distance(start, counter).is_some_and(|d| d < -30) {
                batch.push(ChainEvent::NoteResult {
                    identity: identity.clone(),
                    note_index: self.next,
                    quality: Quality::Miss,
                });
                self.next += 1;
            }
            if self.next >= self.song.len() && !self.finished {
                self.finished = true;
                batch.push(ChainEvent::SessionFinished { identity });
            }
            batch
        }
    }

    pub fn run() -> Result<u64, ConfigError> {
        let config = EngineConfig::demo();
        let counter = SharedCounter::new();
        let events = LocalEventSource::new();
        let commands = RecordingSink::new();
        let renderer = RecordingRenderer::new();

        let mut authority = Authority {
            song: config.song.clone(),
            start: None,
            next: 0,
            finished: false,
        };
        let mut engine = Engine::new(
            config,
            Box::new(counter.clone()),
            Box::new(events.clone()),
            Box::new(commands.clone()),
            renderer.clone(),
        )?;

        let mut block = FIRST_BLOCK;
        let mut attempted: Option<usize> = None;
        engine.press_begin(Identity::new(super::DEMO_PLAYER));

        for frame_no in 0..MAX_FRAMES {
            counter.push(block);
            engine.frame(FRAME_MS);

            // Player: press on the head note, sloppy on every fourth one,
            // asleep on every seventh
            if let Some(frame) = renderer.last_frame() {
                let head = frame.notes.iter().find(|n| n.index == frame.current_index);
                if let Some(note) = head {
                    let window = if note.index % 4 == 3 { 24 } else { 4 };
                    if note.index % 7 != 6
                        && note.distance_to_hit <= window
                        && attempted != Some(note.index)
                    {
                        attempted = Some(note.index);
                        engine.press_hit();
                    }
                }
                if frame_no % 60 == 0 {
                    log::info!(
                        "frame {}: block {} head {} score {} notes {:?}",
                        frame_no,
                        frame.counter,
                        frame.current_index,
                        frame.score,
                        frame.notes.iter().map(|n| n.distance_to_hit).collect::<Vec<_>>()
                    );
                }
            }

            let batch = authority.respond(commands.take(), block);
            if !batch.is_empty() {
                events.deliver(&batch);
            }

            if engine.state().phase() == GamePhase::Finished {
                break;
            }
            if engine.state().phase() == GamePhase::Playing {
                block += BLOCKS_PER_FRAME;
            }
        }

        let snapshot = engine.state().snapshot();
        log::info!(
            "Session ended in {:?}: {} / {} after {} notes",
            snapshot.phase,
            snapshot.score,
            snapshot.max_score,
            snapshot.consumed_index
        );
        engine.press_reset();
        engine.frame(FRAME_MS);
        engine.shutdown();
        Ok(snapshot.score)
    }
}

#[cfg(not(target_arch = "wasm32"))]
const DEMO_PLAYER: &str = "0xDe000000000000000000000000000000000000b0";
