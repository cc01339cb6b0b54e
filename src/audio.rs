//! Audio system using Web Audio API
//!
//! Procedurally generated cues - no external files needed!

use web_sys::{AudioContext, GainNode, OscillatorNode, OscillatorType};

use crate::sim::Quality;

/// Sound effect types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundEffect {
    /// Countdown step (3, 2, 1)
    CountdownTick,
    /// Countdown over, notes start moving
    Go,
    /// Note resolved
    Perfect,
    Good,
    Miss,
    /// Session finished
    Finish,
}

impl From<Quality> for SoundEffect {
    fn from(quality: Quality) -> Self {
        match quality {
            Quality::Perfect => SoundEffect::Perfect,
            Quality::Good => SoundEffect::Good,
            Quality::Miss => SoundEffect::Miss,
        }
    }
}

/// One scheduled oscillator
#[derive(Debug, Clone, Copy)]
struct Tone {
    freq: f32,
    wave: OscillatorType,
    /// Start time on the context clock
    at: f64,
    /// Seconds until the envelope has decayed
    length: f64,
    glide_to: Option<f32>,
}

impl Tone {
    fn new(freq: f32, wave: OscillatorType, at: f64, length: f64) -> Self {
        Self {
            freq,
            wave,
            at,
            length,
            glide_to: None,
        }
    }
}

/// Audio manager for the game
pub struct AudioManager {
    ctx: Option<AudioContext>,
    master_volume: f32,
    muted: bool,
}

impl Default for AudioManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioManager {
    pub fn new() -> Self {
        // May fail outside a secure context
        let ctx = AudioContext::new().ok();
        if ctx.is_none() {
            log::warn!("Failed to create AudioContext - audio disabled");
        }
        Self {
            ctx,
            master_volume: 0.8,
            muted: false,
        }
    }

    /// Resume audio context (required after user gesture)
    pub fn resume(&self) {
        if let Some(ctx) = &self.ctx {
            let _ = ctx.resume();
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Flip mute; returns the new state
    pub fn toggle_muted(&mut self) -> bool {
        self.muted = !self.muted;
        log::info!("Audio {}", if self.muted { "muted" } else { "unmuted" });
        self.muted
    }

    fn effective_volume(&self) -> f32 {
        if self.muted { 0.0 } else { self.master_volume }
    }

    /// Play a sound effect
    pub fn play(&self, effect: SoundEffect) {
        let vol = self.effective_volume();
        if vol <= 0.0 {
            return;
        }

        let Some(ctx) = &self.ctx else { return };

        if ctx.state() == web_sys::AudioContextState::Suspended {
            let _ = ctx.resume();
        }

        let t = ctx.current_time();
        match effect {
            SoundEffect::CountdownTick => {
                self.tone(ctx, Tone::new(440.0, OscillatorType::Square, t, 0.12), vol * 0.2)
            }
            SoundEffect::Go => {
                self.tone(ctx, Tone::new(880.0, OscillatorType::Square, t, 0.3), vol * 0.2)
            }
            SoundEffect::Perfect => self.arpeggio(ctx, vol, &[660.0, 880.0, 1320.0], t, 0.05),
            SoundEffect::Good => self.arpeggio(ctx, vol, &[520.0, 660.0], t, 0.06),
            SoundEffect::Miss => {
                // Dull descending thud
                let thud = Tone {
                    glide_to: Some(80.0),
                    ..Tone::new(220.0, OscillatorType::Sine, t, 0.25)
                };
                self.tone(ctx, thud, vol * 0.4);
            }
            SoundEffect::Finish => self.arpeggio(ctx, vol, &[400.0, 500.0, 600.0, 800.0], t, 0.1),
        }
    }

    /// Rising notes, `step` seconds apart
    fn arpeggio(&self, ctx: &AudioContext, vol: f32, freqs: &[f32], t: f64, step: f64) {
        for (i, freq) in freqs.iter().enumerate() {
            let note = Tone::new(*freq, OscillatorType::Triangle, t + i as f64 * step, 0.2);
            self.tone(ctx, note, vol * 0.25);
        }
    }

    /// Schedule one oscillator with a decaying envelope
    fn tone(&self, ctx: &AudioContext, tone: Tone, peak: f32) {
        let Some((osc, gain)) = self.create_osc(ctx, tone.freq, tone.wave) else {
            return;
        };
        let end = tone.at + tone.length;

        gain.gain().set_value_at_time(peak, tone.at).ok();
        gain.gain().exponential_ramp_to_value_at_time(0.01, end).ok();
        if let Some(target) = tone.glide_to {
            osc.frequency().set_value_at_time(tone.freq, tone.at).ok();
            osc.frequency()
                .exponential_ramp_to_value_at_time(target, end)
                .ok();
        }

        osc.start_with_when(tone.at).ok();
        osc.stop_with_when(end + 0.05).ok();
    }

    fn create_osc(
        &self,
        ctx: &AudioContext,
        freq: f32,
        wave: OscillatorType,
    ) -> Option<(OscillatorNode, GainNode)> {
        let osc = ctx.create_oscillator().ok()?;
        let gain = ctx.create_gain().ok()?;

        osc.set_type(wave);
        osc.frequency().set_value(freq);
        osc.connect_with_audio_node(&gain).ok()?;
        gain.connect_with_audio_node(&ctx.destination()).ok()?;

        Some((osc, gain))
    }
}
