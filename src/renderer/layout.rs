//! Screen layout for projected notes
//!
//! Notes fall down a single vertical lane. A note sits on the hit line when
//! its distance is zero and moves `pixels_per_block` per block.

use glam::Vec2;

use super::Frame;
use crate::consts::*;
use crate::settings::EngineConfig;

/// A note ready to paint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteSprite {
    pub index: usize,
    pub pos: Vec2,
    pub radius: f32,
    pub color: [f32; 4],
    /// The note the player should hit next
    pub is_head: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub width: f32,
    pub height: f32,
    pub lane_x: f32,
    pub hit_line_y: f32,
    pub pixels_per_block: f32,
    pub note_radius: f32,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            width: CANVAS_WIDTH,
            height: CANVAS_HEIGHT,
            lane_x: CANVAS_WIDTH / 2.0,
            hit_line_y: HIT_LINE_Y,
            pixels_per_block: PIXELS_PER_BLOCK,
            note_radius: NOTE_RADIUS,
        }
    }
}

impl Layout {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            hit_line_y: config.hit_line_y,
            pixels_per_block: config.pixels_per_block,
            ..Self::default()
        }
    }

    /// Vertical position for a note `distance` blocks from the hit line
    #[inline]
    pub fn note_y(&self, distance: i64) -> f32 {
        self.hit_line_y - distance as f32 * self.pixels_per_block
    }

    /// Whether any part of a note at `y` lands on the canvas
    #[inline]
    pub fn on_canvas(&self, y: f32) -> bool {
        y > -self.note_radius && y < self.height + self.note_radius
    }

    /// Sprites for every projected note that reaches the canvas
    pub fn sprites(&self, frame: &Frame) -> Vec<NoteSprite> {
        frame
            .notes
            .iter()
            .filter(|note| note.visible)
            .filter_map(|note| {
                let y = self.note_y(note.distance_to_hit);
                if !self.on_canvas(y) {
                    return None;
                }
                let is_head = note.index == frame.current_index;
                Some(NoteSprite {
                    index: note.index,
                    pos: Vec2::new(self.lane_x, y),
                    radius: self.note_radius,
                    color: if is_head { colors::NOTE_HEAD } else { colors::NOTE },
                    is_head,
                })
            })
            .collect()
    }
}

/// Colors for game elements
pub mod colors {
    use crate::sim::Quality;

    pub const BACKGROUND: [f32; 4] = [0.102, 0.102, 0.180, 1.0];
    pub const TRACK: [f32; 4] = [0.267, 0.267, 0.400, 1.0];
    pub const HIT_LINE: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
    pub const HIT_ZONE: [f32; 4] = [0.0, 1.0, 0.0, 0.1];
    pub const NOTE: [f32; 4] = [0.306, 0.804, 0.769, 1.0];
    pub const NOTE_HEAD: [f32; 4] = [1.0, 0.420, 0.420, 1.0];
    pub const TEXT: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

    pub fn quality(quality: Quality) -> [f32; 4] {
        match quality {
            Quality::Perfect => [1.0, 0.8, 0.2, 1.0],
            Quality::Good => [0.4, 0.9, 1.0, 1.0],
            Quality::Miss => [0.7, 0.7, 0.8, 1.0],
        }
    }

    /// CSS `rgba()` string for canvas 2D fill styles
    pub fn css(color: [f32; 4]) -> String {
        let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!(
            "rgba({}, {}, {}, {})",
            channel(color[0]),
            channel(color[1]),
            channel(color[2]),
            color[3]
        )
    }
}
