//! Tambourine driver
//!
//! A single servo swings the tambourine against a stop and returns. Any
//! note-down requests a swing; `update` reports the angle the firmware
//! should write to the servo each loop iteration: the hit angle for the
//! configured hold time, home otherwise. The bus callbacks themselves
//! never touch hardware.

use carillon_protocol::{Feature, Instrument, NoteEvent};

/// Tambourine driver configuration
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TambourineConfig {
    /// Servo rest angle in degrees
    pub home_angle: u8,
    /// Servo angle while striking
    pub hit_angle: u8,
    /// How long the hit angle is held in ms
    pub hit_ms: u32,
    /// MIDI note advertised for the single jingle
    pub midi_note: u8,
    /// Scheduling offset advertised to the master in ms
    pub offset_ms: i16,
}

impl Default for TambourineConfig {
    fn default() -> Self {
        Self {
            home_angle: 115,
            hit_angle: 130,
            hit_ms: 150,
            midi_note: 64,
            offset_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Swing {
    Idle,
    /// Requested by the bus, starts at the next update
    Pending,
    /// Holding the hit angle since the recorded millisecond
    Holding(u32),
}

/// Tambourine driver state
pub struct Tambourine {
    config: TambourineConfig,
    swing: Swing,
    features: [Feature; 2],
}

impl Tambourine {
    pub fn new(config: TambourineConfig) -> Self {
        let features = [
            Feature::NoteChannel {
                channel: 0,
                midi_min: config.midi_note,
                midi_max: config.midi_note,
            },
            Feature::Offset(config.offset_ms),
        ];
        Self {
            config,
            swing: Swing::Idle,
            features,
        }
    }

    /// Angle to write to the servo this loop iteration
    ///
    /// Call every iteration with a monotonic millisecond clock.
    pub fn update(&mut self, now_ms: u32) -> u8 {
        match self.swing {
            Swing::Idle => self.config.home_angle,
            Swing::Pending => {
                self.swing = Swing::Holding(now_ms);
                self.config.hit_angle
            }
            Swing::Holding(since) => {
                if now_ms.wrapping_sub(since) >= self.config.hit_ms {
                    self.swing = Swing::Idle;
                    self.config.home_angle
                } else {
                    self.config.hit_angle
                }
            }
        }
    }

    /// Whether a swing is requested or in progress
    pub fn is_swinging(&self) -> bool {
        self.swing != Swing::Idle
    }
}

impl Instrument for Tambourine {
    fn features(&self) -> &[Feature] {
        &self.features
    }

    // The whole instrument is one jingle, so every note triggers it,
    // whatever note or channel the conductor chose to route here.
    fn on_note_down(&mut self, _event: NoteEvent) {
        self.swing = Swing::Pending;
    }

    fn on_note_up(&mut self, _event: NoteEvent) {
        // the swing returns on its own
    }
}
