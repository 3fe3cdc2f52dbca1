//! Glockenspiel driver
//!
//! One solenoid striker per bar over a contiguous MIDI range. A note-down
//! queues a strike; the next `update` energizes the coil and releases it
//! again after the configured pulse. The instrument is percussive, so
//! note-up events are ignored and velocity has no effect on a fixed-throw
//! solenoid.

use carillon_protocol::{Feature, Instrument, NoteEvent};
use heapless::Vec;

use crate::OutputPin;

/// How many queued strikes can wait for the next update
const STRIKE_QUEUE: usize = 8;

/// Glockenspiel driver configuration
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlockenspielConfig {
    /// MIDI note of the lowest bar
    pub midi_base: u8,
    /// Coil energize time per strike in ms
    pub strike_ms: u32,
    /// Scheduling offset advertised to the master in ms
    pub offset_ms: i16,
}

impl Default for GlockenspielConfig {
    fn default() -> Self {
        Self {
            midi_base: 79,
            strike_ms: 30,
            offset_ms: 0,
        }
    }
}

/// Glockenspiel driver state
///
/// `N` is the number of bars; bar `i` plays MIDI note `midi_base + i`
/// through `pins[i]`.
pub struct Glockenspiel<P, const N: usize> {
    config: GlockenspielConfig,
    pins: [P; N],
    /// Strike start per bar, `None` while the coil is released
    struck_at: [Option<u32>; N],
    /// Bars waiting for the next update
    pending: Vec<u8, STRIKE_QUEUE>,
    features: [Feature; 2],
}

impl<P: OutputPin, const N: usize> Glockenspiel<P, N> {
    /// Create the driver; all coils start released
    pub fn new(mut pins: [P; N], config: GlockenspielConfig) -> Self {
        for pin in &mut pins {
            pin.set_low();
        }
        let features = [
            Feature::NoteChannel {
                channel: 0,
                midi_min: config.midi_base,
                midi_max: config.midi_base + (N as u8 - 1),
            },
            Feature::Offset(config.offset_ms),
        ];
        Self {
            config,
            pins,
            struck_at: [None; N],
            pending: Vec::new(),
            features,
        }
    }

    /// Apply queued strikes and release elapsed ones
    ///
    /// Call every loop iteration with a monotonic millisecond clock.
    pub fn update(&mut self, now_ms: u32) {
        for &bar in &self.pending {
            let bar = usize::from(bar);
            self.pins[bar].set_high();
            self.struck_at[bar] = Some(now_ms);
        }
        self.pending.clear();

        for (bar, struck) in self.struck_at.iter_mut().enumerate() {
            if let Some(since) = *struck {
                if now_ms.wrapping_sub(since) >= self.config.strike_ms {
                    self.pins[bar].set_low();
                    *struck = None;
                }
            }
        }
    }

    /// Whether any coil is energized or queued
    pub fn is_active(&self) -> bool {
        !self.pending.is_empty() || self.struck_at.iter().any(Option::is_some)
    }
}

impl<P: OutputPin, const N: usize> Instrument for Glockenspiel<P, N> {
    fn features(&self) -> &[Feature] {
        &self.features
    }

    fn on_note_down(&mut self, event: NoteEvent) {
        if event.channel != 0 {
            return;
        }
        let Some(bar) = event.note.checked_sub(self.config.midi_base) else {
            return;
        };
        if usize::from(bar) >= N {
            return;
        }
        // queue overflow drops the strike; the bar is already busy anyway
        let _ = self.pending.push(bar);
    }

    fn on_note_up(&mut self, _event: NoteEvent) {
        // percussive: the strike ends on its own
    }
}
