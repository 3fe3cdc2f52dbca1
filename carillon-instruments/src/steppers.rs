//! Stepper choir driver
//!
//! Each stepper motor is one voice: stepping at an audible rate turns the
//! motor into a square-wave tone generator, so a chord is just one note
//! per motor. A note-down claims a free voice, a note-up releases the
//! voice playing that note, and `update` toggles each active voice's STEP
//! pin whenever its half-period has elapsed.
//!
//! Pitch comes from an integer period table for one reference octave,
//! shifted left or right per octave, so no floating point is needed.

use carillon_protocol::{Feature, Instrument, NoteEvent};
use heapless::Vec;

use crate::OutputPin;

/// Full square-wave periods in microseconds for MIDI notes 60..=71
/// (C4..B4, equal temperament, A4 = 440 Hz)
const PERIOD_US_OCTAVE4: [u32; 12] = [
    3822, 3608, 3405, 3214, 3034, 2863, 2703, 2551, 2408, 2273, 2145, 2025,
];

/// MIDI octave index of the reference table (note 60 / 12)
const TABLE_OCTAVE: u8 = 5;

/// Full period in microseconds of a MIDI note
///
/// Periods halve going up an octave and double going down, which the
/// integer shift reproduces exactly.
pub fn note_period_us(note: u8) -> u32 {
    let base = PERIOD_US_OCTAVE4[usize::from(note % 12)];
    let octave = note / 12;
    if octave >= TABLE_OCTAVE {
        base >> (octave - TABLE_OCTAVE)
    } else {
        base << (TABLE_OCTAVE - octave)
    }
}

/// Stepper choir configuration
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StepperChoirConfig {
    /// Lowest MIDI note the motors track cleanly
    pub midi_min: u8,
    /// Highest MIDI note worth advertising
    pub midi_max: u8,
    /// Scheduling offset advertised to the master in ms
    pub offset_ms: i16,
}

impl Default for StepperChoirConfig {
    fn default() -> Self {
        Self {
            midi_min: 36,
            midi_max: 84,
            offset_ms: 0,
        }
    }
}

/// One sounding note
#[derive(Debug, Clone, Copy)]
struct Voice {
    note: u8,
    half_period_us: u32,
    next_toggle_us: u32,
    level: bool,
}

/// Stepper choir driver state
///
/// `N` motors give `N`-voice polyphony; voice `i` drives `pins[i]`.
pub struct StepperChoir<P, const N: usize> {
    config: StepperChoirConfig,
    pins: [P; N],
    voices: Vec<Voice, N>,
    features: [Feature; 2],
}

impl<P: OutputPin, const N: usize> StepperChoir<P, N> {
    pub fn new(mut pins: [P; N], config: StepperChoirConfig) -> Self {
        for pin in &mut pins {
            pin.set_low();
        }
        let features = [
            Feature::NoteChannel {
                channel: 0,
                midi_min: config.midi_min,
                midi_max: config.midi_max,
            },
            Feature::Offset(config.offset_ms),
        ];
        Self {
            config,
            pins,
            voices: Vec::new(),
            features,
        }
    }

    /// Advance every active voice's square wave
    ///
    /// Call every loop iteration with a monotonic microsecond clock. The
    /// toggle deadline comparison is wrap-safe, so the u32 clock rolling
    /// over mid-note is fine.
    pub fn update(&mut self, now_us: u32) {
        for (i, voice) in self.voices.iter_mut().enumerate() {
            if (now_us.wrapping_sub(voice.next_toggle_us) as i32) >= 0 {
                voice.level = !voice.level;
                self.pins[i].set_state(voice.level);
                voice.next_toggle_us = now_us.wrapping_add(voice.half_period_us);
            }
        }
        // park the motors behind the released voices
        for pin in &mut self.pins[self.voices.len()..] {
            pin.set_low();
        }
    }

    /// Number of currently sounding voices
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }
}

impl<P: OutputPin, const N: usize> Instrument for StepperChoir<P, N> {
    fn features(&self) -> &[Feature] {
        &self.features
    }

    fn on_note_down(&mut self, event: NoteEvent) {
        if event.channel != 0 {
            return;
        }
        // all motors busy: the note is dropped rather than stealing a
        // voice mid-tone
        let _ = self.voices.push(Voice {
            note: event.note,
            half_period_us: note_period_us(event.note) / 2,
            next_toggle_us: 0,
            level: false,
        });
    }

    fn on_note_up(&mut self, event: NoteEvent) {
        if event.channel != 0 {
            return;
        }
        self.voices.retain(|voice| voice.note != event.note);
    }
}
