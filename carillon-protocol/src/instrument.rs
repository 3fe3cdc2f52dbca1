//! Instrument callback interface
//!
//! The engine decodes note, light and control commands into small event
//! structs and hands them to whatever implements [`Instrument`]. The
//! engine holds the instrument by generic parameter and never knows the
//! concrete device; actuation stays entirely on the instrument side.

use crate::features::Feature;

/// Shared wire layout of instrument command bodies:
/// `time: u32` little-endian, then three single bytes.
fn decode_fields(payload: &[u8]) -> Option<(u32, u8, u8, u8)> {
    if payload.len() < 7 {
        return None;
    }
    let time = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    Some((time, payload[4], payload[5], payload[6]))
}

/// A note-down or note-up command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NoteEvent {
    /// Master timeline timestamp in milliseconds
    pub time: u32,
    pub channel: u8,
    /// MIDI note number
    pub note: u8,
    pub velocity: u8,
}

impl NoteEvent {
    /// Decode from a command body, `None` if the body is short
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        let (time, channel, note, velocity) = decode_fields(payload)?;
        Some(Self {
            time,
            channel,
            note,
            velocity,
        })
    }
}

/// A light command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LightEvent {
    pub time: u32,
    pub channel: u8,
    pub light: u8,
    pub value: u8,
}

impl LightEvent {
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        let (time, channel, light, value) = decode_fields(payload)?;
        Some(Self {
            time,
            channel,
            light,
            value,
        })
    }
}

/// A control command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlEvent {
    pub time: u32,
    pub channel: u8,
    pub control: u8,
    pub value: u8,
}

impl ControlEvent {
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        let (time, channel, control, value) = decode_fields(payload)?;
        Some(Self {
            time,
            channel,
            control,
            value,
        })
    }
}

/// Callback set an instrument implements
///
/// Invoked synchronously from inside the engine's tick, so handlers must
/// only record what to do; the physical actuation happens in the
/// instrument's own time-sliced update.
pub trait Instrument {
    /// Capabilities advertised to the master, in wire order
    fn features(&self) -> &[Feature];

    /// A note starts sounding
    fn on_note_down(&mut self, event: NoteEvent);

    /// A note stops sounding
    fn on_note_up(&mut self, event: NoteEvent);

    /// A light changes; return whether the instrument handled it
    fn on_light(&mut self, event: LightEvent) -> bool {
        let _ = event;
        false
    }

    /// A control value changes; return whether the instrument handled it
    fn on_control(&mut self, event: ControlEvent) -> bool {
        let _ = event;
        false
    }
}
