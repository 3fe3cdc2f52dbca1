//! Feature descriptors advertised by instruments
//!
//! A node answers the get-features query with an ordered list of
//! descriptors, one per capability, each exactly 4 bytes on the wire:
//! a kind byte followed by 3 parameter bytes (padded where the parameters
//! are shorter). The list is terminated by a single
//! [`FEATURE_EOF`](crate::wire::FEATURE_EOF) byte.
//!
//! Descriptors are purely advertisement: the engine never enforces the
//! ranges they declare.

use crate::codec::Reply;
use crate::wire::{
    FEATURE_CONTROL_CHANNEL, FEATURE_LIGHT_CHANNEL, FEATURE_NOTE_CHANNEL, FEATURE_OFFSET,
    FEATURE_PAD,
};

/// One advertised capability of an instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Feature {
    /// A note channel and the MIDI range it can play
    NoteChannel {
        channel: u8,
        midi_min: u8,
        midi_max: u8,
    },
    /// A light channel and its value range
    LightChannel { channel: u8, min: u8, max: u8 },
    /// A control channel and its value range
    ControlChannel { channel: u8, min: u8, max: u8 },
    /// Scheduling offset request in milliseconds, positive meaning the
    /// node wants its events early
    Offset(i16),
}

impl Feature {
    /// Stage the 4-byte wire form of this descriptor
    pub fn encode_into(&self, reply: &mut Reply) {
        match *self {
            Feature::NoteChannel {
                channel,
                midi_min,
                midi_max,
            } => {
                reply.push(FEATURE_NOTE_CHANNEL);
                reply.push(channel);
                reply.push(midi_min);
                reply.push(midi_max);
            }
            Feature::LightChannel { channel, min, max } => {
                reply.push(FEATURE_LIGHT_CHANNEL);
                reply.push(channel);
                reply.push(min);
                reply.push(max);
            }
            Feature::ControlChannel { channel, min, max } => {
                reply.push(FEATURE_CONTROL_CHANNEL);
                reply.push(channel);
                reply.push(min);
                reply.push(max);
            }
            Feature::Offset(offset) => {
                // high byte first, padded to the fixed descriptor size
                reply.push(FEATURE_OFFSET);
                reply.push((offset >> 8) as u8);
                reply.push(offset as u8);
                reply.push(FEATURE_PAD);
            }
        }
    }
}
