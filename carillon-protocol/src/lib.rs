//! Carillon bus node protocol
//!
//! This crate implements the node side of the Carillon instrument bus: a
//! daisy-chained, half-duplex serial bus on which a master addresses
//! small instrument controllers with a byte-stuffed, checksummed
//! request/response protocol derived from the JVS arcade I/O bus.
//!
//! # Frame format
//!
//! ```text
//! ┌──────┬──────────────┬───────┬────────────┬─────────┬──────────┐
//! │ SYNC │ DESTINATION  │ COUNT │ CMD/STATUS │ BODY    │ CHECKSUM │
//! │ raw  │ 1B           │ 1B    │ 1B         │ 0–62B   │ 1B       │
//! └──────┴──────────────┴───────┴────────────┴─────────┴──────────┘
//! ```
//!
//! Everything after `SYNC` is byte-stuffed: a payload byte equal to
//! `SYNC` or `MARK` travels as `MARK, value − 1`. `COUNT` is the number
//! of bytes following it up to and including the checksum; the checksum
//! is the wrapping mod-256 sum of the decoded destination, count,
//! command/status and body bytes.
//!
//! The engine is driven by calling [`BusNode::tick`] from the firmware
//! super-loop; each tick handles at most one frame and invokes the
//! device's [`Instrument`] callbacks for note, light and control events.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod codec;
pub mod features;
pub mod instrument;
pub mod node;
pub mod wire;

pub use codec::{Checksum, Reply};
pub use features::Feature;
pub use instrument::{ControlEvent, Instrument, LightEvent, NoteEvent};
pub use node::{BusNode, RX_CAPACITY};
