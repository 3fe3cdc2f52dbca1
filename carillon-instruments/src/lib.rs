//! Instrument actuation drivers
//!
//! Concrete implementations of the carillon-protocol [`Instrument`]
//! callback interface for the instruments in the chain:
//!
//! - Glockenspiel (solenoid strikers, one coil per bar)
//! - Stepper choir (square-wave voices on stepper STEP pins)
//! - Tambourine (servo swing)
//!
//! Drivers never block: bus callbacks only record what to do, and each
//! driver's `update` call performs the actual pin work by polling elapsed
//! time from the firmware super-loop, so a long actuation can never
//! starve the protocol engine.
//!
//! [`Instrument`]: carillon_protocol::Instrument

#![no_std]
#![deny(unsafe_code)]

pub mod glockenspiel;
pub mod steppers;
pub mod tambourine;

pub use glockenspiel::{Glockenspiel, GlockenspielConfig};
pub use steppers::{StepperChoir, StepperChoirConfig};
pub use tambourine::{Tambourine, TambourineConfig};

/// Trait for GPIO pin abstraction
///
/// Implemented over whatever pin type the board HAL provides.
pub trait OutputPin {
    /// Set the pin high
    fn set_high(&mut self);

    /// Set the pin low
    fn set_low(&mut self);

    /// Set the pin to a specific state
    fn set_state(&mut self, high: bool) {
        if high {
            self.set_high();
        } else {
            self.set_low();
        }
    }
}
