//! Half-duplex serial port abstraction
//!
//! Provides the trait for the shared bus transceiver that can be
//! implemented by chip-specific HALs. The bus is physically half-duplex:
//! a single transceiver is steered between receiving and transmitting
//! with a direction select line.

/// Transfer direction of the shared bus transceiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusDirection {
    /// Listen to the bus (default, and the state the engine always
    /// restores before yielding)
    Receive,
    /// Drive the bus to send a response
    Transmit,
}

/// Byte-level access to the half-duplex bus
///
/// Implementations should handle the actual UART peripheral and the
/// transceiver direction pin for the specific chip.
pub trait BusPort {
    /// Check whether at least one received byte is waiting
    fn rx_ready(&mut self) -> bool;

    /// Read one byte from the bus
    ///
    /// Blocks until a byte arrives. There is no timeout: the bus contract
    /// is that a started frame is always finished (or restarted) by the
    /// master.
    fn read_byte(&mut self) -> u8;

    /// Write one byte to the bus
    ///
    /// Blocks until the byte has left the transmitter, so that the
    /// direction can be switched back immediately after the last byte.
    fn write_byte(&mut self, byte: u8);

    /// Steer the transceiver
    fn set_direction(&mut self, direction: BusDirection);
}
