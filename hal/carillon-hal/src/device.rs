//! Node device control
//!
//! Identification and reset hooks the protocol engine needs from the
//! platform but which are not bus I/O.

/// Device-level control of a bus node
pub trait DeviceControl {
    /// Identification string advertised to the master
    ///
    /// Conventionally `"Name;VerX.XX;"`. Sent verbatim (plus a trailing
    /// NUL) in response to a read-identification command.
    fn identification(&self) -> &str;

    /// Reset the device
    ///
    /// Invoked by the bus reset command. Implementations typically jump to
    /// the reset vector or trigger the watchdog; returning is permitted
    /// (the engine carries no assumption that this diverges).
    fn reset(&mut self);
}
