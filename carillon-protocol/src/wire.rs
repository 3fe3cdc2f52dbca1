//! Wire-level constants of the bus protocol
//!
//! Reserved bytes, node addresses, command/status/report codes and the
//! feature descriptor codes. All values are fixed by the bus dialect and
//! shared with the master implementation.

/// Frame synchronization byte. Never appears as payload: any occurrence
/// on the wire starts a new frame.
pub const SYNC: u8 = 0xE0;

/// Escape marker. `MARK, x` on the wire decodes to the payload byte
/// `x + 1`.
pub const MARK: u8 = 0xD0;

// Node addresses
/// The master's address; nodes only ever send to it
pub const ADDR_MASTER: u8 = 0x00;
/// Broadcast destination, received by every node
pub const ADDR_BROADCAST: u8 = 0xFF;
/// Identity of a node that has not been assigned an address yet
pub const ADDR_UNSET: u8 = ADDR_BROADCAST;

// Protocol versions reported by the version queries (BCD-style nibbles)
/// Command set version (1.3)
pub const VERSION_CMD: u8 = 0x13;
/// Bus protocol version (2.0)
pub const VERSION_BUS: u8 = 0x20;
/// Communication layer version (1.0)
pub const VERSION_COMM: u8 = 0x10;

// Status codes (first byte after the length of every response)
pub const STATUS_OK: u8 = 0x01;
pub const STATUS_UNKNOWN_COMMAND: u8 = 0x02;
pub const STATUS_CHECKSUM: u8 = 0x03;
pub const STATUS_OVERFLOW: u8 = 0x04;
/// Reserved catch-all, never emitted by this engine
pub const STATUS_UNKNOWN: u8 = 0xFF;

// Report codes (first byte of an OK-status body)
pub const REPORT_OK: u8 = 0x01;
pub const REPORT_PARAM_MISSING: u8 = 0x02;
pub const REPORT_PARAM_INVALID: u8 = 0x03;
pub const REPORT_BUSY: u8 = 0x04;

/// Check byte a reset command must carry to take effect
pub const RESET_CHECK: u8 = 0xD9;

// Transport configuration commands
pub const CMD_RESET: u8 = 0xF0;
pub const CMD_ASSIGN_ADDR: u8 = 0xF1;

// Configuration queries
pub const CMD_READ_ID: u8 = 0x10;
pub const CMD_GET_CMD_VERSION: u8 = 0x11;
pub const CMD_GET_BUS_VERSION: u8 = 0x12;
pub const CMD_GET_COMM_VERSION: u8 = 0x13;
pub const CMD_GET_FEATURES: u8 = 0x14;

/// Reserved by the bus dialect, not implemented at this layer; nodes
/// answer it like any unknown command
pub const CMD_REQUEST_RETRANSMIT: u8 = 0x2F;

// Control and debug commands
pub const CMD_PING: u8 = 0x60;
pub const CMD_GET_SENSE: u8 = 0x61;
pub const CMD_INCR: u8 = 0x62;
pub const CMD_CNTR: u8 = 0x63;

// Instrument commands
pub const CMD_NOTE_DOWN: u8 = 0x70;
pub const CMD_NOTE_UP: u8 = 0x71;
pub const CMD_LIGHT: u8 = 0x72;
pub const CMD_CONTROL: u8 = 0x73;

// Feature descriptor codes
pub const FEATURE_PAD: u8 = 0x00;
pub const FEATURE_EOF: u8 = 0x00;
pub const FEATURE_NOTE_CHANNEL: u8 = 0x01;
pub const FEATURE_LIGHT_CHANNEL: u8 = 0x02;
pub const FEATURE_CONTROL_CHANNEL: u8 = 0x03;
pub const FEATURE_OFFSET: u8 = 0x04;
