//! The bus node engine
//!
//! One [`BusNode`] owns the platform and the instrument and is driven by
//! calling [`BusNode::tick`] from the firmware super-loop. Each tick
//! either returns immediately (no sync byte pending) or consumes exactly
//! one inbound frame, synchronously answering and/or invoking instrument
//! callbacks before it returns.
//!
//! The receiver is a state machine with a 1-to-1 correlation between
//! state transitions and bytes read. That shape is what the protocol
//! demands: any `SYNC` observed anywhere must be treated as the start of
//! a new frame, discarding all progress on the frame in flight, so every
//! state decodes through one operation that can signal the restart.
//!
//! Byte reads inside a frame block with no timeout. A master that stops
//! transmitting mid-frame stalls the node until the next byte arrives;
//! that is the bus contract, not a defect to paper over with deadlines.
//! The direction selector is restored to receive on every exit path.

use carillon_hal::{BusDirection, Platform, SenseLevel};

use crate::codec::{self, Checksum, Reply};
use crate::instrument::{ControlEvent, Instrument, LightEvent, NoteEvent};
use crate::wire::{
    ADDR_BROADCAST, ADDR_MASTER, ADDR_UNSET, CMD_ASSIGN_ADDR, CMD_CNTR, CMD_CONTROL,
    CMD_GET_BUS_VERSION, CMD_GET_CMD_VERSION, CMD_GET_COMM_VERSION, CMD_GET_FEATURES,
    CMD_GET_SENSE, CMD_INCR, CMD_LIGHT, CMD_NOTE_DOWN, CMD_NOTE_UP, CMD_PING, CMD_READ_ID,
    CMD_RESET, FEATURE_EOF, MARK, REPORT_OK, REPORT_PARAM_INVALID, REPORT_PARAM_MISSING,
    RESET_CHECK, STATUS_CHECKSUM, STATUS_OK, STATUS_OVERFLOW, STATUS_UNKNOWN_COMMAND, SYNC,
    VERSION_BUS, VERSION_CMD, VERSION_COMM,
};

/// Capacity of the receive body buffer in bytes
pub const RX_CAPACITY: usize = 64;

/// Receive progress of the frame currently in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    /// No frame started; yield as soon as the line is quiet
    Waiting,
    /// `SYNC` seen, destination next
    GotSync,
    /// Destination accepted, byte count next
    ReadCount,
    /// Count accepted, command byte next
    ReadCommand,
    /// Count exceeds the receive buffer; answer and drop
    Overflow,
    /// Reading body bytes
    ReadBody,
    /// Body complete, checksum byte next
    VerifySum,
}

/// Result of decoding one stuffed payload byte
enum Decoded {
    Byte(u8),
    /// A `SYNC` arrived instead: the frame in flight is dead
    Resync,
}

/// A bus node: protocol engine state plus its platform and instrument
///
/// Constructed once at startup; all mutation happens inside [`tick`].
///
/// [`tick`]: BusNode::tick
pub struct BusNode<P, I> {
    platform: P,
    instrument: I,
    /// Assigned bus identity, [`ADDR_UNSET`] until the master addresses us
    node_id: u8,
    /// Diagnostic counter, incremented by CMD_INCR and cleared by CMD_CNTR
    counter: u8,
    state: RxState,
    sum: Checksum,
    rx_buf: [u8; RX_CAPACITY],
}

impl<P: Platform, I: Instrument> BusNode<P, I> {
    /// Create a node in the freshly-powered state
    ///
    /// Identity is unset and the downstream sense output is driven high,
    /// which keeps the next node in the chain from taking an address
    /// before this one has.
    pub fn new(mut platform: P, instrument: I) -> Self {
        platform.set_output(SenseLevel::High);
        Self {
            platform,
            instrument,
            node_id: ADDR_UNSET,
            counter: 0,
            state: RxState::Waiting,
            sum: Checksum::new(),
            rx_buf: [0; RX_CAPACITY],
        }
    }

    /// Current bus identity, [`ADDR_UNSET`] before assignment
    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    /// Whether the master has assigned this node an address
    pub fn is_addressed(&self) -> bool {
        self.node_id != ADDR_UNSET
    }

    pub fn instrument(&self) -> &I {
        &self.instrument
    }

    /// Access for the super-loop's actuation work between ticks
    pub fn instrument_mut(&mut self) -> &mut I {
        &mut self.instrument
    }

    /// Process at most one inbound frame
    ///
    /// Returns immediately when the line is idle. Once a `SYNC` has been
    /// seen the call blocks until the frame completes, is replaced by a
    /// newer `SYNC`, or is dropped for routing/capacity/integrity
    /// reasons. The direction selector is back in receive mode by the
    /// time this returns, on every path.
    pub fn tick(&mut self) {
        self.platform.set_direction(BusDirection::Receive);
        self.state = RxState::Waiting;
        self.sum = Checksum::new();

        let mut dest = ADDR_BROADCAST;
        let mut count = 0u8;
        let mut command = 0u8;
        let mut body_len = 0usize;

        loop {
            match self.state {
                RxState::Waiting => {
                    if !self.platform.rx_ready() {
                        return;
                    }
                    if self.platform.read_byte() != SYNC {
                        return;
                    }
                    self.state = RxState::GotSync;
                }

                RxState::GotSync => {
                    self.state = RxState::ReadCount;
                    dest = match self.decode() {
                        Decoded::Byte(byte) => byte,
                        Decoded::Resync => continue,
                    };
                    // nodes never take frames addressed to the master
                    if dest == ADDR_MASTER {
                        return;
                    }
                    if dest != ADDR_BROADCAST && dest != self.node_id {
                        return;
                    }
                }

                RxState::ReadCount => {
                    self.state = RxState::ReadCommand;
                    count = match self.decode() {
                        Decoded::Byte(byte) => byte,
                        Decoded::Resync => continue,
                    };
                    // count covers command + body + checksum; a count of
                    // zero is malformed and treated as oversized
                    if count == 0 || usize::from(count) - 1 > RX_CAPACITY {
                        if dest == ADDR_BROADCAST {
                            // never answer a broadcast you can't hold
                            return;
                        }
                        self.state = RxState::Overflow;
                    }
                }

                RxState::ReadCommand => {
                    self.state = RxState::ReadBody;
                    command = match self.decode() {
                        Decoded::Byte(byte) => byte,
                        Decoded::Resync => continue,
                    };
                    body_len = 0;
                }

                RxState::Overflow => {
                    self.platform.set_direction(BusDirection::Transmit);
                    // none of these bytes collide with SYNC or MARK, so
                    // the stuffing step is skipped
                    self.platform.write_byte(SYNC);
                    self.platform.write_byte(ADDR_MASTER);
                    self.platform.write_byte(2);
                    self.platform.write_byte(STATUS_OVERFLOW);
                    self.platform
                        .write_byte(ADDR_MASTER + 2 + STATUS_OVERFLOW);
                    self.platform.set_direction(BusDirection::Receive);
                    return;
                }

                RxState::ReadBody => {
                    if body_len + 2 < usize::from(count) {
                        let byte = match self.decode() {
                            Decoded::Byte(byte) => byte,
                            Decoded::Resync => continue,
                        };
                        self.rx_buf[body_len] = byte;
                        body_len += 1;
                    } else {
                        self.state = RxState::VerifySum;
                    }
                }

                RxState::VerifySum => {
                    // snapshot before the checksum byte folds itself in
                    let expected = self.sum.value();
                    let received = match self.decode() {
                        Decoded::Byte(byte) => byte,
                        Decoded::Resync => continue,
                    };
                    if expected != received {
                        // corrupted frame
                        self.platform.set_direction(BusDirection::Transmit);
                        self.platform.write_byte(SYNC);
                        self.platform.write_byte(ADDR_MASTER);
                        self.platform.write_byte(2);
                        self.platform.write_byte(STATUS_CHECKSUM);
                        self.platform
                            .write_byte(ADDR_MASTER + 2 + STATUS_CHECKSUM);
                        self.platform.set_direction(BusDirection::Receive);
                        return;
                    }
                    break;
                }
            }
        }

        // The whole frame is in and verified; no more chances to see a
        // stray SYNC, so plain sequential dispatch from here on.
        self.dispatch(dest, command, body_len);
    }

    /// Read and destuff one payload byte, folding it into the running
    /// checksum. `SYNC` is never payload: seeing one (even where an
    /// escaped byte was expected) aborts the frame in flight.
    fn decode(&mut self) -> Decoded {
        let mut byte = self.platform.read_byte();
        if byte == SYNC {
            self.state = RxState::GotSync;
            return Decoded::Resync;
        }
        if byte == MARK {
            let follow = self.platform.read_byte();
            if follow == SYNC {
                self.state = RxState::GotSync;
                return Decoded::Resync;
            }
            byte = codec::decode_escaped(follow);
        }
        self.sum.add(byte);
        Decoded::Byte(byte)
    }

    /// Execute one validated frame's command
    fn dispatch(&mut self, dest: u8, command: u8, body_len: usize) {
        let mut reply = Reply::new();
        let mut status = STATUS_OK;
        let mut lower_sense = false;

        match command {
            CMD_RESET => {
                if self.rx_buf[..body_len].first() == Some(&RESET_CHECK) {
                    self.node_id = ADDR_UNSET;
                    self.platform.set_output(SenseLevel::High);
                    self.platform.reset();
                }
                // never answered
                return;
            }

            CMD_ASSIGN_ADDR => {
                // only the first unaddressed node in the chain may take
                // an address: upstream sense high, identity still unset
                if !self.platform.input().is_high() {
                    return;
                }
                if self.node_id != ADDR_UNSET {
                    return;
                }
                match self.rx_buf[..body_len].first() {
                    Some(&address) => {
                        self.node_id = address;
                        // unblock downstream only once our acceptance is
                        // on the wire
                        lower_sense = true;
                        reply.push(REPORT_OK);
                    }
                    None => {
                        if dest == ADDR_BROADCAST {
                            return;
                        }
                        reply.push(REPORT_PARAM_MISSING);
                    }
                }
            }

            CMD_READ_ID => {
                self.send_identification();
                return;
            }
            CMD_GET_CMD_VERSION => {
                reply.push(REPORT_OK);
                reply.push(VERSION_CMD);
            }
            CMD_GET_BUS_VERSION => {
                reply.push(REPORT_OK);
                reply.push(VERSION_BUS);
            }
            CMD_GET_COMM_VERSION => {
                reply.push(REPORT_OK);
                reply.push(VERSION_COMM);
            }

            CMD_GET_FEATURES => {
                reply.push(REPORT_OK);
                for feature in self.instrument.features() {
                    feature.encode_into(&mut reply);
                }
                reply.push(FEATURE_EOF);
            }

            CMD_PING => {
                // answered empty-handed; the master times the round trip
                reply.push(REPORT_OK);
            }
            CMD_GET_SENSE => {
                reply.push(REPORT_OK);
                reply.push(if self.platform.input().is_high() { 1 } else { 0 });
            }
            CMD_INCR => {
                self.counter = self.counter.wrapping_add(1);
                return;
            }
            CMD_CNTR => {
                reply.push(REPORT_OK);
                reply.push(self.counter);
                self.counter = 0;
            }

            CMD_NOTE_DOWN => {
                if let Some(event) = NoteEvent::from_payload(&self.rx_buf[..body_len]) {
                    self.instrument.on_note_down(event);
                }
                // notes are never answered, the bus would saturate
                return;
            }
            CMD_NOTE_UP => {
                if let Some(event) = NoteEvent::from_payload(&self.rx_buf[..body_len]) {
                    self.instrument.on_note_up(event);
                }
                return;
            }
            CMD_LIGHT => {
                if let Some(event) = LightEvent::from_payload(&self.rx_buf[..body_len]) {
                    self.instrument.on_light(event);
                }
                // same no-response rule as notes
                return;
            }
            CMD_CONTROL => {
                match ControlEvent::from_payload(&self.rx_buf[..body_len]) {
                    Some(event) => {
                        let handled = self.instrument.on_control(event);
                        reply.push(if handled { REPORT_OK } else { REPORT_PARAM_INVALID });
                    }
                    None => reply.push(REPORT_PARAM_MISSING),
                }
                if dest == ADDR_BROADCAST {
                    // every node answering at once would collide
                    return;
                }
            }

            _ => {
                // never report errors to a broadcast
                if dest == ADDR_BROADCAST {
                    return;
                }
                status = STATUS_UNKNOWN_COMMAND;
            }
        }

        self.send_reply(status, &reply);

        if lower_sense {
            self.platform.set_output(SenseLevel::Low);
        }
    }

    /// Stuff one byte onto the wire
    fn write_stuffed(&mut self, byte: u8) {
        let (bytes, len) = codec::encode_byte(byte);
        for i in 0..len {
            self.platform.write_byte(bytes[i]);
        }
    }

    /// Standard response path: sync and destination raw, everything after
    /// stuffed, checksum appended
    fn send_reply(&mut self, status: u8, reply: &Reply) {
        let count = reply.len().wrapping_add(2); // status + body + checksum
        let mut sum = Checksum::from(ADDR_MASTER);
        sum.add(count);
        sum.add(status);
        sum.add(reply.sum());

        self.platform.set_direction(BusDirection::Transmit);
        self.platform.write_byte(SYNC);
        self.platform.write_byte(ADDR_MASTER);
        self.write_stuffed(count);
        self.write_stuffed(status);
        for &byte in reply.body() {
            self.write_stuffed(byte);
        }
        self.write_stuffed(sum.value());
        self.platform.set_direction(BusDirection::Receive);
    }

    /// Identification fast path
    ///
    /// The identification string can outgrow the staged reply buffer, so
    /// it is streamed from its source one byte at a time through the
    /// stuffing step. The payload is report + string + NUL, hence the
    /// `len + 4` count (report and checksum included).
    fn send_identification(&mut self) {
        let len = self.platform.identification().len() as u8;
        let count = len.wrapping_add(4);

        let mut sum = Checksum::from(ADDR_MASTER);
        sum.add(count);
        sum.add(STATUS_OK);
        sum.add(REPORT_OK);

        self.platform.set_direction(BusDirection::Transmit);
        self.platform.write_byte(SYNC);
        self.platform.write_byte(ADDR_MASTER);
        self.write_stuffed(count);
        self.write_stuffed(STATUS_OK);
        self.write_stuffed(REPORT_OK);
        let mut i = 0;
        while let Some(byte) = self.platform.identification().as_bytes().get(i).copied() {
            sum.add(byte);
            self.write_stuffed(byte);
            i += 1;
        }
        sum.add(0);
        self.write_stuffed(0); // NUL terminator travels with the string
        self.write_stuffed(sum.value());
        self.platform.set_direction(BusDirection::Receive);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Feature;
    use crate::wire::CMD_REQUEST_RETRANSMIT;
    use carillon_hal::{BusPort, DeviceControl, SenseLine};
    use std::vec;
    use std::vec::Vec;

    struct MockPlatform {
        rx: Vec<u8>,
        rx_pos: usize,
        tx: Vec<u8>,
        direction: BusDirection,
        sense_in: SenseLevel,
        sense_out: Vec<SenseLevel>,
        resets: usize,
        ident: &'static str,
    }

    impl MockPlatform {
        fn new() -> Self {
            Self {
                rx: Vec::new(),
                rx_pos: 0,
                tx: Vec::new(),
                direction: BusDirection::Receive,
                sense_in: SenseLevel::High,
                sense_out: Vec::new(),
                resets: 0,
                ident: "Testbell;Ver1.00;",
            }
        }
    }

    impl BusPort for MockPlatform {
        fn rx_ready(&mut self) -> bool {
            self.rx_pos < self.rx.len()
        }
        // Test frames are always complete, so the blocking read never
        // actually has to wait.
        fn read_byte(&mut self) -> u8 {
            let byte = self.rx[self.rx_pos];
            self.rx_pos += 1;
            byte
        }
        fn write_byte(&mut self, byte: u8) {
            assert_eq!(
                self.direction,
                BusDirection::Transmit,
                "wrote while not driving the bus"
            );
            self.tx.push(byte);
        }
        fn set_direction(&mut self, direction: BusDirection) {
            self.direction = direction;
        }
    }

    impl SenseLine for MockPlatform {
        fn input(&self) -> SenseLevel {
            self.sense_in
        }
        fn set_output(&mut self, level: SenseLevel) {
            self.sense_out.push(level);
        }
    }

    impl DeviceControl for MockPlatform {
        fn identification(&self) -> &str {
            self.ident
        }
        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    #[derive(Default)]
    struct Recorder {
        features: Vec<Feature>,
        downs: Vec<NoteEvent>,
        ups: Vec<NoteEvent>,
        lights: Vec<LightEvent>,
        controls: Vec<ControlEvent>,
        handle_control: bool,
    }

    impl Instrument for Recorder {
        fn features(&self) -> &[Feature] {
            &self.features
        }
        fn on_note_down(&mut self, event: NoteEvent) {
            self.downs.push(event);
        }
        fn on_note_up(&mut self, event: NoteEvent) {
            self.ups.push(event);
        }
        fn on_light(&mut self, event: LightEvent) -> bool {
            self.lights.push(event);
            true
        }
        fn on_control(&mut self, event: ControlEvent) -> bool {
            self.controls.push(event);
            self.handle_control
        }
    }

    /// Build a stuffed request frame the way the master does
    fn frame(dest: u8, command: u8, body: &[u8]) -> Vec<u8> {
        let mut plain = vec![dest, (body.len() + 2) as u8, command];
        plain.extend_from_slice(body);
        let sum = plain.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        plain.push(sum);

        let mut out = vec![SYNC];
        for &byte in &plain {
            if byte == SYNC || byte == MARK {
                out.push(MARK);
                out.push(byte - 1);
            } else {
                out.push(byte);
            }
        }
        out
    }

    /// Destuff and verify a captured response; returns (status, body)
    fn parse_reply(tx: &[u8]) -> (u8, Vec<u8>) {
        assert_eq!(tx[0], SYNC);
        assert_eq!(tx[1], ADDR_MASTER);
        let mut plain = vec![ADDR_MASTER];
        let mut i = 2;
        while i < tx.len() {
            let byte = tx[i];
            assert_ne!(byte, SYNC, "SYNC leaked into a response payload");
            if byte == MARK {
                i += 1;
                plain.push(tx[i].wrapping_add(1));
            } else {
                plain.push(byte);
            }
            i += 1;
        }
        let count = plain[1] as usize;
        assert_eq!(plain.len(), count + 2, "count field disagrees with frame");
        let checksum = *plain.last().unwrap();
        let sum = plain[..plain.len() - 1]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_add(b));
        assert_eq!(sum, checksum, "bad response checksum");
        (plain[2], plain[3..plain.len() - 1].to_vec())
    }

    fn node() -> BusNode<MockPlatform, Recorder> {
        BusNode::new(MockPlatform::new(), Recorder::default())
    }

    /// Run an assignment broadcast so directed tests have an identity
    fn addressed(id: u8) -> BusNode<MockPlatform, Recorder> {
        let mut node = node();
        node.platform.rx = frame(ADDR_BROADCAST, CMD_ASSIGN_ADDR, &[id]);
        node.tick();
        assert_eq!(node.node_id(), id);
        node.platform.tx.clear();
        node
    }

    fn run(node: &mut BusNode<MockPlatform, Recorder>, bytes: Vec<u8>) {
        let pos = node.platform.rx.len();
        node.platform.rx.extend_from_slice(&bytes);
        node.platform.rx_pos = pos;
        node.tick();
        assert_eq!(
            node.platform.direction,
            BusDirection::Receive,
            "tick must hand the bus back in receive mode"
        );
    }

    #[test]
    fn test_idle_tick_returns() {
        let mut node = node();
        node.tick();
        assert!(node.platform.tx.is_empty());
        assert_eq!(node.platform.direction, BusDirection::Receive);
    }

    #[test]
    fn test_garbage_byte_consumed_silently() {
        let mut node = node();
        run(&mut node, vec![0x42]);
        assert!(node.platform.tx.is_empty());
    }

    #[test]
    fn test_assign_addr_end_to_end() {
        let mut node = node();
        // fresh node: sense output driven high at construction
        assert_eq!(node.platform.sense_out, vec![SenseLevel::High]);

        run(&mut node, frame(ADDR_BROADCAST, CMD_ASSIGN_ADDR, &[0x05]));

        assert_eq!(node.node_id(), 0x05);
        // exact bytes: sync, master, count 3, status OK, report OK, sum
        assert_eq!(node.platform.tx, vec![SYNC, 0x00, 0x03, 0x01, 0x01, 0x05]);
        // sense lowered, and only after the reply went out
        assert_eq!(
            node.platform.sense_out,
            vec![SenseLevel::High, SenseLevel::Low]
        );
    }

    #[test]
    fn test_assign_addr_requires_sense_high() {
        let mut node = node();
        node.platform.sense_in = SenseLevel::Low;
        run(&mut node, frame(ADDR_BROADCAST, CMD_ASSIGN_ADDR, &[0x05]));
        assert_eq!(node.node_id(), ADDR_UNSET);
        assert!(node.platform.tx.is_empty());
    }

    #[test]
    fn test_second_assign_is_silent_noop() {
        let mut node = addressed(0x05);
        run(&mut node, frame(ADDR_BROADCAST, CMD_ASSIGN_ADDR, &[0x09]));
        assert_eq!(node.node_id(), 0x05);
        assert!(node.platform.tx.is_empty());
    }

    #[test]
    fn test_foreign_destination_dropped() {
        let mut node = addressed(0x05);
        run(&mut node, frame(0x22, CMD_PING, &[]));
        assert!(node.platform.tx.is_empty());
    }

    #[test]
    fn test_master_destination_dropped() {
        let mut node = addressed(0x05);
        run(&mut node, frame(ADDR_MASTER, CMD_PING, &[]));
        assert!(node.platform.tx.is_empty());
    }

    #[test]
    fn test_ping_reports_ok() {
        let mut node = addressed(0x05);
        run(&mut node, frame(0x05, CMD_PING, &[]));
        let (status, body) = parse_reply(&node.platform.tx);
        assert_eq!(status, STATUS_OK);
        assert_eq!(body, vec![REPORT_OK]);
    }

    #[test]
    fn test_stuffed_destination_accepted() {
        // 0xD0 is a legal identity and collides with MARK on the wire
        let mut node = addressed(0xD0);
        run(&mut node, frame(0xD0, CMD_PING, &[]));
        let (status, _) = parse_reply(&node.platform.tx);
        assert_eq!(status, STATUS_OK);
    }

    #[test]
    fn test_version_queries() {
        for (command, version) in [
            (CMD_GET_CMD_VERSION, VERSION_CMD),
            (CMD_GET_BUS_VERSION, VERSION_BUS),
            (CMD_GET_COMM_VERSION, VERSION_COMM),
        ] {
            let mut node = addressed(0x05);
            run(&mut node, frame(0x05, command, &[]));
            let (status, body) = parse_reply(&node.platform.tx);
            assert_eq!(status, STATUS_OK);
            assert_eq!(body, vec![REPORT_OK, version]);
        }
    }

    #[test]
    fn test_get_features_layout() {
        let mut node = addressed(0x05);
        node.instrument.features = vec![
            Feature::NoteChannel {
                channel: 0,
                midi_min: 79,
                midi_max: 108,
            },
            Feature::Offset(0),
        ];
        run(&mut node, frame(0x05, CMD_GET_FEATURES, &[]));
        let (status, body) = parse_reply(&node.platform.tx);
        assert_eq!(status, STATUS_OK);
        assert_eq!(
            body,
            vec![REPORT_OK, 0x01, 0, 79, 108, 0x04, 0x00, 0x00, 0x00, FEATURE_EOF]
        );
    }

    #[test]
    fn test_feature_bytes_get_stuffed() {
        let mut node = addressed(0x05);
        node.instrument.features = vec![Feature::LightChannel {
            channel: 0,
            min: 0,
            max: SYNC, // forces an escape on the way out
        }];
        run(&mut node, frame(0x05, CMD_GET_FEATURES, &[]));
        assert!(node.platform.tx.windows(2).any(|w| w == [MARK, SYNC - 1]));
        let (_, body) = parse_reply(&node.platform.tx);
        assert_eq!(body[4], SYNC);
    }

    #[test]
    fn test_read_id_fast_path() {
        let mut node = addressed(0x05);
        run(&mut node, frame(0x05, CMD_READ_ID, &[]));
        let (status, body) = parse_reply(&node.platform.tx);
        assert_eq!(status, STATUS_OK);
        let ident = node.platform.ident.as_bytes();
        assert_eq!(body[0], REPORT_OK);
        assert_eq!(&body[1..body.len() - 1], ident);
        assert_eq!(*body.last().unwrap(), 0, "identification ends in NUL");
        // count = string length + report + NUL + checksum
        assert_eq!(node.platform.tx[2] as usize, ident.len() + 4);
    }

    #[test]
    fn test_get_sense_mirrors_input() {
        let mut node = addressed(0x05);
        run(&mut node, frame(0x05, CMD_GET_SENSE, &[]));
        let (_, body) = parse_reply(&node.platform.tx);
        assert_eq!(body, vec![REPORT_OK, 1]);

        node.platform.tx.clear();
        node.platform.sense_in = SenseLevel::Low;
        run(&mut node, frame(0x05, CMD_GET_SENSE, &[]));
        let (_, body) = parse_reply(&node.platform.tx);
        assert_eq!(body, vec![REPORT_OK, 0]);
    }

    #[test]
    fn test_counter_increments_and_clears() {
        let mut node = addressed(0x05);
        for _ in 0..3 {
            run(&mut node, frame(0x05, CMD_INCR, &[]));
        }
        assert!(node.platform.tx.is_empty(), "INCR is never answered");

        run(&mut node, frame(0x05, CMD_CNTR, &[]));
        let (_, body) = parse_reply(&node.platform.tx);
        assert_eq!(body, vec![REPORT_OK, 3]);

        node.platform.tx.clear();
        run(&mut node, frame(0x05, CMD_CNTR, &[]));
        let (_, body) = parse_reply(&node.platform.tx);
        assert_eq!(body, vec![REPORT_OK, 0], "CNTR clears the counter");
    }

    #[test]
    fn test_note_down_is_silent_and_dispatched() {
        let mut node = addressed(0x05);
        let body = [0x10, 0x00, 0x00, 0x00, 0, 69, 100];
        run(&mut node, frame(0x05, CMD_NOTE_DOWN, &body));
        assert!(node.platform.tx.is_empty(), "notes must never be answered");
        assert_eq!(node.instrument.downs.len(), 1);
        let event = node.instrument.downs[0];
        assert_eq!(event.time, 0x10);
        assert_eq!(event.note, 69);
        assert_eq!(event.velocity, 100);
    }

    #[test]
    fn test_note_up_dispatched() {
        let mut node = addressed(0x05);
        run(
            &mut node,
            frame(0x05, CMD_NOTE_UP, &[0, 0, 0, 0, 0, 72, 0]),
        );
        assert!(node.platform.tx.is_empty());
        assert_eq!(node.instrument.ups.len(), 1);
        assert_eq!(node.instrument.ups[0].note, 72);
    }

    #[test]
    fn test_short_note_body_dropped() {
        let mut node = addressed(0x05);
        run(&mut node, frame(0x05, CMD_NOTE_DOWN, &[1, 2, 3]));
        assert!(node.instrument.downs.is_empty());
        assert!(node.platform.tx.is_empty());
    }

    #[test]
    fn test_light_is_silent() {
        let mut node = addressed(0x05);
        run(
            &mut node,
            frame(0x05, CMD_LIGHT, &[0, 0, 0, 0, 0, 2, 255]),
        );
        assert!(node.platform.tx.is_empty());
        assert_eq!(node.instrument.lights.len(), 1);
        assert_eq!(node.instrument.lights[0].light, 2);
        assert_eq!(node.instrument.lights[0].value, 255);
    }

    #[test]
    fn test_control_answered_when_directed() {
        let mut node = addressed(0x05);
        node.instrument.handle_control = true;
        run(
            &mut node,
            frame(0x05, CMD_CONTROL, &[0, 0, 0, 0, 1, 7, 30]),
        );
        let (status, body) = parse_reply(&node.platform.tx);
        assert_eq!(status, STATUS_OK);
        assert_eq!(body, vec![REPORT_OK]);
        assert_eq!(node.instrument.controls.len(), 1);
    }

    #[test]
    fn test_control_refused_reports_invalid() {
        let mut node = addressed(0x05);
        run(
            &mut node,
            frame(0x05, CMD_CONTROL, &[0, 0, 0, 0, 1, 7, 30]),
        );
        let (_, body) = parse_reply(&node.platform.tx);
        assert_eq!(body, vec![REPORT_PARAM_INVALID]);
    }

    #[test]
    fn test_broadcast_control_not_answered() {
        let mut node = addressed(0x05);
        node.instrument.handle_control = true;
        run(
            &mut node,
            frame(ADDR_BROADCAST, CMD_CONTROL, &[0, 0, 0, 0, 1, 7, 30]),
        );
        assert!(node.platform.tx.is_empty());
        assert_eq!(node.instrument.controls.len(), 1, "callback still runs");
    }

    #[test]
    fn test_reset_requires_check_byte() {
        let mut node = addressed(0x05);
        run(&mut node, frame(0x05, CMD_RESET, &[0x00]));
        assert_eq!(node.node_id(), 0x05);
        assert_eq!(node.platform.resets, 0);
        assert!(node.platform.tx.is_empty());

        run(&mut node, frame(0x05, CMD_RESET, &[RESET_CHECK]));
        assert_eq!(node.node_id(), ADDR_UNSET);
        assert_eq!(node.platform.resets, 1);
        assert_eq!(*node.platform.sense_out.last().unwrap(), SenseLevel::High);
        assert!(node.platform.tx.is_empty(), "reset is never answered");
    }

    #[test]
    fn test_unknown_command_directed() {
        let mut node = addressed(0x05);
        run(&mut node, frame(0x05, CMD_REQUEST_RETRANSMIT, &[]));
        let (status, body) = parse_reply(&node.platform.tx);
        assert_eq!(status, STATUS_UNKNOWN_COMMAND);
        assert!(body.is_empty());
    }

    #[test]
    fn test_unknown_command_broadcast_silent() {
        let mut node = addressed(0x05);
        run(&mut node, frame(ADDR_BROADCAST, 0x4E, &[]));
        assert!(node.platform.tx.is_empty());
    }

    #[test]
    fn test_corrupted_frame_answered_without_side_effects() {
        let mut node = addressed(0x05);
        let mut bytes = frame(0x05, CMD_INCR, &[]);
        *bytes.last_mut().unwrap() ^= 0xFF;
        run(&mut node, bytes);
        // fixed 5-byte checksum-error frame
        assert_eq!(
            node.platform.tx,
            vec![SYNC, ADDR_MASTER, 2, STATUS_CHECKSUM, 5]
        );

        // the command must not have executed
        node.platform.tx.clear();
        run(&mut node, frame(0x05, CMD_CNTR, &[]));
        let (_, body) = parse_reply(&node.platform.tx);
        assert_eq!(body, vec![REPORT_OK, 0]);
    }

    #[test]
    fn test_overflow_directed_answered() {
        let mut node = addressed(0x05);
        // count byte far beyond the receive buffer; no body follows, the
        // node answers straight from the count
        run(&mut node, vec![SYNC, 0x05, 0xFE]);
        assert_eq!(
            node.platform.tx,
            vec![SYNC, ADDR_MASTER, 2, STATUS_OVERFLOW, 6]
        );
    }

    #[test]
    fn test_overflow_broadcast_silent() {
        let mut node = addressed(0x05);
        run(&mut node, vec![SYNC, MARK, ADDR_BROADCAST - 1, 0xFE]);
        assert!(node.platform.tx.is_empty());
    }

    #[test]
    fn test_zero_count_lands_oversized() {
        let mut node = addressed(0x05);
        run(&mut node, vec![SYNC, 0x05, 0x00]);
        assert_eq!(
            node.platform.tx,
            vec![SYNC, ADDR_MASTER, 2, STATUS_OVERFLOW, 6]
        );
    }

    #[test]
    fn test_resync_at_every_offset() {
        let good = frame(0x05, CMD_PING, &[]);
        for cut in 1..good.len() {
            let mut node = addressed(0x05);
            let mut bytes = good[..cut].to_vec();
            bytes.extend_from_slice(&good);
            run(&mut node, bytes);
            let (status, body) = parse_reply(&node.platform.tx);
            assert_eq!(status, STATUS_OK, "resync failed at offset {cut}");
            assert_eq!(body, vec![REPORT_OK]);
        }
    }

    #[test]
    fn test_resync_discards_partial_state() {
        let mut node = addressed(0x05);
        // a partial note-down, then a complete counter read; the note
        // callback must never fire
        let mut bytes = frame(0x05, CMD_NOTE_DOWN, &[0, 0, 0, 0, 0, 60, 90]);
        bytes.truncate(6);
        bytes.extend_from_slice(&frame(0x05, CMD_CNTR, &[]));
        run(&mut node, bytes);
        assert!(node.instrument.downs.is_empty());
        let (_, body) = parse_reply(&node.platform.tx);
        assert_eq!(body, vec![REPORT_OK, 0]);
    }

    #[test]
    fn test_sync_after_mark_restarts() {
        // an escape cut short by a new frame must not decode as payload
        let good = frame(0x05, CMD_PING, &[]);
        let mut node = addressed(0x05);
        let mut bytes = vec![SYNC, MARK];
        bytes.extend_from_slice(&good);
        run(&mut node, bytes);
        let (status, _) = parse_reply(&node.platform.tx);
        assert_eq!(status, STATUS_OK);
    }
}
