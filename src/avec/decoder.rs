//! The polled engine driving the framing state machine.

use alloc::string::String;
use alloc::vec::Vec;

use core::mem;

use either::Either::{Left, Right};
use log::{debug, trace};
use tartan_bitfield::bitfield;
use zerocopy::FromBytes;

use crate::sans::{
    check::compute_crc,
    cipher::descramble,
    frame::{self, MessageKind},
    value,
};

use super::{
    Clock, Port,
    packet::{Alarm, FrameError, Label, Name, Packet, Text, Value},
    registry::Registry,
};

/// Capacity of the frame buffer; the 5-bit length field cannot exceed it.
const FRAME_CAPACITY: usize = 32;

/// Inactivity timeout, in milliseconds, before a partial frame is abandoned.
const TIMEOUT: u64 = 1000;

/// Current position within the framing state machine.
enum Stage {
    Start(frame::Start),
    Identifier(frame::Identifier),
    Length(frame::Length),
    Body(frame::Body),
    AlarmSound(frame::AlarmSound),
    AlarmCode(frame::AlarmCode),
    Text(frame::TextBody),
    /// A data frame is buffered; one value is emitted per poll.
    Values,
}

/// A polled decoder for one EX telemetry link.
///
/// Construct one engine per logical connection and call [`Decoder::poll`]
/// once per control-loop iteration. Each call consumes at most one input
/// unit from the port (or drains one buffered value) and returns at most
/// one packet. Returned packets own their data and remain valid across
/// later polls.
///
/// An engine that receives no input for a second abandons any
/// partially-received frame and silently resynchronizes, so a stalled
/// source is not mistaken for a malformed one.
pub struct Decoder<P, C> {
    port: P,
    clock: C,

    stage: Stage,
    deadline: u64,

    kind: MessageKind,
    length: u8,
    frame: [u8; FRAME_CAPACITY],
    received: usize,

    serial_id: u32,
    cursor: usize,

    text: Vec<u8>,

    registry: Registry,
}

impl<P: Port, C: Clock> Decoder<P, C> {
    /// Construct an engine over a port and clock, initializing the port.
    pub fn new(mut port: P, clock: C) -> Self {
        port.init();
        let deadline = clock.now() + TIMEOUT;

        Self {
            port,
            clock,
            stage: Stage::Start(frame::Start),
            deadline,
            kind: MessageKind::Text,
            length: 0,
            frame: [0; FRAME_CAPACITY],
            received: 0,
            serial_id: 0,
            cursor: 0,
            text: Vec::new(),
            registry: Registry::new(),
        }
    }

    /// The metadata registry accumulated from this link.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The metadata registry, for host-side completion.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Discard any partially-received frame and await a new start byte.
    pub fn reset(&mut self) {
        self.stage = Stage::Start(frame::Start);
        self.deadline = self.clock.now() + TIMEOUT;
    }

    /// Advance the engine by at most one input unit, returning a packet
    /// when one completes.
    pub fn poll(&mut self) -> Option<Packet> {
        let now = self.clock.now();
        if now > self.deadline {
            self.deadline = now + TIMEOUT;
            if !matches!(self.stage, Stage::Start(_)) {
                trace!("inactivity timeout, resynchronizing");
            }
            self.stage = Stage::Start(frame::Start);
            return None;
        }

        // Drain values from an already-buffered data frame without
        // consuming input.
        if let Stage::Values = self.stage {
            let packet = self.next_value().map(Packet::Value);
            if packet.is_none() {
                self.stage = Stage::Start(frame::Start);
            }
            return packet;
        }

        let code = self.port.read()?;
        self.deadline = now + TIMEOUT;

        let byte = code as u8;

        match mem::replace(&mut self.stage, Stage::Start(frame::Start)) {
            Stage::Start(state) => {
                match state.advance([byte]) {
                    Left(state) => self.stage = Stage::Start(state),
                    Right(Left(state)) => self.stage = Stage::Identifier(state),
                    Right(Right(state)) => {
                        self.text.clear();
                        self.stage = Stage::Text(state);
                    }
                }
                None
            }
            Stage::Identifier(state) => match state.advance([byte]) {
                Ok(Left(state)) => {
                    self.stage = Stage::Length(state);
                    None
                }
                Ok(Right(state)) => {
                    self.stage = Stage::AlarmSound(state);
                    None
                }
                Err(error) => {
                    debug!("rejecting packet: {error}");
                    Some(Packet::Error(error.into()))
                }
            },
            Stage::Length(state) => match state.advance([byte]) {
                Ok((kind, length, state)) => {
                    self.kind = kind;
                    self.length = length;
                    self.frame = [0; FRAME_CAPACITY];
                    self.received = 0;
                    self.stage = Stage::Body(state);
                    None
                }
                Err(error) => {
                    debug!("rejecting frame: {error}");
                    Some(Packet::Error(error.into()))
                }
            },
            Stage::Body(state) => {
                self.frame[self.received] = byte;
                self.received += 1;

                match state.advance([byte]) {
                    Left(state) => {
                        self.stage = Stage::Body(state);
                        None
                    }
                    Right(payload) => self.finish_frame(payload),
                }
            }
            Stage::AlarmSound(state) => {
                self.stage = Stage::AlarmCode(state.advance([byte]));
                None
            }
            Stage::AlarmCode(state) => {
                let (sound, code) = state.advance([byte]);
                Some(Packet::Alarm(Alarm { sound, code }))
            }
            Stage::Text(state) => match state.advance([byte]) {
                Ok(Left(state)) => {
                    self.text.push(byte);
                    self.stage = Stage::Text(state);
                    None
                }
                Ok(Right(_)) => Some(Packet::Text(Text {
                    content: latin1(&self.text),
                })),
                Err(error) => {
                    debug!("rejecting message: {error}");
                    Some(Packet::Error(error.into()))
                }
            },
            Stage::Values => unreachable!(),
        }
    }

    /// Validate, descramble, and classify a completely received frame body.
    fn finish_frame(&mut self, _payload: frame::Payload) -> Option<Packet> {
        let length = self.length as usize;

        let init = compute_crc(0, &[self.length | self.kind.bits() << 6]);
        let calculated = compute_crc(init, &self.frame[..length - 1]);
        let found = self.frame[length - 1];

        if calculated != found {
            let error = FrameError::CyclicRedundancyCheck { found, calculated };
            debug!("rejecting frame: {error}");
            return Some(Packet::Error(error));
        }

        #[repr(C, packed)]
        #[derive(FromBytes)]
        struct FrameHead {
            manufacturer: [u8; 2],
            device: [u8; 2],
            key: u8,
        }

        let head: [u8; 5] = self.frame[..5].try_into().unwrap();
        let FrameHead {
            manufacturer,
            device,
            key,
        } = zerocopy::transmute!(head);

        let serial_id =
            u32::from(u16::from_le_bytes(manufacturer)) | u32::from(u16::from_le_bytes(device)) << 16;

        descramble(key, &mut self.frame, length);

        match self.kind {
            MessageKind::Text => {
                if self.frame[5] == 0 {
                    self.decode_name(serial_id)
                } else {
                    self.decode_label(serial_id)
                }
            }
            MessageKind::Message => {
                self.serial_id = serial_id;
                self.cursor = 5;
                self.stage = Stage::Values;
                None
            }
            MessageKind::Data | MessageKind::Reserved => {
                self.serial_id = serial_id;
                self.cursor = 5;
                self.stage = Stage::Values;
                self.next_value().map(Packet::Value)
            }
        }
    }

    /// Record and emit a sensor name announcement.
    ///
    /// Undersized frames are dropped without a packet. A repeated
    /// announcement echoes the stored name rather than re-decoding it.
    fn decode_name(&mut self, serial_id: u32) -> Option<Packet> {
        if self.length < 8 {
            return None;
        }

        let (text, _) = self.metadata_texts();
        let sensor = self.registry.append_sensor(serial_id, Some(text));

        Some(Packet::Name(Name {
            serial_id,
            name: sensor.name().map(String::from),
        }))
    }

    /// Record and emit a value label announcement.
    ///
    /// Undersized frames are dropped without a packet. A repeated
    /// announcement echoes the stored label and unit.
    fn decode_label(&mut self, serial_id: u32) -> Option<Packet> {
        if self.length < 9 {
            return None;
        }

        let id = self.frame[5];
        let (text, unit) = self.metadata_texts();
        let label = self.registry.append_label(serial_id, id, Some(text), Some(unit));

        Some(Packet::Label(Label {
            serial_id,
            id,
            label: label.label().map(String::from),
            unit: label.unit().map(String::from),
        }))
    }

    /// Decode the next value of the buffered frame and resolve its label.
    fn next_value(&mut self) -> Option<Value> {
        let reading = value::next(&self.frame, self.length as usize, &mut self.cursor)?;
        let label = self.registry.resolve(self.serial_id, reading.id);

        Some(Value {
            serial_id: self.serial_id,
            id: reading.id,
            kind: reading.kind,
            value: reading.value,
            exponent: reading.exponent,
            label,
        })
    }

    /// Extract the packed text and unit strings of a metadata frame.
    fn metadata_texts(&self) -> (String, String) {
        bitfield! {
            struct TextHead(u8) {
                [0..3] unit_length: u8,
                [3..8] text_length: u8,
            }
        }

        let head = TextHead(self.frame[6]);

        let text = section(&self.frame, 7, head.text_length() as usize);
        let unit = section(&self.frame, 7 + head.text_length() as usize, head.unit_length() as usize);

        (latin1(text), latin1(unit))
    }
}

/// A metadata section of the frame buffer, clamped to its capacity.
fn section(frame: &[u8], start: usize, length: usize) -> &[u8] {
    let start = start.min(frame.len());
    let end = (start + length).min(frame.len());

    &frame[start..end]
}

/// Decode metadata bytes as Latin-1, one scalar per byte; the degree byte
/// `0xB0` surfaces as `'°'`.
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
