//! The packets produced by the engine.
//!
//! Packets own their data: metadata text is copied out of the registry when
//! a packet is emitted, so packets remain valid across later polls.

use alloc::string::String;

use tartan_bitfield::bitfield;
use thiserror::Error;

use crate::sans::frame::{IdentifierError, LengthError, TextError};

pub use crate::sans::value::Kind;

/// A recoverable fault in the incoming stream.
///
/// Every fault resynchronizes the engine to await the next start byte; no
/// fault is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The byte following a start marker was neither an EX marker nor an
    /// alarm.
    #[error("Unrecognized packet identifier ({0:#04x}).")]
    UnrecognizedPacket(u8),
    /// The frame length cannot hold a serial number and identifier.
    #[error("Length ({0}) cannot hold a serial number and identifier.")]
    InvalidLength(u8),
    /// Calculated and found CRC values do not match.
    #[error("Calculated ({calculated:#04x}) and found ({found:#04x}) CRC values do not match.")]
    CyclicRedundancyCheck { found: u8, calculated: u8 },
    /// A plain-text message ran past the permitted length.
    #[error("Plain-text message exceeds 32 characters.")]
    TextOverflow,
}

impl From<IdentifierError> for FrameError {
    fn from(err: IdentifierError) -> Self {
        match err {
            IdentifierError::Unrecognized(byte) => Self::UnrecognizedPacket(byte),
        }
    }
}

impl From<LengthError> for FrameError {
    fn from(err: LengthError) -> Self {
        match err {
            LengthError::TooShort(length) => Self::InvalidLength(length),
        }
    }
}

impl From<TextError> for FrameError {
    fn from(err: TextError) -> Self {
        match err {
            TextError::Overflow => Self::TextOverflow,
        }
    }
}

/// A decoded telemetry packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// A recoverable framing, length, check, or overflow fault.
    Error(FrameError),
    /// An out-of-band alarm.
    Alarm(Alarm),
    /// A plain-text status message.
    Text(Text),
    /// A sensor name announcement.
    Name(Name),
    /// A value label-and-unit announcement.
    Label(Label),
    /// A sensor value sample.
    Value(Value),
}

/// An out-of-band alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alarm {
    /// Whether the receiver should sound the alarm.
    pub sound: bool,
    /// Vendor-assigned alarm code.
    pub code: u8,
}

/// A plain-text status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    pub content: String,
}

/// A sensor name announcement, as recorded in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    pub serial_id: u32,
    pub name: Option<String>,
}

/// A value label-and-unit announcement, as recorded in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub serial_id: u32,
    pub id: u8,
    pub label: Option<String>,
    pub unit: Option<String>,
}

/// Registry metadata resolved for a value at decode time.
///
/// Resolution happens once, when the value is decoded; a sample whose
/// metadata has not yet arrived carries no reference, and only a later
/// sample for the same serial and id will pick the metadata up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRef {
    pub label: Option<String>,
    pub unit: Option<String>,
    /// Name of the owning sensor, when it has been announced.
    pub sensor: Option<String>,
}

/// A sensor value sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub serial_id: u32,
    pub id: u8,
    pub kind: Kind,
    /// Sign-magnitude value as decoded from the wire.
    pub value: i32,
    /// Decimal scale exponent (0–3).
    pub exponent: u8,
    pub label: Option<LabelRef>,
}

/// A decoded GPS coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    /// Fractional degrees, negative for south or west.
    pub degrees: f32,
    /// Whether this is a longitude (east/west) rather than a latitude.
    pub is_longitude: bool,
}

/// A decoded calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    pub day: u8,
    pub month: u8,
    pub year: u16,
}

/// A decoded time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

// Packed layout of a date/time word: a flag bit selects between the two
// interpretations of the same three bytes.
bitfield! {
    struct Stamp(u32) {
        [0..8] low: u8,
        [8..16] mid: u8,
        [16..21] high: u8,
        [21] is_date,
    }
}

impl Value {
    /// Whether this value carries a plain numeric magnitude.
    ///
    /// The check masks the wire discriminant against the reference
    /// decoder's constant, kept bit-exact: date/time and GPS words are
    /// excluded.
    pub fn is_numeric(&self) -> bool {
        const NUMERIC: u16 = 0x113;
        NUMERIC & (1 << self.kind.code()) != 0
    }

    /// The magnitude scaled by its decimal exponent.
    ///
    /// `None` for non-numeric kinds. Exponents 1 and 2 divide by 10 and
    /// 100; exponent 3 leaves the magnitude unscaled, as in the reference
    /// decoder.
    pub fn as_float(&self) -> Option<f32> {
        if !self.is_numeric() {
            return None;
        }

        let mut value = self.value as f32;
        if self.exponent == 1 {
            value /= 10.0;
        } else if self.exponent == 2 {
            value /= 100.0;
        }

        Some(value)
    }

    /// The packed GPS coordinate of a [`Kind::Gps`] value.
    pub fn as_coordinate(&self) -> Option<Coordinate> {
        if self.kind != Kind::Gps {
            return None;
        }

        bitfield! {
            struct GpsWord(u32) {
                [0..16] minutes: u16,
                [16..25] degrees: u16,
                [29] longitude,
                [30] inverted,
            }
        }

        let word = GpsWord(self.value as u32);

        // Minutes are scaled by a thousand on the wire; divide down to a
        // fractional-degree offset.
        let fraction = word.minutes() as f32 / 0.6 / 100_000.0;
        let degrees = word.degrees() as f32 + fraction;

        Some(Coordinate {
            degrees: if word.inverted() { -degrees } else { degrees },
            is_longitude: word.longitude(),
        })
    }

    /// The latitude of a [`Kind::Gps`] value, if it carries one.
    pub fn as_latitude(&self) -> Option<f32> {
        self.as_coordinate()
            .filter(|c| !c.is_longitude)
            .map(|c| c.degrees)
    }

    /// The longitude of a [`Kind::Gps`] value, if it carries one.
    pub fn as_longitude(&self) -> Option<f32> {
        self.as_coordinate()
            .filter(|c| c.is_longitude)
            .map(|c| c.degrees)
    }

    /// The calendar date of a [`Kind::DateTime`] value, if it carries one.
    pub fn as_date(&self) -> Option<Date> {
        if self.kind != Kind::DateTime {
            return None;
        }

        let word = Stamp(self.value as u32);

        word.is_date().then(|| Date {
            day: word.high(),
            month: word.mid(),
            year: u16::from(word.low()) + 2000,
        })
    }

    /// The time of day of a [`Kind::DateTime`] value, if it carries one.
    pub fn as_time(&self) -> Option<Time> {
        if self.kind != Kind::DateTime {
            return None;
        }

        let word = Stamp(self.value as u32);

        (!word.is_date()).then(|| Time {
            hour: word.high(),
            minute: word.mid(),
            second: word.low(),
        })
    }

    /// Whether this value resolved to a label with a unit and a named
    /// owning sensor.
    pub fn is_complete(&self) -> bool {
        self.label
            .as_ref()
            .is_some_and(|label| label.unit.is_some() && label.sensor.is_some())
    }
}
