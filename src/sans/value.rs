//! Decoding value records from a received data frame.

use tartan_bitfield::bitfield;

/// The numeric encoding of a value record.
///
/// The wire discriminants are sparse; the gaps are unassigned by the
/// protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// 5-bit magnitude with sign and exponent, in one byte.
    Bits6,
    /// 13-bit magnitude with sign and exponent, in two bytes.
    Bits14,
    /// 21-bit magnitude with sign and exponent, in three bytes.
    Bits22,
    /// 29-bit magnitude with sign and exponent, in four bytes.
    Bits30,
    /// A packed calendar date or time of day, in three bytes.
    DateTime,
    /// A packed GPS coordinate, in four bytes.
    Gps,
}

impl Kind {
    /// The wire discriminant of this kind.
    pub fn code(self) -> u8 {
        match self {
            Kind::Bits6 => 0,
            Kind::Bits14 => 1,
            Kind::Bits22 => 4,
            Kind::DateTime => 5,
            Kind::Bits30 => 8,
            Kind::Gps => 9,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Kind::Bits6),
            1 => Some(Kind::Bits14),
            4 => Some(Kind::Bits22),
            5 => Some(Kind::DateTime),
            8 => Some(Kind::Bits30),
            9 => Some(Kind::Gps),
            _ => None,
        }
    }
}

/// A decoded value record, before resolution against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    /// Identifier of the value within its sensor.
    pub id: u8,
    /// Numeric encoding of the record.
    pub kind: Kind,
    /// Sign-magnitude value, negated when the wire sign bit was set.
    pub value: i32,
    /// Decimal scale exponent (0–3), zero for date/time and GPS records.
    pub exponent: u8,
}

/// Decode the next value record of a received frame, advancing the cursor.
///
/// `frame` is the frame's zeroed backing buffer and `length` the recorded
/// packet length. Returns `None` once fewer than three bytes remain ahead
/// of the check byte, or when a record carries an unassigned kind (its
/// width is unknown, so the remaining records cannot be delimited).
pub fn next(frame: &[u8], length: usize, cursor: &mut usize) -> Option<Reading> {
    if *cursor >= length.saturating_sub(3) {
        return None;
    }

    bitfield! {
        struct Head(u8) {
            [0..4] kind: u8,
            [4..8] id: u8,
        }
    }

    let head = Head(take(frame, cursor));

    let mut id = head.id();
    if id == 0 {
        // Escaped wide-identifier form: the whole next byte is the id.
        id = take(frame, cursor);
    }

    let kind = Kind::from_code(head.kind())?;

    bitfield! {
        struct Tail(u8) {
            [0..5] magnitude: u8,
            [5..7] exponent: u8,
            [7] negative,
        }
    }

    let (value, exponent) = match kind {
        Kind::Bits6 => {
            let tail = Tail(take(frame, cursor));
            let value = tail.magnitude() as i32;
            (signed(value, tail.negative()), tail.exponent())
        }
        Kind::Bits14 => {
            let low = take(frame, cursor);
            let tail = Tail(take(frame, cursor));
            let value = low as i32 | (tail.magnitude() as i32) << 8;
            (signed(value, tail.negative()), tail.exponent())
        }
        Kind::Bits22 => {
            let low = take(frame, cursor);
            let mid = take(frame, cursor);
            let tail = Tail(take(frame, cursor));
            let value = low as i32 | (mid as i32) << 8 | (tail.magnitude() as i32) << 16;
            (signed(value, tail.negative()), tail.exponent())
        }
        Kind::Bits30 => {
            let low = take(frame, cursor);
            let mid = take(frame, cursor);
            let high = take(frame, cursor);
            let tail = Tail(take(frame, cursor));
            let value = low as i32
                | (mid as i32) << 8
                | (high as i32) << 16
                | (tail.magnitude() as i32) << 24;
            (signed(value, tail.negative()), tail.exponent())
        }
        Kind::DateTime => {
            let word = u32::from_le_bytes([
                take(frame, cursor),
                take(frame, cursor),
                take(frame, cursor),
                0,
            ]);
            (word as i32, 0)
        }
        Kind::Gps => {
            let word = u32::from_le_bytes([
                take(frame, cursor),
                take(frame, cursor),
                take(frame, cursor),
                take(frame, cursor),
            ]);
            (word as i32, 0)
        }
    };

    Some(Reading {
        id,
        kind,
        value,
        exponent,
    })
}

/// Apply a sign-magnitude sign bit (two's complement is not used on the
/// wire).
fn signed(value: i32, negative: bool) -> i32 {
    if negative { -value } else { value }
}

/// Take the byte under the cursor, advancing it. Positions past the
/// received length read as zero, matching the zeroed frame buffer.
fn take(frame: &[u8], cursor: &mut usize) -> u8 {
    let b = frame.get(*cursor).copied().unwrap_or(0);
    *cursor += 1;
    b
}
