//! States processing frame boundaries and bodies.

use either::Either::{self, Left, Right};
use tartan_bitfield::bitfield;
use thiserror::Error;

/// Frame kinds multiplexed onto one link, from bits 6–7 of the length byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// Metadata: a sensor name or a value label.
    Text = 0,
    /// Value records.
    Data = 1,
    /// A message burst of value records.
    Message = 2,
    /// Unassigned by the protocol; handled like [`MessageKind::Data`].
    Reserved = 3,
}

impl MessageKind {
    /// The two wire bits of this kind, as found in the length byte.
    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// State token to recognize the start of a packet.
#[derive(Debug)]
pub struct Start;

impl Start {
    /// Transition to another state by examining one input byte.
    ///
    /// Bytes other than the two start markers are discarded, returning this
    /// token to await the next.
    pub fn advance(self, r: [u8; 1]) -> Either<Start, Either<Identifier, TextBody>> {
        match r[0] {
            0x7E => Right(Left(Identifier(()))),
            0xFE => Right(Right(TextBody { received: 0 })),
            _ => Left(Start),
        }
    }
}

/// An error advancing over a packet identifier.
#[derive(Debug, Error)]
pub enum IdentifierError {
    /// Neither an EX marker nor an alarm.
    #[error("Unrecognized packet identifier ({0:#04x}).")]
    Unrecognized(u8),
}

/// State token to classify the byte following a start marker.
#[derive(Debug)]
pub struct Identifier(pub(super) ());

impl Identifier {
    /// Transition to another state by classifying the identifier byte.
    ///
    /// A low nibble of `0xF` marks an EX frame; bit 1 marks an alarm.
    pub fn advance(self, r: [u8; 1]) -> Result<Either<Length, AlarmSound>, IdentifierError> {
        let r = r[0];

        if r & 0x0F == 0x0F {
            Ok(Left(Length(())))
        } else if r & 0x02 != 0 {
            Ok(Right(AlarmSound(())))
        } else {
            Err(IdentifierError::Unrecognized(r))
        }
    }
}

/// An error advancing over a length byte.
#[derive(Debug, Error)]
pub enum LengthError {
    /// Too short to hold a serial number and identifier.
    #[error("Length ({0}) cannot hold a serial number and identifier.")]
    TooShort(u8),
}

/// State token to decode the combined length and kind byte.
#[derive(Debug)]
pub struct Length(pub(super) ());

impl Length {
    /// Transition to another state by decoding the length byte.
    ///
    /// Returns the message kind, the packet length, and a successor state
    /// token. The caller should zero its frame buffer before appending body
    /// bytes, so that overlong value records read zeroes.
    pub fn advance(self, r: [u8; 1]) -> Result<(MessageKind, u8, Body), LengthError> {
        bitfield! {
            struct LengthByte(u8) {
                [0..5] length: u8,
                [6..8] kind: u8,
            }
        }

        let header = LengthByte(r[0]);

        let kind = match header.kind() {
            0 => MessageKind::Text,
            1 => MessageKind::Data,
            2 => MessageKind::Message,
            _ => MessageKind::Reserved,
        };

        let length = header.length();
        if length <= 5 {
            Err(LengthError::TooShort(length))?;
        }

        Ok((kind, length, Body {
            bytes_remaining: length,
        }))
    }
}

/// State token to collect one byte of a frame body.
#[derive(Debug)]
pub struct Body {
    pub(super) bytes_remaining: u8,
}

impl Body {
    /// Transition to another state by accepting one body byte.
    ///
    /// The caller must append the same byte to its frame buffer. Returns a
    /// successor token, or a [`Payload`] token once the body is complete.
    pub fn advance(self, _r: [u8; 1]) -> Either<Body, Payload> {
        let bytes_remaining = self.bytes_remaining - 1;

        if bytes_remaining != 0 {
            Left(Body { bytes_remaining })
        } else {
            Right(Payload(()))
        }
    }
}

/// State token marking a completely received frame body.
///
/// The buffered bytes must pass the cyclic redundancy check and be
/// descrambled before interpretation; see [`crate::sans::check`] and
/// [`crate::sans::cipher`].
#[derive(Debug)]
pub struct Payload(pub(super) ());

/// State token to decode an alarm's sound flag.
#[derive(Debug)]
pub struct AlarmSound(pub(super) ());

impl AlarmSound {
    /// Transition to another state by decoding the sound flag byte.
    pub fn advance(self, r: [u8; 1]) -> AlarmCode {
        AlarmCode {
            sound: r[0] & 1 != 0,
        }
    }
}

/// State token to decode an alarm's code byte.
#[derive(Debug)]
pub struct AlarmCode {
    pub(super) sound: bool,
}

impl AlarmCode {
    /// Complete the alarm by decoding the code byte.
    ///
    /// Returns the sound flag and alarm code; the machine returns to
    /// [`Start`].
    pub fn advance(self, r: [u8; 1]) -> (bool, u8) {
        (self.sound, r[0])
    }
}

/// An error advancing over plain text.
#[derive(Debug, Error)]
pub enum TextError {
    /// Ran past the permitted message length without a terminator.
    #[error("Plain-text message exceeds 32 characters.")]
    Overflow,
}

/// State token to collect one byte of a plain-text message.
#[derive(Debug)]
pub struct TextBody {
    pub(super) received: u8,
}

impl TextBody {
    /// Transition to another state by accepting one text byte.
    ///
    /// On the `0xFF` terminator the message is complete and the machine
    /// returns to [`Start`]; otherwise the caller appends the byte.
    pub fn advance(self, r: [u8; 1]) -> Result<Either<TextBody, Start>, TextError> {
        let r = r[0];

        if r == 0xFF {
            Ok(Right(Start))
        } else if self.received > 32 {
            Err(TextError::Overflow)
        } else {
            Ok(Left(TextBody {
                received: self.received + 1,
            }))
        }
    }
}
