//! Internal finite-state machine for implementing decoders.
//!
//! This module is intended for advanced applications that need fine control
//! over decoder internals. See [`crate::avec`] for the polled engine covering
//! the common decoding pattern.
//!
//! # Architecture
//!
//! All framing states are represented by a non-copy token. Each input byte
//! transitions to another state by calling the token's `advance` method,
//! which returns a successor state token, along with any extracted data.
//! Tokens do not buffer: implementations append each frame-body byte to
//! their own storage alongside the matching `advance` call, so the buffer
//! and the state cannot drift apart.
//!
//! Only the initial state, re-exported for convenience as [`Decoder`], can
//! be constructed. A fresh [`frame::Start`] is also the correct target for
//! a forced resynchronization (for example after an inactivity timeout).
//!
//! This architecture enables the compiler and type system to guide
//! applications toward a correct implementation. However, some areas of the
//! decoding process are not represented in the finite-state machine and must
//! be carefully written:
//!
//! - Applying the cyclic redundancy check once a frame body is complete,
//! using the helper in the [`check`] module, before trusting any payload
//! byte.
//!
//! - Reversing the obfuscation with [`cipher::descramble`] after the check
//! passes and before interpreting the payload.
//!
//! - Stepping a cursor through the value records of a received data frame
//! with [`value::next`].
//!
//! Implementers are recommended to begin by studying and modifying the
//! engine in the [`crate::avec`] module.

pub mod check;
pub mod cipher;
pub mod frame;
pub mod value;

/// Entrypoint to the finite-state machine.
pub type Decoder = frame::Start;
