//! The polled decoding engine and its host-facing contracts.
//!
//! An engine is constructed once per logical connection from two injected
//! collaborators: a [`Port`] surfacing received code units and a [`Clock`]
//! providing monotonic milliseconds. The host calls [`Decoder::poll`] once
//! per control-loop iteration; each call consumes at most one input unit
//! and returns at most one [`Packet`].
//!
//! Sensor names and value labels observed on the wire accumulate in the
//! engine's [`registry::Registry`], which resolves later value samples to
//! human-readable descriptions. Hosts that already know a sensor's
//! metadata out-of-band can seed the registry through
//! [`registry::Registry::complete_value`] instead of waiting for it to
//! arrive over the link.

pub mod decoder;
pub mod packet;
pub mod registry;

pub use decoder::Decoder;
pub use packet::Packet;

/// A source of received code units.
///
/// Implementations wrap the physical transport: a hardware receiver, an
/// interrupt-fed ring buffer, or a replayed capture. The engine only
/// requires "the next available unit, or nothing".
pub trait Port {
    /// Prepare the underlying transport.
    ///
    /// Idempotent; invoked once when an engine is constructed over this
    /// port. The default implementation does nothing.
    fn init(&mut self) {}

    /// Retrieve the next available code unit.
    ///
    /// The low byte of a returned code is the received unit. `None` means
    /// nothing is currently pending; the engine does not advance on it.
    fn read(&mut self) -> Option<u16>;
}

/// A monotonic millisecond clock.
pub trait Clock {
    /// Milliseconds since an arbitrary epoch.
    fn now(&self) -> u64;
}

/// A [`Port`] replaying an in-memory capture, one byte per poll.
#[derive(Debug)]
pub struct SlicePort<'a> {
    bytes: &'a [u8],
}

impl<'a> SlicePort<'a> {
    /// Wrap a capture; each byte is surfaced exactly once.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Whether every byte of the capture has been surfaced.
    pub fn is_exhausted(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Port for SlicePort<'_> {
    fn read(&mut self) -> Option<u16> {
        let (first, rest) = self.bytes.split_first()?;
        self.bytes = rest;
        Some(u16::from(*first))
    }
}

#[cfg(feature = "std")]
extern crate std;

/// A [`Clock`] over the process monotonic clock.
///
/// _Requires Cargo feature `std`._
#[cfg(feature = "std")]
#[derive(Debug)]
pub struct SystemClock {
    epoch: std::time::Instant,
}

#[cfg(feature = "std")]
impl SystemClock {
    /// A clock counting from its own construction.
    pub fn new() -> Self {
        Self {
            epoch: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for SystemClock {
    fn now(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}
