#![no_std]

//! A streaming decoder for the Jeti Duplex EX telemetry protocol.
//!
//! Empennage turns the framed, CRC-protected, optionally-obfuscated byte
//! stream emitted by EX telemetry sensors into typed packets: sensor names,
//! value labels with units, value samples, alarms, and plain-text messages.
//! Metadata and values arrive interleaved in arbitrary order; a registry
//! caches names and labels so value packets can be resolved to
//! human-readable descriptions as soon as their metadata has been seen.
//!
//! Most users should begin with the polled engine in the [`avec`] module,
//! feeding it from a [`avec::Port`] implementation for their serial
//! transport. Applications needing finer control over internals (such as
//! those running on embedded systems without an engine instance) can drive
//! the finite-state machine in the [`sans`] module directly.
//!
//! ## Cargo Features
//!
//! The following crate feature flags are available:
//!
//! - `std`: enable the system clock (default).

extern crate alloc;

pub mod avec;
pub mod sans;
