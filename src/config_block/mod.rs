//! Configuration block support: decoding, field access, and encoding.
//!
//! Every CY7C652xx stores a 512-byte configuration block in its EEPROM
//! describing the device's identity and default behavior: operating type,
//! USB vid/pid, descriptor strings, CapSense flag, and the default bus
//! frequency. This module provides:
//!
//! - [`ConfigurationBlock`] - The decoded structure with field accessors.
//! - [`decode`](ConfigurationBlock::decode) - Parse a binary block.
//! - [`encode`](ConfigurationBlock::encode) - Serialize back to bytes.
//!
//! The serialized form is byte-exact: decoding a well-formed block and
//! re-encoding it reproduces the input, including reserved regions this
//! module does not interpret. Blocks move to and from hardware via
//! [`MfgBridge`](crate::bridge::MfgBridge).

mod block;
mod decode;
mod encode;

pub use block::ConfigurationBlock;
