//! Pure Rust driver for Cypress CY7C652xx USB serial bridge chips.
//!
//! These chips (CY7C65211, CY7C65213, CY7C65215 and friends) bridge USB to
//! an I2C, SPI, or UART bus, selected by a persistent configuration block
//! in on-chip EEPROM. This crate talks their vendor protocol directly using
//! [nusb](https://crates.io/crates/nusb) — no C dependencies or vendor
//! libraries required.
//!
//! # Quick Start
//!
//! ```no_run
//! use cy_serial_bridge::{
//!     backend::{NusbTransport, OsSerialPorts},
//!     scan_for_device, CyI2cBridge, CyI2cConfig, OpenMode, ScanFilter,
//! };
//!
//! let transport = NusbTransport::new();
//! let device = scan_for_device(
//!     &transport,
//!     &OsSerialPorts::new(),
//!     &ScanFilter::new(OpenMode::I2cController),
//! )?;
//!
//! let mut i2c = CyI2cBridge::new(&transport, &device)?;
//! i2c.set_config(&CyI2cConfig { frequency: 400_000 })?;
//! let id = i2c.write_read(0x50, &[0x00], 2)?;
//! # Ok::<(), cy_serial_bridge::Error>(())
//! ```
//!
//! # Features
//!
//! - **Device discovery**: Classify connected bridges by operating mode and
//!   select one by vid/pid/serial number ([`list_devices`],
//!   [`scan_for_device`]).
//! - **I2C controller**: Reads, writes, and repeated-start combined
//!   transactions, with NACK, bus-error, and arbitration-loss outcomes
//!   reported distinctly ([`CyI2cBridge`]).
//! - **SPI controller**: Configurable mode/frequency/word size and
//!   full-duplex transfers ([`CySpiBridge`]).
//! - **UART CDC**: Classified devices expose the OS serial port path to
//!   open with any serial library.
//! - **Configuration block**: Decode, modify, and re-encode the chip's
//!   512-byte identity block, byte-exact ([`ConfigurationBlock`]), and move
//!   it to and from hardware ([`MfgBridge`]).
//! - **Mockable transport**: All hardware access goes through the traits in
//!   [`transport`], so the classifier and bridges test against in-memory
//!   fakes.

pub mod backend;
pub mod bridge;
pub mod config_block;
pub mod constants;
pub mod discovery;
pub mod error;
pub mod transport;
pub mod types;

// ---- Convenience re-exports ----

pub use bridge::{CyI2cBridge, CyI2cConfig, CySpiBridge, CySpiConfig, CySpiMode, MfgBridge};
pub use config_block::ConfigurationBlock;
pub use constants::CY_VID;
pub use discovery::{list_devices, scan_for_device, DiscoveredDevice, ScanFilter};
pub use error::{Error, Result};
pub use types::{CyType, FirmwareVersion, OpenMode};
