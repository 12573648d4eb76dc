//! The decoded configuration block structure and its field accessors.

use crate::constants::cfg;
use crate::error::{Error, Result};
use crate::types::CyType;

/// Decoded contents of a device's 512-byte configuration block.
///
/// Constructed by [`decode`](Self::decode) from a blob read off the chip (or
/// from a file), mutated through the setters, and serialized back with
/// [`encode`](Self::encode). The raw buffer is retained so that regions this
/// crate does not interpret survive a decode/encode round trip unchanged.
#[derive(Debug, Clone)]
pub struct ConfigurationBlock {
    /// Raw block contents; reserved regions are preserved verbatim.
    pub(super) buf: Vec<u8>,

    pub(super) version_major: u8,
    pub(super) version_minor: u8,
    pub(super) version_build: u16,
    pub(super) device_type: CyType,
    pub(super) vid: u16,
    pub(super) pid: u16,
    pub(super) mfgr_string: Option<String>,
    pub(super) product_string: Option<String>,
    pub(super) serial_number: Option<String>,
    pub(super) capsense_on: bool,
    pub(super) default_frequency: u32,
}

/// Equality compares the logical fields only; the retained raw buffer may
/// hold stale bytes for fields changed through setters.
impl PartialEq for ConfigurationBlock {
    fn eq(&self, other: &Self) -> bool {
        self.version() == other.version()
            && self.device_type == other.device_type
            && self.vid == other.vid
            && self.pid == other.pid
            && self.mfgr_string == other.mfgr_string
            && self.product_string == other.product_string
            && self.serial_number == other.serial_number
            && self.capsense_on == other.capsense_on
            && self.default_frequency == other.default_frequency
    }
}

impl Eq for ConfigurationBlock {}

// ---- Construction ----

impl ConfigurationBlock {
    /// Create a blank block for the given device type.
    ///
    /// Format version is the newest this crate supports; identity defaults
    /// to the stock Cypress vid/pid and a 100 kHz default frequency.
    pub fn new(device_type: CyType) -> Self {
        Self {
            buf: vec![0u8; cfg::BLOCK_SIZE],
            version_major: cfg::SUPPORTED_VERSION_MAJOR,
            version_minor: 0,
            version_build: 0,
            device_type,
            vid: crate::constants::CY_VID,
            pid: crate::constants::pid::VENDOR_MODE,
            mfgr_string: None,
            product_string: None,
            serial_number: None,
            capsense_on: false,
            default_frequency: 100_000,
        }
    }
}

// ---- Field accessors ----

impl ConfigurationBlock {
    /// Format version the block was decoded from, as (major, minor, build).
    /// Read-only: it describes the layout, not a configurable value.
    pub fn version(&self) -> (u8, u8, u16) {
        (self.version_major, self.version_minor, self.version_build)
    }

    /// Configured operating type of the device's SCB.
    pub fn device_type(&self) -> CyType {
        self.device_type
    }

    /// Set the operating type.
    pub fn set_device_type(&mut self, device_type: CyType) {
        self.device_type = device_type;
    }

    /// USB vendor ID the device enumerates with.
    pub fn vid(&self) -> u16 {
        self.vid
    }

    /// Set the USB vendor ID.
    pub fn set_vid(&mut self, vid: u16) {
        self.vid = vid;
    }

    /// USB product ID the device enumerates with.
    pub fn pid(&self) -> u16 {
        self.pid
    }

    /// Set the USB product ID.
    pub fn set_pid(&mut self, pid: u16) {
        self.pid = pid;
    }

    /// Manufacturer string, if configured.
    pub fn mfgr_string(&self) -> Option<&str> {
        self.mfgr_string.as_deref()
    }

    /// Set or clear the manufacturer string.
    ///
    /// Clearing zeroes the string's storage on the next encode. Fails if the
    /// string does not fit its slot.
    pub fn set_mfgr_string(&mut self, value: Option<&str>) -> Result<()> {
        self.mfgr_string = checked_string(value)?;
        Ok(())
    }

    /// Product string, if configured.
    pub fn product_string(&self) -> Option<&str> {
        self.product_string.as_deref()
    }

    /// Set or clear the product string.
    pub fn set_product_string(&mut self, value: Option<&str>) -> Result<()> {
        self.product_string = checked_string(value)?;
        Ok(())
    }

    /// Serial number string, if configured.
    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    /// Set or clear the serial number string.
    pub fn set_serial_number(&mut self, value: Option<&str>) -> Result<()> {
        self.serial_number = checked_string(value)?;
        Ok(())
    }

    /// Whether the CapSense touch sensing block is enabled.
    pub fn capsense_on(&self) -> bool {
        self.capsense_on
    }

    /// Enable or disable CapSense.
    pub fn set_capsense_on(&mut self, on: bool) {
        self.capsense_on = on;
    }

    /// Default bus frequency in Hz. Meaningful for I2C-capable types.
    pub fn default_frequency(&self) -> u32 {
        self.default_frequency
    }

    /// Set the default bus frequency.
    pub fn set_default_frequency(&mut self, frequency: u32) {
        self.default_frequency = frequency;
    }
}

impl std::fmt::Display for ConfigurationBlock {
    /// One-line identity summary, e.g. for listing tools.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} device {:04x}:{:04x}",
            self.device_type, self.vid, self.pid
        )?;
        if let Some(mfgr) = &self.mfgr_string {
            write!(f, ", manufacturer \"{mfgr}\"")?;
        }
        if let Some(product) = &self.product_string {
            write!(f, ", product \"{product}\"")?;
        }
        if let Some(serial) = &self.serial_number {
            write!(f, ", serial \"{serial}\"")?;
        }
        write!(f, ", {} Hz default", self.default_frequency)?;
        if self.capsense_on {
            write!(f, ", capsense on")?;
        }
        Ok(())
    }
}

/// Validate that a string fits a block string slot.
fn checked_string(value: Option<&str>) -> Result<Option<String>> {
    match value {
        None => Ok(None),
        Some(s) => {
            if s.encode_utf16().count() > cfg::MAX_STRING_CHARS {
                return Err(Error::InvalidArgument(
                    "string too long for configuration block slot",
                ));
            }
            Ok(Some(s.to_owned()))
        }
    }
}
