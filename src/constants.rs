//! Protocol constants for CY7C652xx chip communication.
//!
//! These constants define the USB vendor request codes, interface
//! class/subclass signatures, and the configuration-block layout used by the
//! Cypress USB-Serial bridge family. Most users should not need to use these
//! directly.

use std::time::Duration;

// ---- Cypress Vendor ID and known Product IDs ----

/// Default Cypress vendor ID.
pub const CY_VID: u16 = 0x04B4;

/// Known Cypress serial bridge product IDs.
pub mod pid {
    /// CY7C652xx in vendor (I2C/SPI/manufacturing) mode.
    pub const VENDOR_MODE: u16 = 0xE010;
    /// CY7C652xx in UART CDC mode.
    pub const UART_CDC_MODE: u16 = 0xE011;
}

/// Default (vid, pid) pairs matched when a scan does not widen the filter.
pub const DEFAULT_VID_PIDS: &[(u16, u16)] =
    &[(CY_VID, pid::VENDOR_MODE), (CY_VID, pid::UART_CDC_MODE)];

// ---- USB interface class/subclass signatures ----

/// Vendor-specific interface class carrying the SCB and manufacturing
/// interfaces.
pub(crate) const CLASS_VENDOR: u8 = 0xFF;
/// CDC communications class (UART control interface).
pub(crate) const CLASS_CDC_CONTROL: u8 = 0x02;
/// CDC ACM subclass on the control interface.
pub(crate) const SUBCLASS_CDC_ACM: u8 = 0x02;
/// CDC data class (UART data interface).
pub(crate) const CLASS_CDC_DATA: u8 = 0x0A;

// ---- Vendor request codes ----
//
// Values match libcyusbserial and the USCU configuration utility.

/// Read the 8-byte firmware version structure.
pub(crate) const CY_GET_VERSION_CMD: u8 = 0xB0;
/// Read the 4-byte device signature ("CYUS" in application firmware).
pub(crate) const CY_GET_SIGNATURE_CMD: u8 = 0xBD;
/// Read the SPI module configuration.
pub(crate) const CY_SPI_GET_CONFIG_CMD: u8 = 0xC2;
/// Write the SPI module configuration.
pub(crate) const CY_SPI_SET_CONFIG_CMD: u8 = 0xC3;
/// Read the I2C module configuration.
pub(crate) const CY_I2C_GET_CONFIG_CMD: u8 = 0xC4;
/// Write the I2C module configuration.
pub(crate) const CY_I2C_SET_CONFIG_CMD: u8 = 0xC5;
/// Start an I2C write transaction.
pub(crate) const CY_I2C_WRITE_CMD: u8 = 0xC6;
/// Start an I2C read transaction.
pub(crate) const CY_I2C_READ_CMD: u8 = 0xC7;
/// Read the I2C status bytes.
pub(crate) const CY_I2C_GET_STATUS_CMD: u8 = 0xC8;
/// Reset the I2C read or write module.
pub(crate) const CY_I2C_RESET_CMD: u8 = 0xC9;
/// Start an SPI read and/or write transaction.
pub(crate) const CY_SPI_READ_WRITE_CMD: u8 = 0xCA;
/// Reset the SPI module.
pub(crate) const CY_SPI_RESET_CMD: u8 = 0xCB;
/// Read the SPI status word.
pub(crate) const CY_SPI_GET_STATUS_CMD: u8 = 0xCC;
/// Program a page of the user flash area.
pub(crate) const CY_PROG_USER_FLASH_CMD: u8 = 0xE0;
/// Read a page of the user flash area.
pub(crate) const CY_READ_USER_FLASH_CMD: u8 = 0xE1;
/// Reset the device. It drops off the bus and re-enumerates.
pub(crate) const CY_DEVICE_RESET_CMD: u8 = 0xE3;

/// Magic wValue for [`CY_DEVICE_RESET_CMD`].
pub(crate) const CY_DEVICE_RESET_VALUE: u16 = 0xA6B6;
/// Magic wIndex for [`CY_DEVICE_RESET_CMD`].
pub(crate) const CY_DEVICE_RESET_INDEX: u16 = 0xADBA;

/// Length of the firmware version response.
pub(crate) const CY_GET_VERSION_LEN: u16 = 8;
/// Length of the signature response.
pub(crate) const CY_GET_SIGNATURE_LEN: u16 = 4;
/// Expected signature when the device is running application firmware.
pub(crate) const CY_DEVICE_SIGNATURE: &[u8; 4] = b"CYUS";

/// Bit position of the SCB index within control transfer wValue fields.
pub(crate) const CY_SCB_INDEX_POS: u16 = 15;

// ---- Manufacturing interface requests (USCU protocol) ----

/// Sent by USCU on startup; effect unknown but harmless.
pub(crate) const CY_MFG_PING_CMD: u8 = 203;
/// Reads a 4-byte value USCU queries on startup.
pub(crate) const CY_MFG_PROBE_CMD: u8 = 177;
/// Read the full configuration block.
pub(crate) const CY_MFG_READ_CONFIG_CMD: u8 = 181;
/// Write the full configuration block.
pub(crate) const CY_MFG_WRITE_CONFIG_CMD: u8 = 182;
/// Enter or leave configuration mode.
pub(crate) const CY_MFG_MODE_CMD: u8 = 226;
/// Magic wValue for [`CY_MFG_MODE_CMD`].
pub(crate) const CY_MFG_MODE_VALUE: u16 = 0xA6BC;
/// wIndex selecting "enter configuration mode".
pub(crate) const CY_MFG_MODE_ENTER: u16 = 0xB1B0;
/// wIndex selecting "leave configuration mode".
pub(crate) const CY_MFG_MODE_LEAVE: u16 = 0xB9B0;
/// Length of the probe response.
pub(crate) const CY_MFG_PROBE_LEN: u16 = 4;

// ---- I2C wire constants ----

pub(crate) mod i2c {
    /// Length of the packed I2C configuration structure.
    pub const CONFIG_LEN: u16 = 16;
    /// Length of the status response.
    pub const GET_STATUS_LEN: u16 = 3;
    /// Length of the transfer-complete interrupt notification.
    pub const EVENT_NOTIFICATION_LEN: usize = 3;
    /// Status/reset mode selector: write direction.
    pub const MODE_WRITE: u16 = 0;
    /// Status/reset mode selector: read direction.
    pub const MODE_READ: u16 = 1;
    /// Status byte 0: an error occurred (or the module is busy).
    pub const ERROR_BIT: u8 = 1 << 0;
    /// Status byte 0: lost multi-controller arbitration.
    pub const ARBITRATION_ERROR_BIT: u8 = 1 << 1;
    /// Status byte 0: target did not acknowledge.
    pub const NAK_ERROR_BIT: u8 = 1 << 2;
    /// Status byte 0: electrical or timing bus fault.
    pub const BUS_ERROR_BIT: u8 = 1 << 3;
    /// Largest valid 7-bit target address.
    pub const MAX_VALID_ADDRESS: u8 = 0x7F;
}

// ---- SPI wire constants ----

pub(crate) mod spi {
    /// Length of the packed SPI configuration structure.
    pub const CONFIG_LEN: u16 = 16;
    /// Length of the status response. All zeros means idle.
    pub const GET_STATUS_LEN: u16 = 4;
    /// Transfer mode bit: read data back from the peripheral.
    pub const READ_BIT: u16 = 1 << 0;
    /// Transfer mode bit: send data to the peripheral.
    pub const WRITE_BIT: u16 = 1 << 1;
    /// Lowest supported SCLK frequency in Hz.
    pub const MIN_FREQUENCY: u32 = 1_000;
    /// Highest supported controller-mode SCLK frequency in Hz.
    pub const MAX_FREQUENCY: u32 = 3_000_000;
    /// Smallest supported word size in bits.
    pub const MIN_WORD_SIZE: u8 = 4;
    /// Largest supported word size in bits.
    pub const MAX_WORD_SIZE: u8 = 16;
}

// ---- User flash ----

/// Total size of the user flash area in bytes.
pub const USER_FLASH_SIZE: usize = 512;
/// User flash page size. Reads and programs must be page aligned.
pub const USER_FLASH_PAGE_SIZE: usize = 128;

// ---- Configuration block layout ----

/// Byte offsets and sizes within the persistent configuration block.
pub mod cfg {
    /// Total serialized size of a configuration block.
    pub const BLOCK_SIZE: usize = 512;
    /// Magic bytes at the start of every block.
    pub const MAGIC: &[u8; 4] = b"CYUS";
    /// Format version: major (u8).
    pub const VERSION_MAJOR_OFFSET: usize = 0x04;
    /// Format version: minor (u8).
    pub const VERSION_MINOR_OFFSET: usize = 0x05;
    /// Format version: build number (u16 LE).
    pub const VERSION_BUILD_OFFSET: usize = 0x06;
    /// Checksum (u32 LE): wrapping sum of all bytes from
    /// [`CHECKSUM_REGION_START`] to the end of the block.
    pub const CHECKSUM_OFFSET: usize = 0x08;
    /// First byte covered by the checksum.
    pub const CHECKSUM_REGION_START: usize = 0x0C;
    /// Device type byte.
    pub const DEVICE_TYPE_OFFSET: usize = 0x0C;
    /// Flags byte.
    pub const FLAGS_OFFSET: usize = 0x0D;
    /// Flags bit 0: CapSense enabled.
    pub const FLAG_CAPSENSE: u8 = 1 << 0;
    /// USB vendor ID (u16 LE).
    pub const VID_OFFSET: usize = 0x0E;
    /// USB product ID (u16 LE).
    pub const PID_OFFSET: usize = 0x10;
    /// Default bus frequency in Hz (u32 LE).
    pub const FREQUENCY_OFFSET: usize = 0x14;
    /// Manufacturer string slot.
    pub const MFGR_STRING_OFFSET: usize = 0x20;
    /// Product string slot.
    pub const PRODUCT_STRING_OFFSET: usize = 0x64;
    /// Serial number string slot.
    pub const SERIAL_STRING_OFFSET: usize = 0xA8;
    /// Size of one string slot: a 2-byte USB string descriptor header plus
    /// up to [`MAX_STRING_CHARS`] UTF-16LE code units, zero padded.
    pub const STRING_SLOT_SIZE: usize = 68;
    /// Maximum number of characters in a stored string.
    pub const MAX_STRING_CHARS: usize = 32;
    /// Supported format version (major).
    pub const SUPPORTED_VERSION_MAJOR: u8 = 1;
}

// ---- Timeouts ----

/// Default timeout for control transfers and short bulk operations.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
/// Timeout used when reading descriptor strings during a scan.
pub(crate) const STRING_TIMEOUT: Duration = Duration::from_secs(1);
