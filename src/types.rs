//! Type definitions for CY7C652xx chip communication.
//!
//! These types model the operating personality of a bridge device and the
//! mode a caller asks for when opening one.

/// Operating type of a communication interface on a CY7C652xx.
///
/// Each serial communication block (SCB) of the chip is configured to one of
/// these personalities in the persistent configuration block. The same values
/// are stored in the device-type byte of the configuration block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CyType {
    /// SCB disabled.
    Disabled,
    /// UART using a vendor-specific USB protocol (not yet supported).
    UartVendor,
    /// SPI controller or peripheral.
    Spi,
    /// I2C controller or peripheral.
    I2c,
    /// JTAG controller (CY7C65215 only, not yet supported).
    Jtag,
    /// Manufacturing interface, present on every device in vendor mode.
    /// Carries the configuration protocol used by Cypress's USCU utility.
    Mfg,
    /// UART exposed as a standard USB CDC ACM serial port.
    UartCdc,
}

impl CyType {
    /// Wire value stored in the configuration block's device-type byte.
    pub(crate) fn wire_value(self) -> u8 {
        match self {
            Self::Disabled => 0,
            Self::UartVendor => 1,
            Self::Spi => 2,
            Self::I2c => 3,
            Self::Jtag => 4,
            Self::Mfg => 5,
            Self::UartCdc => 6,
        }
    }

    /// Decode from the configuration block's device-type byte.
    pub(crate) fn from_wire_value(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Disabled,
            1 => Self::UartVendor,
            2 => Self::Spi,
            3 => Self::I2c,
            4 => Self::Jtag,
            5 => Self::Mfg,
            6 => Self::UartCdc,
            _ => return None,
        })
    }
}

/// Mode to open a device in.
///
/// Passed to a scan to restrict matches to devices whose SCB personality can
/// satisfy the intended use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Drive an I2C bus as the controller.
    I2cController,
    /// Drive an SPI bus as the controller.
    SpiController,
    /// Talk to the manufacturing interface (reconfiguration).
    MfgInterface,
    /// Use the CDC ACM serial port.
    UartCdc,
}

impl OpenMode {
    /// The SCB personality this mode requires, if any.
    ///
    /// [`OpenMode::MfgInterface`] returns `None`: every vendor-mode device
    /// carries a manufacturing interface regardless of SCB personality.
    pub(crate) fn required_cy_type(self) -> Option<CyType> {
        match self {
            Self::I2cController => Some(CyType::I2c),
            Self::SpiController => Some(CyType::Spi),
            Self::UartCdc => Some(CyType::UartCdc),
            Self::MfgInterface => None,
        }
    }
}

/// Firmware version reported by a bridge device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FirmwareVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
    /// Patch version.
    pub patch: u16,
    /// Build number.
    pub build: u32,
}

impl FirmwareVersion {
    /// Decode from the 8-byte version response.
    pub(crate) fn from_bytes(raw: &[u8; 8]) -> Self {
        Self {
            major: raw[0],
            minor: raw[1],
            patch: u16::from_le_bytes([raw[2], raw[3]]),
            build: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
        }
    }
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{} build {}",
            self.major, self.minor, self.patch, self.build
        )
    }
}
