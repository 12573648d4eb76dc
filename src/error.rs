//! Error types for the cy-serial-bridge crate.

/// The error type for bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error from the nusb USB layer.
    #[error("USB error: {0}")]
    Usb(#[from] nusb::Error),

    /// A USB transfer error.
    #[error("USB transfer error: {0}")]
    Transfer(#[from] nusb::transfer::TransferError),

    /// A serial port enumeration error.
    #[error("serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    /// No device matching the scan filter was found.
    #[error("device not found")]
    DeviceNotFound,

    /// More than one device matched the scan filter and no serial number
    /// was given to disambiguate.
    #[error("{count} devices matched the filter; pass a serial number to pick one")]
    AmbiguousMatch {
        /// Number of matching devices.
        count: usize,
    },

    /// Invalid argument(s) were provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A malformed configuration block.
    #[error("configuration block error: {0}")]
    ConfigBlock(String),

    /// The configuration block's format version is not supported.
    #[error("unsupported configuration format version {major}.{minor} build {build}")]
    UnsupportedVersion {
        /// Major version found in the block.
        major: u8,
        /// Minor version found in the block.
        minor: u8,
        /// Build number found in the block.
        build: u16,
    },

    /// The configuration block names a device type this crate does not know.
    #[error("unknown device type byte {0:#04x}")]
    UnknownDeviceType(u8),

    /// Configuration block checksum verification failed.
    #[error("configuration checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Checksum stored in the block.
        stored: u32,
        /// Checksum computed over the block contents.
        computed: u32,
    },

    /// The device did not return the expected "CYUS" signature.
    #[error("unexpected device signature {0:02x?}; device may be in bootloader mode")]
    InvalidSignature([u8; 4]),

    /// A bridge operation was attempted before configuring the module.
    #[error("bridge not configured; call set_config first")]
    NotConfigured,

    /// An I2C target did not acknowledge.
    #[error("I2C NACK after {bytes_written} bytes")]
    I2cNack {
        /// Number of bytes the target acknowledged before the NACK.
        /// Zero for an address NACK or for read transactions.
        bytes_written: usize,
    },

    /// An electrical or timing fault was detected on the I2C bus.
    #[error("I2C bus error")]
    I2cBusError,

    /// Lost arbitration to another controller on the I2C bus.
    #[error("I2C arbitration lost")]
    I2cArbitrationLost,

    /// The bridge reported a non-idle status after a transfer.
    #[error("bridge transfer failed with status {0:#010x}")]
    BridgeStatus(u32),

    /// The device sent a response the protocol layer cannot interpret
    /// (short read, missing endpoint, unknown mode value).
    #[error("unexpected device response: {0}")]
    UnexpectedResponse(String),
}

/// A specialized `Result` type for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;
