//! I2C controller bridge.
//!
//! Drives a CY7C652xx whose SCB is configured for I2C, as the bus
//! controller. Each transaction is one vendor control transfer setting up
//! the operation, a bulk transfer carrying the data, and an interrupt
//! notification reporting the outcome.
//!
//! # Example
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
//!
//! // Write a register address, then read 2 bytes with a repeated start.
//! let data = i2c.write_read(0x50, &[0x00], 2)?;
//! # Ok::<(), cy_serial_bridge::Error>(())
//! ```

use std::time::Duration;

use log::debug;

use crate::constants::i2c;
use crate::constants::{
    CY_I2C_GET_CONFIG_CMD, CY_I2C_GET_STATUS_CMD, CY_I2C_READ_CMD, CY_I2C_RESET_CMD,
    CY_I2C_SET_CONFIG_CMD, CY_I2C_WRITE_CMD,
};
use crate::discovery::DiscoveredDevice;
use crate::error::{Error, Result};
use crate::transport::{UsbHandle, UsbTransport};
use crate::types::{CyType, FirmwareVersion};

use super::BridgeBase;

/// I2C module configuration.
///
/// The controller-mode hardware only exposes the bus frequency; the other
/// wire fields are fixed by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyI2cConfig {
    /// Bus frequency in Hz.
    pub frequency: u32,
}

impl Default for CyI2cConfig {
    fn default() -> Self {
        Self { frequency: 400_000 }
    }
}

impl CyI2cConfig {
    /// Pack into the 16-byte wire structure.
    fn to_wire(self) -> [u8; i2c::CONFIG_LEN as usize] {
        let mut raw = [0u8; i2c::CONFIG_LEN as usize];
        raw[..4].copy_from_slice(&self.frequency.to_le_bytes());
        // sAddress: ignored in controller mode
        raw[4] = 0;
        // isMsbFirst: always set
        raw[5] = 1;
        // isMaster
        raw[6] = 1;
        // sIgnore, clockStretch, isLoopback stay zero
        raw
    }

    fn from_wire(raw: &[u8]) -> Result<Self> {
        if raw.len() != i2c::CONFIG_LEN as usize {
            return Err(Error::UnexpectedResponse(
                "short I2C configuration response".into(),
            ));
        }
        Ok(Self {
            frequency: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
        })
    }
}

/// A CY7C652xx opened in I2C controller mode.
pub struct CyI2cBridge<H: UsbHandle> {
    base: BridgeBase<H>,
    /// Set by [`set_config`](Self::set_config); transfers refuse to run
    /// before it, since the hardware may hold garbage settings at power-up.
    frequency: Option<u32>,
}

impl<H: UsbHandle> std::fmt::Debug for CyI2cBridge<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CyI2cBridge")
            .field("base", &self.base)
            .field("frequency", &self.frequency)
            .finish()
    }
}

// ---- Construction / configuration ----

impl<H: UsbHandle> CyI2cBridge<H> {
    /// Open a discovered I2C-mode device.
    ///
    /// Resets both directions of the I2C module in case a previous session
    /// left it mid-error, then verifies the module reports idle.
    pub fn new<T: UsbTransport<Handle = H>>(
        transport: &T,
        device: &DiscoveredDevice,
    ) -> Result<Self> {
        let base = BridgeBase::open(transport, device, CyType::I2c)?;
        let mut bridge = Self {
            base,
            frequency: None,
        };

        bridge.reset_module(i2c::MODE_READ)?;
        bridge.reset_module(i2c::MODE_WRITE)?;

        for mode in [i2c::MODE_READ, i2c::MODE_WRITE] {
            let status = bridge.status(mode)?;
            if status[0] & i2c::ERROR_BIT != 0 {
                return Err(Error::BridgeStatus(status_word(&status)));
            }
        }

        Ok(bridge)
    }

    /// Configure the I2C module.
    ///
    /// Call once after opening; the power-up configuration is not
    /// guaranteed to be sane.
    pub fn set_config(&mut self, config: &CyI2cConfig) -> Result<()> {
        let timeout = self.base.timeout;
        self.base.handle.control_out(
            CY_I2C_SET_CONFIG_CMD,
            self.base.scb_bits(),
            0,
            &config.to_wire(),
            timeout,
        )?;
        self.frequency = Some(config.frequency);
        Ok(())
    }

    /// Read the current I2C module configuration from the device.
    pub fn read_config(&mut self) -> Result<CyI2cConfig> {
        let timeout = self.base.timeout;
        let raw = self.base.handle.control_in(
            CY_I2C_GET_CONFIG_CMD,
            self.base.scb_bits(),
            0,
            i2c::CONFIG_LEN,
            timeout,
        )?;
        let config = CyI2cConfig::from_wire(&raw)?;
        self.frequency = Some(config.frequency);
        Ok(config)
    }

    /// Firmware version read when the device was opened.
    pub fn firmware_version(&self) -> FirmwareVersion {
        self.base.firmware_version()
    }

    /// Reset the device; it re-enumerates and this bridge is consumed.
    pub fn reset_device(self) -> Result<()> {
        self.base.reset_device()
    }

    /// Program the 512-byte user flash area. Page aligned, whole pages.
    pub fn program_user_flash(&mut self, addr: usize, data: &[u8]) -> Result<()> {
        self.base.program_user_flash(addr, data)
    }

    /// Read from the user flash area. Page aligned, whole pages.
    pub fn read_user_flash(&mut self, addr: usize, len: usize) -> Result<Vec<u8>> {
        self.base.read_user_flash(addr, len)
    }
}

// ---- Transactions ----

impl<H: UsbHandle> CyI2cBridge<H> {
    /// Read `len` bytes from the peripheral at `addr`, ending with a stop
    /// condition.
    pub fn read(&mut self, addr: u8, len: usize) -> Result<Vec<u8>> {
        self.read_inner(addr, len, true)
    }

    /// Write `data` to the peripheral at `addr`, ending with a stop
    /// condition.
    pub fn write(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        self.write_inner(addr, data, true)
    }

    /// Write then read with a repeated start in between, the usual
    /// register-read idiom.
    pub fn write_read(&mut self, addr: u8, data: &[u8], read_len: usize) -> Result<Vec<u8>> {
        self.write_inner(addr, data, false)?;
        self.read_inner(addr, read_len, true)
    }

    fn read_inner(&mut self, addr: u8, len: usize, relinquish_bus: bool) -> Result<Vec<u8>> {
        let frequency = self.check_transaction(addr)?;
        if len == 0 {
            // The bridge hardware does not handle zero-length reads.
            return Err(Error::InvalidArgument("read length must be >= 1"));
        }
        if len > usize::from(u16::MAX) {
            // The setup request carries the length in a 16-bit field.
            return Err(Error::InvalidArgument(
                "transfer length must fit in 16 bits",
            ));
        }

        let timeout = transfer_timeout(len, frequency);

        let initial = self.status(i2c::MODE_READ)?;
        if initial[0] & i2c::ERROR_BIT != 0 {
            return Err(Error::BridgeStatus(status_word(&initial)));
        }

        // Bit 1 requests a NAK of the final byte, required by the standard;
        // bit 0 controls stop generation.
        let value = self.base.scb_bits()
            | u16::from(addr) << 8
            | 0b10
            | u16::from(relinquish_bus);

        self.base
            .handle
            .control_out(CY_I2C_READ_CMD, value, len as u16, &[], timeout)?;

        let ep_in = self.data_endpoint(self.base.ep_in)?;
        let ep_intr = self.data_endpoint(self.base.ep_intr)?;
        let data = self.base.handle.bulk_in(ep_in, len, timeout);
        let notification =
            data.and_then(|data| {
                let status =
                    self.base
                        .handle
                        .interrupt_in(ep_intr, i2c::EVENT_NOTIFICATION_LEN, timeout)?;
                Ok((data, status))
            });

        let (data, status) = match notification {
            Ok(ok) => ok,
            Err(Error::Transfer(nusb::transfer::TransferError::Stall)) => {
                // A stalled pipe means the transaction died on the bus.
                // Clear the halt so the endpoint carries transfers again,
                // then re-query the status to find out why.
                self.base.handle.clear_halt(ep_in)?;
                let status = self.status(i2c::MODE_READ)?;
                if status[0] & i2c::ERROR_BIT == 0 {
                    return Err(Error::UnexpectedResponse(
                        "pipe stalled but I2C module reports no error".into(),
                    ));
                }
                (Vec::new(), status)
            }
            Err(err) => return Err(err),
        };

        if status[0] & i2c::ERROR_BIT != 0 {
            self.reset_module(i2c::MODE_READ)?;
            return Err(read_error(&status));
        }

        if data.len() != len {
            return Err(Error::UnexpectedResponse(format!(
                "expected {} bytes from bulk read, got {}",
                len,
                data.len()
            )));
        }

        Ok(data)
    }

    fn write_inner(&mut self, addr: u8, data: &[u8], relinquish_bus: bool) -> Result<()> {
        let frequency = self.check_transaction(addr)?;
        if data.len() > usize::from(u16::MAX) {
            // The setup request carries the length in a 16-bit field.
            return Err(Error::InvalidArgument(
                "transfer length must fit in 16 bits",
            ));
        }
        let timeout = transfer_timeout(data.len(), frequency);

        let initial = self.status(i2c::MODE_WRITE)?;
        if initial[0] & i2c::ERROR_BIT != 0 {
            return Err(Error::BridgeStatus(status_word(&initial)));
        }

        // Bit 0 controls stop generation.
        let value = self.base.scb_bits() | u16::from(addr) << 8 | u16::from(relinquish_bus);

        self.base
            .handle
            .control_out(CY_I2C_WRITE_CMD, value, data.len() as u16, &[], timeout)?;

        let ep_out = self.data_endpoint(self.base.ep_out)?;
        let ep_intr = self.data_endpoint(self.base.ep_intr)?;
        let result = self.base.handle.bulk_out(ep_out, data, timeout).and_then(|_| {
            self.base
                .handle
                .interrupt_in(ep_intr, i2c::EVENT_NOTIFICATION_LEN, timeout)
        });

        let status = match result {
            Ok(status) => status,
            Err(Error::Transfer(nusb::transfer::TransferError::Stall)) => {
                self.base.handle.clear_halt(ep_out)?;
                let status = self.status(i2c::MODE_WRITE)?;
                if status[0] & i2c::ERROR_BIT == 0 {
                    return Err(Error::UnexpectedResponse(
                        "pipe stalled but I2C module reports no error".into(),
                    ));
                }
                status
            }
            Err(err) => return Err(err),
        };

        if status[0] & i2c::ERROR_BIT != 0 {
            self.reset_module(i2c::MODE_WRITE)?;
            return Err(write_error(&status));
        }

        Ok(())
    }

    fn check_transaction(&self, addr: u8) -> Result<u32> {
        if addr > i2c::MAX_VALID_ADDRESS {
            return Err(Error::InvalidArgument(
                "peripheral address must fit in 7 bits",
            ));
        }
        self.frequency.ok_or(Error::NotConfigured)
    }

    fn data_endpoint(&self, ep: Option<u8>) -> Result<u8> {
        // Open verified these exist for SCB bridges.
        ep.ok_or_else(|| Error::UnexpectedResponse("bridge endpoint missing".into()))
    }

    /// Read the status bytes for one direction of the I2C module.
    fn status(&mut self, mode: u16) -> Result<Vec<u8>> {
        let timeout = self.base.timeout;
        let status = self.base.handle.control_in(
            CY_I2C_GET_STATUS_CMD,
            self.base.scb_bits() | mode,
            0,
            i2c::GET_STATUS_LEN,
            timeout,
        )?;
        if status.is_empty() {
            return Err(Error::UnexpectedResponse("empty I2C status".into()));
        }
        Ok(status)
    }

    /// Reset one direction of the I2C module after an errored transaction.
    fn reset_module(&mut self, mode: u16) -> Result<()> {
        debug!("resetting I2C module, mode {}", mode);
        let timeout = self.base.timeout;
        self.base.handle.control_out(
            CY_I2C_RESET_CMD,
            self.base.scb_bits() | mode,
            0,
            &[],
            timeout,
        )
    }
}

/// Map an errored read status to the distinct error kinds.
fn read_error(status: &[u8]) -> Error {
    if status[0] & i2c::ARBITRATION_ERROR_BIT != 0 {
        Error::I2cArbitrationLost
    } else if status[0] & i2c::NAK_ERROR_BIT != 0 {
        // Read NAKs can only happen on the address byte.
        Error::I2cNack { bytes_written: 0 }
    } else if status[0] & i2c::BUS_ERROR_BIT != 0 {
        Error::I2cBusError
    } else {
        Error::BridgeStatus(status_word(status))
    }
}

/// Map an errored write status. Bytes 1..3 carry how much of the write the
/// target acknowledged before the failure.
fn write_error(status: &[u8]) -> Error {
    if status[0] & i2c::ARBITRATION_ERROR_BIT != 0 {
        Error::I2cArbitrationLost
    } else if status[0] & i2c::NAK_ERROR_BIT != 0 {
        let bytes_written = if status.len() >= 3 {
            u16::from_le_bytes([status[1], status[2]]) as usize
        } else {
            0
        };
        Error::I2cNack { bytes_written }
    } else if status[0] & i2c::BUS_ERROR_BIT != 0 {
        Error::I2cBusError
    } else {
        Error::BridgeStatus(status_word(status))
    }
}

/// Pack status bytes into a diagnostic word, little endian.
fn status_word(status: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    for (dst, src) in raw.iter_mut().zip(status) {
        *dst = *src;
    }
    u32::from_le_bytes(raw)
}

/// Transfer timeout: a second of USB slack plus 10 bit times per byte.
fn transfer_timeout(len: usize, frequency: u32) -> Duration {
    let bus_ms = (len as u64 * 10 * 1000).div_ceil(u64::from(frequency.max(1)));
    Duration::from_millis(1000 + bus_ms)
}
