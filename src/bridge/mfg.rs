//! Manufacturing interface access.
//!
//! Every CY7C652xx in vendor mode carries a manufacturing interface next to
//! its SCB interface. Cypress's USCU configuration utility talks to it to
//! read and rewrite the persistent configuration block; this driver speaks
//! the same reverse-engineered request sequence.
//!
//! # Example
//!
//! ```no_run
//! use cy_serial_bridge::{
//!     backend::{NusbTransport, OsSerialPorts},
//!     scan_for_device, ConfigurationBlock, MfgBridge, OpenMode, ScanFilter,
//! };
//!
//! let transport = NusbTransport::new();
//! let device = scan_for_device(
//!     &transport,
//!     &OsSerialPorts::new(),
//!     &ScanFilter::new(OpenMode::MfgInterface),
//! )?;
//!
//! let mut mfg = MfgBridge::new(&transport, &device)?;
//! mfg.connect()?;
//! let mut block = ConfigurationBlock::decode(&mfg.read_config_block()?)?;
//! block.set_serial_number(Some("A1B2C3"))?;
//! mfg.write_config_block(&block.encode())?;
//! mfg.disconnect()?;
//! # Ok::<(), cy_serial_bridge::Error>(())
//! ```

use crate::config_block::ConfigurationBlock;
use crate::constants::{
    cfg, CY_MFG_MODE_CMD, CY_MFG_MODE_ENTER, CY_MFG_MODE_LEAVE, CY_MFG_MODE_VALUE,
    CY_MFG_PING_CMD, CY_MFG_PROBE_CMD, CY_MFG_PROBE_LEN, CY_MFG_READ_CONFIG_CMD,
    CY_MFG_WRITE_CONFIG_CMD,
};
use crate::discovery::DiscoveredDevice;
use crate::error::{Error, Result};
use crate::transport::{UsbHandle, UsbTransport};
use crate::types::{CyType, FirmwareVersion};

use super::BridgeBase;

/// A CY7C652xx opened on its manufacturing interface.
pub struct MfgBridge<H: UsbHandle> {
    base: BridgeBase<H>,
}

impl<H: UsbHandle> std::fmt::Debug for MfgBridge<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MfgBridge").field("base", &self.base).finish()
    }
}

impl<H: UsbHandle> MfgBridge<H> {
    /// Open a discovered device on its manufacturing interface.
    ///
    /// Works for any vendor-mode device regardless of SCB personality; the
    /// interface carries no bulk endpoints, only control transfers.
    pub fn new<T: UsbTransport<Handle = H>>(
        transport: &T,
        device: &DiscoveredDevice,
    ) -> Result<Self> {
        let base = BridgeBase::open(transport, device, CyType::Mfg)?;
        Ok(Self { base })
    }

    /// Firmware version read when the device was opened.
    pub fn firmware_version(&self) -> FirmwareVersion {
        self.base.firmware_version()
    }

    /// Send the no-op request USCU issues on startup.
    pub fn ping(&mut self) -> Result<()> {
        let timeout = self.base.timeout;
        self.base
            .handle
            .control_out(CY_MFG_PING_CMD, 0, 0, &[], timeout)
    }

    /// Read the 4-byte value USCU queries on startup. Meaning unknown.
    pub fn probe(&mut self) -> Result<[u8; 4]> {
        let timeout = self.base.timeout;
        let raw = self
            .base
            .handle
            .control_in(CY_MFG_PROBE_CMD, 0, 0, CY_MFG_PROBE_LEN, timeout)?;
        raw.try_into()
            .map_err(|_| Error::UnexpectedResponse("short probe response".into()))
    }

    /// Enter configuration mode. Call before reading or writing the
    /// configuration block.
    pub fn connect(&mut self) -> Result<()> {
        self.mode_request(CY_MFG_MODE_ENTER)
    }

    /// Leave configuration mode.
    pub fn disconnect(&mut self) -> Result<()> {
        self.mode_request(CY_MFG_MODE_LEAVE)
    }

    fn mode_request(&mut self, index: u16) -> Result<()> {
        let timeout = self.base.timeout;
        self.base
            .handle
            .control_out(CY_MFG_MODE_CMD, CY_MFG_MODE_VALUE, index, &[], timeout)
    }

    /// Read the raw 512-byte configuration block from the device.
    pub fn read_config_block(&mut self) -> Result<Vec<u8>> {
        let timeout = self.base.timeout;
        let raw = self.base.handle.control_in(
            CY_MFG_READ_CONFIG_CMD,
            0,
            0,
            cfg::BLOCK_SIZE as u16,
            timeout,
        )?;
        if raw.len() != cfg::BLOCK_SIZE {
            return Err(Error::UnexpectedResponse(format!(
                "configuration block read returned {} bytes",
                raw.len()
            )));
        }
        Ok(raw)
    }

    /// Read and decode the configuration block.
    pub fn read_config(&mut self) -> Result<ConfigurationBlock> {
        ConfigurationBlock::decode(&self.read_config_block()?)
    }

    /// Write a raw 512-byte configuration block to the device.
    ///
    /// The new identity takes effect after a device reset. No validation is
    /// done here; encode through [`ConfigurationBlock`] to guarantee a
    /// consistent block.
    pub fn write_config_block(&mut self, block: &[u8]) -> Result<()> {
        if block.len() != cfg::BLOCK_SIZE {
            return Err(Error::InvalidArgument(
                "configuration block must be exactly 512 bytes",
            ));
        }
        let timeout = self.base.timeout;
        self.base
            .handle
            .control_out(CY_MFG_WRITE_CONFIG_CMD, 0, 0, block, timeout)
    }

    /// Encode and write a configuration block.
    pub fn write_config(&mut self, block: &ConfigurationBlock) -> Result<()> {
        self.write_config_block(&block.encode())
    }

    /// Reset the device so a rewritten configuration takes effect. The
    /// device re-enumerates and this bridge is consumed.
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
