//! Bridge control protocol: drive an opened CY7C652xx over its vendor
//! command set.
//!
//! Each operating mode gets its own driver type, built on a classified
//! [`DiscoveredDevice`](crate::DiscoveredDevice):
//!
//! - [`CyI2cBridge`] - I2C controller transactions.
//! - [`CySpiBridge`] - SPI controller transfers.
//! - [`MfgBridge`] - the manufacturing interface used to read and write the
//!   configuration block.
//!
//! All drivers share the common command set (firmware version, device reset,
//! user flash access) implemented on the private base.

pub mod i2c;
pub mod mfg;
pub mod spi;

pub use i2c::{CyI2cBridge, CyI2cConfig};
pub use mfg::MfgBridge;
pub use spi::{CySpiBridge, CySpiConfig, CySpiMode};

use std::time::Duration;

use log::{debug, info};

use crate::constants::*;
use crate::discovery::DiscoveredDevice;
use crate::error::{Error, Result};
use crate::transport::{UsbHandle, UsbTransport};
use crate::types::{CyType, FirmwareVersion};

/// Shared state and commands common to every bridge mode.
///
/// Owns the opened handle; all transfers on one bridge serialize through
/// `&mut self`.
pub(crate) struct BridgeBase<H: UsbHandle> {
    handle: H,
    /// SCB index for multi-port devices; always 0 for single-SCB parts.
    scb_index: u16,
    timeout: Duration,
    ep_in: Option<u8>,
    ep_out: Option<u8>,
    ep_intr: Option<u8>,
    firmware_version: FirmwareVersion,
}

impl<H: UsbHandle> std::fmt::Debug for BridgeBase<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeBase")
            .field("scb_index", &self.scb_index)
            .field("firmware_version", &self.firmware_version)
            .finish_non_exhaustive()
    }
}

// ---- Opening ----

impl<H: UsbHandle> BridgeBase<H> {
    /// Open a discovered device as the given bridge type.
    ///
    /// Claims the matching interface, verifies the "CYUS" device signature,
    /// and reads the firmware version. The manufacturing interface carries
    /// no bulk endpoints; for every other type all three endpoints must be
    /// present.
    pub(crate) fn open<T: UsbTransport<Handle = H>>(
        transport: &T,
        device: &DiscoveredDevice,
        cy_type: CyType,
    ) -> Result<Self> {
        let setting = match cy_type {
            CyType::Mfg => device.mfg_interface.as_ref().ok_or(Error::InvalidArgument(
                "device has no manufacturing interface",
            ))?,
            CyType::I2c | CyType::Spi => {
                if device.cy_type != cy_type {
                    return Err(Error::InvalidArgument(
                        "device SCB is not configured for the requested mode",
                    ));
                }
                device
                    .scb_interface
                    .as_ref()
                    .ok_or(Error::InvalidArgument("device has no SCB interface"))?
            }
            _ => return Err(Error::InvalidArgument("unsupported bridge type")),
        };

        let mut ep_in = None;
        let mut ep_out = None;
        let mut ep_intr = None;
        for ep in &setting.endpoints {
            if ep.is_bulk() {
                if ep.is_in() {
                    ep_in = Some(ep.address);
                } else {
                    ep_out = Some(ep.address);
                }
            } else if ep.is_interrupt() && ep.is_in() {
                ep_intr = Some(ep.address);
            }
        }

        if cy_type != CyType::Mfg && (ep_in.is_none() || ep_out.is_none() || ep_intr.is_none()) {
            return Err(Error::UnexpectedResponse(
                "bridge endpoints missing from interface descriptor".into(),
            ));
        }

        let mut handle = transport.open(&device.usb_device)?;
        handle.claim_interface(setting.interface_number)?;

        let mut base = Self {
            handle,
            scb_index: 0,
            timeout: DEFAULT_TIMEOUT,
            ep_in,
            ep_out,
            ep_intr,
            firmware_version: FirmwareVersion {
                major: 0,
                minor: 0,
                patch: 0,
                build: 0,
            },
        };

        let signature = base.signature()?;
        if &signature != CY_DEVICE_SIGNATURE {
            return Err(Error::InvalidSignature(signature));
        }

        base.firmware_version = base.read_firmware_version()?;
        info!(
            "opened {:?} interface of device {}, firmware {}",
            cy_type, device.usb_device.id, base.firmware_version
        );

        Ok(base)
    }

    /// wValue bits selecting this SCB.
    fn scb_bits(&self) -> u16 {
        self.scb_index << CY_SCB_INDEX_POS
    }
}

// ---- Common commands ----

impl<H: UsbHandle> BridgeBase<H> {
    /// Read the 4-byte device signature.
    fn signature(&mut self) -> Result<[u8; 4]> {
        let raw = self
            .handle
            .control_in(CY_GET_SIGNATURE_CMD, 0, 0, CY_GET_SIGNATURE_LEN, self.timeout)?;
        raw.try_into()
            .map_err(|_| Error::UnexpectedResponse("short signature response".into()))
    }

    fn read_firmware_version(&mut self) -> Result<FirmwareVersion> {
        let raw = self
            .handle
            .control_in(CY_GET_VERSION_CMD, 0, 0, CY_GET_VERSION_LEN, self.timeout)?;
        let raw: [u8; 8] = raw
            .try_into()
            .map_err(|_| Error::UnexpectedResponse("short version response".into()))?;
        Ok(FirmwareVersion::from_bytes(&raw))
    }

    /// Firmware version read at open time.
    pub(crate) fn firmware_version(&self) -> FirmwareVersion {
        self.firmware_version
    }

    /// Reset the device. It drops off the bus and re-enumerates, so the
    /// bridge is consumed.
    ///
    /// The chip never completes this request cleanly; the resulting stall
    /// or disconnect error is part of normal operation and swallowed.
    pub(crate) fn reset_device(mut self) -> Result<()> {
        let result = self.handle.control_out(
            CY_DEVICE_RESET_CMD,
            CY_DEVICE_RESET_VALUE,
            CY_DEVICE_RESET_INDEX,
            &[],
            self.timeout,
        );
        match result {
            Ok(()) => Ok(()),
            Err(Error::Transfer(nusb::transfer::TransferError::Stall))
            | Err(Error::Transfer(nusb::transfer::TransferError::Disconnected)) => {
                debug!("device dropped off the bus during reset, as expected");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn check_flash_bounds(addr: usize, len: usize) -> Result<()> {
        if addr % USER_FLASH_PAGE_SIZE != 0 || len % USER_FLASH_PAGE_SIZE != 0 || len == 0 {
            return Err(Error::InvalidArgument(
                "user flash access must be in whole 128-byte pages",
            ));
        }
        if addr + len > USER_FLASH_SIZE {
            return Err(Error::InvalidArgument(
                "user flash access outside the 512-byte area",
            ));
        }
        Ok(())
    }

    /// Program the user flash area, one 128-byte page at a time.
    pub(crate) fn program_user_flash(&mut self, addr: usize, data: &[u8]) -> Result<()> {
        Self::check_flash_bounds(addr, data.len())?;

        for (page_idx, page) in data.chunks(USER_FLASH_PAGE_SIZE).enumerate() {
            let page_addr = addr + page_idx * USER_FLASH_PAGE_SIZE;
            self.handle.control_out(
                CY_PROG_USER_FLASH_CMD,
                0,
                page_addr as u16,
                page,
                self.timeout,
            )?;
        }
        Ok(())
    }

    /// Read from the user flash area, one 128-byte page at a time.
    pub(crate) fn read_user_flash(&mut self, addr: usize, len: usize) -> Result<Vec<u8>> {
        Self::check_flash_bounds(addr, len)?;

        let mut result = Vec::with_capacity(len);
        for page_idx in 0..len / USER_FLASH_PAGE_SIZE {
            let page_addr = addr + page_idx * USER_FLASH_PAGE_SIZE;
            let page = self.handle.control_in(
                CY_READ_USER_FLASH_CMD,
                0,
                page_addr as u16,
                USER_FLASH_PAGE_SIZE as u16,
                self.timeout,
            )?;
            if page.len() != USER_FLASH_PAGE_SIZE {
                return Err(Error::UnexpectedResponse(
                    "short user flash page read".into(),
                ));
            }
            result.extend_from_slice(&page);
        }
        Ok(result)
    }
}
