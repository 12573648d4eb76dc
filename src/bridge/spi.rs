//! SPI controller bridge.
//!
//! Drives a CY7C652xx whose SCB is configured for SPI, as the bus
//! controller. The module is configured once with a [`CySpiConfig`], then
//! [`transfer`](CySpiBridge::transfer) exchanges equal-length data in both
//! directions.
//!
//! # Example
//!
//! ```no_run
//! use cy_serial_bridge::{
//!     backend::{NusbTransport, OsSerialPorts},
//!     scan_for_device, CySpiBridge, CySpiConfig, OpenMode, ScanFilter,
//! };
//!
//! let transport = NusbTransport::new();
//! let device = scan_for_device(
//!     &transport,
//!     &OsSerialPorts::new(),
//!     &ScanFilter::new(OpenMode::SpiController),
//! )?;
//!
//! let mut spi = CySpiBridge::new(&transport, &device)?;
//! spi.set_config(&CySpiConfig::default())?;
//!
//! let rx = spi.transfer(&[0x9F, 0x00, 0x00, 0x00])?;
//! # Ok::<(), cy_serial_bridge::Error>(())
//! ```

use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use crate::constants::spi;
use crate::constants::{
    CY_SPI_GET_CONFIG_CMD, CY_SPI_GET_STATUS_CMD, CY_SPI_READ_WRITE_CMD, CY_SPI_RESET_CMD,
    CY_SPI_SET_CONFIG_CMD,
};
use crate::discovery::DiscoveredDevice;
use crate::error::{Error, Result};
use crate::transport::{UsbHandle, UsbTransport};
use crate::types::{CyType, FirmwareVersion};

use super::BridgeBase;

/// Chunk size for interleaving the two directions of a full-duplex
/// transfer; matches the endpoint FIFO so neither side can overrun.
const TRANSFER_CHUNK: usize = 64;

/// SPI protocol variants supported by the SCB.
///
/// For ordinary SPI peripherals you want one of the Motorola modes; TI and
/// National Microwire framing each support a single fixed clock polarity
/// and phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CySpiMode {
    /// Motorola framing, CPOL=0 CPHA=0.
    #[default]
    MotorolaMode0,
    /// Motorola framing, CPOL=1 CPHA=0.
    MotorolaMode1,
    /// Motorola framing, CPOL=0 CPHA=1.
    MotorolaMode2,
    /// Motorola framing, CPOL=1 CPHA=1.
    MotorolaMode3,
    /// TI framing with a start pulse; CPOL=1 CPHA=0 only.
    Ti,
    /// National Microwire framing; CPOL=0 CPHA=0 only.
    NationalMicrowire,
}

impl CySpiMode {
    /// Protocol selector byte on the wire.
    pub(crate) fn protocol(self) -> u8 {
        match self {
            Self::MotorolaMode0
            | Self::MotorolaMode1
            | Self::MotorolaMode2
            | Self::MotorolaMode3 => 0,
            Self::Ti => 1,
            Self::NationalMicrowire => 2,
        }
    }

    /// Clock phase bit.
    pub(crate) fn cpha(self) -> u8 {
        match self {
            Self::MotorolaMode0 | Self::MotorolaMode1 | Self::Ti | Self::NationalMicrowire => 0,
            Self::MotorolaMode2 | Self::MotorolaMode3 => 1,
        }
    }

    /// Clock polarity bit.
    pub(crate) fn cpol(self) -> u8 {
        match self {
            Self::MotorolaMode0 | Self::MotorolaMode2 | Self::NationalMicrowire => 0,
            Self::MotorolaMode1 | Self::MotorolaMode3 | Self::Ti => 1,
        }
    }

    fn from_wire(protocol: u8, cpha: u8, cpol: u8) -> Option<Self> {
        let all = [
            Self::MotorolaMode0,
            Self::MotorolaMode1,
            Self::MotorolaMode2,
            Self::MotorolaMode3,
            Self::Ti,
            Self::NationalMicrowire,
        ];
        all.into_iter()
            .find(|m| m.protocol() == protocol && m.cpha() == cpha && m.cpol() == cpol)
    }
}

/// SPI module configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CySpiConfig {
    /// SCLK frequency in Hz, 1 kHz to 3 MHz inclusive.
    pub frequency: u32,
    /// Word size in bits, 4 to 16 inclusive.
    pub word_size: u8,
    /// Framing and clock mode.
    pub mode: CySpiMode,
    /// Send the most significant bit of each word first.
    pub msbit_first: bool,
    /// Keep SSEL asserted for the whole transaction instead of toggling
    /// per word.
    pub continuous_ssel: bool,
    /// TI mode only: the start pulse precedes the first data bit.
    pub ti_select_precede: bool,
}

impl Default for CySpiConfig {
    fn default() -> Self {
        Self {
            frequency: 1_000_000,
            word_size: 8,
            mode: CySpiMode::MotorolaMode0,
            msbit_first: true,
            continuous_ssel: true,
            ti_select_precede: true,
        }
    }
}

impl CySpiConfig {
    /// Pack into the 16-byte wire structure.
    fn to_wire(self) -> [u8; spi::CONFIG_LEN as usize] {
        let mut raw = [0u8; spi::CONFIG_LEN as usize];
        raw[..4].copy_from_slice(&self.frequency.to_le_bytes());
        raw[4] = self.word_size;
        raw[5] = self.mode.protocol();
        // xferMode (byte 6) unused by the hardware
        raw[7] = u8::from(self.msbit_first);
        // isMaster
        raw[8] = 1;
        raw[9] = u8::from(self.continuous_ssel);
        raw[10] = u8::from(self.ti_select_precede);
        raw[11] = self.mode.cpha();
        raw[12] = self.mode.cpol();
        // isLoopback (byte 13) stays zero
        raw
    }

    fn from_wire(raw: &[u8]) -> Result<Self> {
        if raw.len() != spi::CONFIG_LEN as usize {
            return Err(Error::UnexpectedResponse(
                "short SPI configuration response".into(),
            ));
        }
        let mode = CySpiMode::from_wire(raw[5], raw[11], raw[12]).ok_or_else(|| {
            Error::UnexpectedResponse("device returned an unknown SPI mode".into())
        })?;
        Ok(Self {
            frequency: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            word_size: raw[4],
            mode,
            msbit_first: raw[7] != 0,
            continuous_ssel: raw[9] != 0,
            ti_select_precede: raw[10] != 0,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.frequency < spi::MIN_FREQUENCY || self.frequency > spi::MAX_FREQUENCY {
            return Err(Error::InvalidArgument(
                "SPI frequency must be between 1 kHz and 3 MHz",
            ));
        }
        if self.word_size < spi::MIN_WORD_SIZE || self.word_size > spi::MAX_WORD_SIZE {
            return Err(Error::InvalidArgument(
                "SPI word size must be between 4 and 16 bits",
            ));
        }
        Ok(())
    }
}

/// A CY7C652xx opened in SPI controller mode.
pub struct CySpiBridge<H: UsbHandle> {
    base: BridgeBase<H>,
    /// Set by [`set_config`](Self::set_config); transfers refuse to run
    /// before it.
    frequency: Option<u32>,
}

impl<H: UsbHandle> std::fmt::Debug for CySpiBridge<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CySpiBridge")
            .field("base", &self.base)
            .field("frequency", &self.frequency)
            .finish()
    }
}

// ---- Construction / configuration ----

impl<H: UsbHandle> CySpiBridge<H> {
    /// Open a discovered SPI-mode device, resetting the SPI module in case
    /// a previous session left it mid-error.
    pub fn new<T: UsbTransport<Handle = H>>(
        transport: &T,
        device: &DiscoveredDevice,
    ) -> Result<Self> {
        let base = BridgeBase::open(transport, device, CyType::Spi)?;
        let mut bridge = Self {
            base,
            frequency: None,
        };
        bridge.reset_module()?;
        Ok(bridge)
    }

    /// Configure the SPI module.
    ///
    /// Call once after opening; the power-up configuration is not
    /// guaranteed to be sane.
    pub fn set_config(&mut self, config: &CySpiConfig) -> Result<()> {
        config.validate()?;
        let timeout = self.base.timeout;
        self.base.handle.control_out(
            CY_SPI_SET_CONFIG_CMD,
            self.base.scb_bits(),
            0,
            &config.to_wire(),
            timeout,
        )?;
        self.frequency = Some(config.frequency);
        Ok(())
    }

    /// Read the current SPI module configuration from the device.
    pub fn read_config(&mut self) -> Result<CySpiConfig> {
        let timeout = self.base.timeout;
        let raw = self.base.handle.control_in(
            CY_SPI_GET_CONFIG_CMD,
            self.base.scb_bits(),
            0,
            spi::CONFIG_LEN,
            timeout,
        )?;
        let config = CySpiConfig::from_wire(&raw)?;
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

// ---- Transfers ----

impl<H: UsbHandle> CySpiBridge<H> {
    /// Full-duplex exchange: send `tx_data` while recording the
    /// peripheral's response to every word. Always reads and writes the
    /// same length, so pad `tx_data` for trailing bytes you only want to
    /// read.
    pub fn transfer(&mut self, tx_data: &[u8]) -> Result<Vec<u8>> {
        let frequency = self.frequency.ok_or(Error::NotConfigured)?;
        let timeout = transfer_timeout(tx_data.len(), frequency);

        self.start_transfer(spi::READ_BIT | spi::WRITE_BIT, tx_data.len(), timeout)?;

        match self.exchange_and_wait(tx_data, timeout) {
            Ok(rx) => Ok(rx),
            Err(err) => {
                // Put the module back in a usable state for the next call.
                self.reset_module()?;
                Err(err)
            }
        }
    }

    /// Exchange the data, then poll until the module drains its FIFOs.
    fn exchange_and_wait(&mut self, tx_data: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let rx = self.exchange(tx_data, timeout)?;
        self.wait_write_done(timeout)?;
        Ok(rx)
    }

    /// Write-only operation; data the peripheral sends back is discarded.
    pub fn write(&mut self, tx_data: &[u8]) -> Result<()> {
        let frequency = self.frequency.ok_or(Error::NotConfigured)?;
        let timeout = transfer_timeout(tx_data.len(), frequency);

        self.start_transfer(spi::WRITE_BIT, tx_data.len(), timeout)?;

        let ep_out = self.data_endpoint(self.base.ep_out)?;
        let result = self
            .base
            .handle
            .bulk_out(ep_out, tx_data, timeout)
            .and_then(|_| self.wait_write_done(timeout));
        if let Err(err) = result {
            self.reset_module()?;
            if matches!(err, Error::Transfer(nusb::transfer::TransferError::Stall)) {
                self.base.handle.clear_halt(ep_out)?;
            }
            return Err(err);
        }
        Ok(())
    }

    /// Read-only operation.
    ///
    /// The data shifted out on MOSI during a read-only operation is
    /// undefined; unless MOSI is unconnected, prefer
    /// [`transfer`](Self::transfer).
    pub fn read(&mut self, len: usize) -> Result<Vec<u8>> {
        let frequency = self.frequency.ok_or(Error::NotConfigured)?;
        let timeout = transfer_timeout(len, frequency);

        self.start_transfer(spi::READ_BIT, len, timeout)?;

        let ep_in = self.data_endpoint(self.base.ep_in)?;
        let result = self.read_exact(ep_in, len, timeout);
        match result {
            Ok(data) => Ok(data),
            Err(err) => {
                self.reset_module()?;
                Err(err)
            }
        }
    }

    fn start_transfer(&mut self, direction_bits: u16, len: usize, timeout: Duration) -> Result<()> {
        if len > usize::from(u16::MAX) {
            // The setup request carries the length in a 16-bit field.
            return Err(Error::InvalidArgument(
                "transfer length must fit in 16 bits",
            ));
        }
        self.base.handle.control_out(
            CY_SPI_READ_WRITE_CMD,
            self.base.scb_bits() | direction_bits,
            len as u16,
            &[],
            timeout,
        )
    }

    /// Move equal-length data both ways, interleaved chunk by chunk so the
    /// chip's FIFOs never fill while the host ignores one direction.
    fn exchange(&mut self, tx_data: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let ep_out = self.data_endpoint(self.base.ep_out)?;
        let ep_in = self.data_endpoint(self.base.ep_in)?;

        let mut rx = Vec::with_capacity(tx_data.len());
        for chunk in tx_data.chunks(TRANSFER_CHUNK) {
            let sent = self.base.handle.bulk_out(ep_out, chunk, timeout)?;
            if sent != chunk.len() {
                return Err(Error::UnexpectedResponse(format!(
                    "bulk write accepted {} of {} bytes",
                    sent,
                    chunk.len()
                )));
            }
            rx.extend_from_slice(&self.read_exact(ep_in, chunk.len(), timeout)?);
        }
        Ok(rx)
    }

    /// Bulk-read until exactly `len` bytes have arrived; the hardware may
    /// split the data across packets.
    fn read_exact(&mut self, ep_in: u8, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(len);
        while data.len() < len {
            let part = self
                .base
                .handle
                .bulk_in(ep_in, len - data.len(), timeout)?;
            if part.is_empty() {
                return Err(Error::UnexpectedResponse(format!(
                    "expected {} bytes from bulk read, got {}",
                    len,
                    data.len()
                )));
            }
            data.extend_from_slice(&part);
        }
        Ok(data)
    }

    /// Poll the status word until the module reports idle. Unlike I2C
    /// there is no completion interrupt.
    fn wait_write_done(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.status()?;
            if status.iter().all(|&b| b == 0) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::BridgeStatus(u32::from_le_bytes(status)));
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn status(&mut self) -> Result<[u8; 4]> {
        let timeout = self.base.timeout;
        let status = self.base.handle.control_in(
            CY_SPI_GET_STATUS_CMD,
            self.base.scb_bits(),
            0,
            spi::GET_STATUS_LEN,
            timeout,
        )?;
        status
            .try_into()
            .map_err(|_| Error::UnexpectedResponse("short SPI status".into()))
    }

    /// Reset the SPI module after an errored transaction.
    fn reset_module(&mut self) -> Result<()> {
        debug!("resetting SPI module");
        let timeout = self.base.timeout;
        self.base
            .handle
            .control_out(CY_SPI_RESET_CMD, self.base.scb_bits(), 0, &[], timeout)
    }

    fn data_endpoint(&self, ep: Option<u8>) -> Result<u8> {
        ep.ok_or_else(|| Error::UnexpectedResponse("bridge endpoint missing".into()))
    }
}

/// Transfer timeout: a second of USB slack plus 9 bit times per byte.
fn transfer_timeout(len: usize, frequency: u32) -> Duration {
    let bus_ms = (len as u64 * 9 * 1000).div_ceil(u64::from(frequency.max(1)));
    Duration::from_millis(1000 + bus_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_wire_values_round_trip() {
        for mode in [
            CySpiMode::MotorolaMode0,
            CySpiMode::MotorolaMode1,
            CySpiMode::MotorolaMode2,
            CySpiMode::MotorolaMode3,
            CySpiMode::Ti,
            CySpiMode::NationalMicrowire,
        ] {
            assert_eq!(
                CySpiMode::from_wire(mode.protocol(), mode.cpha(), mode.cpol()),
                Some(mode)
            );
        }
        assert_eq!(CySpiMode::from_wire(3, 0, 0), None);
    }

    #[test]
    fn config_wire_round_trip() {
        let config = CySpiConfig {
            frequency: 2_000_000,
            word_size: 12,
            mode: CySpiMode::MotorolaMode3,
            msbit_first: false,
            continuous_ssel: false,
            ti_select_precede: false,
        };
        let raw = config.to_wire();
        assert_eq!(CySpiConfig::from_wire(&raw).unwrap(), config);
    }

    #[test]
    fn config_validation() {
        let mut config = CySpiConfig::default();
        config.validate().unwrap();

        config.frequency = 500;
        assert!(config.validate().is_err());
        config.frequency = 4_000_000;
        assert!(config.validate().is_err());

        config = CySpiConfig::default();
        config.word_size = 3;
        assert!(config.validate().is_err());
        config.word_size = 17;
        assert!(config.validate().is_err());
    }
}
