//! Device discovery and classification.
//!
//! Use [`list_devices`] to classify every connected bridge device, or
//! [`scan_for_device`] with a [`ScanFilter`] to select exactly one device
//! for opening.

use log::{debug, warn};

use crate::constants::{
    CLASS_CDC_CONTROL, CLASS_CDC_DATA, CLASS_VENDOR, CY_VID, DEFAULT_VID_PIDS, SUBCLASS_CDC_ACM,
};
use crate::error::{Error, Result};
use crate::transport::{
    SerialPortSource, UsbDeviceRecord, UsbInterfaceSettingRecord, UsbTransport,
};
use crate::types::{CyType, OpenMode};

/// Vendor-class subclass values marking each interface personality.
fn scb_type_for_subclass(subclass: u8) -> Option<CyType> {
    match subclass {
        0x02 => Some(CyType::Spi),
        0x03 => Some(CyType::I2c),
        _ => None,
    }
}

/// Subclass of the vendor-class manufacturing interface.
const SUBCLASS_MFG: u8 = 0x05;

/// One classified bridge device, as found during a scan.
///
/// A snapshot: constructed fresh on every scan, immutable afterwards. Exactly
/// one of the SCB interface or the CDC control/data pair is present.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Descriptor record of the underlying USB device.
    pub usb_device: UsbDeviceRecord,
    /// The manufacturing interface setting, when the device is in vendor mode.
    pub mfg_interface: Option<UsbInterfaceSettingRecord>,
    /// The SCB (I2C/SPI) interface setting.
    pub scb_interface: Option<UsbInterfaceSettingRecord>,
    /// The CDC control interface setting (UART CDC mode).
    pub cdc_control_interface: Option<UsbInterfaceSettingRecord>,
    /// The CDC data interface setting (UART CDC mode).
    pub cdc_data_interface: Option<UsbInterfaceSettingRecord>,
    /// idVendor.
    pub vid: u16,
    /// idProduct.
    pub pid: u16,
    /// Classified operating mode.
    pub cy_type: CyType,
    /// True when the device could not be opened to read its strings
    /// (permissions, or claimed by another process).
    pub open_failed: bool,
    /// iManufacturer string; absent when `open_failed`.
    pub manufacturer: Option<String>,
    /// iProduct string; absent when `open_failed`.
    pub product: Option<String>,
    /// iSerialNumber string; absent when `open_failed`.
    pub serial_number: Option<String>,
    /// OS serial port path, populated for UART CDC devices whose serial
    /// number matches a known port. Best effort.
    pub serial_port_name: Option<String>,
}

/// Classify one USB device. Returns `None` when it is not a recognized
/// bridge device.
fn classify(record: &UsbDeviceRecord) -> Option<DiscoveredDevice> {
    let config = record.active_configuration()?;

    let mut mfg_interface = None;
    let mut scb_interface = None;
    let mut scb_type = None;
    let mut cdc_control_interface = None;
    let mut cdc_data_interface = None;

    for interface in &config.interfaces {
        let setting = match interface.first_setting() {
            Some(s) => s,
            None => continue,
        };

        match (setting.class, setting.subclass) {
            (CLASS_VENDOR, SUBCLASS_MFG) => mfg_interface = Some(setting.clone()),
            (CLASS_VENDOR, subclass) => {
                if let Some(cy_type) = scb_type_for_subclass(subclass) {
                    scb_interface = Some(setting.clone());
                    scb_type = Some(cy_type);
                }
            }
            (CLASS_CDC_CONTROL, SUBCLASS_CDC_ACM) => {
                cdc_control_interface = Some(setting.clone())
            }
            (CLASS_CDC_DATA, _) => cdc_data_interface = Some(setting.clone()),
            _ => {}
        }
    }

    let cy_type = match (&scb_interface, &cdc_control_interface, &cdc_data_interface) {
        (Some(_), _, _) => {
            // SCB wins; a vendor-mode device never also exposes CDC.
            cdc_control_interface = None;
            cdc_data_interface = None;
            scb_type?
        }
        (None, Some(_), Some(_)) => CyType::UartCdc,
        _ => {
            debug!(
                "skipping device {}: no recognized interface signature",
                record.id
            );
            return None;
        }
    };

    Some(DiscoveredDevice {
        usb_device: record.clone(),
        mfg_interface,
        scb_interface,
        cdc_control_interface,
        cdc_data_interface,
        vid: record.vid,
        pid: record.pid,
        cy_type,
        open_failed: false,
        manufacturer: None,
        product: None,
        serial_number: None,
        serial_port_name: None,
    })
}

/// List and classify all connected bridge devices.
///
/// `vid_pids` restricts the scan to the given (vendor, product) pairs;
/// `None` uses the stock Cypress IDs
/// ([`DEFAULT_VID_PIDS`](crate::constants::DEFAULT_VID_PIDS)). Devices whose
/// descriptors do not match a known bridge signature are skipped. Devices
/// that match but cannot be opened are still returned, with
/// `open_failed = true` and no strings.
pub fn list_devices<T: UsbTransport, S: SerialPortSource>(
    transport: &T,
    serial_ports: &S,
    vid_pids: Option<&[(u16, u16)]>,
) -> Result<Vec<DiscoveredDevice>> {
    let vid_pids = vid_pids.unwrap_or(DEFAULT_VID_PIDS);
    let ports = serial_ports.ports()?;

    let mut discovered = Vec::new();
    for record in transport.devices()? {
        if !vid_pids.contains(&(record.vid, record.pid)) {
            continue;
        }

        let mut device = match classify(&record) {
            Some(d) => d,
            None => continue,
        };

        match transport.strings(&record) {
            Ok(strings) => {
                device.manufacturer = strings.manufacturer;
                device.product = strings.product;
                device.serial_number = strings.serial_number;
            }
            Err(err) => {
                warn!("could not open device {} for strings: {}", record.id, err);
                device.open_failed = true;
            }
        }

        // Best-effort join against the OS serial port list.
        if device.cy_type == CyType::UartCdc {
            if let Some(serial) = &device.serial_number {
                device.serial_port_name = ports
                    .iter()
                    .find(|p| p.serial_number.as_deref() == Some(serial.as_str()))
                    .map(|p| p.name.clone());
            }
        }

        discovered.push(device);
    }

    Ok(discovered)
}

/// Filtering criteria for [`scan_for_device`].
///
/// # Example
///
/// ```no_run
/// use cy_serial_bridge::{OpenMode, ScanFilter};
///
/// let filter = ScanFilter::new(OpenMode::I2cController).serial_number("0123ABCD");
/// ```
#[derive(Debug, Clone)]
pub struct ScanFilter {
    /// USB vendor ID to match.
    pub vid: u16,
    /// Allowed product IDs. `None` accepts the stock Cypress PIDs.
    pub pids: Option<Vec<u16>>,
    /// Requested access mode; matched against the classified CyType.
    pub open_mode: OpenMode,
    /// If set, require the serial number to match exactly.
    pub serial_number: Option<String>,
}

impl ScanFilter {
    /// Create a filter for the given access mode, matching the stock
    /// Cypress vendor and product IDs.
    pub fn new(open_mode: OpenMode) -> Self {
        Self {
            vid: CY_VID,
            pids: None,
            open_mode,
            serial_number: None,
        }
    }

    /// Match a different vendor ID (for reconfigured devices).
    pub fn vid(mut self, vid: u16) -> Self {
        self.vid = vid;
        self
    }

    /// Restrict to the given product IDs.
    pub fn pids(mut self, pids: impl Into<Vec<u16>>) -> Self {
        self.pids = Some(pids.into());
        self
    }

    /// Require the serial number to match.
    pub fn serial_number(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    fn vid_pids(&self) -> Vec<(u16, u16)> {
        match &self.pids {
            Some(pids) => pids.iter().map(|&pid| (self.vid, pid)).collect(),
            None => DEFAULT_VID_PIDS
                .iter()
                .map(|&(_, pid)| (self.vid, pid))
                .collect(),
        }
    }
}

/// Find exactly one device matching the filter.
///
/// Fails with [`Error::DeviceNotFound`] when nothing matches, and with
/// [`Error::AmbiguousMatch`] when several devices match and no serial number
/// was given to pick one.
pub fn scan_for_device<T: UsbTransport, S: SerialPortSource>(
    transport: &T,
    serial_ports: &S,
    filter: &ScanFilter,
) -> Result<DiscoveredDevice> {
    let vid_pids = filter.vid_pids();
    let devices = list_devices(transport, serial_ports, Some(&vid_pids))?;

    let required_type = filter.open_mode.required_cy_type();

    let mut candidates: Vec<DiscoveredDevice> = devices
        .into_iter()
        .filter(|d| match required_type {
            Some(cy_type) => d.cy_type == cy_type,
            // The manufacturing interface rides along on every vendor-mode
            // device regardless of SCB personality.
            None => d.mfg_interface.is_some(),
        })
        .filter(|d| match &filter.serial_number {
            Some(serial) => d.serial_number.as_deref() == Some(serial.as_str()),
            None => true,
        })
        .collect();

    match candidates.len() {
        0 => Err(Error::DeviceNotFound),
        1 => {
            let device = candidates.pop().ok_or(Error::DeviceNotFound)?;
            debug!(
                "scan matched device {} ({:04x}:{:04x}, {:?})",
                device.usb_device.id, device.vid, device.pid, device.cy_type
            );
            Ok(device)
        }
        count => Err(Error::AmbiguousMatch { count }),
    }
}
