//! USB and serial-port access traits.
//!
//! The discovery and bridge layers talk to hardware exclusively through the
//! [`UsbTransport`], [`UsbHandle`], and [`SerialPortSource`] traits defined
//! here. Production code uses the nusb/serialport implementations in
//! [`backend`](crate::backend); tests substitute in-memory fakes.

use std::time::Duration;

use crate::error::Result;

/// Stable identity of a USB device for the duration of one enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    /// USB bus number.
    pub bus: u8,
    /// Device address on that bus.
    pub address: u8,
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}:{:03}", self.bus, self.address)
    }
}

/// One endpoint of an interface alternate setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbEndpointRecord {
    /// Endpoint address including the direction bit.
    pub address: u8,
    /// bmAttributes; the low two bits give the transfer type.
    pub attributes: u8,
}

impl UsbEndpointRecord {
    /// Whether this is a bulk endpoint.
    pub fn is_bulk(&self) -> bool {
        self.attributes & 0x03 == 0x02
    }

    /// Whether this is an interrupt endpoint.
    pub fn is_interrupt(&self) -> bool {
        self.attributes & 0x03 == 0x03
    }

    /// Whether this endpoint carries data device-to-host.
    pub fn is_in(&self) -> bool {
        self.address & 0x80 != 0
    }
}

/// One alternate setting of an interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbInterfaceSettingRecord {
    /// bInterfaceNumber.
    pub interface_number: u8,
    /// bAlternateSetting.
    pub alternate_setting: u8,
    /// bInterfaceClass.
    pub class: u8,
    /// bInterfaceSubClass.
    pub subclass: u8,
    /// Endpoints of this setting.
    pub endpoints: Vec<UsbEndpointRecord>,
}

/// One interface of a configuration, with all of its alternate settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbInterfaceRecord {
    /// bInterfaceNumber.
    pub number: u8,
    /// Alternate settings; the first is the default.
    pub settings: Vec<UsbInterfaceSettingRecord>,
}

impl UsbInterfaceRecord {
    /// The default (first) alternate setting, if the descriptor has one.
    pub fn first_setting(&self) -> Option<&UsbInterfaceSettingRecord> {
        self.settings.first()
    }
}

/// One configuration of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbConfigurationRecord {
    /// bConfigurationValue.
    pub value: u8,
    /// Interfaces in descriptor order.
    pub interfaces: Vec<UsbInterfaceRecord>,
}

/// Descriptor-level view of one connected USB device.
///
/// This is everything a scan can learn without opening the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceRecord {
    /// Bus/address identity.
    pub id: DeviceId,
    /// idVendor.
    pub vid: u16,
    /// idProduct.
    pub pid: u16,
    /// Configurations; the first is the active one.
    pub configurations: Vec<UsbConfigurationRecord>,
}

impl UsbDeviceRecord {
    /// The active (first) configuration, if the descriptor has one.
    pub fn active_configuration(&self) -> Option<&UsbConfigurationRecord> {
        self.configurations.first()
    }
}

/// String descriptors read from an opened device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorStrings {
    /// iManufacturer string.
    pub manufacturer: Option<String>,
    /// iProduct string.
    pub product: Option<String>,
    /// iSerialNumber string.
    pub serial_number: Option<String>,
}

/// An opened USB device.
///
/// All transfer methods take `&mut self`: the bridge protocol requires one
/// transaction at a time per handle, and exclusive access makes interleaving
/// impossible to express.
pub trait UsbHandle {
    /// Claim an interface, detaching any kernel driver bound to it.
    fn claim_interface(&mut self, number: u8) -> Result<()>;

    /// Clear a halt (stall) condition on an endpoint so it can carry
    /// transfers again.
    fn clear_halt(&mut self, endpoint: u8) -> Result<()>;

    /// Vendor IN control transfer on the claimed interface.
    fn control_in(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
        timeout: Duration,
    ) -> Result<Vec<u8>>;

    /// Vendor OUT control transfer on the claimed interface.
    fn control_out(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<()>;

    /// Bulk OUT transfer. Returns the number of bytes accepted.
    fn bulk_out(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize>;

    /// Bulk IN transfer of up to `length` bytes.
    fn bulk_in(&mut self, endpoint: u8, length: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Interrupt IN transfer of up to `length` bytes.
    fn interrupt_in(&mut self, endpoint: u8, length: usize, timeout: Duration) -> Result<Vec<u8>>;
}

/// Enumerates and opens USB devices.
pub trait UsbTransport {
    /// Handle type produced by [`open`](Self::open).
    type Handle: UsbHandle;

    /// Descriptor records for every connected device.
    fn devices(&self) -> Result<Vec<UsbDeviceRecord>>;

    /// Open a device briefly to read its string descriptors.
    ///
    /// Fails on devices the current user may not open; scans treat that as
    /// a soft failure and report the device without strings.
    fn strings(&self, record: &UsbDeviceRecord) -> Result<DescriptorStrings>;

    /// Open a device for bridge communication.
    fn open(&self, record: &UsbDeviceRecord) -> Result<Self::Handle>;
}

/// One serial port known to the operating system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// OS port name, e.g. `/dev/ttyACM0` or `COM5`.
    pub name: String,
    /// idVendor of the underlying USB device, if the port is USB-backed.
    pub vid: Option<u16>,
    /// idProduct of the underlying USB device.
    pub pid: Option<u16>,
    /// iSerialNumber of the underlying USB device.
    pub serial_number: Option<String>,
}

/// Enumerates serial ports, used to name the OS port of CDC-mode devices.
pub trait SerialPortSource {
    /// All serial ports currently known to the OS.
    fn ports(&self) -> Result<Vec<SerialPortInfo>>;
}
