//! nusb and serialport implementations of the transport traits.

use std::num::NonZero;
use std::time::Duration;

use log::trace;
use nusb::transfer::{Bulk, ControlIn, ControlOut, ControlType, In, Interrupt, Out, Recipient};
use nusb::{self, MaybeFuture};

use crate::constants::STRING_TIMEOUT;
use crate::error::{Error, Result};
use crate::transport::{
    DescriptorStrings, DeviceId, SerialPortInfo, SerialPortSource, UsbConfigurationRecord,
    UsbDeviceRecord, UsbEndpointRecord, UsbHandle, UsbInterfaceRecord, UsbInterfaceSettingRecord,
    UsbTransport,
};

/// [`UsbTransport`] backed by nusb.
#[derive(Debug, Clone, Copy, Default)]
pub struct NusbTransport;

impl NusbTransport {
    /// Create the default transport.
    pub fn new() -> Self {
        Self
    }
}

/// Build a descriptor record from an enumerated device.
///
/// Reading the configuration descriptor requires opening the device. When
/// that fails (typically a permissions problem), the record falls back to
/// the interface class/subclass data the OS exposes without opening, with
/// no endpoint information.
fn device_record(dev_info: &nusb::DeviceInfo) -> UsbDeviceRecord {
    let id = DeviceId {
        bus: dev_info.busnum(),
        address: dev_info.device_address(),
    };

    let configurations = match dev_info.open().wait() {
        Ok(device) => match device.active_configuration() {
            Ok(config) => {
                let interfaces = config
                    .interfaces()
                    .map(|group| UsbInterfaceRecord {
                        number: group.interface_number(),
                        settings: group
                            .alt_settings()
                            .map(|alt| UsbInterfaceSettingRecord {
                                interface_number: alt.interface_number(),
                                alternate_setting: alt.alternate_setting(),
                                class: alt.class(),
                                subclass: alt.subclass(),
                                endpoints: alt
                                    .endpoints()
                                    .map(|ep| UsbEndpointRecord {
                                        address: ep.address(),
                                        attributes: endpoint_attributes(ep.transfer_type()),
                                    })
                                    .collect(),
                            })
                            .collect(),
                    })
                    .collect();
                vec![UsbConfigurationRecord {
                    value: config.configuration_value(),
                    interfaces,
                }]
            }
            Err(_) => Vec::new(),
        },
        Err(_) => {
            // Classification can still proceed on class/subclass alone.
            let interfaces = dev_info
                .interfaces()
                .map(|iface| UsbInterfaceRecord {
                    number: iface.interface_number(),
                    settings: vec![UsbInterfaceSettingRecord {
                        interface_number: iface.interface_number(),
                        alternate_setting: 0,
                        class: iface.class(),
                        subclass: iface.subclass(),
                        endpoints: Vec::new(),
                    }],
                })
                .collect();
            vec![UsbConfigurationRecord {
                value: 1,
                interfaces,
            }]
        }
    };

    UsbDeviceRecord {
        id,
        vid: dev_info.vendor_id(),
        pid: dev_info.product_id(),
        configurations,
    }
}

fn endpoint_attributes(transfer_type: nusb::descriptors::TransferType) -> u8 {
    use nusb::descriptors::TransferType;
    match transfer_type {
        TransferType::Control => 0x00,
        TransferType::Isochronous => 0x01,
        TransferType::Bulk => 0x02,
        TransferType::Interrupt => 0x03,
    }
}

fn find_device_info(id: DeviceId) -> Result<nusb::DeviceInfo> {
    nusb::list_devices()
        .wait()?
        .find(|d| d.busnum() == id.bus && d.device_address() == id.address)
        .ok_or(Error::DeviceNotFound)
}

impl UsbTransport for NusbTransport {
    type Handle = NusbHandle;

    fn devices(&self) -> Result<Vec<UsbDeviceRecord>> {
        Ok(nusb::list_devices()
            .wait()?
            .map(|d| device_record(&d))
            .collect())
    }

    fn strings(&self, record: &UsbDeviceRecord) -> Result<DescriptorStrings> {
        let dev_info = find_device_info(record.id)?;
        let device = dev_info.open().wait()?;
        let desc = device.device_descriptor();

        let read = |idx: Option<NonZero<u8>>| -> Option<String> {
            idx.and_then(|idx| {
                device
                    .get_string_descriptor(idx, 0x0409, STRING_TIMEOUT)
                    .wait()
                    .ok()
            })
        };

        Ok(DescriptorStrings {
            manufacturer: read(desc.manufacturer_string_index()),
            product: read(desc.product_string_index()),
            serial_number: read(desc.serial_number_string_index()),
        })
    }

    fn open(&self, record: &UsbDeviceRecord) -> Result<NusbHandle> {
        let dev_info = find_device_info(record.id)?;
        let device = dev_info.open().wait()?;
        Ok(NusbHandle {
            device,
            interface: None,
        })
    }
}

/// [`UsbHandle`] backed by an opened nusb device.
pub struct NusbHandle {
    #[allow(dead_code)] // Kept to ensure the USB device stays open
    device: nusb::Device,
    interface: Option<nusb::Interface>,
}

impl std::fmt::Debug for NusbHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NusbHandle")
            .field("claimed", &self.interface.is_some())
            .finish_non_exhaustive()
    }
}

impl NusbHandle {
    fn interface(&self) -> Result<&nusb::Interface> {
        self.interface.as_ref().ok_or(Error::NotConfigured)
    }
}

impl UsbHandle for NusbHandle {
    fn claim_interface(&mut self, number: u8) -> Result<()> {
        let interface = self.device.detach_and_claim_interface(number).wait()?;
        self.interface = Some(interface);
        Ok(())
    }

    fn clear_halt(&mut self, endpoint: u8) -> Result<()> {
        trace!("clear halt ep={endpoint:#04x}");
        let interface = self.interface()?;
        if endpoint & 0x80 != 0 {
            let mut ep = interface
                .endpoint::<Bulk, In>(endpoint)
                .map_err(Error::Usb)?;
            ep.clear_halt().wait()?;
        } else {
            let mut ep = interface
                .endpoint::<Bulk, Out>(endpoint)
                .map_err(Error::Usb)?;
            ep.clear_halt().wait()?;
        }
        Ok(())
    }

    fn control_in(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        trace!("control IN req={request:#04x} value={value:#06x} index={index:#06x} len={length}");
        let data = self
            .interface()?
            .control_in(
                ControlIn {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index,
                    length,
                },
                timeout,
            )
            .wait()?;
        Ok(data)
    }

    fn control_out(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<()> {
        trace!(
            "control OUT req={request:#04x} value={value:#06x} index={index:#06x} len={}",
            data.len()
        );
        self.interface()?
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index,
                    data,
                },
                timeout,
            )
            .wait()?;
        Ok(())
    }

    fn bulk_out(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize> {
        trace!("bulk OUT ep={endpoint:#04x} len={}", data.len());
        let mut ep = self
            .interface()?
            .endpoint::<Bulk, Out>(endpoint)
            .map_err(Error::Usb)?;

        let mut transfer_buf = nusb::transfer::Buffer::new(data.len());
        transfer_buf.extend_from_slice(data);

        let completion = ep.transfer_blocking(transfer_buf, timeout);
        completion.status.map_err(Error::Transfer)?;
        Ok(completion.actual_len)
    }

    fn bulk_in(&mut self, endpoint: u8, length: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut ep = self
            .interface()?
            .endpoint::<Bulk, In>(endpoint)
            .map_err(Error::Usb)?;

        let transfer_buf = nusb::transfer::Buffer::new(length);
        let completion = ep.transfer_blocking(transfer_buf, timeout);
        completion.status.map_err(Error::Transfer)?;

        let mut data = completion.buffer.into_vec();
        data.truncate(completion.actual_len);
        Ok(data)
    }

    fn interrupt_in(&mut self, endpoint: u8, length: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut ep = self
            .interface()?
            .endpoint::<Interrupt, In>(endpoint)
            .map_err(Error::Usb)?;

        let transfer_buf = nusb::transfer::Buffer::new(length);
        let completion = ep.transfer_blocking(transfer_buf, timeout);
        completion.status.map_err(Error::Transfer)?;

        let mut data = completion.buffer.into_vec();
        data.truncate(completion.actual_len);
        Ok(data)
    }
}

/// [`SerialPortSource`] backed by the serialport crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSerialPorts;

impl OsSerialPorts {
    /// Create the default serial port source.
    pub fn new() -> Self {
        Self
    }
}

impl SerialPortSource for OsSerialPorts {
    fn ports(&self) -> Result<Vec<SerialPortInfo>> {
        let ports = serialport::available_ports()?
            .into_iter()
            .map(|port| match port.port_type {
                serialport::SerialPortType::UsbPort(usb) => SerialPortInfo {
                    name: port.port_name,
                    vid: Some(usb.vid),
                    pid: Some(usb.pid),
                    serial_number: usb.serial_number,
                },
                _ => SerialPortInfo {
                    name: port.port_name,
                    vid: None,
                    pid: None,
                    serial_number: None,
                },
            })
            .collect();
        Ok(ports)
    }
}
