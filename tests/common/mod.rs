//! In-memory transport fakes shared by the integration tests.
//!
//! `MockTransport` serves a canned descriptor tree and mints `MockHandle`s
//! whose state the test keeps a handle on, so it can script device
//! responses and inspect every transfer afterwards.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use cy_serial_bridge::error::{Error, Result};
use cy_serial_bridge::transport::{
    DescriptorStrings, DeviceId, SerialPortInfo, SerialPortSource, UsbConfigurationRecord,
    UsbDeviceRecord, UsbEndpointRecord, UsbHandle, UsbInterfaceRecord, UsbInterfaceSettingRecord,
    UsbTransport,
};

pub const EP_BULK: u8 = 0x02;
pub const EP_INTR: u8 = 0x03;

/// Scriptable state behind a [`MockHandle`].
#[derive(Debug, Default)]
pub struct MockHandleState {
    pub claimed: Vec<u8>,
    /// (request, value, index, data) of every OUT control transfer.
    pub control_out_log: Vec<(u8, u16, u16, Vec<u8>)>,
    /// (request, value, index, length) of every IN control transfer.
    pub control_in_log: Vec<(u8, u16, u16, u16)>,
    /// Scripted IN control responses, per request code, consumed in order.
    /// Requests with no scripted response get a sensible default.
    pub control_in_responses: HashMap<u8, VecDeque<Vec<u8>>>,
    pub bulk_in_queue: VecDeque<Vec<u8>>,
    /// (endpoint, data) of every bulk OUT transfer.
    pub bulk_out_log: Vec<(u8, Vec<u8>)>,
    pub interrupt_in_queue: VecDeque<Vec<u8>>,
    /// When set, the next interrupt IN transfer fails with a pipe stall.
    pub stall_next_interrupt_in: bool,
    /// Endpoints a halt was cleared on, in order.
    pub cleared_halts: Vec<u8>,
}

impl MockHandleState {
    pub fn script_control_in(&mut self, request: u8, response: Vec<u8>) {
        self.control_in_responses
            .entry(request)
            .or_default()
            .push_back(response);
    }
}

pub struct MockHandle(pub Rc<RefCell<MockHandleState>>);

impl UsbHandle for MockHandle {
    fn claim_interface(&mut self, number: u8) -> Result<()> {
        self.0.borrow_mut().claimed.push(number);
        Ok(())
    }

    fn clear_halt(&mut self, endpoint: u8) -> Result<()> {
        self.0.borrow_mut().cleared_halts.push(endpoint);
        Ok(())
    }

    fn control_in(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
        _timeout: Duration,
    ) -> Result<Vec<u8>> {
        let mut state = self.0.borrow_mut();
        state.control_in_log.push((request, value, index, length));

        if let Some(queue) = state.control_in_responses.get_mut(&request) {
            if let Some(response) = queue.pop_front() {
                return Ok(response);
            }
        }

        // Defaults keep the open handshake and idle-status polls working
        // without per-test scripting.
        Ok(match request {
            0xBD => b"CYUS".to_vec(),
            0xB0 => vec![1, 2, 3, 0, 4, 0, 0, 0],
            _ => vec![0; length as usize],
        })
    }

    fn control_out(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<()> {
        self.0
            .borrow_mut()
            .control_out_log
            .push((request, value, index, data.to_vec()));
        Ok(())
    }

    fn bulk_out(&mut self, endpoint: u8, data: &[u8], _timeout: Duration) -> Result<usize> {
        self.0
            .borrow_mut()
            .bulk_out_log
            .push((endpoint, data.to_vec()));
        Ok(data.len())
    }

    fn bulk_in(&mut self, _endpoint: u8, length: usize, _timeout: Duration) -> Result<Vec<u8>> {
        let mut state = self.0.borrow_mut();
        Ok(state
            .bulk_in_queue
            .pop_front()
            .unwrap_or_else(|| vec![0; length]))
    }

    fn interrupt_in(
        &mut self,
        _endpoint: u8,
        length: usize,
        _timeout: Duration,
    ) -> Result<Vec<u8>> {
        let mut state = self.0.borrow_mut();
        if state.stall_next_interrupt_in {
            state.stall_next_interrupt_in = false;
            return Err(Error::Transfer(nusb::transfer::TransferError::Stall));
        }
        Ok(state
            .interrupt_in_queue
            .pop_front()
            .unwrap_or_else(|| vec![0; length]))
    }
}

#[derive(Default)]
pub struct MockTransport {
    pub devices: Vec<UsbDeviceRecord>,
    pub strings: HashMap<(u8, u8), DescriptorStrings>,
    /// Devices whose string read fails, simulating a permissions problem.
    pub strings_fail: HashSet<(u8, u8)>,
    handles: RefCell<HashMap<(u8, u8), Rc<RefCell<MockHandleState>>>>,
}

impl MockTransport {
    pub fn with_devices(devices: Vec<UsbDeviceRecord>) -> Self {
        Self {
            devices,
            ..Self::default()
        }
    }

    pub fn set_strings(&mut self, id: DeviceId, manufacturer: &str, product: &str, serial: &str) {
        self.strings.insert(
            (id.bus, id.address),
            DescriptorStrings {
                manufacturer: Some(manufacturer.to_owned()),
                product: Some(product.to_owned()),
                serial_number: Some(serial.to_owned()),
            },
        );
    }

    /// Pre-register (and keep visibility into) the handle state a future
    /// `open` of this device will use.
    pub fn handle_state(&self, id: DeviceId) -> Rc<RefCell<MockHandleState>> {
        self.handles
            .borrow_mut()
            .entry((id.bus, id.address))
            .or_default()
            .clone()
    }
}

impl UsbTransport for MockTransport {
    type Handle = MockHandle;

    fn devices(&self) -> Result<Vec<UsbDeviceRecord>> {
        Ok(self.devices.clone())
    }

    fn strings(&self, record: &UsbDeviceRecord) -> Result<DescriptorStrings> {
        let key = (record.id.bus, record.id.address);
        if self.strings_fail.contains(&key) {
            return Err(Error::DeviceNotFound);
        }
        Ok(self.strings.get(&key).cloned().unwrap_or_default())
    }

    fn open(&self, record: &UsbDeviceRecord) -> Result<MockHandle> {
        Ok(MockHandle(self.handle_state(record.id)))
    }
}

#[derive(Default)]
pub struct MockSerialPorts {
    pub ports: Vec<SerialPortInfo>,
}

impl SerialPortSource for MockSerialPorts {
    fn ports(&self) -> Result<Vec<SerialPortInfo>> {
        Ok(self.ports.clone())
    }
}

// ---- Descriptor tree builders ----

pub fn endpoint(address: u8, attributes: u8) -> UsbEndpointRecord {
    UsbEndpointRecord {
        address,
        attributes,
    }
}

pub fn setting(
    interface_number: u8,
    class: u8,
    subclass: u8,
    endpoints: Vec<UsbEndpointRecord>,
) -> UsbInterfaceSettingRecord {
    UsbInterfaceSettingRecord {
        interface_number,
        alternate_setting: 0,
        class,
        subclass,
        endpoints,
    }
}

pub fn device(
    bus: u8,
    address: u8,
    vid: u16,
    pid: u16,
    settings: Vec<UsbInterfaceSettingRecord>,
) -> UsbDeviceRecord {
    let interfaces = settings
        .into_iter()
        .map(|s| UsbInterfaceRecord {
            number: s.interface_number,
            settings: vec![s],
        })
        .collect();
    UsbDeviceRecord {
        id: DeviceId { bus, address },
        vid,
        pid,
        configurations: vec![UsbConfigurationRecord {
            value: 1,
            interfaces,
        }],
    }
}

/// A vendor-mode device with an SCB interface of the given subclass plus
/// the manufacturing interface, mirroring a real CY7C65211 tree.
pub fn vendor_mode_device(bus: u8, address: u8, scb_subclass: u8) -> UsbDeviceRecord {
    device(
        bus,
        address,
        0x04B4,
        0xE010,
        vec![
            setting(
                0,
                0xFF,
                scb_subclass,
                vec![
                    endpoint(0x01, EP_BULK),
                    endpoint(0x82, EP_BULK),
                    endpoint(0x83, EP_INTR),
                ],
            ),
            setting(1, 0xFF, 0x05, vec![]),
        ],
    )
}

pub fn i2c_device(bus: u8, address: u8) -> UsbDeviceRecord {
    vendor_mode_device(bus, address, 0x03)
}

pub fn spi_device(bus: u8, address: u8) -> UsbDeviceRecord {
    vendor_mode_device(bus, address, 0x02)
}

/// A UART CDC mode device: CDC ACM control interface plus CDC data
/// interface carrying the bulk pipes.
pub fn uart_cdc_device(bus: u8, address: u8) -> UsbDeviceRecord {
    device(
        bus,
        address,
        0x04B4,
        0xE011,
        vec![
            setting(0, 0x02, 0x02, vec![endpoint(0x84, EP_INTR)]),
            setting(
                1,
                0x0A,
                0x00,
                vec![endpoint(0x02, EP_BULK), endpoint(0x85, EP_BULK)],
            ),
        ],
    )
}
