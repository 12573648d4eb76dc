//! Bridge protocol tests against a scripted mock transport.

mod common;

use common::*;
use cy_serial_bridge::transport::DeviceId;
use cy_serial_bridge::{
    list_devices, ConfigurationBlock, CyI2cBridge, CyI2cConfig, CySpiBridge, CySpiConfig, CyType,
    Error, MfgBridge,
};

const I2C_ERROR_BIT: u8 = 1 << 0;
const I2C_ARB_BIT: u8 = 1 << 1;
const I2C_NAK_BIT: u8 = 1 << 2;
const I2C_BUS_BIT: u8 = 1 << 3;

fn discover_one(transport: &MockTransport) -> cy_serial_bridge::DiscoveredDevice {
    let ports = MockSerialPorts::default();
    let mut devices = list_devices(transport, &ports, None).unwrap();
    assert_eq!(devices.len(), 1);
    devices.pop().unwrap()
}

// ---- Open handshake ----

#[test]
fn open_claims_interface_and_reads_version() {
    let transport = MockTransport::with_devices(vec![i2c_device(1, 5)]);
    let state = transport.handle_state(DeviceId { bus: 1, address: 5 });
    let device = discover_one(&transport);

    let bridge = CyI2cBridge::new(&transport, &device).unwrap();

    let version = bridge.firmware_version();
    assert_eq!(
        (version.major, version.minor, version.patch, version.build),
        (1, 2, 3, 4)
    );

    let state = state.borrow();
    // The SCB interface, not the manufacturing one.
    assert_eq!(state.claimed, vec![0]);
    // Signature then version were the first reads.
    assert_eq!(state.control_in_log[0].0, 0xBD);
    assert_eq!(state.control_in_log[1].0, 0xB0);
}

#[test]
fn bootloader_signature_is_rejected() {
    let transport = MockTransport::with_devices(vec![i2c_device(1, 5)]);
    let state = transport.handle_state(DeviceId { bus: 1, address: 5 });
    state.borrow_mut().script_control_in(0xBD, b"CYBL".to_vec());
    let device = discover_one(&transport);

    let err = CyI2cBridge::new(&transport, &device).unwrap_err();
    assert!(matches!(err, Error::InvalidSignature(sig) if &sig == b"CYBL"));
}

#[test]
fn missing_endpoints_fail_open() {
    let stripped = device(
        1,
        5,
        0x04B4,
        0xE010,
        vec![setting(0, 0xFF, 0x03, vec![]), setting(1, 0xFF, 0x05, vec![])],
    );
    let transport = MockTransport::with_devices(vec![stripped]);
    let device = discover_one(&transport);

    assert!(matches!(
        CyI2cBridge::new(&transport, &device),
        Err(Error::UnexpectedResponse(_))
    ));
}

#[test]
fn wrong_mode_fails_open() {
    let transport = MockTransport::with_devices(vec![spi_device(1, 6)]);
    let device = discover_one(&transport);
    assert_eq!(device.cy_type, CyType::Spi);

    assert!(matches!(
        CyI2cBridge::new(&transport, &device),
        Err(Error::InvalidArgument(_))
    ));
}

// ---- I2C ----

#[test]
fn i2c_transactions_require_configuration() {
    let transport = MockTransport::with_devices(vec![i2c_device(1, 5)]);
    let device = discover_one(&transport);
    let mut i2c = CyI2cBridge::new(&transport, &device).unwrap();

    assert!(matches!(i2c.read(0x50, 4), Err(Error::NotConfigured)));
    assert!(matches!(i2c.write(0x50, &[1]), Err(Error::NotConfigured)));
}

#[test]
fn i2c_write_sends_setup_then_data() {
    let transport = MockTransport::with_devices(vec![i2c_device(1, 5)]);
    let state = transport.handle_state(DeviceId { bus: 1, address: 5 });
    let device = discover_one(&transport);

    let mut i2c = CyI2cBridge::new(&transport, &device).unwrap();
    i2c.set_config(&CyI2cConfig { frequency: 100_000 }).unwrap();
    i2c.write(0x50, &[0xDE, 0xAD]).unwrap();

    let state = state.borrow();
    let setup = state
        .control_out_log
        .iter()
        .find(|(req, ..)| *req == 0xC6)
        .expect("no write setup request sent");
    // Address in bits 8..15, stop-bit generation in bit 0.
    assert_eq!(setup.1, (0x50 << 8) | 1);
    // Transfer length rides in wIndex.
    assert_eq!(setup.2, 2);
    assert_eq!(state.bulk_out_log, vec![(0x01, vec![0xDE, 0xAD])]);
}

#[test]
fn i2c_read_returns_bulk_data() {
    let transport = MockTransport::with_devices(vec![i2c_device(1, 5)]);
    let state = transport.handle_state(DeviceId { bus: 1, address: 5 });
    state
        .borrow_mut()
        .bulk_in_queue
        .push_back(vec![0x11, 0x22, 0x33]);
    let device = discover_one(&transport);

    let mut i2c = CyI2cBridge::new(&transport, &device).unwrap();
    i2c.set_config(&CyI2cConfig::default()).unwrap();

    let data = i2c.read(0x2A, 3).unwrap();
    assert_eq!(data, vec![0x11, 0x22, 0x33]);

    let state = state.borrow();
    let setup = state
        .control_out_log
        .iter()
        .find(|(req, ..)| *req == 0xC7)
        .expect("no read setup request sent");
    // NAK-on-last-byte bit plus stop bit alongside the address.
    assert_eq!(setup.1, (0x2A << 8) | 0b10 | 1);
    assert_eq!(setup.2, 3);
}

#[test]
fn i2c_zero_length_read_is_rejected() {
    let transport = MockTransport::with_devices(vec![i2c_device(1, 5)]);
    let device = discover_one(&transport);
    let mut i2c = CyI2cBridge::new(&transport, &device).unwrap();
    i2c.set_config(&CyI2cConfig::default()).unwrap();

    assert!(matches!(i2c.read(0x50, 0), Err(Error::InvalidArgument(_))));
    assert!(matches!(i2c.read(0x80, 1), Err(Error::InvalidArgument(_))));
}

#[test]
fn i2c_nack_reports_partial_write_length() {
    let transport = MockTransport::with_devices(vec![i2c_device(1, 5)]);
    let state = transport.handle_state(DeviceId { bus: 1, address: 5 });
    state
        .borrow_mut()
        .interrupt_in_queue
        .push_back(vec![I2C_ERROR_BIT | I2C_NAK_BIT, 2, 0]);
    let device = discover_one(&transport);

    let mut i2c = CyI2cBridge::new(&transport, &device).unwrap();
    i2c.set_config(&CyI2cConfig::default()).unwrap();

    let err = i2c.write(0x50, &[1, 2, 3, 4]).unwrap_err();
    assert!(matches!(err, Error::I2cNack { bytes_written: 2 }));

    // The errored direction was reset so the next transaction can run.
    let state = state.borrow();
    assert!(state
        .control_out_log
        .iter()
        .any(|(req, _, _, _)| *req == 0xC9));
}

#[test]
fn i2c_oversized_transfers_are_rejected() {
    let transport = MockTransport::with_devices(vec![i2c_device(1, 5)]);
    let state = transport.handle_state(DeviceId { bus: 1, address: 5 });
    let device = discover_one(&transport);

    let mut i2c = CyI2cBridge::new(&transport, &device).unwrap();
    i2c.set_config(&CyI2cConfig::default()).unwrap();

    // A length over 65535 cannot be represented in the setup request.
    assert!(matches!(
        i2c.read(0x50, 0x1_0000),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        i2c.write(0x50, &vec![0u8; 0x1_0000]),
        Err(Error::InvalidArgument(_))
    ));

    // Rejected before any setup request reaches the device.
    let state = state.borrow();
    assert!(!state
        .control_out_log
        .iter()
        .any(|(req, ..)| *req == 0xC6 || *req == 0xC7));
}

#[test]
fn i2c_stall_recovery_clears_halt() {
    let transport = MockTransport::with_devices(vec![i2c_device(1, 5)]);
    let state = transport.handle_state(DeviceId { bus: 1, address: 5 });
    {
        let mut state = state.borrow_mut();
        state.stall_next_interrupt_in = true;
        // Two status reads during open, the pre-transaction check, then the
        // post-stall re-query reporting the failure.
        state.script_control_in(0xC8, vec![0, 0, 0]);
        state.script_control_in(0xC8, vec![0, 0, 0]);
        state.script_control_in(0xC8, vec![0, 0, 0]);
        state.script_control_in(0xC8, vec![I2C_ERROR_BIT | I2C_NAK_BIT, 0, 0]);
    }
    let device = discover_one(&transport);

    let mut i2c = CyI2cBridge::new(&transport, &device).unwrap();
    i2c.set_config(&CyI2cConfig::default()).unwrap();

    let err = i2c.read(0x50, 2).unwrap_err();
    assert!(matches!(err, Error::I2cNack { bytes_written: 0 }));

    // The halted bulk IN endpoint was cleared before re-querying status.
    assert_eq!(state.borrow().cleared_halts, vec![0x82]);
}

#[test]
fn i2c_error_kinds_are_distinct() {
    let cases = [
        (I2C_ARB_BIT, "arbitration"),
        (I2C_NAK_BIT, "nack"),
        (I2C_BUS_BIT, "bus"),
    ];

    let mut seen = Vec::new();
    for (bit, _label) in cases {
        let transport = MockTransport::with_devices(vec![i2c_device(1, 5)]);
        let state = transport.handle_state(DeviceId { bus: 1, address: 5 });
        state
            .borrow_mut()
            .interrupt_in_queue
            .push_back(vec![I2C_ERROR_BIT | bit, 0, 0]);
        let device = discover_one(&transport);

        let mut i2c = CyI2cBridge::new(&transport, &device).unwrap();
        i2c.set_config(&CyI2cConfig::default()).unwrap();
        seen.push(i2c.read(0x50, 1).unwrap_err());
    }

    assert!(matches!(seen[0], Error::I2cArbitrationLost));
    assert!(matches!(seen[1], Error::I2cNack { bytes_written: 0 }));
    assert!(matches!(seen[2], Error::I2cBusError));

    // And none of them collapse into one another.
    assert_eq!(
        3,
        seen.iter()
            .map(std::mem::discriminant)
            .collect::<std::collections::HashSet<_>>()
            .len()
    );
}

// ---- SPI ----

#[test]
fn spi_transfer_exchanges_equal_lengths() {
    let transport = MockTransport::with_devices(vec![spi_device(1, 6)]);
    let state = transport.handle_state(DeviceId { bus: 1, address: 6 });
    state
        .borrow_mut()
        .bulk_in_queue
        .push_back(vec![0xA0, 0xA1, 0xA2, 0xA3]);
    let device = discover_one(&transport);

    let mut spi = CySpiBridge::new(&transport, &device).unwrap();
    spi.set_config(&CySpiConfig::default()).unwrap();

    let rx = spi.transfer(&[0x9F, 0x00, 0x00, 0x00]).unwrap();
    assert_eq!(rx, vec![0xA0, 0xA1, 0xA2, 0xA3]);

    let state = state.borrow();
    let setup = state
        .control_out_log
        .iter()
        .find(|(req, ..)| *req == 0xCA)
        .expect("no transfer setup request sent");
    // Read and write bits both set; length in wIndex.
    assert_eq!(setup.1, 0b11);
    assert_eq!(setup.2, 4);
    assert_eq!(state.bulk_out_log, vec![(0x01, vec![0x9F, 0x00, 0x00, 0x00])]);
}

#[test]
fn spi_requires_configuration_and_valid_settings() {
    let transport = MockTransport::with_devices(vec![spi_device(1, 6)]);
    let device = discover_one(&transport);
    let mut spi = CySpiBridge::new(&transport, &device).unwrap();

    assert!(matches!(spi.transfer(&[0x00]), Err(Error::NotConfigured)));

    let bad = CySpiConfig {
        frequency: 10_000_000,
        ..CySpiConfig::default()
    };
    assert!(matches!(
        spi.set_config(&bad),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn spi_oversized_transfer_is_rejected() {
    let transport = MockTransport::with_devices(vec![spi_device(1, 6)]);
    let state = transport.handle_state(DeviceId { bus: 1, address: 6 });
    let device = discover_one(&transport);

    let mut spi = CySpiBridge::new(&transport, &device).unwrap();
    spi.set_config(&CySpiConfig::default()).unwrap();

    assert!(matches!(
        spi.transfer(&vec![0u8; 0x1_0000]),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(spi.read(0x1_0000), Err(Error::InvalidArgument(_))));

    let state = state.borrow();
    assert!(!state.control_out_log.iter().any(|(req, ..)| *req == 0xCA));
}

#[test]
fn spi_resets_module_when_completion_poll_fails() {
    let transport = MockTransport::with_devices(vec![spi_device(1, 6)]);
    let state = transport.handle_state(DeviceId { bus: 1, address: 6 });
    // A malformed status response fails the completion poll after the data
    // exchange already succeeded.
    state.borrow_mut().script_control_in(0xCC, vec![1, 2]);
    let device = discover_one(&transport);

    let mut spi = CySpiBridge::new(&transport, &device).unwrap();
    spi.set_config(&CySpiConfig::default()).unwrap();

    let err = spi.transfer(&[1, 2, 3, 4]).unwrap_err();
    assert!(matches!(err, Error::UnexpectedResponse(_)));

    // Once at open, once recovering from the failed poll.
    let state = state.borrow();
    let resets = state
        .control_out_log
        .iter()
        .filter(|(req, ..)| *req == 0xCB)
        .count();
    assert_eq!(resets, 2);
}

// ---- Manufacturing interface ----

#[test]
fn mfg_claims_manufacturing_interface() {
    let transport = MockTransport::with_devices(vec![spi_device(1, 6)]);
    let state = transport.handle_state(DeviceId { bus: 1, address: 6 });
    let device = discover_one(&transport);

    let _mfg = MfgBridge::new(&transport, &device).unwrap();
    assert_eq!(state.borrow().claimed, vec![1]);
}

#[test]
fn mfg_config_block_round_trip() {
    let mut block = ConfigurationBlock::new(CyType::Spi);
    block.set_serial_number(Some("A1B2C3")).unwrap();
    let block_bytes = block.encode();

    let transport = MockTransport::with_devices(vec![spi_device(1, 6)]);
    let state = transport.handle_state(DeviceId { bus: 1, address: 6 });
    state
        .borrow_mut()
        .script_control_in(181, block_bytes.clone());
    let device = discover_one(&transport);

    let mut mfg = MfgBridge::new(&transport, &device).unwrap();
    mfg.connect().unwrap();

    let read_back = mfg.read_config().unwrap();
    assert_eq!(read_back, block);

    mfg.write_config(&read_back).unwrap();
    mfg.disconnect().unwrap();

    let state = state.borrow();
    let write = state
        .control_out_log
        .iter()
        .find(|(req, ..)| *req == 182)
        .expect("no config write request sent");
    assert_eq!(write.3, block_bytes);

    // Enter then leave configuration mode with the magic words.
    let modes: Vec<_> = state
        .control_out_log
        .iter()
        .filter(|(req, ..)| *req == 226)
        .collect();
    assert_eq!(modes.len(), 2);
    assert_eq!((modes[0].1, modes[0].2), (0xA6BC, 0xB1B0));
    assert_eq!((modes[1].1, modes[1].2), (0xA6BC, 0xB9B0));
}

#[test]
fn mfg_rejects_wrong_size_config_block() {
    let transport = MockTransport::with_devices(vec![spi_device(1, 6)]);
    let device = discover_one(&transport);
    let mut mfg = MfgBridge::new(&transport, &device).unwrap();

    assert!(matches!(
        mfg.write_config_block(&[0u8; 100]),
        Err(Error::InvalidArgument(_))
    ));
}

// ---- User flash ----

#[test]
fn user_flash_enforces_page_alignment_and_bounds() {
    let transport = MockTransport::with_devices(vec![spi_device(1, 6)]);
    let device = discover_one(&transport);
    let mut mfg = MfgBridge::new(&transport, &device).unwrap();

    // Misaligned address and length.
    assert!(matches!(
        mfg.program_user_flash(64, &[0u8; 128]),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        mfg.program_user_flash(0, &[0u8; 100]),
        Err(Error::InvalidArgument(_))
    ));
    // Out of bounds.
    assert!(matches!(
        mfg.read_user_flash(384, 256),
        Err(Error::InvalidArgument(_))
    ));

    // A whole-page access inside bounds works.
    let data = mfg.read_user_flash(256, 128).unwrap();
    assert_eq!(data.len(), 128);
    mfg.program_user_flash(0, &[0xFFu8; 256]).unwrap();
}
