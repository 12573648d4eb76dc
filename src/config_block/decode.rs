//! Configuration block decoding: parse a binary blob into a
//! [`ConfigurationBlock`].

use crate::constants::cfg;
use crate::error::{Error, Result};
use crate::types::CyType;

use super::encode::checksum;
use super::ConfigurationBlock;

/// Decode a string slot.
///
/// Slots hold USB string descriptors: a length byte (2 + 2 per character),
/// a type byte (0x03), then UTF-16LE characters. A zero length byte means
/// the string is absent, never empty.
fn decode_string(buf: &[u8], offset: usize) -> Result<Option<String>> {
    let slot = &buf[offset..offset + cfg::STRING_SLOT_SIZE];

    let raw_len = slot[0] as usize;
    if raw_len == 0 {
        return Ok(None);
    }
    // Same bound the setters enforce: header plus at most MAX_STRING_CHARS
    // UTF-16 units.
    if raw_len < 2 || raw_len % 2 != 0 || raw_len > 2 + 2 * cfg::MAX_STRING_CHARS {
        return Err(Error::ConfigBlock(format!(
            "bad string descriptor length {raw_len} at offset {offset:#x}"
        )));
    }
    if slot[1] != 0x03 {
        return Err(Error::ConfigBlock(format!(
            "bad string descriptor type {:#04x} at offset {offset:#x}",
            slot[1]
        )));
    }

    let char_count = (raw_len - 2) / 2;
    let units: Vec<u16> = (0..char_count)
        .map(|i| u16::from_le_bytes([slot[2 + 2 * i], slot[3 + 2 * i]]))
        .collect();

    let s = String::from_utf16(&units).map_err(|_| {
        Error::ConfigBlock(format!("invalid UTF-16 string at offset {offset:#x}"))
    })?;
    Ok(Some(s))
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

impl ConfigurationBlock {
    /// Decode a binary configuration block.
    ///
    /// Verifies the magic, format version, and checksum before interpreting
    /// any field. Fails without a partial result on any malformation.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != cfg::BLOCK_SIZE {
            return Err(Error::ConfigBlock(format!(
                "block must be {} bytes, got {}",
                cfg::BLOCK_SIZE,
                data.len()
            )));
        }

        if &data[..cfg::MAGIC.len()] != cfg::MAGIC {
            return Err(Error::ConfigBlock(format!(
                "bad magic {:02x?}",
                &data[..cfg::MAGIC.len()]
            )));
        }

        let version_major = data[cfg::VERSION_MAJOR_OFFSET];
        let version_minor = data[cfg::VERSION_MINOR_OFFSET];
        let version_build = read_u16(data, cfg::VERSION_BUILD_OFFSET);
        if version_major != cfg::SUPPORTED_VERSION_MAJOR {
            return Err(Error::UnsupportedVersion {
                major: version_major,
                minor: version_minor,
                build: version_build,
            });
        }

        let stored = read_u32(data, cfg::CHECKSUM_OFFSET);
        let computed = checksum(data);
        if stored != computed {
            return Err(Error::ChecksumMismatch { stored, computed });
        }

        let type_byte = data[cfg::DEVICE_TYPE_OFFSET];
        let device_type =
            CyType::from_wire_value(type_byte).ok_or(Error::UnknownDeviceType(type_byte))?;

        Ok(Self {
            buf: data.to_vec(),
            version_major,
            version_minor,
            version_build,
            device_type,
            vid: read_u16(data, cfg::VID_OFFSET),
            pid: read_u16(data, cfg::PID_OFFSET),
            mfgr_string: decode_string(data, cfg::MFGR_STRING_OFFSET)?,
            product_string: decode_string(data, cfg::PRODUCT_STRING_OFFSET)?,
            serial_number: decode_string(data, cfg::SERIAL_STRING_OFFSET)?,
            capsense_on: data[cfg::FLAGS_OFFSET] & cfg::FLAG_CAPSENSE != 0,
            default_frequency: read_u32(data, cfg::FREQUENCY_OFFSET),
        })
    }
}
