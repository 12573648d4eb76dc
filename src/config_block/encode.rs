//! Configuration block encoding: serialize a [`ConfigurationBlock`] back to
//! its fixed 512-byte binary form.

use crate::constants::cfg;

use super::ConfigurationBlock;

/// Compute the block checksum: wrapping u32 sum of every byte from
/// [`cfg::CHECKSUM_REGION_START`] to the end of the block.
pub(super) fn checksum(buf: &[u8]) -> u32 {
    buf[cfg::CHECKSUM_REGION_START..]
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
}

/// Write a string slot as a USB string descriptor, zeroing the remainder.
///
/// An absent string zeroes the whole slot so a reader cannot mistake stale
/// bytes for content.
fn encode_string(buf: &mut [u8], offset: usize, value: Option<&str>) {
    let slot = &mut buf[offset..offset + cfg::STRING_SLOT_SIZE];
    slot.fill(0);

    let s = match value {
        Some(s) => s,
        None => return,
    };

    let mut pos = 2;
    for unit in s.encode_utf16() {
        let bytes = unit.to_le_bytes();
        slot[pos] = bytes[0];
        slot[pos + 1] = bytes[1];
        pos += 2;
    }
    slot[0] = pos as u8;
    slot[1] = 0x03;
}

fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

impl ConfigurationBlock {
    /// Serialize to the fixed 512-byte binary form.
    ///
    /// Field regions are rewritten from the current field values; reserved
    /// regions carry over verbatim from the buffer the block was decoded
    /// from. The checksum is recomputed last, so the output is always
    /// internally consistent.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = self.buf.clone();

        buf[..cfg::MAGIC.len()].copy_from_slice(cfg::MAGIC);
        buf[cfg::VERSION_MAJOR_OFFSET] = self.version_major;
        buf[cfg::VERSION_MINOR_OFFSET] = self.version_minor;
        write_u16(&mut buf, cfg::VERSION_BUILD_OFFSET, self.version_build);

        buf[cfg::DEVICE_TYPE_OFFSET] = self.device_type.wire_value();

        let mut flags = buf[cfg::FLAGS_OFFSET] & !cfg::FLAG_CAPSENSE;
        if self.capsense_on {
            flags |= cfg::FLAG_CAPSENSE;
        }
        buf[cfg::FLAGS_OFFSET] = flags;

        write_u16(&mut buf, cfg::VID_OFFSET, self.vid);
        write_u16(&mut buf, cfg::PID_OFFSET, self.pid);
        write_u32(&mut buf, cfg::FREQUENCY_OFFSET, self.default_frequency);

        encode_string(&mut buf, cfg::MFGR_STRING_OFFSET, self.mfgr_string.as_deref());
        encode_string(
            &mut buf,
            cfg::PRODUCT_STRING_OFFSET,
            self.product_string.as_deref(),
        );
        encode_string(
            &mut buf,
            cfg::SERIAL_STRING_OFFSET,
            self.serial_number.as_deref(),
        );

        let sum = checksum(&buf);
        write_u32(&mut buf, cfg::CHECKSUM_OFFSET, sum);

        buf
    }
}
