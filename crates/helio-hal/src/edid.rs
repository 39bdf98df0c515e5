//! EDID decoding
//!
//! Extracts identity fields from the 128-byte base block: manufacturer,
//! product code, serial number, manufacture date and the name and serial
//! text descriptors.

use crate::HalError;
use serde::{Deserialize, Serialize};

/// Fixed 8-byte EDID header
pub const EDID_HEADER: [u8; 8] = [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00];

/// Size of the base block
pub const EDID_BLOCK_LEN: usize = 128;

const DESCRIPTOR_OFFSETS: [usize; 4] = [54, 72, 90, 108];
const DESCRIPTOR_LEN: usize = 18;

/// Descriptor tag of a text field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TextDescriptor {
    Name = 0xFC,
    Serial = 0xFF,
}

/// Identity decoded from an EDID block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdidInfo {
    /// Monitor name descriptor (0xFC)
    pub name: Option<String>,
    /// Serial text descriptor (0xFF)
    pub serial: Option<String>,
    /// Raw big-endian manufacturer id from bytes 8-9
    pub vendor_id: u16,
    /// Three letter PNP id derived from `vendor_id`
    pub manufacturer: String,
    pub product_code: u16,
    pub serial_number: u32,
    pub week: u8,
    pub year: u16,
    pub version: (u8, u8),
    pub valid_header: bool,
}

impl EdidInfo {
    /// Decode the base block. Extension blocks are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, HalError> {
        if bytes.len() < EDID_BLOCK_LEN {
            return Err(HalError::InvalidEdid(format!(
                "expected at least {} bytes, got {}",
                EDID_BLOCK_LEN,
                bytes.len()
            )));
        }

        let vendor_id = u16::from_be_bytes([bytes[8], bytes[9]]);
        let info = Self {
            name: descriptor_text(bytes, TextDescriptor::Name),
            serial: descriptor_text(bytes, TextDescriptor::Serial),
            vendor_id,
            manufacturer: pnp_id(vendor_id),
            product_code: u16::from_le_bytes([bytes[10], bytes[11]]),
            serial_number: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            week: bytes[16],
            year: u16::from(bytes[17]) + 1990,
            version: (bytes[18], bytes[19]),
            valid_header: bytes[..8] == EDID_HEADER,
        };

        if !info.valid_header {
            tracing::debug!("EDID for {} has a malformed header", info.identification());
        }
        Ok(info)
    }

    /// Stable key used to recognise a display across reconnects
    pub fn serial_key(&self) -> String {
        format!(
            "{}-{}-{}-{}-{}-{}",
            self.name.as_deref().unwrap_or("NO_NAME"),
            self.serial.as_deref().unwrap_or("NO_SERIAL"),
            self.serial_number,
            self.product_code,
            self.year,
            self.week
        )
    }

    /// Short identification string, e.g. `DEL-41234-808464432 12/2019 1.4`
    pub fn identification(&self) -> String {
        format!(
            "{}-{}-{} {}/{} {}.{}",
            self.manufacturer,
            self.product_code,
            self.serial_number,
            self.week,
            self.year,
            self.version.0,
            self.version.1
        )
    }

    /// Name for display in logs and UIs
    pub fn printable_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("{} {}", self.manufacturer, self.product_code),
        }
    }
}

/// Decode the three 5-bit letters of a manufacturer id
pub fn pnp_id(vendor_id: u16) -> String {
    [10u16, 5, 0]
        .iter()
        .map(|shift| {
            let letter = ((vendor_id >> shift) & 0x1F) as u8;
            if (1..=26).contains(&letter) {
                (b'A' + letter - 1) as char
            } else {
                '?'
            }
        })
        .collect()
}

/// Find a text descriptor and return its trimmed contents.
///
/// Non-ASCII contents are rendered as a hex dump so the result stays
/// unique for serial derivation.
pub fn descriptor_text(bytes: &[u8], tag: TextDescriptor) -> Option<String> {
    for offset in DESCRIPTOR_OFFSETS {
        let Some(descriptor) = bytes.get(offset..offset + DESCRIPTOR_LEN) else {
            continue;
        };
        if descriptor[..3] != [0, 0, 0] || descriptor[3] != tag as u8 {
            continue;
        }

        let text = &descriptor[5..];
        if text.iter().any(|b| *b >= 0x80) {
            return Some(
                text.iter()
                    .map(|b| format!("{:02x}", b))
                    .collect::<Vec<_>>()
                    .join(" "),
            );
        }

        let value: String = text
            .iter()
            .take_while(|b| **b != 0x0A && **b != 0x00)
            .map(|b| *b as char)
            .collect();
        let value = value.trim();
        return if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        };
    }
    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a base block with the given name and serial descriptors
    pub(crate) fn sample_edid(name: &str, serial: &str) -> Vec<u8> {
        let mut edid = vec![0u8; EDID_BLOCK_LEN];
        edid[..8].copy_from_slice(&EDID_HEADER);
        // "DEL"
        edid[8] = 0x10;
        edid[9] = 0xAC;
        edid[10..12].copy_from_slice(&0xA0B1u16.to_le_bytes());
        edid[12..16].copy_from_slice(&12345u32.to_le_bytes());
        edid[16] = 12;
        edid[17] = 29;
        edid[18] = 1;
        edid[19] = 4;
        write_descriptor(&mut edid, 72, 0xFC, name.as_bytes());
        write_descriptor(&mut edid, 90, 0xFF, serial.as_bytes());
        edid
    }

    pub(crate) fn write_descriptor(edid: &mut [u8], offset: usize, tag: u8, text: &[u8]) {
        edid[offset..offset + 5].copy_from_slice(&[0, 0, 0, tag, 0]);
        let mut field = [0x20u8; 13];
        field[..text.len()].copy_from_slice(text);
        if text.len() < 13 {
            field[text.len()] = 0x0A;
        }
        edid[offset + 5..offset + 18].copy_from_slice(&field);
    }

    #[test]
    fn test_decode_fields() {
        let info = EdidInfo::decode(&sample_edid("DELL U2720Q", "ABC123")).unwrap();
        assert_eq!(info.name.as_deref(), Some("DELL U2720Q"));
        assert_eq!(info.serial.as_deref(), Some("ABC123"));
        assert_eq!(info.manufacturer, "DEL");
        assert_eq!(info.vendor_id, 4268);
        assert_eq!(info.product_code, 0xA0B1);
        assert_eq!(info.serial_number, 12345);
        assert_eq!(info.week, 12);
        assert_eq!(info.year, 2019);
        assert_eq!(info.version, (1, 4));
        assert!(info.valid_header);
    }

    #[test]
    fn test_serial_descriptor_trimmed() {
        let mut edid = vec![0u8; 256];
        edid[..8].copy_from_slice(&EDID_HEADER);
        edid[108..113].copy_from_slice(&[0, 0, 0, 0xFF, 0]);
        edid[113..126].copy_from_slice(b"ABC123       ");
        let info = EdidInfo::decode(&edid).unwrap();
        assert_eq!(info.serial.as_deref(), Some("ABC123"));
        assert_eq!(info.name, None);
    }

    #[test]
    fn test_non_ascii_falls_back_to_hex() {
        let mut edid = sample_edid("NAME", "X");
        write_descriptor(&mut edid, 90, 0xFF, &[0x41, 0x9F, 0x42]);
        let info = EdidInfo::decode(&edid).unwrap();
        let serial = info.serial.unwrap();
        assert!(serial.starts_with("41 9f 42 0a"));
    }

    #[test]
    fn test_detailed_timing_is_not_text() {
        let mut edid = sample_edid("NAME", "SERIAL");
        // A timing descriptor has a non-zero pixel clock in bytes 0-1
        edid[54..72].copy_from_slice(&[0x02, 0x3A, 0, 0xFC, 0, b'X', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let info = EdidInfo::decode(&edid).unwrap();
        assert_eq!(info.name.as_deref(), Some("NAME"));
    }

    #[test]
    fn test_too_short() {
        assert!(EdidInfo::decode(&[0u8; 64]).is_err());
    }

    #[test]
    fn test_serial_key_placeholders() {
        let mut edid = vec![0u8; EDID_BLOCK_LEN];
        edid[..8].copy_from_slice(&EDID_HEADER);
        edid[17] = 30;
        edid[16] = 5;
        let info = EdidInfo::decode(&edid).unwrap();
        assert_eq!(info.serial_key(), "NO_NAME-NO_SERIAL-0-0-2020-5");
    }

    #[test]
    fn test_identification() {
        let info = EdidInfo::decode(&sample_edid("DELL", "S")).unwrap();
        assert_eq!(info.identification(), "DEL-41137-12345 12/2019 1.4");
    }

    #[test]
    fn test_pnp_id() {
        assert_eq!(pnp_id(19501), "SAM");
        assert_eq!(pnp_id(7789), "GSM");
    }
}
