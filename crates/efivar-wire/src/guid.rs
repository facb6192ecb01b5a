// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: EFI GUID representation with canonical text form.
// Author: Lukas Bower

use core::fmt;
use core::str::FromStr;

use crate::WireError;

/// An EFI GUID.
///
/// Stored as its four textual components. The canonical text form is the
/// lowercase `8-4-4-4-12` rendering used by efivarfs file names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid {
    data1: u32,
    data2: u16,
    data3: u16,
    data4: [u8; 8],
}

/// The EFI global variable namespace, `8be4df61-93ca-11d2-aa0d-00e098032b8c`.
pub const GUID_GLOBAL: Guid = Guid::new(
    0x8be4_df61,
    0x93ca,
    0x11d2,
    [0xaa, 0x0d, 0x00, 0xe0, 0x98, 0x03, 0x2b, 0x8c],
);

impl Guid {
    /// Build a GUID from its components.
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    /// Serialize to the 16-byte EFI binary layout (first three fields
    /// little-endian, as found inside device-path nodes).
    pub fn to_efi_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.data1.to_le_bytes());
        out[4..6].copy_from_slice(&self.data2.to_le_bytes());
        out[6..8].copy_from_slice(&self.data3.to_le_bytes());
        out[8..16].copy_from_slice(&self.data4);
        out
    }

    /// Deserialize from the 16-byte EFI binary layout.
    pub fn from_efi_bytes(bytes: [u8; 16]) -> Self {
        Self {
            data1: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            data2: u16::from_le_bytes([bytes[4], bytes[5]]),
            data3: u16::from_le_bytes([bytes[6], bytes[7]]),
            data4: [
                bytes[8], bytes[9], bytes[10], bytes[11], bytes[12], bytes[13], bytes[14],
                bytes[15],
            ],
        }
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7],
        )
    }
}

impl FromStr for Guid {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if !s.is_ascii()
            || bytes.len() != 36
            || bytes[8] != b'-'
            || bytes[13] != b'-'
            || bytes[18] != b'-'
            || bytes[23] != b'-'
        {
            return Err(WireError::InvalidGuid);
        }

        fn hex(s: &str) -> Result<u64, WireError> {
            u64::from_str_radix(s, 16).map_err(|_| WireError::InvalidGuid)
        }

        let data1 = hex(&s[0..8])? as u32;
        let data2 = hex(&s[9..13])? as u16;
        let data3 = hex(&s[14..18])? as u16;
        let mut data4 = [0u8; 8];
        data4[0] = hex(&s[19..21])? as u8;
        data4[1] = hex(&s[21..23])? as u8;
        for (i, slot) in data4[2..].iter_mut().enumerate() {
            let off = 24 + i * 2;
            *slot = hex(&s[off..off + 2])? as u8;
        }
        Ok(Self::new(data1, data2, data3, data4))
    }
}
