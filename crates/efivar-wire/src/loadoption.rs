// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Encode and decode the EFI_LOAD_OPTION binary structure.
// Author: Lukas Bower

//! `EFI_LOAD_OPTION` codec.
//!
//! Wire layout: a 32-bit attribute word, a 16-bit device-path-list length,
//! a UCS-2 NUL-terminated description, the device-path list, then optional
//! data (conventionally the UCS-2 command line, NUL-terminated). All
//! integers little-endian. The codec is a bijection on valid inputs: decode
//! keeps the original bytes, and two options are the same entry exactly when
//! their bytes are equal.

use alloc::string::String;
use alloc::vec::Vec;

use crate::devicepath::{self, DevicePath};
use crate::{ucs2, WireError};

const HEADER_LEN: usize = 6;

/// An owned, validated load option.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadOption {
    data: Vec<u8>,
    desc_end: usize,
}

impl LoadOption {
    /// Validate `bytes` as a load option and take ownership of it.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < HEADER_LEN + 2 {
            return Err(WireError::InvalidLoadOption("shorter than fixed header"));
        }

        let fp_len = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
        let desc_end = match ucs2::find_nul(&bytes[HEADER_LEN..]) {
            Some(off) => HEADER_LEN + off,
            None => return Err(WireError::InvalidLoadOption("unterminated description")),
        };
        // Reject descriptions that are not valid UTF-16.
        ucs2::decode(&bytes[HEADER_LEN..desc_end])?;

        let fp_start = desc_end + 2;
        let fp_end = fp_start
            .checked_add(fp_len)
            .ok_or(WireError::InvalidLoadOption("device path length overflow"))?;
        if fp_end > bytes.len() {
            return Err(WireError::InvalidLoadOption("device path past end of data"));
        }
        devicepath::validate(&bytes[fp_start..fp_end])?;

        Ok(Self {
            data: bytes.to_vec(),
            desc_end,
        })
    }

    /// Build a load option from its parts.
    pub fn encode(
        attributes: u32,
        description: &str,
        device_path: &DevicePath,
        optional_data: &[u8],
    ) -> Self {
        let path_bytes = device_path.as_bytes();
        let mut data =
            Vec::with_capacity(HEADER_LEN + description.len() * 2 + 2 + path_bytes.len());
        data.extend_from_slice(&attributes.to_le_bytes());
        data.extend_from_slice(&(path_bytes.len() as u16).to_le_bytes());
        let desc_end = data.len() + description.encode_utf16().count() * 2;
        data.extend_from_slice(&ucs2::encode_nul_terminated(description));
        data.extend_from_slice(path_bytes);
        data.extend_from_slice(optional_data);
        Self { data, desc_end }
    }

    /// The attribute word. `LOAD_OPTION_ACTIVE` marks a bootable entry.
    pub fn attributes(&self) -> u32 {
        u32::from_le_bytes([self.data[0], self.data[1], self.data[2], self.data[3]])
    }

    /// The description string.
    pub fn description(&self) -> String {
        // Validated during decode/encode, cannot fail here.
        ucs2::decode(&self.data[HEADER_LEN..self.desc_end]).unwrap_or_default()
    }

    /// The raw device-path list bytes.
    pub fn file_path_list(&self) -> &[u8] {
        let fp_len = u16::from_le_bytes([self.data[4], self.data[5]]) as usize;
        let fp_start = self.desc_end + 2;
        &self.data[fp_start..fp_start + fp_len]
    }

    /// The device-path list as a walkable [`DevicePath`].
    pub fn device_path(&self) -> DevicePath {
        // Validated on construction.
        DevicePath::from_bytes(self.file_path_list().to_vec()).expect("validated device path")
    }

    /// Bytes after the device-path list, if any.
    pub fn optional_data(&self) -> &[u8] {
        let fp_len = u16::from_le_bytes([self.data[4], self.data[5]]) as usize;
        &self.data[self.desc_end + 2 + fp_len..]
    }

    /// The encoded wire form.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume into the encoded wire form.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
