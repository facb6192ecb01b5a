// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Convert between Rust strings and UCS-2 (UTF-16LE) firmware strings.
// Author: Lukas Bower

//! UCS-2 string conversion.
//!
//! Firmware strings are UTF-16LE without a byte-order mark. Descriptions and
//! load-option arguments are NUL-terminated; the terminator is handled by the
//! callers, not here.

use alloc::string::String;
use alloc::vec::Vec;

use crate::WireError;

/// Encode `s` as UTF-16LE bytes, without a terminator.
pub fn encode(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() * 2);
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// Encode `s` as UTF-16LE bytes with a trailing NUL code unit.
pub fn encode_nul_terminated(s: &str) -> Vec<u8> {
    let mut out = encode(s);
    out.extend_from_slice(&[0, 0]);
    out
}

/// Decode UTF-16LE bytes into a string. The input must not contain the
/// terminating NUL and must have even length.
pub fn decode(bytes: &[u8]) -> Result<String, WireError> {
    if bytes.len() % 2 != 0 {
        return Err(WireError::InvalidUcs2);
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| WireError::InvalidUcs2)
}

/// Byte offset of the first NUL code unit in a UTF-16LE buffer.
pub fn find_nul(bytes: &[u8]) -> Option<usize> {
    bytes
        .chunks_exact(2)
        .position(|c| c == [0, 0])
        .map(|units| units * 2)
}
