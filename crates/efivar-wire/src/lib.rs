// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Encode and decode the UEFI load-option and device-path wire formats.
// Author: Lukas Bower
#![no_std]
//! Pure wire-format support for UEFI Boot Manager variables.
//!
//! This crate carries no I/O. It knows how to take an `EFI_LOAD_OPTION`
//! apart and put one back together, how to walk a device-path list, and how
//! to convert between Rust strings and the UCS-2 form the firmware stores.

extern crate alloc;

use core::fmt;

pub mod devicepath;
pub mod guid;
pub mod loadoption;
pub mod ucs2;

pub use devicepath::{DevicePath, DevicePathNode};
pub use guid::Guid;
pub use loadoption::LoadOption;

/// Variable is stored in non-volatile memory.
pub const VARIABLE_NON_VOLATILE: u32 = 0x0000_0001;
/// Variable is visible to boot services.
pub const VARIABLE_BOOTSERVICE_ACCESS: u32 = 0x0000_0002;
/// Variable is visible at runtime.
pub const VARIABLE_RUNTIME_ACCESS: u32 = 0x0000_0004;

/// Attribute set used for every `Boot####` variable we write.
pub const BOOT_VARIABLE_ATTRIBUTES: u32 =
    VARIABLE_NON_VOLATILE | VARIABLE_BOOTSERVICE_ACCESS | VARIABLE_RUNTIME_ACCESS;

/// `LOAD_OPTION_ACTIVE` attribute bit of a load option.
pub const LOAD_OPTION_ACTIVE: u32 = 0x0000_0001;

/// Errors produced while encoding or decoding wire structures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireError {
    /// The input ended before the structure was complete.
    UnexpectedEof,
    /// The load option failed its structural validity check.
    InvalidLoadOption(&'static str),
    /// A device-path node carried an impossible header or length.
    InvalidDevicePath(&'static str),
    /// A UCS-2 string field was not valid UTF-16.
    InvalidUcs2,
    /// A GUID string did not match the canonical text form.
    InvalidGuid,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of input"),
            Self::InvalidLoadOption(reason) => write!(f, "invalid load option: {reason}"),
            Self::InvalidDevicePath(reason) => write!(f, "invalid device path: {reason}"),
            Self::InvalidUcs2 => write!(f, "invalid ucs-2 string"),
            Self::InvalidGuid => write!(f, "invalid guid"),
        }
    }
}

impl core::error::Error for WireError {}
