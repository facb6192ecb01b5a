// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.4
// Date Modified: 2026-07-15
// Author: Lukas Bower

//! UEFI variable store abstraction.
//!
//! [`EfiVariables`] is the only route the core takes to the firmware.
//! [`HostEfiVariables`] talks to efivarfs; [`mock::MockEfiVariables`] keeps
//! variables in a map and can dump them as JSON, which is what makes
//! `--output-json` work on machines without firmware access.

pub mod mock;

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use efivar_wire::{DevicePath, Guid};

pub use efivar_wire::guid::GUID_GLOBAL;

/// Errors of the variable store.
#[derive(Debug, Error)]
pub enum VarError {
    /// The host has no UEFI variable store.
    #[error("EFI variables are not supported on this system")]
    Unavailable,
    /// The requested variable does not exist.
    #[error("variable does not exist")]
    NotExist,
    /// The backend failed to read or write.
    #[error("variable store i/o: {0}")]
    Io(#[from] io::Error),
    /// A device path could not be constructed.
    #[error("cannot build device path: {0}")]
    DevicePath(String),
}

/// Identity of one variable.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct VariableDescriptor {
    /// Vendor namespace.
    pub guid: Guid,
    /// Variable name.
    pub name: String,
}

/// How much of the device hierarchy a file device path spells out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DevicePathMode {
    /// Hard-drive node plus file node.
    Full,
    /// File node only; the firmware binds it to the boot partition.
    ShortForm,
}

/// Pluggable UEFI variable backend.
pub trait EfiVariables {
    /// Enumerate all variables. [`VarError::Unavailable`] when the host has
    /// no variable store.
    fn list(&self) -> Result<Vec<VariableDescriptor>, VarError>;

    /// Read a variable's payload and attributes.
    fn get(&self, guid: Guid, name: &str) -> Result<(Vec<u8>, u32), VarError>;

    /// Write a variable. Empty `data` deletes it.
    fn set(&self, guid: Guid, name: &str, data: &[u8], attrs: u32) -> Result<(), VarError>;

    /// Construct a file device path for `path`.
    fn new_file_device_path(
        &self,
        path: &Path,
        mode: DevicePathMode,
    ) -> Result<DevicePath, VarError>;
}

/// Convert a host path into the backslash form used inside device paths.
pub(crate) fn to_firmware_path(path: &Path) -> String {
    path.to_string_lossy().replace('/', "\\")
}

const EFIVARFS_DIR: &str = "/sys/firmware/efi/efivars";

/// Variable backend over efivarfs.
///
/// Each variable is a file named `<Name>-<guid>` whose first four bytes are
/// the little-endian attribute word.
#[derive(Clone, Debug)]
pub struct HostEfiVariables {
    dir: PathBuf,
}

impl HostEfiVariables {
    /// Backend over the standard efivarfs mount point.
    pub fn new() -> Self {
        Self {
            dir: PathBuf::from(EFIVARFS_DIR),
        }
    }

    fn variable_path(&self, guid: Guid, name: &str) -> PathBuf {
        self.dir.join(format!("{}-{}", name, guid))
    }
}

impl Default for HostEfiVariables {
    fn default() -> Self {
        Self::new()
    }
}

impl EfiVariables for HostEfiVariables {
    fn list(&self) -> Result<Vec<VariableDescriptor>, VarError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Err(VarError::Unavailable),
        };

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(VarError::Io)?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            // Name-11112222-3333-4444-5555-666677778888
            if !file_name.is_ascii() || file_name.len() < 38 {
                continue;
            }
            let (name, rest) = file_name.split_at(file_name.len() - 37);
            let Some(guid_text) = rest.strip_prefix('-') else {
                continue;
            };
            let Ok(guid) = Guid::from_str(guid_text) else {
                continue;
            };
            out.push(VariableDescriptor {
                guid,
                name: name.to_string(),
            });
        }
        Ok(out)
    }

    fn get(&self, guid: Guid, name: &str) -> Result<(Vec<u8>, u32), VarError> {
        let path = self.variable_path(guid, name);
        let mut file = match std::fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(VarError::NotExist),
            Err(e) => return Err(VarError::Io(e)),
        };
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;
        if raw.len() < 4 {
            return Err(VarError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "variable shorter than its attribute word",
            )));
        }
        let attrs = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        Ok((raw[4..].to_vec(), attrs))
    }

    fn set(&self, guid: Guid, name: &str, data: &[u8], attrs: u32) -> Result<(), VarError> {
        let path = self.variable_path(guid, name);
        if data.is_empty() {
            return match std::fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Err(VarError::NotExist),
                Err(e) => Err(VarError::Io(e)),
            };
        }
        let mut payload = Vec::with_capacity(4 + data.len());
        payload.extend_from_slice(&attrs.to_le_bytes());
        payload.extend_from_slice(data);
        let mut file = std::fs::File::create(&path)?;
        file.write_all(&payload)?;
        Ok(())
    }

    fn new_file_device_path(
        &self,
        path: &Path,
        mode: DevicePathMode,
    ) -> Result<DevicePath, VarError> {
        match mode {
            DevicePathMode::ShortForm => Ok(DevicePath::new_file(&to_firmware_path(path))),
            DevicePathMode::Full => Err(VarError::DevicePath(
                "full-form paths need partition discovery, which the host backend does not do"
                    .into(),
            )),
        }
    }
}
