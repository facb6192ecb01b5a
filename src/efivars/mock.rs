// CLASSIFICATION: COMMUNITY
// Filename: mock.rs v0.3
// Date Modified: 2026-07-15
// Author: Lukas Bower

//! In-memory variable backends.
//!
//! [`MockEfiVariables`] is a full store over a map; its JSON dump is the
//! payload of `--output-json`, so a packaging run in a chroot can still show
//! what it would have written. [`NoEfiVariables`] models a host without
//! firmware variables at all.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};

use efivar_wire::{DevicePath, Guid};

use super::{to_firmware_path, DevicePathMode, EfiVariables, VarError, VariableDescriptor};
use crate::fs::Fs;

/// Map-backed [`EfiVariables`] implementation.
pub struct MockEfiVariables {
    store: RefCell<BTreeMap<(Guid, String), (Vec<u8>, u32)>>,
    fs: Rc<dyn Fs>,
}

impl MockEfiVariables {
    /// An empty store. The filesystem is consulted when building device
    /// paths, so entries can only point at files that exist.
    pub fn new(fs: Rc<dyn Fs>) -> Self {
        Self {
            store: RefCell::new(BTreeMap::new()),
            fs,
        }
    }

    /// Seed a variable, for tests.
    pub fn insert(&self, guid: Guid, name: &str, data: &[u8], attrs: u32) {
        self.store
            .borrow_mut()
            .insert((guid, name.to_string()), (data.to_vec(), attrs));
    }

    /// Whether a variable currently exists.
    pub fn contains(&self, guid: Guid, name: &str) -> bool {
        self.store
            .borrow()
            .contains_key(&(guid, name.to_string()))
    }

    /// Number of stored variables.
    pub fn len(&self) -> usize {
        self.store.borrow().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.store.borrow().is_empty()
    }

    /// Dump the store as JSON.
    ///
    /// Keys are `<Name>-<guid>`; each value is the base64 encoding of the
    /// attribute word as a little-endian 16-bit integer followed by the
    /// variable data.
    pub fn to_json(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        for ((guid, name), (data, attrs)) in self.store.borrow().iter() {
            let mut payload = Vec::with_capacity(2 + data.len());
            payload.extend_from_slice(&(*attrs as u16).to_le_bytes());
            payload.extend_from_slice(data);
            out.insert(
                format!("{}-{}", name, guid),
                serde_json::Value::String(BASE64_STANDARD.encode(payload)),
            );
        }
        serde_json::Value::Object(out)
    }
}

impl EfiVariables for MockEfiVariables {
    fn list(&self) -> Result<Vec<VariableDescriptor>, VarError> {
        Ok(self
            .store
            .borrow()
            .keys()
            .map(|(guid, name)| VariableDescriptor {
                guid: *guid,
                name: name.clone(),
            })
            .collect())
    }

    fn get(&self, guid: Guid, name: &str) -> Result<(Vec<u8>, u32), VarError> {
        self.store
            .borrow()
            .get(&(guid, name.to_string()))
            .cloned()
            .ok_or(VarError::NotExist)
    }

    fn set(&self, guid: Guid, name: &str, data: &[u8], attrs: u32) -> Result<(), VarError> {
        let mut store = self.store.borrow_mut();
        if data.is_empty() {
            return store
                .remove(&(guid, name.to_string()))
                .map(|_| ())
                .ok_or(VarError::NotExist);
        }
        store.insert((guid, name.to_string()), (data.to_vec(), attrs));
        Ok(())
    }

    fn new_file_device_path(
        &self,
        path: &Path,
        mode: DevicePathMode,
    ) -> Result<DevicePath, VarError> {
        // Refuse to describe files that are not there.
        self.fs.stat(path).map_err(VarError::Io)?;

        let firmware_path = to_firmware_path(path);
        Ok(match mode {
            DevicePathMode::ShortForm => DevicePath::new_file(&firmware_path),
            DevicePathMode::Full => DevicePath::new_hard_drive_file(
                1,
                0x800,
                0x10_0000,
                [0u8; 16],
                &firmware_path,
            ),
        })
    }
}

/// Backend for hosts without UEFI variables.
pub struct NoEfiVariables;

impl EfiVariables for NoEfiVariables {
    fn list(&self) -> Result<Vec<VariableDescriptor>, VarError> {
        Err(VarError::Unavailable)
    }

    fn get(&self, _guid: Guid, _name: &str) -> Result<(Vec<u8>, u32), VarError> {
        Err(VarError::Unavailable)
    }

    fn set(&self, _guid: Guid, _name: &str, _data: &[u8], _attrs: u32) -> Result<(), VarError> {
        Err(VarError::Unavailable)
    }

    fn new_file_device_path(
        &self,
        _path: &Path,
        _mode: DevicePathMode,
    ) -> Result<DevicePath, VarError> {
        Err(VarError::Unavailable)
    }
}
