// CLASSIFICATION: COMMUNITY
// Filename: bootmgr.rs v0.4
// Date Modified: 2026-07-28
// Author: Lukas Bower

//! Boot device selection menu entries (Boot0000...BootFFFE).
//!
//! The boot manager mirrors the firmware state in memory: every valid
//! `Boot####` variable under the global GUID plus the parsed `BootOrder`.
//! Variable writes happen immediately; `BootOrder` writes are coalesced
//! through [`BootManager::prepend_and_set_boot_order`] so a batch of entry
//! deletions costs one firmware write.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};

use efivar_wire::{LoadOption, BOOT_VARIABLE_ATTRIBUTES, LOAD_OPTION_ACTIVE};

use crate::context::CoreContext;
use crate::efivars::{DevicePathMode, EfiVariables as _, VarError, GUID_GLOBAL};
use crate::error::Error;
use crate::shim::BootEntry;

/// Indices run 0..=0xFFFE; BootFFFF is reserved.
const MAX_BOOT_ENTRIES: u32 = 65535;

/// One `Boot####` variable and its parsed payload.
#[derive(Clone, Debug)]
pub struct BootEntryVariable {
    /// Variable index; 4 for `Boot0004`.
    pub boot_number: u16,
    /// Raw variable payload.
    pub data: Vec<u8>,
    /// Variable attributes.
    pub attributes: u32,
    /// The payload parsed as a load option.
    pub load_option: LoadOption,
}

/// In-memory mirror of the firmware boot menu.
#[derive(Debug, Default)]
pub struct BootManager {
    entries: BTreeMap<u16, BootEntryVariable>,
    boot_order: Vec<u16>,
    boot_order_attrs: Option<u32>,
}

impl BootManager {
    /// Read the boot menu from the variable store.
    ///
    /// Fails with [`Error::Unavailable`] when the host has no variable
    /// store. `Boot####` payloads that do not validate as load options are
    /// logged and skipped.
    pub fn load(ctx: &CoreContext) -> Result<Self> {
        let descriptors = match ctx.vars.list() {
            Ok(descriptors) => descriptors,
            Err(VarError::Unavailable) => {
                return Err(Error::Unavailable).context("cannot enumerate variables")
            }
            Err(e) => return Err(e).context("cannot enumerate variables"),
        };

        let mut manager = Self::default();

        match ctx.vars.get(GUID_GLOBAL, "BootOrder") {
            Ok((data, attrs)) => {
                manager.boot_order = decode_boot_order(&data);
                manager.boot_order_attrs = Some(attrs);
            }
            Err(VarError::NotExist) => {}
            Err(e) => return Err(e).context("cannot read BootOrder"),
        }

        for descriptor in descriptors {
            if descriptor.guid != GUID_GLOBAL {
                continue;
            }
            let Some(boot_number) = parse_boot_variable_name(&descriptor.name) else {
                continue;
            };
            let (data, attributes) = ctx
                .vars
                .get(GUID_GLOBAL, &descriptor.name)
                .with_context(|| format!("cannot read {}", descriptor.name))?;
            let load_option = match LoadOption::decode(&data) {
                Ok(load_option) => load_option,
                Err(e) => {
                    log::warn!("invalid boot entry Boot{boot_number:04X}: {e}");
                    continue;
                }
            };
            manager.entries.insert(
                boot_number,
                BootEntryVariable {
                    boot_number,
                    data,
                    attributes,
                    load_option,
                },
            );
        }

        Ok(manager)
    }

    /// The parsed entries by index.
    pub fn entries(&self) -> &BTreeMap<u16, BootEntryVariable> {
        &self.entries
    }

    /// The cached `BootOrder` list.
    pub fn boot_order(&self) -> &[u16] {
        &self.boot_order
    }

    /// The lowest unused `Boot####` index.
    pub fn next_free_entry(&self) -> Result<u16> {
        for candidate in 0..MAX_BOOT_ENTRIES {
            let candidate = candidate as u16;
            if !self.entries.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(Error::EntryExhausted.into())
    }

    /// Find the entry equal to `entry`, or create it at the lowest free
    /// index. Identity is byte-equality of the encoded load option plus
    /// equal variable attributes, so an unchanged entry never writes.
    pub fn find_or_create_entry(
        &mut self,
        ctx: &CoreContext,
        entry: &BootEntry,
        relative_to: &Path,
    ) -> Result<u16> {
        let device_path = ctx
            .vars
            .new_file_device_path(&relative_to.join(&entry.filename), DevicePathMode::ShortForm)
            .with_context(|| format!("cannot build device path for {}", entry.filename))?;
        let optional_data = efivar_wire::ucs2::encode_nul_terminated(&entry.options);
        let load_option = LoadOption::encode(
            LOAD_OPTION_ACTIVE,
            &entry.label,
            &device_path,
            &optional_data,
        );

        for existing in self.entries.values() {
            if existing.data == load_option.as_bytes()
                && existing.attributes == BOOT_VARIABLE_ATTRIBUTES
            {
                return Ok(existing.boot_number);
            }
        }

        let boot_number = self.next_free_entry()?;
        let name = format!("Boot{boot_number:04X}");
        log::info!("adding boot entry {name}");
        ctx.vars
            .set(
                GUID_GLOBAL,
                &name,
                load_option.as_bytes(),
                BOOT_VARIABLE_ATTRIBUTES,
            )
            .with_context(|| format!("cannot write {name}"))?;

        self.entries.insert(
            boot_number,
            BootEntryVariable {
                boot_number,
                data: load_option.as_bytes().to_vec(),
                attributes: BOOT_VARIABLE_ATTRIBUTES,
                load_option,
            },
        );
        Ok(boot_number)
    }

    /// Delete `Boot####` number `boot_number`.
    ///
    /// The in-memory order is filtered immediately; the `BootOrder`
    /// variable itself is only rewritten by the next
    /// [`Self::prepend_and_set_boot_order`].
    pub fn delete_entry(&mut self, ctx: &CoreContext, boot_number: u16) -> Result<()> {
        if !self.entries.contains_key(&boot_number) {
            return Err(Error::UnknownEntry(boot_number).into());
        }
        let name = format!("Boot{boot_number:04X}");
        ctx.vars
            .set(GUID_GLOBAL, &name, &[], 0)
            .with_context(|| format!("cannot delete {name}"))?;
        self.entries.remove(&boot_number);
        self.boot_order.retain(|&n| n != boot_number);
        Ok(())
    }

    /// Write `BootOrder` as `head` followed by the current order, keeping
    /// the first occurrence of each index and only indices that still have
    /// an entry. Previously observed variable attributes are preserved.
    pub fn prepend_and_set_boot_order(&mut self, ctx: &CoreContext, head: &[u16]) -> Result<()> {
        let mut new_order: Vec<u16> = Vec::new();
        for &number in head.iter().chain(self.boot_order.iter()) {
            if new_order.contains(&number) || !self.entries.contains_key(&number) {
                continue;
            }
            new_order.push(number);
        }

        if new_order == self.boot_order && self.boot_order_attrs.is_some() {
            return Ok(());
        }

        let data = encode_boot_order(&new_order);
        let attrs = self.boot_order_attrs.unwrap_or(BOOT_VARIABLE_ATTRIBUTES);
        if data.is_empty() {
            // An empty write means delete; only do so if the variable is
            // actually there.
            match ctx.vars.set(GUID_GLOBAL, "BootOrder", &data, attrs) {
                Ok(()) | Err(VarError::NotExist) => {}
                Err(e) => return Err(e).context("cannot write BootOrder"),
            }
        } else {
            ctx.vars
                .set(GUID_GLOBAL, "BootOrder", &data, attrs)
                .context("cannot write BootOrder")?;
        }
        self.boot_order = new_order;
        self.boot_order_attrs = Some(attrs);
        Ok(())
    }

    /// Indices of entries whose device path names `basename`.
    pub fn entries_with_path_basename(&self, basename: &str) -> Vec<u16> {
        self.entries
            .values()
            .filter(|entry| {
                entry
                    .load_option
                    .device_path()
                    .file_path_basename()
                    .is_some_and(|b| b == basename)
            })
            .map(|entry| entry.boot_number)
            .collect()
    }
}

/// `Boot####` with exactly four uppercase hex digits.
fn parse_boot_variable_name(name: &str) -> Option<u16> {
    let digits = name.strip_prefix("Boot")?;
    if digits.len() != 4
        || !digits
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
    {
        return None;
    }
    u16::from_str_radix(digits, 16).ok()
}

/// Decode `BootOrder` as little-endian 16-bit indices.
///
/// Kept separate from the manager so the endianness could be swapped in
/// one place should firmware with the other byte order ever surface.
pub fn decode_boot_order(data: &[u8]) -> Vec<u16> {
    data.chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode a `BootOrder` list as little-endian 16-bit indices.
pub fn encode_boot_order(order: &[u16]) -> Vec<u8> {
    order.iter().flat_map(|n| n.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::efivars::mock::{MockEfiVariables, NoEfiVariables};
    use crate::fs::mem::MemFs;
    use crate::EfiArch;
    use std::rc::Rc;

    // A firmware-created USB CD-ROM entry, attributes 9.
    pub const USBR_BOOT_CDROM: &[u8] = &[
        9, 0, 0, 0, 28, 0, 85, 0, 83, 0, 66, 0, 82, 0, 32, 0, 66, 0, 79, 0, 79, 0, 84, 0, 32, 0,
        67, 0, 68, 0, 82, 0, 79, 0, 77, 0, 0, 0, 2, 1, 12, 0, 208, 65, 3, 10, 0, 0, 0, 0, 1, 1, 6,
        0, 0, 20, 3, 5, 6, 0, 11, 1, 127, 255, 4, 0,
    ];

    fn context() -> (MemFs, Rc<MockEfiVariables>, CoreContext) {
        let fs = MemFs::new();
        let vars = Rc::new(MockEfiVariables::new(Rc::new(fs.clone())));
        let ctx = CoreContext::with_arch(Rc::new(fs.clone()), vars.clone(), EfiArch::X64);
        (fs, vars, ctx)
    }

    fn entry(filename: &str, label: &str, options: &str) -> BootEntry {
        BootEntry {
            filename: filename.into(),
            label: label.into(),
            options: options.into(),
            description: String::new(),
        }
    }

    #[test]
    fn load_parses_entries_and_order() {
        let (_fs, vars, ctx) = context();
        vars.insert(GUID_GLOBAL, "BootOrder", &[1, 0, 2, 0, 3, 0], 123);
        vars.insert(GUID_GLOBAL, "Boot0001", USBR_BOOT_CDROM, 42);
        vars.insert(GUID_GLOBAL, "Boot0002", &[0, 1], 7);
        vars.insert(GUID_GLOBAL, "BootABCD", USBR_BOOT_CDROM, 7);
        vars.insert(GUID_GLOBAL, "Bootabcd", USBR_BOOT_CDROM, 7);
        vars.insert(GUID_GLOBAL, "BootNext", &[1, 0], 7);

        let manager = BootManager::load(&ctx).unwrap();

        assert_eq!(manager.boot_order(), [1, 2, 3]);
        // Boot0002 is malformed, Bootabcd is not a boot entry name.
        let numbers: Vec<u16> = manager.entries().keys().copied().collect();
        assert_eq!(numbers, [1, 0xABCD]);
        assert_eq!(
            manager.entries()[&1].load_option.description(),
            "USBR BOOT CDROM"
        );
        assert_eq!(manager.entries()[&1].attributes, 42);
    }

    #[test]
    fn load_unsupported_host() {
        let fs = MemFs::new();
        let ctx =
            CoreContext::with_arch(Rc::new(fs), Rc::new(NoEfiVariables), EfiArch::X64);
        let err = BootManager::load(&ctx).unwrap_err();
        assert!(matches!(err.downcast_ref(), Some(Error::Unavailable)));
    }

    #[test]
    fn find_or_create_allocates_lowest_free_index() {
        let (fs, vars, ctx) = context();
        fs.write_file("/esp/EFI/ubuntu/kernel.efi-1.0-1-generic", b"k1");
        vars.insert(GUID_GLOBAL, "Boot0001", USBR_BOOT_CDROM, 42);

        let mut manager = BootManager::load(&ctx).unwrap();
        let first = manager
            .find_or_create_entry(
                &ctx,
                &entry("kernel.efi-1.0-1-generic", "Ubuntu with kernel 1.0-1-generic", ""),
                Path::new("/esp/EFI/ubuntu"),
            )
            .unwrap();
        assert_eq!(first, 0);
        assert!(vars.contains(GUID_GLOBAL, "Boot0000"));

        let (data, attrs) = vars.get(GUID_GLOBAL, "Boot0000").unwrap();
        assert_eq!(attrs, BOOT_VARIABLE_ATTRIBUTES);
        let written = LoadOption::decode(&data).unwrap();
        assert_eq!(written.description(), "Ubuntu with kernel 1.0-1-generic");
        assert_eq!(
            written.device_path().file_path_basename().unwrap(),
            "kernel.efi-1.0-1-generic"
        );
        assert_eq!(written.optional_data(), [0, 0]);

        // Same entry again: found, not duplicated.
        let again = manager
            .find_or_create_entry(
                &ctx,
                &entry("kernel.efi-1.0-1-generic", "Ubuntu with kernel 1.0-1-generic", ""),
                Path::new("/esp/EFI/ubuntu"),
            )
            .unwrap();
        assert_eq!(again, 0);
        assert_eq!(vars.len(), 2);

        // A different command line is a different entry.
        let other = manager
            .find_or_create_entry(
                &ctx,
                &entry(
                    "kernel.efi-1.0-1-generic",
                    "Ubuntu with kernel 1.0-1-generic",
                    "\\kernel.efi-1.0-1-generic root=magic",
                ),
                Path::new("/esp/EFI/ubuntu"),
            )
            .unwrap();
        assert_eq!(other, 2);
    }

    #[test]
    fn delete_entry_removes_variable_and_filters_order() {
        let (fs, vars, ctx) = context();
        fs.write_file("/esp/EFI/ubuntu/kernel.efi-1.0-1-generic", b"k1");
        vars.insert(GUID_GLOBAL, "BootOrder", &[0, 0, 1, 0], 123);
        vars.insert(GUID_GLOBAL, "Boot0001", USBR_BOOT_CDROM, 42);

        let mut manager = BootManager::load(&ctx).unwrap();
        let n = manager
            .find_or_create_entry(
                &ctx,
                &entry("kernel.efi-1.0-1-generic", "entry", ""),
                Path::new("/esp/EFI/ubuntu"),
            )
            .unwrap();
        assert_eq!(n, 0);

        manager.delete_entry(&ctx, 0).unwrap();
        assert!(!vars.contains(GUID_GLOBAL, "Boot0000"));
        assert_eq!(manager.boot_order(), [1]);
        // The variable write is deferred to the next order commit.
        assert_eq!(vars.get(GUID_GLOBAL, "BootOrder").unwrap().0, [0, 0, 1, 0]);

        let err = manager.delete_entry(&ctx, 0).unwrap_err();
        assert!(matches!(err.downcast_ref(), Some(Error::UnknownEntry(0))));
    }

    #[test]
    fn prepend_dedups_and_drops_missing_entries() {
        let (fs, vars, ctx) = context();
        fs.write_file("/esp/EFI/ubuntu/kernel.efi-1.0-1-generic", b"k1");
        vars.insert(GUID_GLOBAL, "BootOrder", &[1, 0, 2, 0, 3, 0], 123);
        vars.insert(GUID_GLOBAL, "Boot0001", USBR_BOOT_CDROM, 42);

        let mut manager = BootManager::load(&ctx).unwrap();
        let n = manager
            .find_or_create_entry(
                &ctx,
                &entry("kernel.efi-1.0-1-generic", "entry", ""),
                Path::new("/esp/EFI/ubuntu"),
            )
            .unwrap();

        manager.prepend_and_set_boot_order(&ctx, &[n]).unwrap();

        assert_eq!(manager.boot_order(), [0, 1]);
        let (data, attrs) = vars.get(GUID_GLOBAL, "BootOrder").unwrap();
        assert_eq!(decode_boot_order(&data), [0, 1]);
        // Attributes observed at load time are preserved.
        assert_eq!(attrs, 123);
    }

    #[test]
    fn boot_order_codec_is_little_endian() {
        assert_eq!(decode_boot_order(&[1, 0, 0x34, 0x12]), [1, 0x1234]);
        assert_eq!(encode_boot_order(&[1, 0x1234]), [1, 0, 0x34, 0x12]);
        // A trailing odd byte is ignored.
        assert_eq!(decode_boot_order(&[1, 0, 9]), [1]);
    }

    #[test]
    fn entry_lookup_by_device_path_basename() {
        let (fs, _vars, ctx) = context();
        fs.write_file("/esp/EFI/ubuntu/kernel.efi-1.0-1-generic", b"k1");
        fs.write_file("/esp/EFI/ubuntu/kernel.efi-1.0-2-generic", b"k2");

        let mut manager = BootManager::load(&ctx).unwrap();
        let a = manager
            .find_or_create_entry(
                &ctx,
                &entry("kernel.efi-1.0-1-generic", "one", ""),
                Path::new("/esp/EFI/ubuntu"),
            )
            .unwrap();
        let b = manager
            .find_or_create_entry(
                &ctx,
                &entry("kernel.efi-1.0-2-generic", "two", ""),
                Path::new("/esp/EFI/ubuntu"),
            )
            .unwrap();

        assert_eq!(
            manager.entries_with_path_basename("kernel.efi-1.0-1-generic"),
            [a]
        );
        assert_eq!(
            manager.entries_with_path_basename("kernel.efi-1.0-2-generic"),
            [b]
        );
        assert!(manager.entries_with_path_basename("missing").is_empty());
    }
}
