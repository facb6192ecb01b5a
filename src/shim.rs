// CLASSIFICATION: COMMUNITY
// Filename: shim.rs v0.3
// Date Modified: 2026-07-26
// Author: Lukas Bower

//! Shim installation and the shim fallback CSV.
//!
//! The fallback loader reads `BOOT<ARCH>.CSV` from the vendor directory and
//! recreates boot variables from it when the firmware lost them. The file
//! is UTF-16LE without a byte-order mark, one record per line, four
//! comma-separated fields. Commas cannot be escaped in this format, so a
//! field containing one is a hard error.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::context::CoreContext;
use crate::error::Error;
use crate::fs::{maybe_update_file, Fs as _};

/// A logical boot entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootEntry {
    /// Base name of the file the entry boots, relative to the vendor
    /// directory.
    pub filename: String,
    /// Human-readable label.
    pub label: String,
    /// Space-separated kernel command line options.
    pub options: String,
    /// Descriptive text.
    pub description: String,
}

/// Serialize `entries` as fallback CSV records into `writer`, encoding as
/// UTF-16LE without a byte-order mark.
pub fn write_shim_fallback(writer: &mut dyn Write, entries: &[BootEntry]) -> Result<()> {
    for entry in entries {
        if entry.filename.contains(',')
            || entry.label.contains(',')
            || entry.options.contains(',')
            || entry.description.contains(',')
        {
            return Err(Error::CsvComma(entry.label.clone()).into());
        }

        let record = format!(
            "{},{},{},{}\n",
            entry.filename, entry.label, entry.options, entry.description
        );
        writer
            .write_all(&efivar_wire::ucs2::encode(&record))
            .with_context(|| format!("cannot write entry '{}' to file", entry.label))?;
    }
    Ok(())
}

/// Install the signed shim and its support files into the vendor directory.
///
/// `shim<arch>.efi.signed` from `shim_source` becomes
/// `<esp>/EFI/<vendor>/shim<arch>.efi`; the `fb`/`mm` support binaries are
/// carried over under their own names when the source ships them. Returns
/// whether anything was rewritten.
pub fn install_shim(ctx: &CoreContext, esp: &Path, shim_source: &Path, vendor: &str) -> Result<bool> {
    let arch = ctx.arch.as_str();
    let vendor_dir = esp.join("EFI").join(vendor);
    ctx.fs
        .mkdir_all(&vendor_dir, 0o755)
        .with_context(|| format!("cannot create {}", vendor_dir.display()))?;

    let shim_base = format!("shim{arch}.efi");
    let mut updated = maybe_update_file(
        ctx.fs.as_ref(),
        &vendor_dir.join(&shim_base),
        &shim_source.join(format!("{shim_base}.signed")),
    )
    .with_context(|| format!("cannot install {shim_base}"))?;

    for support in [format!("fb{arch}.efi"), format!("mm{arch}.efi")] {
        let source = shim_source.join(&support);
        if ctx.fs.stat(&source).is_err() {
            continue;
        }
        updated |= maybe_update_file(ctx.fs.as_ref(), &vendor_dir.join(&support), &source)
            .with_context(|| format!("cannot install {support}"))?;
    }

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::efivars::mock::MockEfiVariables;
    use crate::fs::mem::MemFs;
    use crate::EfiArch;
    use std::rc::Rc;

    fn context() -> (MemFs, CoreContext) {
        let fs = MemFs::new();
        let vars = MockEfiVariables::new(Rc::new(fs.clone()));
        let ctx = CoreContext::with_arch(Rc::new(fs.clone()), Rc::new(vars), EfiArch::X64);
        (fs, ctx)
    }

    fn entry(filename: &str, label: &str, options: &str, description: &str) -> BootEntry {
        BootEntry {
            filename: filename.into(),
            label: label.into(),
            options: options.into(),
            description: description.into(),
        }
    }

    #[test]
    fn records_are_utf16le_without_bom() {
        let mut out = Vec::new();
        write_shim_fallback(
            &mut out,
            &[entry("grubx64.efi", "ubuntu", "", "This is the boot entry for Ubuntu")],
        )
        .unwrap();

        let expected = "grubx64.efi,ubuntu,,This is the boot entry for Ubuntu\n";
        assert_eq!(out, efivar_wire::ucs2::encode(expected));
        assert_ne!(&out[..2], [0xff, 0xfe]);
    }

    #[test]
    fn comma_in_any_field_is_rejected() {
        for bad in [
            entry("a,b", "l", "o", "d"),
            entry("f", "l,", "o", "d"),
            entry("f", "l", "o,o", "d"),
            entry("f", "l", "o", ",d"),
        ] {
            let mut out = Vec::new();
            let err = write_shim_fallback(&mut out, &[bad]).unwrap_err();
            assert!(matches!(err.downcast_ref(), Some(Error::CsvComma(_))));
            assert!(out.is_empty());
        }
    }

    #[test]
    fn install_shim_copies_signed_and_support_files() {
        let (fs, ctx) = context();
        fs.write_file("/usr/lib/sealboot/shim/shimx64.efi.signed", b"shim2");
        fs.write_file("/usr/lib/sealboot/shim/mmx64.efi", b"mok manager");
        fs.write_file("/boot/efi/EFI/ubuntu/shimx64.efi", b"shim1");

        let updated = install_shim(
            &ctx,
            Path::new("/boot/efi"),
            Path::new("/usr/lib/sealboot/shim"),
            "ubuntu",
        )
        .unwrap();

        assert!(updated);
        assert_eq!(fs.read_file("/boot/efi/EFI/ubuntu/shimx64.efi").unwrap(), b"shim2");
        assert_eq!(
            fs.read_file("/boot/efi/EFI/ubuntu/mmx64.efi").unwrap(),
            b"mok manager"
        );
        assert!(fs.read_file("/boot/efi/EFI/ubuntu/fbx64.efi").is_err());
    }

    #[test]
    fn install_shim_is_idempotent() {
        let (fs, ctx) = context();
        fs.write_file("/usr/lib/sealboot/shim/shimx64.efi.signed", b"shim1");
        fs.write_file("/boot/efi/EFI/ubuntu/shimx64.efi", b"shim1");

        let updated = install_shim(
            &ctx,
            Path::new("/boot/efi"),
            Path::new("/usr/lib/sealboot/shim"),
            "ubuntu",
        )
        .unwrap();
        assert!(!updated);
    }
}
