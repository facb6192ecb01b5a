// CLASSIFICATION: COMMUNITY
// Filename: kernel.rs v0.5
// Date Modified: 2026-07-29
// Author: Lukas Bower

//! Kernel discovery, installation and boot-loader commit.
//!
//! Kernels are versioned files named `kernel.efi-<version>-<flavor>` in a
//! package-managed source directory. The manager mirrors them into the
//! vendor directory on the ESP, keeps one boot variable per installed
//! kernel (newest first in `BootOrder`) and maintains the shim fallback
//! CSV. Cleanup removes target kernels the source no longer ships,
//! together with their boot variables.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::bootmgr::BootManager;
use crate::context::CoreContext;
use crate::fs::{maybe_update_file, Fs as _};
use crate::shim::{write_shim_fallback, BootEntry};
use crate::version::DebVersion;

/// File-name prefix of installable kernels.
pub const KERNEL_PREFIX: &str = "kernel.efi-";

/// Path of the kernel command line consumed at commit time.
pub const CMDLINE_PATH: &str = "/etc/kernel/cmdline";

/// Manager for the kernels of one vendor directory.
pub struct KernelManager {
    source_dir: PathBuf,
    target_dir: PathBuf,
    vendor: String,
    source_kernels: Vec<String>,
    target_kernels: Vec<String>,
    boot_manager: Option<BootManager>,
}

impl KernelManager {
    /// Discover kernels in `kernel_source_dir` and `esp/EFI/<vendor>`.
    ///
    /// Passing a [`BootManager`] makes commits maintain boot variables;
    /// without one only files and the fallback CSV are managed.
    pub fn new(
        ctx: &CoreContext,
        esp: &Path,
        kernel_source_dir: &Path,
        vendor: &str,
        boot_manager: Option<BootManager>,
    ) -> Result<Self> {
        let target_dir = esp.join("EFI").join(vendor);
        let source_kernels = list_kernels(ctx, kernel_source_dir)?;
        let target_kernels = list_kernels(ctx, &target_dir)?;
        Ok(Self {
            source_dir: kernel_source_dir.to_path_buf(),
            target_dir,
            vendor: vendor.to_string(),
            source_kernels,
            target_kernels,
            boot_manager,
        })
    }

    /// Kernels shipped by the package manager, newest first.
    pub fn source_kernels(&self) -> &[String] {
        &self.source_kernels
    }

    /// Kernels present on the ESP, newest first.
    pub fn target_kernels(&self) -> &[String] {
        &self.target_kernels
    }

    /// The package-managed kernel directory.
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// The vendor directory on the ESP.
    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// The wrapped boot manager, if any.
    pub fn boot_manager(&self) -> Option<&BootManager> {
        self.boot_manager.as_ref()
    }

    /// Copy source kernels into the target directory, newest first.
    /// Destinations that already hold identical content are untouched.
    pub fn install_kernels(&mut self, ctx: &CoreContext) -> Result<()> {
        ctx.fs
            .mkdir_all(&self.target_dir, 0o755)
            .with_context(|| format!("cannot create {}", self.target_dir.display()))?;

        for kernel in &self.source_kernels {
            let updated = maybe_update_file(
                ctx.fs.as_ref(),
                &self.target_dir.join(kernel),
                &self.source_dir.join(kernel),
            )
            .with_context(|| format!("cannot install {kernel}"))?;
            if updated {
                log::info!("installed {kernel}");
            }
        }

        self.target_kernels = list_kernels(ctx, &self.target_dir)?;
        Ok(())
    }

    /// Commit the installed kernels to the boot loader: one boot variable
    /// per kernel (newest first at the head of `BootOrder`), then the shim
    /// fallback CSV (oldest first, since the fallback loader registers
    /// entries in reverse).
    pub fn commit_to_boot_loader(&mut self, ctx: &CoreContext) -> Result<()> {
        let cmdline = read_cmdline(ctx)?;
        let vendor_cased = capitalize(&self.vendor);

        let entries: Vec<BootEntry> = self
            .source_kernels
            .iter()
            .map(|kernel| {
                let suffix = kernel.strip_prefix(KERNEL_PREFIX).unwrap_or(kernel);
                let options = if cmdline.is_empty() {
                    format!("\\{kernel}")
                } else {
                    format!("\\{kernel} {cmdline}")
                };
                BootEntry {
                    filename: kernel.clone(),
                    label: format!("{vendor_cased} with kernel {suffix}"),
                    options,
                    description: format!("{vendor_cased} entry for kernel {suffix}"),
                }
            })
            .collect();

        if let Some(boot_manager) = &mut self.boot_manager {
            let mut head = Vec::with_capacity(entries.len());
            for entry in &entries {
                let number = boot_manager
                    .find_or_create_entry(ctx, entry, &self.target_dir)
                    .with_context(|| format!("cannot commit entry '{}'", entry.label))?;
                head.push(number);
            }
            boot_manager
                .prepend_and_set_boot_order(ctx, &head)
                .context("cannot update boot order")?;
        }

        self.write_fallback_csv(ctx, &entries)
    }

    fn write_fallback_csv(&self, ctx: &CoreContext, entries: &[BootEntry]) -> Result<()> {
        let shim_base = format!("shim{}.efi", ctx.arch);
        let records: Vec<BootEntry> = entries
            .iter()
            .rev()
            .map(|entry| BootEntry {
                filename: shim_base.clone(),
                ..entry.clone()
            })
            .collect();

        let csv_path = self.target_dir.join(format!("BOOT{}.CSV", ctx.arch.upper()));
        let mut payload = Vec::new();
        write_shim_fallback(&mut payload, &records)
            .with_context(|| format!("cannot serialize {}", csv_path.display()))?;

        if let Ok(mut existing) = ctx.fs.open(&csv_path) {
            let mut current = Vec::new();
            if existing.read_to_end(&mut current).is_ok() && current == payload {
                return Ok(());
            }
        }

        let mut writer = ctx
            .fs
            .create(&csv_path)
            .with_context(|| format!("cannot create {}", csv_path.display()))?;
        writer
            .write_all(&payload)
            .with_context(|| format!("cannot write {}", csv_path.display()))?;
        writer.flush()?;
        Ok(())
    }

    /// Remove target kernels the source no longer ships, along with every
    /// boot variable whose device path names them. The resulting stale
    /// `BootOrder` is corrected by the next commit.
    pub fn remove_obsolete_kernels(&mut self, ctx: &CoreContext) -> Result<()> {
        for kernel in &self.target_kernels {
            if self.source_kernels.contains(kernel) {
                continue;
            }
            let path = self.target_dir.join(kernel);
            ctx.fs
                .remove(&path)
                .with_context(|| format!("cannot remove {}", path.display()))?;
            log::info!("removed obsolete kernel {kernel}");

            if let Some(boot_manager) = &mut self.boot_manager {
                for number in boot_manager.entries_with_path_basename(kernel) {
                    boot_manager
                        .delete_entry(ctx, number)
                        .with_context(|| format!("cannot delete Boot{number:04X}"))?;
                }
            }
        }

        self.target_kernels = list_kernels(ctx, &self.target_dir)?;
        Ok(())
    }
}

/// Enumerate the kernels of `dir`, sorted newest first by Debian version.
/// A missing directory is an empty list.
fn list_kernels(ctx: &CoreContext, dir: &Path) -> Result<Vec<String>> {
    let entries = match ctx.fs.read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("cannot enumerate {}", dir.display())),
    };

    let mut kernels: Vec<(DebVersion, String)> = Vec::new();
    for entry in entries {
        if entry.is_dir {
            continue;
        }
        let Some(suffix) = entry.name.strip_prefix(KERNEL_PREFIX) else {
            continue;
        };
        match DebVersion::parse(suffix) {
            Some(version) => kernels.push((version, entry.name)),
            None => log::warn!("skipping {}: unparsable version", entry.name),
        }
    }

    kernels.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(kernels.into_iter().map(|(_, name)| name).collect())
}

fn read_cmdline(ctx: &CoreContext) -> Result<String> {
    let mut raw = Vec::new();
    match ctx.fs.open(Path::new(CMDLINE_PATH)) {
        Ok(mut file) => {
            file.read_to_end(&mut raw)
                .with_context(|| format!("cannot read {CMDLINE_PATH}"))?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
        Err(e) => return Err(e).with_context(|| format!("cannot open {CMDLINE_PATH}")),
    }
    Ok(String::from_utf8_lossy(&raw).trim().to_string())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
