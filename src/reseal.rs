// CLASSIFICATION: COMMUNITY
// Filename: reseal.rs v0.5
// Date Modified: 2026-07-31
// Author: Lukas Bower

//! Sealed-key resealing pipeline.
//!
//! Rebinds the sealed disk-encryption key to a PCR 4+7+12 profile covering
//! the shim and kernel images that may take part in the next boots. Every
//! image the profile references is read through a verifying wrapper: leaf
//! hashes are computed as the policy services read the file, folded into a
//! root on close and checked against the trusted-assets store. The profile
//! is rejected outright if any image is untrusted or any handle is leaked.

use std::cell::{Cell, RefCell};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::assets::{fold_root, TrustedAssets};
use crate::context::CoreContext;
use crate::error::Error;
use crate::fs::{clean_path, Fs};
use crate::hashed_file::HashedFile;
use crate::kernel::KernelManager;
use crate::profile::{PcrAlg, PcrProtectionProfile};
use crate::secboot::{AuxKeySource, Keyring, SealedKey, SecbootPolicy, Tpm, TpmSession as _};

/// Sealed-key file, relative to the ESP.
pub const SEALED_KEY_PATH: &str = "device/fde/cloudimg-rootfs.sealed-key";

const KEYRING_PREFIX: &str = "ubuntu-fde";
const ROOTFS_LABEL: &str = "cloudimg-rootfs-enc";
const BY_LABEL_DIR: &str = "/dev/disk/by-label";
const BY_PARTUUID_DIR: &str = "/dev/disk/by-partuuid";

/// The injected service set the pipeline runs against.
pub struct Services<'a> {
    /// Secure-boot policy composition.
    pub policy: &'a dyn SecbootPolicy,
    /// Auxiliary policy key retrieval.
    pub aux_key: &'a dyn AuxKeySource,
    /// Kernel keyring plumbing.
    pub keyring: &'a dyn Keyring,
    /// TPM device access.
    pub tpm: &'a dyn Tpm,
}

/// Shared bookkeeping for one profile computation: the trusted root set,
/// the open-handle count and the paths that failed verification.
pub struct ProfileContext {
    trusted: Vec<[u8; 32]>,
    n_open: Cell<i64>,
    failed_paths: RefCell<Vec<PathBuf>>,
}

impl ProfileContext {
    /// Start a computation trusting the store's current root set.
    pub fn new(assets: &TrustedAssets) -> Rc<Self> {
        Rc::new(Self {
            trusted: assets.loaded().to_vec(),
            n_open: Cell::new(0),
            failed_paths: RefCell::new(Vec::new()),
        })
    }

    /// Handles opened and not yet closed.
    pub fn open_count(&self) -> i64 {
        self.n_open.get()
    }

    /// Paths whose root hash was not trusted.
    pub fn failed_paths(&self) -> Vec<PathBuf> {
        self.failed_paths.borrow().clone()
    }
}

/// What loads an image, for measurement purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageSource {
    /// Loaded by the firmware boot manager.
    Firmware,
    /// Chain-loaded by the shim.
    Shim,
}

/// A boot image the policy services may open and read.
#[derive(Clone)]
pub struct TrustedImage {
    context: Rc<ProfileContext>,
    fs: Rc<dyn Fs>,
    path: PathBuf,
}

impl TrustedImage {
    /// Describe the image at `path`.
    pub fn new(context: Rc<ProfileContext>, fs: Rc<dyn Fs>, path: PathBuf) -> Self {
        Self { context, fs, path }
    }

    /// The image path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open for verified reading. The handle counts toward the leak check
    /// until [`VerifiedImage::close`].
    pub fn open(&self) -> io::Result<VerifiedImage> {
        let file = self.fs.open(&self.path)?;
        self.context.n_open.set(self.context.n_open.get() + 1);
        Ok(VerifiedImage {
            context: self.context.clone(),
            hashed: HashedFile::new(file),
        })
    }
}

/// An open image handle with block-granular verification.
pub struct VerifiedImage {
    context: Rc<ProfileContext>,
    hashed: HashedFile,
}

impl VerifiedImage {
    /// Read up to `buf.len()` bytes at `off`.
    pub fn read_at(&mut self, buf: &mut [u8], off: u64) -> io::Result<usize> {
        self.hashed.read_at(buf, off)
    }

    /// Image size in bytes.
    pub fn size(&self) -> u64 {
        self.hashed.size()
    }

    /// Finish verification. Blocks never read are hashed now; an untrusted
    /// root records the path as failed but the close itself succeeds.
    pub fn close(self) -> io::Result<()> {
        let path = self.hashed.path().to_path_buf();
        let result = self.hashed.finish();
        self.context.n_open.set(self.context.n_open.get() - 1);

        let leaves = result?;
        if !self.context.trusted.contains(&fold_root(&leaves)) {
            self.context.failed_paths.borrow_mut().push(path);
        }
        Ok(())
    }
}

/// One step of a measured load sequence.
#[derive(Clone)]
pub struct ImageLoadEvent {
    /// Who loads the image.
    pub source: ImageSource,
    /// The image itself.
    pub image: TrustedImage,
    /// Images this one may load next.
    pub next: Vec<ImageLoadEvent>,
}

/// Follow symlinks until `path` names a real file.
pub fn resolve_link(fs: &dyn Fs, path: &Path) -> io::Result<PathBuf> {
    let mut current = clean_path(path);
    loop {
        match fs.read_link(&current) {
            Ok(target) => {
                let next = if target.is_absolute() {
                    target
                } else {
                    current
                        .parent()
                        .unwrap_or_else(|| Path::new("/"))
                        .join(target)
                };
                current = clean_path(&next);
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => return Ok(current),
            Err(e) => return Err(e),
        }
    }
}

fn is_kernel_key_not_found(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<Error>(), Some(Error::KernelKeyNotFound))
}

/// Resolve the encrypted rootfs device and fetch its auxiliary policy key
/// from the kernel keyring.
fn get_policy_auth_key(ctx: &CoreContext, services: &Services<'_>) -> Result<Vec<u8>> {
    let device = resolve_link(
        ctx.fs.as_ref(),
        &Path::new(BY_LABEL_DIR).join(ROOTFS_LABEL),
    )
    .context("cannot resolve device symlink")?;

    // System services get a session keyring without the user keyring
    // linked, and possessor-read keys are invisible through it.
    services
        .keyring
        .link_user_into_process()
        .context("cannot link user keyring into process keyring")?;

    let mut key = services.aux_key.get_auxiliary_key(KEYRING_PREFIX, &device);

    let not_found = key
        .as_ref()
        .err()
        .is_some_and(is_kernel_key_not_found);
    if not_found {
        // The kernel registers the key under whichever /dev/disk alias it
        // was unlocked with; try the partuuid aliases of the same device.
        if let Ok(entries) = ctx.fs.read_dir(Path::new(BY_PARTUUID_DIR)) {
            for entry in entries {
                let alias = Path::new(BY_PARTUUID_DIR).join(&entry.name);
                let Ok(resolved) = resolve_link(ctx.fs.as_ref(), &alias) else {
                    continue;
                };
                if resolved == device {
                    key = services.aux_key.get_auxiliary_key(KEYRING_PREFIX, &alias);
                    break;
                }
            }
        }
    }

    key.context("cannot read key from kernel")
}

/// Compose the PCR 4+7+12 profile for `load_sequences`.
fn compute_pcr_protection_profile(
    services: &Services<'_>,
    load_sequences: &[ImageLoadEvent],
) -> Result<PcrProtectionProfile> {
    let mut profile = PcrProtectionProfile::new();

    services
        .policy
        .add_boot_manager_profile(&mut profile, load_sequences)
        .context("cannot add EFI boot manager profile")?;
    services
        .policy
        .add_secure_boot_policy_profile(&mut profile, load_sequences)
        .context("cannot add EFI secure boot policy profile")?;

    profile.add_pcr_value(PcrAlg::Sha256, 12, vec![0u8; PcrAlg::Sha256.size()]);
    // snap-bootstrap measures an epoch.
    let epoch = Sha256::digest(0u32.to_le_bytes());
    profile.extend_pcr(PcrAlg::Sha256, 12, epoch.to_vec());

    for ((alg, pcr), value) in profile.compute_pcr_values() {
        log::debug!("PCR{pcr},{alg:?}: {}", hex_string(&value));
    }

    Ok(profile)
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Rebind the sealed key's PCR policy to the current shim and kernel set.
///
/// A missing sealed-key file means the system does not use full-disk
/// encryption and there is nothing to do. The profile covers both shim
/// copies (package source and ESP) chain-loading every source and target
/// kernel, so it holds across the surrounding install or cleanup.
pub fn reseal_key(
    ctx: &CoreContext,
    services: &Services<'_>,
    assets: &TrustedAssets,
    km: &KernelManager,
    esp: &Path,
    shim_source: &Path,
    vendor: &str,
) -> Result<()> {
    let key_path = esp.join(SEALED_KEY_PATH);
    if ctx.fs.stat(&key_path).is_err() {
        return Ok(());
    }

    let context = ProfileContext::new(assets);
    let shim_base = format!("shim{}.efi", ctx.arch);

    let mut roots = Vec::new();
    for path in [
        shim_source.join(format!("{shim_base}.signed")),
        esp.join("EFI").join(vendor).join(&shim_base),
    ] {
        if ctx.fs.stat(&path).is_err() {
            continue;
        }
        roots.push(ImageLoadEvent {
            source: ImageSource::Firmware,
            image: TrustedImage::new(context.clone(), ctx.fs.clone(), path),
            next: Vec::new(),
        });
    }

    let mut kernels = Vec::new();
    for (dir, files) in [
        (km.source_dir(), km.source_kernels()),
        (km.target_dir(), km.target_kernels()),
    ] {
        for name in files {
            kernels.push(ImageLoadEvent {
                source: ImageSource::Shim,
                image: TrustedImage::new(context.clone(), ctx.fs.clone(), dir.join(name)),
                next: Vec::new(),
            });
        }
    }
    for root in &mut roots {
        root.next = kernels.clone();
    }

    let auth_key =
        get_policy_auth_key(ctx, services).context("cannot obtain auth key from kernel")?;

    let profile = compute_pcr_protection_profile(services, &roots)
        .context("cannot compute PCR profile")?;

    if context.open_count() != 0 {
        return Err(Error::LeakedFiles.into());
    }
    let failed_paths = context.failed_paths();
    if !failed_paths.is_empty() {
        return Err(Error::UntrustedAssets(failed_paths).into());
    }

    let mut raw = Vec::new();
    ctx.fs
        .open(&key_path)
        .and_then(|mut f| f.read_to_end(&mut raw))
        .context("cannot read sealed key file")?;
    let mut key = SealedKey(raw);

    let session = services.tpm.connect()?;
    session
        .update_pcr_policy(&mut key, &auth_key, &profile)
        .context("cannot update PCR profile")?;

    let key_dir = key_path.parent().expect("sealed key path has a parent");
    (|| -> Result<()> {
        let mut writer = ctx.fs.temp_file(key_dir, ".sealed-key")?;
        writer.write_all(&key.0)?;
        writer.flush()?;
        let tmp_path = writer.path().to_path_buf();
        drop(writer);
        ctx.fs.rename(&tmp_path, &key_path)?;
        Ok(())
    })()
    .context("cannot write updated sealed key object")?;

    Ok(())
}
