// CLASSIFICATION: COMMUNITY
// Filename: secboot.rs v0.3
// Date Modified: 2026-07-29
// Author: Lukas Bower

//! Injectable secure-boot, TPM and keyring services.
//!
//! The reseal pipeline depends on platform facilities this crate does not
//! implement: secure-boot policy composition, the TPM2 sealed-key
//! cryptography, the kernel keyring and Authenticode digests. Each is a
//! trait here; production wires platform implementations, tests substitute
//! fakes. The shipped host implementations cover what the platform allows
//! directly: keyring syscalls, the keyring-backed auxiliary key lookup and
//! the TPM device probe.

use std::path::Path;

use anyhow::Result;

use crate::error::Error;
use crate::fs::FsRead;
use crate::profile::PcrProtectionProfile;
use crate::reseal::ImageLoadEvent;

/// Composes secure-boot PCR profiles over image load sequences.
pub trait SecbootPolicy {
    /// Add the boot-manager (PCR 4) measurements for `load_sequences`.
    fn add_boot_manager_profile(
        &self,
        profile: &mut PcrProtectionProfile,
        load_sequences: &[ImageLoadEvent],
    ) -> Result<()>;

    /// Add the secure-boot policy (PCR 7) measurements for
    /// `load_sequences`.
    fn add_secure_boot_policy_profile(
        &self,
        profile: &mut PcrProtectionProfile,
        load_sequences: &[ImageLoadEvent],
    ) -> Result<()>;
}

/// Retrieves the auxiliary policy key for a block device.
pub trait AuxKeySource {
    /// Fetch the key registered under `prefix` for `device_path`. Fails
    /// with [`Error::KernelKeyNotFound`] when the keyring has no such key.
    fn get_auxiliary_key(&self, prefix: &str, device_path: &Path) -> Result<Vec<u8>>;
}

/// Kernel keyring plumbing.
pub trait Keyring {
    /// Link the user keyring into the process keyring so possessor-read
    /// keys become readable.
    fn link_user_into_process(&self) -> Result<()>;
}

/// An open TPM session.
pub trait TpmSession {
    /// Rebind `key`'s PCR policy to `profile`, authorized by `auth_key`.
    fn update_pcr_policy(
        &self,
        key: &mut SealedKey,
        auth_key: &[u8],
        profile: &PcrProtectionProfile,
    ) -> Result<()>;
}

/// TPM device access.
pub trait Tpm {
    /// Open a session. Fails with [`Error::NoTpm`] when the host has no
    /// usable device.
    fn connect(&self) -> Result<Box<dyn TpmSession>>;
}

/// Computes the Authenticode digest of a PE image.
pub trait PeDigest {
    /// SHA-256 Authenticode digest of `file`.
    fn compute_pe_digest(&self, file: &mut dyn FsRead) -> Result<Vec<u8>>;
}

/// An opaque sealed-key blob, rewritten whole on policy updates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedKey(pub Vec<u8>);

/// Default policy composition: measures every image of every load
/// sequence into the PCR by content digest.
///
/// This walks each image through its verified handle, which is what makes
/// the trust and leak checks of the pipeline effective. Deployments whose
/// firmware measures differently inject their own composition.
pub struct MeasuredBootPolicy;

impl MeasuredBootPolicy {
    fn measure(
        profile: &mut PcrProtectionProfile,
        pcr: u32,
        load_sequences: &[ImageLoadEvent],
    ) -> Result<()> {
        use crate::profile::PcrAlg;
        use sha2::{Digest, Sha256};

        for event in load_sequences {
            let mut file = event.image.open()?;
            let mut hasher = Sha256::new();
            let mut offset = 0u64;
            let mut buf = [0u8; 4096];
            loop {
                let n = file.read_at(&mut buf, offset)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                offset += n as u64;
            }
            file.close()?;
            profile.extend_pcr(PcrAlg::Sha256, pcr, hasher.finalize().to_vec());

            Self::measure(profile, pcr, &event.next)?;
        }
        Ok(())
    }
}

impl SecbootPolicy for MeasuredBootPolicy {
    fn add_boot_manager_profile(
        &self,
        profile: &mut PcrProtectionProfile,
        load_sequences: &[ImageLoadEvent],
    ) -> Result<()> {
        Self::measure(profile, 4, load_sequences)
    }

    fn add_secure_boot_policy_profile(
        &self,
        profile: &mut PcrProtectionProfile,
        load_sequences: &[ImageLoadEvent],
    ) -> Result<()> {
        Self::measure(profile, 7, load_sequences)
    }
}

const KEYCTL_LINK: libc::c_long = 8;
const KEYCTL_SEARCH: libc::c_long = 10;
const KEYCTL_READ: libc::c_long = 11;
const KEY_SPEC_PROCESS_KEYRING: libc::c_long = -2;
const KEY_SPEC_USER_KEYRING: libc::c_long = -4;

/// Keyring service over the real kernel keyring.
pub struct HostKeyring;

impl Keyring for HostKeyring {
    fn link_user_into_process(&self) -> Result<()> {
        // keyctl(KEYCTL_LINK, KEY_SPEC_USER_KEYRING, KEY_SPEC_PROCESS_KEYRING)
        let rc = unsafe {
            libc::syscall(
                libc::SYS_keyctl,
                KEYCTL_LINK,
                KEY_SPEC_USER_KEYRING,
                KEY_SPEC_PROCESS_KEYRING,
                0,
                0,
            )
        };
        if rc < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(())
    }
}

/// Auxiliary-key source over the kernel keyring: the key is a `user` key
/// named `<prefix>:<device>:aux` in the user keyring.
pub struct HostAuxKeySource;

impl AuxKeySource for HostAuxKeySource {
    fn get_auxiliary_key(&self, prefix: &str, device_path: &Path) -> Result<Vec<u8>> {
        let description =
            std::ffi::CString::new(format!("{}:{}:aux", prefix, device_path.display()))?;
        let key_type = std::ffi::CString::new("user").expect("static string");

        let key_id = unsafe {
            libc::syscall(
                libc::SYS_keyctl,
                KEYCTL_SEARCH,
                KEY_SPEC_USER_KEYRING,
                key_type.as_ptr(),
                description.as_ptr(),
                0,
            )
        };
        if key_id < 0 {
            return Err(Error::KernelKeyNotFound.into());
        }

        let size = unsafe {
            libc::syscall(
                libc::SYS_keyctl,
                KEYCTL_READ,
                key_id,
                std::ptr::null_mut::<u8>(),
                0,
                0,
            )
        };
        if size < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        let mut payload = vec![0u8; size as usize];
        let read = unsafe {
            libc::syscall(
                libc::SYS_keyctl,
                KEYCTL_READ,
                key_id,
                payload.as_mut_ptr(),
                payload.len(),
                0,
            )
        };
        if read < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        payload.truncate(read as usize);
        Ok(payload)
    }
}

/// TPM service over the host device nodes.
///
/// Probes for a resource-managed device; the sealed-key cryptography is
/// not implemented here, so sessions refuse policy updates and deployments
/// performing real reseals must inject a platform implementation.
pub struct HostTpm;

struct HostTpmSession;

impl TpmSession for HostTpmSession {
    fn update_pcr_policy(
        &self,
        _key: &mut SealedKey,
        _auth_key: &[u8],
        _profile: &PcrProtectionProfile,
    ) -> Result<()> {
        Err(anyhow::anyhow!(
            "sealed-key policy updates need the platform TPM service"
        ))
    }
}

impl Tpm for HostTpm {
    fn connect(&self) -> Result<Box<dyn TpmSession>> {
        for device in ["/dev/tpmrm0", "/dev/tpm0"] {
            if std::fs::metadata(device).is_ok() {
                return Ok(Box::new(HostTpmSession));
            }
        }
        Err(Error::NoTpm.into())
    }
}
