// CLASSIFICATION: COMMUNITY
// Filename: lib.rs v0.4
// Date Modified: 2026-07-30
// Author: Lukas Bower

//! Root library for sealboot.
//!
//! sealboot keeps three things consistent across package-manager updates of
//! the shim loader and kernel on UEFI systems whose root filesystem is
//! unlocked by a TPM-sealed key: the EFI System Partition contents, the
//! UEFI Boot Manager variables, and the PCR policy protecting the sealed
//! key. All host access goes through the [`context::CoreContext`] backends
//! so every operation can run against in-memory fakes.

/// Exported error kinds.
pub mod error;

/// Filesystem abstraction and the in-memory test backend.
pub mod fs;

/// UEFI variable store abstraction, efivarfs backend and mock.
pub mod efivars;

/// Process-wide state passed explicitly into every operation.
pub mod context;

/// Debian version ordering.
pub mod version;

/// Content-addressed store of trusted boot-asset root hashes.
pub mod assets;

/// Streaming reader that hashes file blocks as they are read.
pub mod hashed_file;

/// Boot device selection menu entries (Boot0000...BootFFFE).
pub mod bootmgr;

/// Kernel discovery, installation and boot-loader commit.
pub mod kernel;

/// Shim installation and the shim fallback CSV.
pub mod shim;

/// TCG 2.0 measurement log parser.
pub mod tcglog;

/// PCR protection profile accumulator.
pub mod profile;

/// Injectable secure-boot, TPM and keyring services.
pub mod secboot;

/// Sealed-key resealing pipeline.
pub mod reseal;

pub use context::{CoreContext, EfiArch};
pub use error::Error;
