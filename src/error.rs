// CLASSIFICATION: COMMUNITY
// Filename: error.rs v0.2
// Date Modified: 2026-06-18
// Author: Lukas Bower

//! Error kinds exported by the core.
//!
//! Top-level operations return `anyhow::Result` and chain context with
//! `"cannot X: ..."` prefixes; these variants are the terminal causes that
//! callers may want to match on with `Error::downcast_ref`.

use std::path::PathBuf;

use thiserror::Error;

/// Terminal error causes of core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The host has no UEFI variable store.
    #[error("EFI variables are not supported on this system")]
    Unavailable,

    /// A file or variable was expected to exist.
    #[error("does not exist")]
    NotExist,

    /// A file or variable was expected to be absent.
    #[error("already exists")]
    AlreadyExists,

    /// A `Boot####` payload failed the load-option structural check.
    #[error("invalid load option: {0}")]
    InvalidLoadOption(#[from] efivar_wire::WireError),

    /// All 65535 boot entry indices are taken.
    #[error("maximum number of boot entries exceeded")]
    EntryExhausted,

    /// A delete was requested for a `Boot####` that is not present.
    #[error("unknown boot entry Boot{0:04X}")]
    UnknownEntry(u16),

    /// The trusted-assets file does not name a digest algorithm.
    #[error("digest algorithm is missing")]
    UnknownAlg,

    /// The trusted-assets file names an algorithm we do not implement.
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlg(String),

    /// A shim fallback CSV field contains the record separator.
    #[error("entry '{0}' contains ',' in one of the attributes, this is not supported")]
    CsvComma(String),

    /// Boot images whose hash-tree roots are not in the trusted set.
    #[error("some assets failed an integrity check: {0:?}")]
    UntrustedAssets(Vec<PathBuf>),

    /// An image handle survived PCR profile composition.
    #[error("leaked open files from computing PCR profile")]
    LeakedFiles,

    /// The auxiliary policy key is not in the kernel keyring.
    #[error("cannot find key in kernel keyring")]
    KernelKeyNotFound,

    /// The TPM service reports no usable device.
    #[error("no TPM2 device is available")]
    NoTpm,
}
