// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.3
// Date Modified: 2026-07-12
// Author: Lukas Bower

//! Filesystem abstraction.
//!
//! The core never touches the platform directly; everything goes through
//! [`Fs`]. [`HostFs`] maps onto `std::fs`, and [`mem::MemFs`] keeps a whole
//! tree in memory for tests.

pub mod mem;

use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// A readable, seekable file handle.
pub trait FsRead: Read + Seek {
    /// Size of the file at open time.
    fn len(&self) -> u64;

    /// The path this handle was opened with.
    fn path(&self) -> &Path;
}

/// A writable file handle.
pub trait FsWrite: Write {
    /// The path this handle writes to.
    fn path(&self) -> &Path;
}

/// Result of [`Fs::stat`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileInfo {
    /// File size in bytes (0 for directories).
    pub size: u64,
    /// Whether the path is a directory.
    pub is_dir: bool,
}

/// One entry of [`Fs::read_dir`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// Base name of the entry.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Whether the entry is a symbolic link.
    pub is_symlink: bool,
}

/// Pluggable filesystem backend.
pub trait Fs {
    /// Create or truncate a file for writing.
    fn create(&self, path: &Path) -> io::Result<Box<dyn FsWrite>>;

    /// Open a file for reading, following symlinks.
    fn open(&self, path: &Path) -> io::Result<Box<dyn FsRead>>;

    /// Create a directory and any missing parents.
    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// List the immediate entries of a directory, sorted by name.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Read the target of a symbolic link. Non-links fail with
    /// `ErrorKind::InvalidInput`, mirroring `EINVAL`.
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Remove a file.
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Rename a file, replacing any existing target.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Stat a path, following symlinks.
    fn stat(&self, path: &Path) -> io::Result<FileInfo>;

    /// Create a uniquely-named file in `dir` for writing. The caller
    /// renames it into place for atomic updates.
    fn temp_file(&self, dir: &Path, prefix: &str) -> io::Result<Box<dyn FsWrite>>;
}

/// Lexically normalize a path, resolving `.` and `..` components.
pub fn clean_path(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// SHA-256 of a whole file.
pub fn hash_file(fs: &dyn Fs, path: &Path) -> io::Result<[u8; 32]> {
    let mut file = fs.open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().into())
}

/// Copy `source` over `target` unless the contents already match.
///
/// Equality is SHA-256 over the raw bytes; a size mismatch skips the hash
/// comparison. Returns whether the target was rewritten.
pub fn maybe_update_file(fs: &dyn Fs, target: &Path, source: &Path) -> Result<bool> {
    let source_info = fs
        .stat(source)
        .with_context(|| format!("cannot stat source {}", source.display()))?;

    if let Ok(target_info) = fs.stat(target) {
        if target_info.size == source_info.size
            && hash_file(fs, source)? == hash_file(fs, target)?
        {
            return Ok(false);
        }
    }

    let mut reader = fs
        .open(source)
        .with_context(|| format!("cannot open {}", source.display()))?;
    let mut writer = fs
        .create(target)
        .with_context(|| format!("cannot create {}", target.display()))?;
    io::copy(&mut reader, &mut writer)
        .with_context(|| format!("cannot copy to {}", target.display()))?;
    writer.flush()?;

    Ok(true)
}

/// Filesystem backend over the host operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostFs;

struct HostRead {
    file: std::fs::File,
    path: PathBuf,
    size: u64,
}

impl Read for HostRead {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for HostRead {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl FsRead for HostRead {
    fn len(&self) -> u64 {
        self.size
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

struct HostWrite {
    file: std::fs::File,
    path: PathBuf,
}

impl Write for HostWrite {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl FsWrite for HostWrite {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Fs for HostFs {
    fn create(&self, path: &Path) -> io::Result<Box<dyn FsWrite>> {
        let file = std::fs::File::create(path)?;
        Ok(Box::new(HostWrite {
            file,
            path: path.to_path_buf(),
        }))
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn FsRead>> {
        let file = std::fs::File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Box::new(HostRead {
            file,
            path: path.to_path_buf(),
            size,
        }))
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        if std::fs::metadata(path).is_ok() {
            return Ok(());
        }
        std::fs::create_dir_all(path)?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            out.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
                is_symlink: file_type.is_symlink(),
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::read_link(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn stat(&self, path: &Path) -> io::Result<FileInfo> {
        let meta = std::fs::metadata(path)?;
        Ok(FileInfo {
            size: meta.len(),
            is_dir: meta.is_dir(),
        })
    }

    fn temp_file(&self, dir: &Path, prefix: &str) -> io::Result<Box<dyn FsWrite>> {
        let named = tempfile::Builder::new().prefix(prefix).tempfile_in(dir)?;
        let (file, path) = named.keep().map_err(|e| e.error)?;
        Ok(Box::new(HostWrite { file, path }))
    }
}
