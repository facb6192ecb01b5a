// CLASSIFICATION: COMMUNITY
// Filename: mem.rs v0.3
// Date Modified: 2026-07-12
// Author: Lukas Bower

//! In-memory filesystem backend for tests.
//!
//! Holds a whole tree in a map keyed by absolute path. Clones share the
//! same tree, so a test can keep a handle for inspection while the core
//! works through a `Rc<dyn Fs>` of the same instance. Symlinks are real
//! nodes; `read_link` exposes them and every other operation follows them.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::{DirEntry, FileInfo, Fs, FsRead, FsWrite};

const MAX_LINK_DEPTH: usize = 40;

#[derive(Clone, Debug)]
enum Node {
    File(Vec<u8>),
    Dir,
    Symlink(PathBuf),
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<PathBuf, Node>,
    temp_counter: u64,
}

/// In-memory [`Fs`] backend.
#[derive(Clone, Debug, Default)]
pub struct MemFs {
    inner: Rc<RefCell<State>>,
}

impl MemFs {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a whole file, creating parent directories.
    pub fn write_file(&self, path: impl AsRef<Path>, data: &[u8]) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.inner.borrow_mut();
        make_parents(&mut state.nodes, &path);
        state.nodes.insert(path, Node::File(data.to_vec()));
    }

    /// Read a whole file, following symlinks.
    pub fn read_file(&self, path: impl AsRef<Path>) -> io::Result<Vec<u8>> {
        let resolved = self.resolve(path.as_ref())?;
        let state = self.inner.borrow();
        match state.nodes.get(&resolved) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(_) => Err(io::Error::new(io::ErrorKind::InvalidInput, "is a directory")),
            None => Err(io::ErrorKind::NotFound.into()),
        }
    }

    /// Create a symbolic link at `link` pointing at `target`.
    pub fn symlink(&self, target: impl AsRef<Path>, link: impl AsRef<Path>) {
        let link = link.as_ref().to_path_buf();
        let mut state = self.inner.borrow_mut();
        make_parents(&mut state.nodes, &link);
        state
            .nodes
            .insert(link, Node::Symlink(target.as_ref().to_path_buf()));
    }

    /// A view of the same tree that rejects every mutation.
    pub fn read_only(&self) -> ReadOnlyFs {
        ReadOnlyFs { inner: self.clone() }
    }

    fn resolve(&self, path: &Path) -> io::Result<PathBuf> {
        let state = self.inner.borrow();
        let mut current = super::clean_path(path);
        for _ in 0..MAX_LINK_DEPTH {
            match state.nodes.get(&current) {
                Some(Node::Symlink(target)) => {
                    let next = if target.is_absolute() {
                        target.clone()
                    } else {
                        current
                            .parent()
                            .map(|p| p.join(target))
                            .unwrap_or_else(|| target.clone())
                    };
                    current = super::clean_path(&next);
                }
                _ => return Ok(current),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "too many levels of symbolic links",
        ))
    }
}

fn make_parents(nodes: &mut BTreeMap<PathBuf, Node>, path: &Path) {
    for ancestor in path.ancestors().skip(1) {
        if ancestor.as_os_str().is_empty() {
            continue;
        }
        nodes
            .entry(ancestor.to_path_buf())
            .or_insert(Node::Dir);
    }
}

struct MemRead {
    cursor: Cursor<Vec<u8>>,
    path: PathBuf,
    size: u64,
}

impl Read for MemRead {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemRead {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl FsRead for MemRead {
    fn len(&self) -> u64 {
        self.size
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

struct MemWrite {
    inner: Rc<RefCell<State>>,
    path: PathBuf,
}

impl Write for MemWrite {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.inner.borrow_mut();
        match state.nodes.get_mut(&self.path) {
            Some(Node::File(data)) => {
                data.extend_from_slice(buf);
                Ok(buf.len())
            }
            _ => Err(io::ErrorKind::NotFound.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl FsWrite for MemWrite {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Fs for MemFs {
    fn create(&self, path: &Path) -> io::Result<Box<dyn FsWrite>> {
        let resolved = self.resolve(path)?;
        let mut state = self.inner.borrow_mut();
        if matches!(state.nodes.get(&resolved), Some(Node::Dir)) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "is a directory"));
        }
        make_parents(&mut state.nodes, &resolved);
        state.nodes.insert(resolved.clone(), Node::File(Vec::new()));
        Ok(Box::new(MemWrite {
            inner: self.inner.clone(),
            path: resolved,
        }))
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn FsRead>> {
        let resolved = self.resolve(path)?;
        let state = self.inner.borrow();
        match state.nodes.get(&resolved) {
            Some(Node::File(data)) => Ok(Box::new(MemRead {
                size: data.len() as u64,
                cursor: Cursor::new(data.clone()),
                path: path.to_path_buf(),
            })),
            Some(_) => Err(io::Error::new(io::ErrorKind::InvalidInput, "is a directory")),
            None => Err(io::ErrorKind::NotFound.into()),
        }
    }

    fn mkdir_all(&self, path: &Path, _mode: u32) -> io::Result<()> {
        let mut state = self.inner.borrow_mut();
        if matches!(state.nodes.get(path), Some(Node::File(_))) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "not a directory"));
        }
        make_parents(&mut state.nodes, path);
        state.nodes.insert(path.to_path_buf(), Node::Dir);
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let resolved = self.resolve(path)?;
        let state = self.inner.borrow();
        if !matches!(state.nodes.get(&resolved), Some(Node::Dir)) {
            return Err(io::ErrorKind::NotFound.into());
        }
        let mut out = Vec::new();
        for (node_path, node) in state.nodes.iter() {
            if node_path.parent() == Some(resolved.as_path()) {
                let name = match node_path.file_name() {
                    Some(name) => name.to_string_lossy().into_owned(),
                    None => continue,
                };
                out.push(DirEntry {
                    name,
                    is_dir: matches!(node, Node::Dir),
                    is_symlink: matches!(node, Node::Symlink(_)),
                });
            }
        }
        Ok(out)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        let state = self.inner.borrow();
        match state.nodes.get(path) {
            Some(Node::Symlink(target)) => Ok(target.clone()),
            Some(_) => Err(io::Error::new(io::ErrorKind::InvalidInput, "not a symlink")),
            None => Err(io::ErrorKind::NotFound.into()),
        }
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        let mut state = self.inner.borrow_mut();
        let has_children = state.nodes.keys().any(|p| p.parent() == Some(path));
        let is_dir = match state.nodes.get(path) {
            Some(Node::Dir) => true,
            Some(_) => false,
            None => return Err(io::ErrorKind::NotFound.into()),
        };
        if is_dir && has_children {
            return Err(io::Error::new(io::ErrorKind::Other, "directory not empty"));
        }
        state.nodes.remove(path);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.inner.borrow_mut();
        let node = state
            .nodes
            .remove(from)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        make_parents(&mut state.nodes, to);
        state.nodes.insert(to.to_path_buf(), node);
        Ok(())
    }

    fn stat(&self, path: &Path) -> io::Result<FileInfo> {
        let resolved = self.resolve(path)?;
        let state = self.inner.borrow();
        match state.nodes.get(&resolved) {
            Some(Node::File(data)) => Ok(FileInfo {
                size: data.len() as u64,
                is_dir: false,
            }),
            Some(Node::Dir) => Ok(FileInfo {
                size: 0,
                is_dir: true,
            }),
            _ => Err(io::ErrorKind::NotFound.into()),
        }
    }

    fn temp_file(&self, dir: &Path, prefix: &str) -> io::Result<Box<dyn FsWrite>> {
        let path = {
            let mut state = self.inner.borrow_mut();
            state.temp_counter += 1;
            dir.join(format!("{}{}", prefix, state.temp_counter))
        };
        self.create(&path)
    }
}

/// Mutation-rejecting view of a [`MemFs`], for permission-failure tests.
pub struct ReadOnlyFs {
    inner: MemFs,
}

impl Fs for ReadOnlyFs {
    fn create(&self, _path: &Path) -> io::Result<Box<dyn FsWrite>> {
        Err(io::ErrorKind::PermissionDenied.into())
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn FsRead>> {
        self.inner.open(path)
    }

    fn mkdir_all(&self, _path: &Path, _mode: u32) -> io::Result<()> {
        Err(io::ErrorKind::PermissionDenied.into())
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        self.inner.read_dir(path)
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        self.inner.read_link(path)
    }

    fn remove(&self, _path: &Path) -> io::Result<()> {
        Err(io::ErrorKind::PermissionDenied.into())
    }

    fn rename(&self, _from: &Path, _to: &Path) -> io::Result<()> {
        Err(io::ErrorKind::PermissionDenied.into())
    }

    fn stat(&self, path: &Path) -> io::Result<FileInfo> {
        self.inner.stat(path)
    }

    fn temp_file(&self, _dir: &Path, _prefix: &str) -> io::Result<Box<dyn FsWrite>> {
        Err(io::ErrorKind::PermissionDenied.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_roundtrip() {
        let fs = MemFs::new();
        fs.write_file("/a/b/c", b"payload");
        assert_eq!(fs.read_file("/a/b/c").unwrap(), b"payload");
        assert_eq!(fs.stat(Path::new("/a/b")).unwrap().is_dir, true);
    }

    #[test]
    fn read_dir_sorted() {
        let fs = MemFs::new();
        fs.write_file("/d/2", b"x");
        fs.write_file("/d/1", b"y");
        fs.write_file("/d/sub/inner", b"z");
        let names: Vec<String> = fs
            .read_dir(Path::new("/d"))
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["1", "2", "sub"]);
    }

    #[test]
    fn symlink_follow_and_read_link() {
        let fs = MemFs::new();
        fs.write_file("/dev/sda1", b"");
        fs.symlink("/dev/sda1", "/dev/disk/by-label/root");

        assert_eq!(
            fs.read_link(Path::new("/dev/disk/by-label/root")).unwrap(),
            PathBuf::from("/dev/sda1")
        );
        assert!(fs.stat(Path::new("/dev/disk/by-label/root")).is_ok());

        let err = fs.read_link(Path::new("/dev/sda1")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn relative_symlink_targets() {
        let fs = MemFs::new();
        fs.write_file("/dev/vda14", b"");
        fs.symlink("../vda14", "/dev/disk/link");
        assert_eq!(fs.read_file("/dev/disk/link").unwrap(), b"");
    }

    #[test]
    fn rename_replaces_target() {
        let fs = MemFs::new();
        fs.write_file("/a", b"new");
        fs.write_file("/b", b"old");
        fs.rename(Path::new("/a"), Path::new("/b")).unwrap();
        assert_eq!(fs.read_file("/b").unwrap(), b"new");
        assert!(fs.read_file("/a").is_err());
    }

    #[test]
    fn temp_files_are_unique() {
        let fs = MemFs::new();
        fs.mkdir_all(Path::new("/tmp"), 0o755).unwrap();
        let a = fs.temp_file(Path::new("/tmp"), ".x").unwrap();
        let b = fs.temp_file(Path::new("/tmp"), ".x").unwrap();
        assert_ne!(a.path(), b.path());
    }
}
