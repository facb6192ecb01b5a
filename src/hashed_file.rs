// CLASSIFICATION: COMMUNITY
// Filename: hashed_file.rs v0.2
// Date Modified: 2026-07-18
// Author: Lukas Bower

//! Streaming reader that hashes file blocks as they are read.
//!
//! Reads are served block by block. The first time a block is read its leaf
//! hash is recorded; a later read of the same block must hash to the same
//! value or the read fails. [`HashedFile::finish`] hashes whatever was never
//! read, so the caller always ends up with the complete leaf list without
//! holding the file in memory.

use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::fs::FsRead;

/// Size of one hash-tree block.
pub const HASH_BLOCK_SIZE: usize = 4096;

/// Hash a block's content, zero-padded to the full block size.
pub fn hash_block(content: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(content);
    if content.len() < HASH_BLOCK_SIZE {
        hasher.update(&[0u8; HASH_BLOCK_SIZE][content.len()..]);
    }
    hasher.finalize().into()
}

/// A file handle with block-granular hashing.
pub struct HashedFile {
    file: Box<dyn FsRead>,
    leaf_hashes: Vec<Option<[u8; 32]>>,
    cached_index: Option<u64>,
    cached_block: Vec<u8>,
    size: u64,
}

impl HashedFile {
    /// Wrap an open file.
    pub fn new(file: Box<dyn FsRead>) -> Self {
        let size = file.len();
        let blocks = (size as usize).div_ceil(HASH_BLOCK_SIZE);
        Self {
            file,
            leaf_hashes: vec![None; blocks],
            cached_index: None,
            cached_block: Vec::new(),
            size,
        }
    }

    /// File size at open time.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The path of the underlying handle.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn load_block(&mut self, index: u64) -> io::Result<()> {
        if self.cached_index == Some(index) {
            return Ok(());
        }
        if index >= self.leaf_hashes.len() as u64 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }

        let content = read_block(&mut *self.file, index)?;
        let digest = hash_block(&content);

        match &self.leaf_hashes[index as usize] {
            None => self.leaf_hashes[index as usize] = Some(digest),
            Some(previous) if *previous != digest => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("hash check fail for block {index}"),
                ));
            }
            Some(_) => {}
        }

        self.cached_index = Some(index);
        self.cached_block = content;
        Ok(())
    }

    /// Read up to `buf.len()` bytes at `off`. Returns 0 at end of file.
    pub fn read_at(&mut self, buf: &mut [u8], off: u64) -> io::Result<usize> {
        if buf.is_empty() || off >= self.size {
            return Ok(0);
        }

        let mut n = 0usize;
        let mut index = off / HASH_BLOCK_SIZE as u64;
        while n < buf.len() && index < self.leaf_hashes.len() as u64 {
            self.load_block(index)?;

            let block_start = index * HASH_BLOCK_SIZE as u64;
            let skip = if n == 0 {
                (off - block_start) as usize
            } else {
                0
            };
            if skip >= self.cached_block.len() {
                break;
            }
            let available = &self.cached_block[skip..];
            let take = available.len().min(buf.len() - n);
            buf[n..n + take].copy_from_slice(&available[..take]);
            n += take;

            if self.cached_block.len() < HASH_BLOCK_SIZE {
                break;
            }
            index += 1;
        }
        Ok(n)
    }

    /// Hash every block that was never read and return the complete leaf
    /// list together with the underlying handle.
    pub fn finish(mut self) -> io::Result<Vec<[u8; 32]>> {
        for index in 0..self.leaf_hashes.len() {
            if self.leaf_hashes[index].is_some() {
                continue;
            }
            let content = read_block(&mut *self.file, index as u64)?;
            self.leaf_hashes[index] = Some(hash_block(&content));
        }
        Ok(self.leaf_hashes.into_iter().flatten().collect())
    }
}

fn read_block(file: &mut dyn FsRead, index: u64) -> io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(index * HASH_BLOCK_SIZE as u64))?;
    let mut content = vec![0u8; HASH_BLOCK_SIZE];
    let mut filled = 0usize;
    while filled < content.len() {
        match file.read(&mut content[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    content.truncate(filled);
    Ok(content)
}
