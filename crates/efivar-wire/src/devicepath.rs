// Copyright © 2026 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Walk and construct EFI device-path lists.
// Author: Lukas Bower

//! EFI device paths.
//!
//! A device path is a list of variable-length nodes, each with a one-byte
//! type, a one-byte sub-type and a little-endian 16-bit total length that
//! includes the four header bytes. The list is closed by an end node.

use alloc::string::String;
use alloc::vec::Vec;

use crate::{ucs2, WireError};

/// Media device-path node type.
pub const TYPE_MEDIA: u8 = 0x04;
/// Hard-drive media node sub-type.
pub const SUBTYPE_HARD_DRIVE: u8 = 0x01;
/// File-path media node sub-type.
pub const SUBTYPE_FILE_PATH: u8 = 0x04;
/// End-of-path node type.
pub const TYPE_END: u8 = 0x7f;
/// End-entire sub-type.
pub const SUBTYPE_END_ENTIRE: u8 = 0xff;

const NODE_HEADER_LEN: usize = 4;

/// A parsed view of one device-path node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DevicePathNode<'a> {
    /// Node type byte.
    pub node_type: u8,
    /// Node sub-type byte.
    pub sub_type: u8,
    /// Node payload, excluding the four header bytes.
    pub data: &'a [u8],
}

impl DevicePathNode<'_> {
    /// Decode the payload of a file-path node as its path string.
    pub fn file_path(&self) -> Option<String> {
        if self.node_type != TYPE_MEDIA || self.sub_type != SUBTYPE_FILE_PATH {
            return None;
        }
        let text = match ucs2::find_nul(self.data) {
            Some(end) => &self.data[..end],
            None => self.data,
        };
        ucs2::decode(text).ok()
    }
}

/// An owned device-path list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DevicePath(Vec<u8>);

impl DevicePath {
    /// Validate `bytes` as a device-path list and take ownership of it.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, WireError> {
        validate(&bytes)?;
        Ok(Self(bytes))
    }

    /// Build a single-node path naming a file, closed by an end node.
    ///
    /// `path` uses backslash separators as the firmware expects; callers
    /// convert from host paths before getting here.
    pub fn new_file(path: &str) -> Self {
        let mut out = Vec::new();
        push_file_node(&mut out, path);
        push_end_node(&mut out);
        Self(out)
    }

    /// Build a hard-drive node (GPT) followed by a file node.
    pub fn new_hard_drive_file(
        partition_number: u32,
        partition_start: u64,
        partition_size: u64,
        signature: [u8; 16],
        path: &str,
    ) -> Self {
        let mut out = Vec::new();
        let mut data = Vec::with_capacity(38);
        data.extend_from_slice(&partition_number.to_le_bytes());
        data.extend_from_slice(&partition_start.to_le_bytes());
        data.extend_from_slice(&partition_size.to_le_bytes());
        data.extend_from_slice(&signature);
        data.push(0x02); // GPT
        data.push(0x02); // GUID signature
        push_node(&mut out, TYPE_MEDIA, SUBTYPE_HARD_DRIVE, &data);
        push_file_node(&mut out, path);
        push_end_node(&mut out);
        Self(out)
    }

    /// Borrow the raw list bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume into the raw list bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Iterate the nodes of the list, stopping at the end node.
    pub fn nodes(&self) -> NodeIter<'_> {
        NodeIter { rest: &self.0 }
    }

    /// The path carried by the first file-path node, if any.
    pub fn file_path(&self) -> Option<String> {
        self.nodes().find_map(|n| n.file_path())
    }

    /// The final component of [`Self::file_path`], with either separator.
    pub fn file_path_basename(&self) -> Option<String> {
        let path = self.file_path()?;
        let base = path
            .rsplit(|c| c == '\\' || c == '/')
            .next()
            .unwrap_or(&path);
        Some(String::from(base))
    }
}

/// Iterator over device-path nodes.
pub struct NodeIter<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for NodeIter<'a> {
    type Item = DevicePathNode<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.len() < NODE_HEADER_LEN {
            return None;
        }
        let node_type = self.rest[0];
        if node_type == TYPE_END {
            return None;
        }
        let len = u16::from_le_bytes([self.rest[2], self.rest[3]]) as usize;
        if len < NODE_HEADER_LEN || len > self.rest.len() {
            return None;
        }
        let node = DevicePathNode {
            node_type,
            sub_type: self.rest[1],
            data: &self.rest[NODE_HEADER_LEN..len],
        };
        self.rest = &self.rest[len..];
        Some(node)
    }
}

/// Check that `bytes` parses as a sequence of well-formed nodes.
pub fn validate(bytes: &[u8]) -> Result<(), WireError> {
    let mut rest = bytes;
    while !rest.is_empty() {
        if rest.len() < NODE_HEADER_LEN {
            return Err(WireError::InvalidDevicePath("truncated node header"));
        }
        let len = u16::from_le_bytes([rest[2], rest[3]]) as usize;
        if len < NODE_HEADER_LEN {
            return Err(WireError::InvalidDevicePath("node length below header size"));
        }
        if len > rest.len() {
            return Err(WireError::InvalidDevicePath("node length past end of list"));
        }
        rest = &rest[len..];
    }
    Ok(())
}

fn push_node(out: &mut Vec<u8>, node_type: u8, sub_type: u8, data: &[u8]) {
    out.push(node_type);
    out.push(sub_type);
    let len = (data.len() + NODE_HEADER_LEN) as u16;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(data);
}

fn push_file_node(out: &mut Vec<u8>, path: &str) {
    let data = ucs2::encode_nul_terminated(path);
    push_node(out, TYPE_MEDIA, SUBTYPE_FILE_PATH, &data);
}

fn push_end_node(out: &mut Vec<u8>) {
    push_node(out, TYPE_END, SUBTYPE_END_ENTIRE, &[]);
}
