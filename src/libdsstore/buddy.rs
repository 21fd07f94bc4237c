/*
 * BSD 2-Clause License
 *
 * Copyright (c) 2021, Khaled Emara
 * All rights reserved.
 *
 * Redistribution and use in source and binary forms, with or without
 * modification, are permitted provided that the following conditions are met:
 *
 * 1. Redistributions of source code must retain the above copyright notice, this
 *    list of conditions and the following disclaimer.
 *
 * 2. Redistributions in binary form must reproduce the above copyright notice,
 *    this list of conditions and the following disclaimer in the documentation
 *    and/or other materials provided with the distribution.
 *
 * THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS"
 * AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE
 * IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
 * DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE
 * FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL
 * DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
 * SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER
 * CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY,
 * OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
 * OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.
 */
use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};

use bincode_next::Decode;
use tracing::debug;

use super::block::Block;
use super::definitions::BlockId;
use super::error::{Error, Result};
use super::utils::decode;

/// Every logical allocator offset is shifted by this much on the physical
/// file.
const OFFSET_SHIFT: u64 = 4;

/// Low five bits of an offset-table address carry log2 of the block size.
const SIZE_BITS: u32 = 0x1F;

#[derive(Clone, Copy, Debug, Decode)]
struct BuddyHeader {
    magic:      u32,
    magic2:     [u8; 4],
    root_addr:  u32,
    root_size:  u32,
    root_addr2: u32,
    _unused:    [u8; 16],
}

impl BuddyHeader {
    const SIZE: usize = 36;
}

/// Read-only view of a Buddy allocator file: header, indirect offset
/// table, named table of contents, and the per-size free lists.
#[derive(Debug)]
pub struct Allocator<R> {
    file:      R,
    file_size: u64,
    offsets:   Vec<u32>,
    toc:       BTreeMap<String, BlockId>,
    free:      Vec<Vec<u32>>,
}

impl<R: Read + Seek> Allocator<R> {
    pub fn open(mut file: R) -> Result<Self> {
        let file_size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;
        let mut raw = [0u8; BuddyHeader::SIZE];
        file.read_exact(&mut raw)?;
        let (hdr, _) = decode::<BuddyHeader>(&raw)?;

        if hdr.magic != 1 || &hdr.magic2 != b"Bud1" {
            return Err(Error::BadMagic);
        }
        if hdr.root_addr != hdr.root_addr2 {
            return Err(Error::InconsistentRoot);
        }

        let mut alloc = Allocator {
            file,
            file_size,
            offsets: Vec::new(),
            toc: BTreeMap::new(),
            free: Vec::new(),
        };
        let mut root = Block::new(alloc.read(u64::from(hdr.root_addr), hdr.root_size as usize)?);

        // Block offset addresses, stored in chunks of 256 entries.
        let count = root.read_u32()? as usize;
        let _unknown = root.read_u32()?;
        let mut offsets = Vec::with_capacity(count.next_multiple_of(256));
        while offsets.len() < count {
            for _ in 0..256 {
                offsets.push(root.read_u32()?);
            }
        }
        offsets.truncate(count);
        alloc.offsets = offsets;

        // Table of contents: short Latin-1 names mapped to block ids.
        let toc_count = root.read_u32()?;
        for _ in 0..toc_count {
            let nlen = root.read_u8()? as usize;
            let name: String = root.read_bytes(nlen)?.iter().map(|&b| b as char).collect();
            let value = root.read_u32()?;
            alloc.toc.insert(name, value);
        }

        // One free-list bucket per power-of-two size class.  Traversal
        // doesn't need them, but slack recovery does, and consuming them
        // validates the root block layout.
        for _ in 0..32 {
            let n = root.read_u32()? as usize;
            let mut bucket = Vec::with_capacity(n);
            for _ in 0..n {
                bucket.push(root.read_u32()?);
            }
            alloc.free.push(bucket);
        }

        debug!(
            blocks = alloc.offsets.len(),
            toc = alloc.toc.len(),
            "opened buddy allocator"
        );
        Ok(alloc)
    }

    /// Read exactly `len` bytes at the logical `offset`.  Reads past the
    /// end of the file zero-pad the tail; trailing blocks in forensic
    /// captures are often truncated.
    pub fn read(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset + OFFSET_SHIFT))?;
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match self.file.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(buf)
    }

    /// Split an offset-table address into `(offset, size)`.  Out-of-range
    /// ids yield `None`.
    pub fn resolve(&self, id: BlockId) -> Option<(u64, usize)> {
        let addr = *self.offsets.get(id as usize)?;
        let offset = u64::from(addr & !SIZE_BITS);
        let size = 1usize << (addr & SIZE_BITS);
        Some((offset, size))
    }

    pub fn get_block(&mut self, id: BlockId) -> Result<Block> {
        let (offset, size) = self.resolve(id).ok_or(Error::UnknownBlock(id))?;
        Ok(Block::new(self.read(offset, size)?))
    }

    pub fn lookup(&self, name: &str) -> Result<BlockId> {
        self.toc
            .get(name)
            .copied()
            .ok_or_else(|| Error::MissingName(name.into()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.toc.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.toc.keys().map(String::as_str)
    }

    pub fn block_count(&self) -> usize {
        self.offsets.len()
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn free_lists(&self) -> &[Vec<u32>] {
        &self.free
    }

    /// Size of the logical (shifted) address space backed by the file.
    pub fn len(&self) -> u64 {
        self.file_size.saturating_sub(OFFSET_SHIFT)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
