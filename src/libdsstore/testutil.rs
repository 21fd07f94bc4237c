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
//! Synthetic, well-formed buddy images for the unit tests.
use std::io::Cursor;

use super::buddy::Allocator;
use super::store::DsStore;

const ROOT_ADDR: u32 = 0x800;
const ROOT_SIZE: u32 = 0x800;
const SUPERBLOCK_ADDR: u32 = 64;
const NODE_BASE: u32 = 0x1000;
const NODE_SIZE_LOG: u32 = 8; // 256-byte tree nodes
const FREE_BASE: u32 = 0x2000;

/// On-disk bytes of one B-tree record.
pub fn record_bytes(filename: &str, code: &[u8; 4], tag: &[u8; 4], value: &[u8]) -> Vec<u8> {
    let units: Vec<u16> = filename.encode_utf16().collect();
    let mut v = (units.len() as u32).to_be_bytes().to_vec();
    for u in units {
        v.extend(u.to_be_bytes());
    }
    v.extend(code);
    v.extend(tag);
    v.extend(value);
    v
}

/// Assembles a buddy image: root block at `0x800`, superblock in block 1,
/// tree nodes in blocks 2.. at 256 bytes each, free-list regions past the
/// nodes.
pub struct StoreBuilder {
    nodes:        Vec<Vec<u8>>,
    sb:           [u32; 3], // root node, levels, records
    free_regions: Vec<(u8, Vec<u8>)>,
    toc_name:     String,
}

impl StoreBuilder {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        StoreBuilder {
            nodes: Vec::new(),
            sb: [2, 0, 0],
            free_regions: Vec::new(),
            toc_name: "DSDB".into(),
        }
    }

    pub fn leaf(self, records: &[Vec<u8>]) -> Self {
        self.leaf_with_tail(records, &[])
    }

    pub fn leaf_with_tail(self, records: &[Vec<u8>], tail: &[u8]) -> Self {
        let mut node = 0u32.to_be_bytes().to_vec();
        node.extend((records.len() as u32).to_be_bytes());
        for r in records {
            node.extend(r);
        }
        node.extend(tail);
        self.push_node(node)
    }

    pub fn internal(self, next: u32, items: &[(u32, Vec<u8>)]) -> Self {
        let mut node = next.to_be_bytes().to_vec();
        node.extend((items.len() as u32).to_be_bytes());
        for (child, rec) in items {
            node.extend(child.to_be_bytes());
            node.extend(rec);
        }
        self.push_node(node)
    }

    fn push_node(mut self, mut node: Vec<u8>) -> Self {
        assert!(node.len() <= 1 << NODE_SIZE_LOG, "node overflows its block");
        node.resize(1 << NODE_SIZE_LOG, 0);
        self.nodes.push(node);
        self
    }

    pub fn superblock(mut self, root: u32, levels: u32, records: u32) -> Self {
        self.sb = [root, levels, records];
        self
    }

    pub fn free_region(mut self, class: u8, content: Vec<u8>) -> Self {
        assert!(content.len() <= 1usize << class, "region overflows its class");
        self.free_regions.push((class, content));
        self
    }

    pub fn toc_name(mut self, name: &str) -> Self {
        self.toc_name = name.into();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let node_count = self.nodes.len() as u32;

        let mut free_addrs = Vec::new();
        let mut cursor = (NODE_BASE + node_count * (1 << NODE_SIZE_LOG)).max(FREE_BASE);
        for (class, _) in &self.free_regions {
            let size = 1u32 << class;
            cursor = cursor.next_multiple_of(size);
            free_addrs.push(cursor);
            cursor += size;
        }

        let logical_end = cursor.max(ROOT_ADDR + ROOT_SIZE);
        let mut image = vec![0u8; 4 + logical_end as usize];

        image[0..4].copy_from_slice(&1u32.to_be_bytes());
        image[4..8].copy_from_slice(b"Bud1");
        image[8..12].copy_from_slice(&ROOT_ADDR.to_be_bytes());
        image[12..16].copy_from_slice(&ROOT_SIZE.to_be_bytes());
        image[16..20].copy_from_slice(&ROOT_ADDR.to_be_bytes());

        // root block: offset table, TOC, free lists
        let mut root = Vec::new();
        let block_count = 2 + node_count;
        root.extend(block_count.to_be_bytes());
        root.extend(0u32.to_be_bytes());
        let mut addrs = vec![ROOT_ADDR | 11, SUPERBLOCK_ADDR | 5];
        for i in 0..node_count {
            addrs.push((NODE_BASE + i * (1 << NODE_SIZE_LOG)) | NODE_SIZE_LOG);
        }
        addrs.resize(block_count.next_multiple_of(256) as usize, 0);
        for a in &addrs {
            root.extend(a.to_be_bytes());
        }
        root.extend(1u32.to_be_bytes());
        root.push(self.toc_name.len() as u8);
        root.extend(self.toc_name.as_bytes());
        root.extend(1u32.to_be_bytes());
        for class in 0..32u8 {
            let offsets: Vec<u32> = self
                .free_regions
                .iter()
                .zip(&free_addrs)
                .filter(|((c, _), _)| *c == class)
                .map(|(_, &addr)| addr)
                .collect();
            root.extend((offsets.len() as u32).to_be_bytes());
            for o in offsets {
                root.extend(o.to_be_bytes());
            }
        }
        assert!(root.len() <= ROOT_SIZE as usize, "root block overflows");
        put(&mut image, ROOT_ADDR, &root);

        let mut sb = Vec::new();
        for v in [self.sb[0], self.sb[1], self.sb[2], node_count, 4096] {
            sb.extend(v.to_be_bytes());
        }
        put(&mut image, SUPERBLOCK_ADDR, &sb);

        for (i, node) in self.nodes.iter().enumerate() {
            put(&mut image, NODE_BASE + (i as u32) * (1 << NODE_SIZE_LOG), node);
        }
        for ((_, content), &addr) in self.free_regions.iter().zip(&free_addrs) {
            put(&mut image, addr, content);
        }
        image
    }

    pub fn build_allocator(&self) -> Allocator<Cursor<Vec<u8>>> {
        Allocator::open(Cursor::new(self.build())).unwrap()
    }

    pub fn build_store(&self, name: &str) -> DsStore<Cursor<Vec<u8>>> {
        DsStore::open(Cursor::new(self.build()), name).unwrap()
    }
}

fn put(image: &mut [u8], logical: u32, bytes: &[u8]) {
    let start = 4 + logical as usize;
    image[start..start + bytes.len()].copy_from_slice(bytes);
}
