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
//! Reader for the Apple bookmark container carried by `pBBk`/`pBB0`
//! records.  Only the first table of contents and the standard item
//! types are decoded; anything structurally off bubbles up as an error
//! so the caller can fall back to a hex rendering.
use std::fmt;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::error::{Error, Result};
use super::utils::hex;

// Item type words, from the bookmark data layout.
const BMK_STRING: u32 = 0x0101;
const BMK_DATA: u32 = 0x0201;
const BMK_NUMBER32: u32 = 0x0303;
const BMK_NUMBER64: u32 = 0x0304;
const BMK_DATE: u32 = 0x0400;
const BMK_BOOL_FALSE: u32 = 0x0500;
const BMK_BOOL_TRUE: u32 = 0x0501;
const BMK_ARRAY: u32 = 0x0601;
const BMK_URL: u32 = 0x0901;

const TOC_MAGIC: u32 = 0xFFFF_FFFE;

#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    Str(String),
    Data(Vec<u8>),
    U32(u32),
    U64(u64),
    Bool(bool),
    /// Seconds since 2001-01-01 UTC; dates are the one big-endian field.
    Date(f64),
    Array(Vec<Item>),
    Other(u32, Vec<u8>),
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Str(s) => write!(f, "{s}"),
            Item::Data(d) => write!(f, "{}", hex(d)),
            Item::U32(v) => write!(f, "{v}"),
            Item::U64(v) => write!(f, "{v}"),
            Item::Bool(b) => write!(f, "{b}"),
            Item::Date(s) => write!(f, "{s}s since 2001-01-01"),
            Item::Array(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Item::Other(typ, d) => write!(f, "type 0x{typ:04x}: {}", hex(d)),
        }
    }
}

/// A parsed bookmark: the items of its first table of contents, in TOC
/// order.
#[derive(Clone, Debug, PartialEq)]
pub struct Bookmark {
    items: Vec<(u32, Item)>,
}

impl Bookmark {
    pub fn from_bytes(raw: &[u8]) -> Result<Bookmark> {
        if raw.len() < 16 {
            return Err(Error::Bookmark("truncated header"));
        }
        if &raw[0..4] != b"book" && &raw[0..4] != b"alis" {
            return Err(Error::Bookmark("bad magic"));
        }
        let header_size = LittleEndian::read_u32(&raw[12..16]) as usize;
        let data = raw
            .get(header_size..)
            .ok_or(Error::Bookmark("header past end"))?;
        if data.len() < 4 {
            return Err(Error::Bookmark("missing TOC offset"));
        }

        let toc_offset = LittleEndian::read_u32(&data[0..4]) as usize;
        let toc = data
            .get(toc_offset..)
            .ok_or(Error::Bookmark("TOC past end"))?;
        if toc.len() < 20 {
            return Err(Error::Bookmark("truncated TOC"));
        }
        if LittleEndian::read_u32(&toc[4..8]) != TOC_MAGIC {
            return Err(Error::Bookmark("bad TOC magic"));
        }
        let count = LittleEndian::read_u32(&toc[16..20]) as usize;
        let entries = toc
            .get(20..20 + 12 * count)
            .ok_or(Error::Bookmark("truncated TOC entries"))?;

        let mut items = Vec::with_capacity(count);
        for entry in entries.chunks_exact(12) {
            let key = LittleEndian::read_u32(&entry[0..4]);
            let offset = LittleEndian::read_u32(&entry[4..8]) as usize;
            items.push((key, read_item(data, offset, 0)?));
        }
        Ok(Bookmark { items })
    }

    pub fn get(&self, key: u32) -> Option<&Item> {
        self.items.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn items(&self) -> &[(u32, Item)] {
        &self.items
    }
}

impl fmt::Display for Bookmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .items
            .iter()
            .map(|(k, v)| format!("{}: {v}", key_name(*k)))
            .collect();
        write!(f, "Bookmark({})", parts.join("; "))
    }
}

fn key_name(key: u32) -> String {
    match key {
        0x1004 => "path".into(),
        0x1005 => "inode-path".into(),
        0x1040 => "created".into(),
        0x2002 => "volume-path".into(),
        0x2010 => "volume-name".into(),
        0x2011 => "volume-uuid".into(),
        0x2012 => "volume-size".into(),
        0x2013 => "volume-created".into(),
        _ => format!("0x{key:04x}"),
    }
}

fn read_item(data: &[u8], offset: usize, depth: u8) -> Result<Item> {
    let head = data
        .get(offset..offset + 8)
        .ok_or(Error::Bookmark("item past end"))?;
    let len = LittleEndian::read_u32(&head[0..4]) as usize;
    let typ = LittleEndian::read_u32(&head[4..8]);
    let payload = data
        .get(offset + 8..offset + 8 + len)
        .ok_or(Error::Bookmark("item payload past end"))?;

    Ok(match typ {
        BMK_STRING | BMK_URL => Item::Str(String::from_utf8_lossy(payload).into_owned()),
        BMK_DATA => Item::Data(payload.to_vec()),
        BMK_NUMBER32 if len >= 4 => Item::U32(LittleEndian::read_u32(&payload[0..4])),
        BMK_NUMBER64 if len >= 8 => Item::U64(LittleEndian::read_u64(&payload[0..8])),
        BMK_DATE if len >= 8 => Item::Date(BigEndian::read_f64(&payload[0..8])),
        BMK_BOOL_FALSE => Item::Bool(false),
        BMK_BOOL_TRUE => Item::Bool(true),
        BMK_ARRAY if depth == 0 => {
            let mut items = Vec::with_capacity(len / 4);
            for off in payload.chunks_exact(4) {
                items.push(read_item(data, LittleEndian::read_u32(off) as usize, depth + 1)?);
            }
            Item::Array(items)
        }
        _ => Item::Other(typ, payload.to_vec()),
    })
}
