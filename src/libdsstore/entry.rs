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
use super::block::Block;
use super::codec::{self, BlobCodec};
use super::definitions::FourCC;
use super::error::{Error, Result};
use super::utils::hex;

/// How a record is being decoded.  Slack decoding is stricter: filenames
/// must be valid UTF-16, and a boolean field consumes four bytes and the
/// record is rejected as malformed, so no slack bool ever surfaces.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeMode {
    Tree,
    Slack,
}

/// A decoded record value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    /// `long` and `shor` tags.
    U32(u32),
    /// `comp` and `dutc` tags.
    U64(u64),
    Ustr(String),
    Type(FourCC),
    /// `blob` payload with no registered codec.
    Blob(Vec<u8>),
    /// Fixed-layout codec output.
    Rendered(String),
    /// Parsed property list.
    Plist(plist::Value),
}

impl Value {
    /// Stable textual form; feeds the provenance hash and the reports.
    pub fn canonical(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::U32(v) => v.to_string(),
            Value::U64(v) => v.to_string(),
            Value::Ustr(s) => s.clone(),
            Value::Type(t) => t.to_string(),
            Value::Blob(b) => hex(b),
            Value::Rendered(s) => s.clone(),
            Value::Plist(v) => format!("{v:?}"),
        }
    }
}

/// Reported kind of an entry: the on-disk type tag, or the name of the
/// codec that replaced a blob payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    Tag(FourCC),
    Codec(&'static str),
}

impl Kind {
    pub fn label(&self) -> String {
        match self {
            Kind::Tag(t) => t.to_string(),
            Kind::Codec(name) => (*name).into(),
        }
    }

    pub fn is_tag(&self, tag: &[u8; 4]) -> bool {
        matches!(self, Kind::Tag(t) if t.as_bytes() == tag)
    }

    pub fn is_codec(&self) -> bool {
        matches!(self, Kind::Codec(_))
    }
}

/// One record of the store's B-tree, keyed by `(filename, code)`.
#[derive(Clone, Debug)]
pub struct DsStoreEntry {
    pub filename: String,
    pub code:     FourCC,
    pub kind:     Kind,
    pub value:    Value,
    /// Provenance annotation, assigned by the walker.
    pub node:     String,
}

impl DsStoreEntry {
    /// Decode one record from a positioned block.
    pub fn read(block: &mut Block, mode: DecodeMode) -> Result<DsStoreEntry> {
        let nlen = block.read_u32()? as usize;
        let filename = read_utf16(block, nlen, mode)?;
        let code = block.read_fourcc()?;
        let tag = block.read_fourcc()?;

        let (kind, value) = match tag.as_bytes() {
            b"bool" => match mode {
                DecodeMode::Tree => (Kind::Tag(tag), Value::Bool(block.read_u8()? != 0)),
                DecodeMode::Slack => {
                    block.read_bytes(4)?;
                    return Err(Error::MalformedBool);
                }
            },
            b"long" | b"shor" => (Kind::Tag(tag), Value::U32(block.read_u32()?)),
            b"blob" => {
                let vlen = block.read_u32()? as usize;
                let payload = block.read_bytes(vlen)?;
                match codec::for_code(&code) {
                    Some(c) => (Kind::Codec(c.name()), c.decode(&payload)?),
                    None => (Kind::Tag(tag), Value::Blob(payload)),
                }
            }
            b"ustr" => {
                let vlen = block.read_u32()? as usize;
                (Kind::Tag(tag), Value::Ustr(read_utf16(block, vlen, mode)?))
            }
            b"type" => (Kind::Tag(tag), Value::Type(block.read_fourcc()?)),
            b"comp" | b"dutc" => (Kind::Tag(tag), Value::U64(block.read_u64()?)),
            _ => return Err(Error::UnknownType(tag)),
        };

        Ok(DsStoreEntry {
            filename,
            code,
            kind,
            value,
            node: String::new(),
        })
    }

    /// Records order by case-folded filename, then code.
    pub fn sort_key(&self) -> (String, FourCC) {
        (self.filename.to_lowercase(), self.code)
    }
}

fn read_utf16(block: &mut Block, chars: usize, mode: DecodeMode) -> Result<String> {
    let raw = block.read_bytes(2 * chars)?;
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    match mode {
        DecodeMode::Tree => Ok(String::from_utf16_lossy(&units)),
        DecodeMode::Slack => Ok(String::from_utf16(&units)?),
    }
}
