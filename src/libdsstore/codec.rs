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
use std::io::Cursor;

use byteorder::{BigEndian, ByteOrder};

use super::bookmark::Bookmark;
use super::definitions::FourCC;
use super::entry::Value;
use super::error::{Error, Result};
use super::utils::hex;

/// Decoder for the blob payload of one well-known code.  Fixed-layout
/// codecs fail the record on short payloads; the plist and bookmark
/// codecs surface their own failures inside the value instead.
#[enum_dispatch::enum_dispatch]
pub trait BlobCodec {
    /// Identity reported in place of the `blob` tag when this codec runs.
    fn name(&self) -> &'static str;

    fn decode(&self, raw: &[u8]) -> Result<Value>;
}

#[derive(Clone, Copy, Debug)]
#[enum_dispatch::enum_dispatch(BlobCodec)]
pub enum Codec {
    Iloc(IlocCodec),
    Icvo(IcvoCodec),
    Fwi0(Fwi0Codec),
    Dilc(DilcCodec),
    Plist(PlistCodec),
    Bookmark(BookmarkCodec),
}

/// Look up the codec registered for a code, if any.
pub fn for_code(code: &FourCC) -> Option<Codec> {
    match code.as_bytes() {
        b"Iloc" => Some(IlocCodec.into()),
        b"icvo" => Some(IcvoCodec.into()),
        b"fwi0" => Some(Fwi0Codec.into()),
        b"dilc" => Some(DilcCodec.into()),
        b"bwsp" | b"lsvp" | b"glvp" | b"lsvP" | b"icvp" | b"lsvC" => Some(PlistCodec.into()),
        b"pBBk" | b"pBB0" => Some(BookmarkCodec.into()),
        _ => None,
    }
}

fn need(raw: &[u8], wanted: usize) -> Result<()> {
    if raw.len() < wanted {
        return Err(Error::ShortRead {
            wanted,
            remaining: raw.len(),
        });
    }
    Ok(())
}

/// Clamped subslice; layouts with optional trailing bytes render whatever
/// is present.
fn part(raw: &[u8], from: usize, to: usize) -> &[u8] {
    let to = to.min(raw.len());
    if from >= to {
        &[]
    } else {
        &raw[from..to]
    }
}

/// ASCII projection of a FourCC-ish field, dropping anything unprintable.
fn ascii(raw: &[u8]) -> String {
    raw.iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect()
}

/// Icon location: `(x, y, selected index, unknown)`, each 32 bits.
#[derive(Clone, Copy, Debug)]
pub struct IlocCodec;

impl IlocCodec {
    fn coord(v: u32) -> String {
        if v == u32::MAX {
            "Null".into()
        } else {
            v.to_string()
        }
    }
}

impl BlobCodec for IlocCodec {
    fn name(&self) -> &'static str {
        "IlocCodec"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        need(raw, 16)?;
        let x = BigEndian::read_u32(&raw[0..4]);
        let y = BigEndian::read_u32(&raw[4..8]);
        let idx = BigEndian::read_u32(&raw[8..12]);
        Ok(Value::Rendered(format!(
            "Location: ({}, {}), Selected Index: {}, Unknown: {}",
            Self::coord(x),
            Self::coord(y),
            Self::coord(idx),
            hex(&raw[12..16]),
        )))
    }
}

/// Icon view options: view type, icon pixel size, grid alignment.
#[derive(Clone, Copy, Debug)]
pub struct IcvoCodec;

impl BlobCodec for IcvoCodec {
    fn name(&self) -> &'static str {
        "IcvoCodec"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        need(raw, 14)?;
        Ok(Value::Rendered(format!(
            "Type: {}, IconPixelSize: {}, GridAlign: {}, GridAlignTo: {}, Unknown: {}",
            ascii(&raw[0..4]),
            BigEndian::read_u16(&raw[4..6]),
            ascii(&raw[6..10]),
            ascii(&raw[10..14]),
            hex(&raw[14..]),
        )))
    }
}

/// Finder window geometry: four edges, a view type, trailing unknowns.
#[derive(Clone, Copy, Debug)]
pub struct Fwi0Codec;

impl BlobCodec for Fwi0Codec {
    fn name(&self) -> &'static str {
        "Fwi0Codec"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        need(raw, 8)?;
        Ok(Value::Rendered(format!(
            "top: {}, left: {}, bottom: {}, right: {}, view_type: {}, Unknown: {}",
            BigEndian::read_u16(&raw[0..2]),
            BigEndian::read_u16(&raw[2..4]),
            BigEndian::read_u16(&raw[4..6]),
            BigEndian::read_u16(&raw[6..8]),
            ascii(part(raw, 8, 12)),
            hex(part(raw, 12, 16)),
        )))
    }
}

/// Desktop icon location.  Position words above 65535 count from the
/// right or bottom edge as `0xFFFFFFFF - v`.
#[derive(Clone, Copy, Debug)]
pub struct DilcCodec;

impl BlobCodec for DilcCodec {
    fn name(&self) -> &'static str {
        "DilcCodec"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        need(raw, 32)?;
        let h = BigEndian::read_u32(&raw[8..12]);
        let v = BigEndian::read_u32(&raw[12..16]);
        let h_pos = if h > 65535 {
            format!("IconPosFromRight: {}", u32::MAX - h)
        } else {
            format!("IconPosFromLeft: {h}")
        };
        let v_pos = if v > 65535 {
            format!("IconPosFromBottom: {}", u32::MAX - v)
        } else {
            format!("IconPosFromTop: {v}")
        };
        Ok(Value::Rendered(format!(
            "Unk1: {}, GridQuadrant: {}, Unk2: {}, {}, {}, GridIconPosFromLeft: {}, \
             GridIconPosFromTop: {}, Unk3: {}, Unk4: {}",
            hex(&raw[0..4]),
            BigEndian::read_u16(&raw[4..6]),
            hex(&raw[6..8]),
            h_pos,
            v_pos,
            BigEndian::read_u32(&raw[16..20]),
            BigEndian::read_u32(&raw[20..24]),
            hex(&raw[24..28]),
            hex(&raw[28..32]),
        )))
    }
}

/// Apple property-list payloads (`bwsp`, `lsvp`, `glvp`, `lsvP`, `icvp`,
/// `lsvC`).
#[derive(Clone, Copy, Debug)]
pub struct PlistCodec;

impl BlobCodec for PlistCodec {
    fn name(&self) -> &'static str {
        "PlistCodec"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        match plist::Value::from_reader(Cursor::new(raw)) {
            Ok(v) => Ok(Value::Plist(v)),
            Err(e) => Ok(Value::Rendered(format!("{e}: {}", hex(raw)))),
        }
    }
}

/// Apple bookmark payloads (`pBBk`, `pBB0`).
#[derive(Clone, Copy, Debug)]
pub struct BookmarkCodec;

impl BlobCodec for BookmarkCodec {
    fn name(&self) -> &'static str {
        "BookmarkCodec"
    }

    fn decode(&self, raw: &[u8]) -> Result<Value> {
        match Bookmark::from_bytes(raw) {
            Ok(b) => Ok(Value::Rendered(b.to_string())),
            Err(e) => Ok(Value::Rendered(format!("{e}: {}", hex(raw)))),
        }
    }
}
