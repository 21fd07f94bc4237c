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
use std::fmt;

pub type BlockId = u32; // index into the allocator's offset table
pub type NodeId = u32; // B-tree node, same namespace as BlockId

/// A four-byte ASCII tag: record codes, type tags, view styles.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn new(bytes: [u8; 4]) -> Self {
        FourCC(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            if (0x20..0x7F).contains(&b) {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({self})")
    }
}

/// The eight value type tags a record may carry.
pub const TYPE_TAGS: [&[u8; 4]; 8] = [
    b"long", b"shor", b"blob", b"dutc", b"type", b"bool", b"ustr", b"comp",
];

pub fn is_type_tag(bytes: &[u8]) -> bool {
    TYPE_TAGS.iter().any(|t| &t[..] == bytes)
}

/// Every record code the Finder is known to write, with a human-readable
/// description for the reports.  The slack scanner uses the keys as its
/// candidate alphabet.
pub const CODE_DESCRIPTIONS: [(&[u8; 4], &str); 42] = [
    (b"BKGD", "Finder Folder Background Picture"),
    (b"ICVO", "Icon View Options"),
    (b"Iloc", "Icon Location"), // location and index
    (b"LSVO", "List View Options"),
    (b"bwsp", "Browser Window Properties"),
    (b"cmmt", "Finder Comments"),
    (b"clip", "Text Clipping"),
    (b"dilc", "Desktop Icon Location"),
    (b"dscl", "Directory is Expanded in List View"),
    (b"fdsc", "Directory is Expanded in Limited Finder Window"),
    (b"extn", "File Extension"),
    (b"fwi0", "Finder Window Information"),
    (b"fwsw", "Finder Window Sidebar Width"),
    (b"fwvh", "Finder Window Sidebar Height"),
    (b"glvp", "Gallery View Properties"),
    (b"GRP0", "Group Items By"),
    (b"icgo", "icgo. Unknown. Icon View Options?"),
    (b"icsp", "icsp. Unknown. Icon View Properties?"),
    (b"icvo", "Icon View Options"),
    (b"icvp", "Icon View Properties"),
    (b"icvt", "Icon View Text Size"),
    (b"info", "info: Unknown. Finder Info?:"),
    (b"logS", "Logical Size"),
    (b"lg1S", "Logical Size"),
    (b"lssp", "List View Scroll Position"),
    (b"lsvC", "List View Columns"),
    (b"lsvo", "List View Options"),
    (b"lsvt", "List View Text Size"),
    (b"lsvp", "List View Properties"),
    (b"lsvP", "List View Properties"),
    (b"modD", "Modified Date"),
    (b"moDD", "Modified Date"),
    (b"phyS", "Physical Size"),
    (b"ph1S", "Physical Size"),
    (b"pict", "Background Image"),
    (b"vSrn", "Opened Folder in new tab"),
    (b"bRsV", "Browse in Selected View"),
    (b"pBBk", "Finder Folder Background Image Bookmark"),
    (b"pBB0", "Finder Folder Background Image Bookmark"),
    (b"vstl", "View Style Selected"),
    (b"ptbL", "Trash Put Back Location"),
    (b"ptbN", "Trash Put Back Name"),
];

pub fn describe(code: &FourCC) -> Option<&'static str> {
    CODE_DESCRIPTIONS
        .iter()
        .find(|(c, _)| *c == code.as_bytes())
        .map(|(_, d)| *d)
}

pub fn is_known_code(bytes: &[u8]) -> bool {
    CODE_DESCRIPTIONS.iter().any(|(c, _)| &c[..] == bytes)
}

/// Render the `vstl` (View Style Selected) value.
pub fn view_style(style: &FourCC) -> String {
    match style.as_bytes() {
        [0, 0, 0, 0] => "0x00000000: Null".into(),
        b"none" => "none: Unselected".into(),
        b"icnv" => "icnv: Icon View".into(),
        b"clmv" => "clmv: Column View".into(),
        b"Nlsv" => "Nlsv: List View".into(),
        b"glyv" => "glyv: Gallery View".into(),
        b"Flwv" => "Flwv: CoverFlow View".into(),
        _ => format!("Unknown Code: {style}"),
    }
}

/// Codes that do not always mean a folder was opened.
pub const OTHER_INFO_CODES: [&[u8; 4]; 13] = [
    b"Iloc", b"dilc", b"cmmt", b"clip", b"extn", b"logS", b"lg1S", b"modD", b"moDD", b"phyS",
    b"ph1S", b"ptbL", b"ptbN",
];

/// Codes indicating folder interactions.
pub const FOLDER_INTERACTION_CODES: [&[u8; 4]; 29] = [
    b"dscl", b"fdsc", b"vSrn", b"BKGD", b"ICVO", b"LSVO", b"bwsp", b"fwi0", b"fwsw", b"fwvh",
    b"glvp", b"GRP0", b"icgo", b"icsp", b"icvo", b"icvp", b"icvt", b"info", b"lssp", b"lsvC",
    b"lsvo", b"lsvt", b"lsvp", b"lsvP", b"pict", b"bRsV", b"pBBk", b"pBB0", b"vstl",
];
