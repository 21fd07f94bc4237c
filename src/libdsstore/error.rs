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
use std::io;

use thiserror::Error;

use super::definitions::{BlockId, FourCC};

#[derive(Debug, Error)]
pub enum Error {
    /// The file does not start with the `1, "Bud1"` signature.
    #[error("not a buddy allocator file")]
    BadMagic,

    /// The two root block addresses in the header disagree.
    #[error("root block addresses differ")]
    InconsistentRoot,

    #[error("seek out of range in block")]
    OutOfRange,

    #[error("unable to read {wanted} bytes in block ({remaining} remain)")]
    ShortRead { wanted: usize, remaining: usize },

    #[error("unknown type code {0}")]
    UnknownType(FourCC),

    /// A boolean carrying more than one byte.  Slack decoding rejects
    /// these; see the slack scanner.
    #[error("malformed boolean record")]
    MalformedBool,

    #[error("no entry named {0:?} in the table of contents")]
    MissingName(String),

    #[error("block id {0} is outside the offset table")]
    UnknownBlock(BlockId),

    #[error("malformed bookmark: {0}")]
    Bookmark(&'static str),

    #[error("invalid UTF-16 in filename")]
    Utf16(#[from] std::string::FromUtf16Error),

    #[error(transparent)]
    Decode(#[from] bincode_next::error::DecodeError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
