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
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};

use super::definitions::{self, FourCC};
use super::entry::{DsStoreEntry, Kind, Value};
use super::utils::hex;

/// Mac absolute time epoch (2001-01-01 UTC) in Unix seconds.
const MAC_EPOCH_UNIX: i64 = 978_307_200;

/// A unique store record, ready for presentation.
#[derive(Clone, Debug)]
pub struct DsStoreRecord {
    entry: DsStoreEntry,
}

impl DsStoreRecord {
    pub(crate) fn new(entry: DsStoreEntry) -> Self {
        DsStoreRecord { entry }
    }

    pub fn entry(&self) -> &DsStoreEntry {
        &self.entry
    }

    pub fn filename(&self) -> &str {
        &self.entry.filename
    }

    pub fn code(&self) -> &FourCC {
        &self.entry.code
    }

    pub fn node(&self) -> &str {
        &self.entry.node
    }

    /// The code with its dictionary description, e.g.
    /// `"Iloc (Icon Location)"`.  Unknown codes still surface.
    pub fn code_description(&self) -> String {
        let code = &self.entry.code;
        match definitions::describe(code) {
            Some(d) => format!("{code} ({d})"),
            None => format!("{code} (Unknown Code: {code})"),
        }
    }

    /// Label for the format column: type tags verbatim, codec names as
    /// `"blob (IlocCodec)"`.
    pub fn format_label(&self) -> String {
        match self.entry.kind {
            Kind::Tag(t) => t.to_string(),
            Kind::Codec(name) => format!("blob ({name})"),
        }
    }

    /// Human-readable value.
    ///
    /// `modD`/`moDD` blobs hold a little-endian IEEE-754 double of
    /// seconds since the Mac epoch; `dutc` values count 1/65536ths of a
    /// second since the HFS epoch.  Other blobs render as lowercase hex.
    pub fn rendered_value(&self) -> String {
        let e = &self.entry;
        if e.code.as_bytes() == b"vstl" {
            if let Value::Type(style) = &e.value {
                return definitions::view_style(style);
            }
        }
        match &e.value {
            Value::Blob(raw) if e.code.as_bytes().eq_ignore_ascii_case(b"modd") && raw.len() >= 8 =>
            {
                let mut be = [0u8; 8];
                be.copy_from_slice(&raw[..8]);
                be.reverse();
                mac_timestamp(f64::from_be_bytes(be)).unwrap_or_else(|| hex(raw))
            }
            Value::Blob(raw) => hex(raw),
            Value::U64(v) if e.kind.is_tag(b"dutc") => hfs_timestamp(*v),
            other => other.canonical(),
        }
    }
}

fn format_naive(dt: NaiveDateTime) -> String {
    if dt.nanosecond() == 0 {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

/// Seconds since 2001-01-01 UTC as a rendered UTC timestamp.
fn mac_timestamp(secs: f64) -> Option<String> {
    if !secs.is_finite() {
        return None;
    }
    let micros = (secs * 1e6) as i64;
    let total = micros.checked_add(MAC_EPOCH_UNIX.checked_mul(1_000_000)?)?;
    let dt = DateTime::<Utc>::from_timestamp(
        total.div_euclid(1_000_000),
        (total.rem_euclid(1_000_000) * 1000) as u32,
    )?;
    Some(format_naive(dt.naive_utc()))
}

/// 1/65536ths of a second since 1904-01-01 UTC; integer-microsecond
/// arithmetic so the rendering is exact.
fn hfs_timestamp(v: u64) -> String {
    let micros = u128::from(v) * 1_000_000 / 65536;
    i64::try_from(micros)
        .ok()
        .and_then(|m| {
            NaiveDate::from_ymd_opt(1904, 1, 1)?
                .and_hms_opt(0, 0, 0)?
                .checked_add_signed(Duration::microseconds(m))
        })
        .map(format_naive)
        .unwrap_or_else(|| v.to_string())
}
