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
use std::fs::{File, Metadata};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Timelike, Utc};
use tracing::info;

use super::definitions::{FOLDER_INTERACTION_CODES, OTHER_INFO_CODES};
use super::record::DsStoreRecord;

/// Report columns, in output order.
pub const REPORT_FIELDS: [&str; 13] = [
    "generated_path",
    "record_filename",
    "record_type",
    "record_format",
    "record_data",
    "src_create_time",
    "src_mod_time",
    "src_acc_time",
    "src_metadata_change_time",
    "src_permissions",
    "src_size",
    "block",
    "src_file",
];

/// Filesystem metadata of one source file, rendered for the reports.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub create_time: String,
    pub mod_time:    String,
    pub acc_time:    String,
    pub change_time: String,
    pub permissions: String,
    pub size:        u64,
}

impl SourceStats {
    pub fn from_metadata(md: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        let change_time = utc_string(md.ctime(), md.ctime_nsec() as u32);
        // birth time where the filesystem records one, metadata-change
        // time otherwise
        let create_time = md
            .created()
            .ok()
            .and_then(|t| {
                let d = t.duration_since(std::time::UNIX_EPOCH).ok()?;
                Some(utc_string(d.as_secs() as i64, d.subsec_nanos()))
            })
            .unwrap_or_else(|| change_time.clone());

        SourceStats {
            create_time,
            mod_time: utc_string(md.mtime(), md.mtime_nsec() as u32),
            acc_time: utc_string(md.atime(), md.atime_nsec() as u32),
            change_time,
            permissions: format!(
                "{}, User: {}, Group: {}",
                perm_to_text(md.mode()),
                md.uid(),
                md.gid()
            ),
            size: md.len(),
        }
    }
}

fn utc_string(secs: i64, nsecs: u32) -> String {
    match DateTime::<Utc>::from_timestamp(secs, nsecs) {
        Some(dt) => {
            let naive = dt.naive_utc();
            let base = if naive.nanosecond() == 0 {
                naive.format("%Y-%m-%d %H:%M:%S").to_string()
            } else {
                naive.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
            };
            format!("{base}+00:00 [UTC]")
        }
        None => format!("{secs} [UTC]"),
    }
}

/// `"Perms: 33188/-rw-r--r--"` for a raw mode word.
pub fn perm_to_text(mode: u32) -> String {
    let mut bits = String::new();
    for shift in [6u32, 3, 0] {
        let p = (mode >> shift) & 7;
        bits.push(if p & 4 != 0 { 'r' } else { '-' });
        bits.push(if p & 2 != 0 { 'w' } else { '-' });
        bits.push(if p & 1 != 0 { 'x' } else { '-' });
    }
    format!("Perms: {mode}/-{bits}")
}

/// Report fields never carry line or cell separators.
fn sanitize(s: &str) -> String {
    s.chars().filter(|c| !matches!(c, '\r' | '\n' | '\t')).collect()
}

/// Path the record's filename would have relative to the searched tree.
pub fn generate_fullpath(source: &Path, ds_file: &Path, filename: &str) -> String {
    let dir = ds_file
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let rel = if source.is_file() {
        dir
    } else {
        let src_parent = source
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        dir.strip_prefix(&src_parent).unwrap_or(&dir).to_string()
    };
    let joined = format!("{}/{}", rel.trim_end_matches('/'), filename);
    let joined = sanitize(&joined);
    if joined.starts_with('/') {
        joined
    } else {
        format!("/{joined}")
    }
}

/// The three TSV reports of one run.
pub struct ReportSet {
    all:    BufWriter<File>,
    folder: BufWriter<File>,
    other:  BufWriter<File>,
    records_parsed: u64,
}

impl ReportSet {
    pub fn create(outdir: &Path, timestamp: &str) -> io::Result<Self> {
        let open = |name: &str| -> io::Result<BufWriter<File>> {
            let path = outdir.join(format!("DS_Store-{name}-{timestamp}.tsv"));
            let mut w = BufWriter::new(File::create(path)?);
            writeln!(w, "{}", REPORT_FIELDS.join("\t"))?;
            Ok(w)
        };
        Ok(ReportSet {
            all: open("All_Parsed_Report")?,
            folder: open("Folder_Access_Report")?,
            other: open("Miscellaneous_Info_Report")?,
            records_parsed: 0,
        })
    }

    pub fn records_parsed(&self) -> u64 {
        self.records_parsed
    }

    pub fn write_record(
        &mut self,
        rec: &DsStoreRecord,
        source: &Path,
        ds_file: &Path,
        stats: &SourceStats,
    ) -> io::Result<()> {
        let row = [
            generate_fullpath(source, ds_file, rec.filename()),
            sanitize(rec.filename()),
            rec.code_description(),
            rec.format_label(),
            sanitize(&rec.rendered_value()),
            stats.create_time.clone(),
            stats.mod_time.clone(),
            stats.acc_time.clone(),
            stats.change_time.clone(),
            stats.permissions.clone(),
            stats.size.to_string(),
            rec.node().to_string(),
            src_file_field(source, ds_file),
        ];
        let line = row.join("\t");
        writeln!(self.all, "{line}")?;
        self.records_parsed += 1;

        let code = rec.code().as_bytes();
        if OTHER_INFO_CODES.iter().any(|c| *c == code) {
            writeln!(self.other, "{line}")?;
        } else if FOLDER_INTERACTION_CODES.iter().any(|c| *c == code) {
            writeln!(self.folder, "{line}")?;
        } else {
            info!("Code not accounted for: {}", rec.code_description());
        }
        Ok(())
    }

    /// A zero-byte `.DS_Store` still leaves a trace in the all-records
    /// report.
    pub fn write_empty_placeholder(
        &mut self,
        source: &Path,
        ds_file: &Path,
        stats: &SourceStats,
    ) -> io::Result<()> {
        let row = [
            format!("EMPTY DS_STORE: {}", ds_file.display()),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            stats.create_time.clone(),
            stats.mod_time.clone(),
            stats.acc_time.clone(),
            stats.change_time.clone(),
            stats.permissions.clone(),
            stats.size.to_string(),
            String::new(),
            src_file_field(source, ds_file),
        ];
        writeln!(self.all, "{}", row.join("\t"))
    }

    pub fn finish(mut self) -> io::Result<u64> {
        self.all.flush()?;
        self.folder.flush()?;
        self.other.flush()?;
        Ok(self.records_parsed)
    }
}

fn src_file_field(source: &Path, ds_file: &Path) -> String {
    if source.is_file() {
        format!("{}, {}", source.display(), ds_file.display())
    } else {
        ds_file.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perm_text() {
        assert_eq!(perm_to_text(0o100644), "Perms: 33188/-rw-r--r--");
        assert_eq!(perm_to_text(0o100755), "Perms: 33261/-rwxr-xr-x");
    }

    #[test]
    fn sanitize_strips_separators() {
        assert_eq!(sanitize("a\tb\r\nc"), "abc");
    }

    #[test]
    fn fullpath_is_relative_to_the_searched_tree() {
        let p = generate_fullpath(
            Path::new("/evidence/mac"),
            Path::new("/evidence/mac/Users/kim/.DS_Store"),
            "notes.txt",
        );
        assert_eq!(p, "/mac/Users/kim/notes.txt");
    }

    #[test]
    fn fullpath_always_leads_with_a_slash() {
        let p = generate_fullpath(
            Path::new("relative"),
            Path::new("relative/.DS_Store"),
            "x",
        );
        assert!(p.starts_with('/'), "{p}");
    }

    #[test]
    fn timestamps_render_as_utc() {
        assert_eq!(utc_string(0, 0), "1970-01-01 00:00:00+00:00 [UTC]");
        assert_eq!(
            utc_string(1_700_000_000, 250_000_000),
            "2023-11-14 22:13:20.250000+00:00 [UTC]"
        );
    }
}
