#![allow(dead_code)]
/**
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
mod libdsstore;

use std::ffi::OsStr;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use libdsstore::report::{ReportSet, SourceStats};
use libdsstore::store::DsStore;

/// Search a path recursively for .DS_Store files and write TSV reports of
/// every record found in them.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// The source path to search recursively for .DS_Store files to parse
    #[arg(short, long)]
    source: PathBuf,

    /// The destination folder for generated reports
    #[arg(short, long)]
    out: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S").to_string();
    let mut reports = match ReportSet::create(&args.out, &timestamp) {
        Ok(r) => r,
        Err(e) => {
            error!(
                "Unable to proceed. Error creating reports in {}: {e}",
                args.out.display()
            );
            return ExitCode::FAILURE;
        }
    };

    for entry in WalkDir::new(&args.source)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if !name.contains(".ds_store") {
            continue;
        }
        process_file(entry.path(), &args.source, &mut reports);
    }

    match reports.finish() {
        Ok(n) => {
            println!("Records Parsed: {n}");
            println!("Reports are located in {}", args.out.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("error finalizing reports: {e}");
            ExitCode::FAILURE
        }
    }
}

fn process_file(path: &Path, source: &Path, reports: &mut ReportSet) {
    let md = match std::fs::symlink_metadata(path) {
        Ok(md) => md,
        Err(e) => {
            warn!("Error opening {}: {e}", path.display());
            return;
        }
    };
    let stats = SourceStats::from_metadata(&md);

    if md.len() == 0 {
        if path.file_name() == Some(OsStr::new(".DS_Store")) {
            if let Err(e) = reports.write_empty_placeholder(source, path, &stats) {
                warn!("Error writing placeholder for {}: {e}", path.display());
            }
        }
        return;
    }

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Error opening {}: {e}", path.display());
            return;
        }
    };
    let mut store = match DsStore::open(BufReader::new(file), path.display().to_string()) {
        Ok(s) => s,
        Err(e) => {
            warn!("ERROR: {e} for file {}", path.display());
            return;
        }
    };
    info!("DS_Store Found: {}", path.display());

    for record in store.records() {
        if let Err(e) = reports.write_record(&record, source, path, &stats) {
            warn!("Error writing record from {}: {e}", path.display());
        }
    }
}
