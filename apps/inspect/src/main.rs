// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! spf-inspect - validate STEP physical files.
//!
//! Parses every path given on the command line in parallel and prints a JSON
//! summary to stdout. Exits with status 1 if any file is invalid.
//!
//! # Environment
//!
//! - `SPF_WITH_TREE` - resolve references (default false)
//! - `SPF_ONLY_HEADER` - read only the header section (default false)
//! - `SPF_WITH_HEADER` - decode the header (default true)
//! - `SPF_WORKER_THREADS` - parser threads (default: CPU count)
//! - `SPF_PRETTY` - pretty-print the JSON
//! - `RUST_LOG` - log filter, logs go to stderr

use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;

mod config;
mod report;

use config::Config;
use report::{FileReport, Summary};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,simple_spf_core=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let paths: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if paths.is_empty() {
        bail!("usage: spf-inspect <file.ifc>...");
    }

    let config = Config::from_env();
    let options = config.parse_options();

    tracing::info!(
        files = paths.len(),
        worker_threads = config.worker_threads,
        with_tree = config.with_tree,
        only_header = config.only_header,
        with_header = config.with_header,
        "Starting spf-inspect"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_threads)
        .build()
        .context("failed to build rayon thread pool")?;

    let start = Instant::now();
    let reports: Vec<FileReport> = pool.install(|| {
        paths
            .par_iter()
            .map(|path| {
                let result = simple_spf_core::open(path, options);
                match &result {
                    Ok(model) => tracing::debug!(path = %path.display(), instances = model.len(), "valid"),
                    Err(err) => tracing::warn!(path = %path.display(), error = %err, "invalid"),
                }
                FileReport::new(path, result)
            })
            .collect()
    });

    let summary = Summary::new(&reports);
    tracing::info!(
        valid = summary.valid,
        invalid = summary.invalid,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Inspection complete"
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if config.pretty {
        serde_json::to_writer_pretty(&mut out, &summary)?;
    } else {
        serde_json::to_writer(&mut out, &summary)?;
    }
    writeln!(out)?;
    out.flush()?;

    if summary.invalid > 0 {
        std::process::exit(1);
    }
    Ok(())
}
