// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! GitHub Actions integration.
//!
//! With `--github-output`, supervision results are appended to the step
//! output file that GitHub Actions points to via `GITHUB_OUTPUT`, so later
//! steps can read `batch_id`, `batch_status` and `exit_code` without parsing
//! stdout.

use camino::{Utf8Path, Utf8PathBuf};
use std::{fs::OpenOptions, io, io::Write};

/// Returns the step output file, if this process appears to run under GitHub
/// Actions. An empty or non-UTF-8 `GITHUB_OUTPUT` is treated as unset.
pub(crate) fn github_output_path() -> Option<Utf8PathBuf> {
    let path = std::env::var_os("GITHUB_OUTPUT")?;
    let path = path.into_string().ok()?;
    (!path.is_empty()).then(|| Utf8PathBuf::from(path))
}

/// Appends `key=value` lines to the step output file.
///
/// Callers only pass single-line values, so the multiline delimiter syntax is
/// not needed.
pub(crate) fn append_github_output(
    path: &Utf8Path,
    entries: &[(&str, String)],
) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for (key, value) in entries {
        writeln!(file, "{key}={value}")?;
    }
    Ok(())
}
