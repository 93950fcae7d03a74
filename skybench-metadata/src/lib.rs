// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to skybench's machine-readable output.
//!
//! CI systems that drive `skybench batch wait` or `skybench batch supervise`
//! consume two stable surfaces: the documented process exit codes in
//! [`SkybenchExitCode`], and the JSON supervision report described by
//! [`SuperviseReport`] (printed with `--message-format json`). This crate
//! defines both so that external tooling can depend on them without pulling
//! in the full client.

mod exit_codes;
mod report;

pub use exit_codes::*;
pub use report::*;
