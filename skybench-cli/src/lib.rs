// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line client for the skybench simulation and test platform.
//!
//! The interesting machinery lives in `skybench-client`; this crate is the
//! thin shell around it: argument parsing, output formatting, and the
//! translation of outcomes into the [documented exit
//! codes](skybench_metadata::SkybenchExitCode) CI systems consume.

#![warn(missing_docs)]

mod ci;
mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, StderrStyles};
