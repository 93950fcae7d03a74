// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Client library for the [skybench](https://crates.io/crates/skybench) platform. For a
//! higher-level overview, see that documentation.
//!
//! The heart of this crate is the [`supervise`] module, which drives a batch
//! from submission to a terminal status: polling for completion, deciding
//! which jobs ended in undesired states, and submitting reruns until the
//! attempt ceiling is reached.

pub mod api;
pub mod errors;
pub mod signal;
pub mod supervise;
mod time;
