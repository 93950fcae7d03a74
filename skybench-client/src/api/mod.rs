// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The platform API surface.
//!
//! [`Platform`] is the capability the supervision core consumes: the handful
//! of logical operations it needs, with no mention of HTTP. [`ApiClient`] is
//! the production implementation; tests script their own.

mod client;
pub mod models;

pub use client::{ApiClient, ApiClientBuilder, Platform};
