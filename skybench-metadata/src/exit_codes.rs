// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `skybench` failures.
///
/// The batch-facing commands (`batch wait`, `batch supervise`) translate the
/// final state of a supervised batch into a process exit code so that CI
/// pipelines can branch on the result without parsing output.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum SkybenchExitCode {}

impl SkybenchExitCode {
    /// No errors occurred and the final batch succeeded.
    pub const OK: i32 = 0;

    /// A fatal error occurred: invalid parameters, a failed lookup, a
    /// transport or protocol error, an unrecognized batch status, or rerun
    /// submission giving up after repeated conflicts.
    pub const FATAL_ERROR: i32 = 1;

    /// The final batch reached the ERROR status and no further rerun was
    /// warranted.
    pub const BATCH_ERROR: i32 = 2;

    /// The final batch was cancelled, either on the platform or through a
    /// shutdown signal delivered to skybench.
    pub const BATCH_CANCELLED: i32 = 5;

    /// The wait deadline elapsed before the batch reached a terminal status.
    ///
    /// The deadline applies per rerun generation and resets whenever a rerun
    /// is submitted. The last observed batch status is logged before exiting.
    pub const WAIT_TIMEOUT: i32 = 6;
}
