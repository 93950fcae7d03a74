// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by skybench-client.

use crate::{
    api::models::{Batch, BatchId, ProjectId},
    supervise::{BatchSelector, RerunTrigger},
};
use reqwest::StatusCode;
use thiserror::Error;

/// An error returned by the platform API capability.
///
/// Non-2xx statuses with dedicated semantics (404, 409, 401/403) get their own
/// variants; everything else lands in [`ApiError::Http`] with a body snippet.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// The underlying HTTP client could not be constructed.
    #[error("failed to construct the HTTP client")]
    BuildClient {
        /// The underlying error.
        #[source]
        err: reqwest::Error,
    },

    /// The request could not be sent or the response body could not be read.
    #[error("request to `{path}` failed")]
    Transport {
        /// The request path.
        path: String,
        /// The underlying error.
        #[source]
        err: reqwest::Error,
    },

    /// The platform returned 404 for the requested resource.
    #[error("`{path}` returned 404 Not Found")]
    NotFound {
        /// The request path.
        path: String,
    },

    /// The platform refused a mutating request due to a concurrent
    /// modification (HTTP 409).
    #[error("`{path}` returned 409 Conflict")]
    Conflict {
        /// The request path.
        path: String,
    },

    /// The platform rejected the credentials (HTTP 401 or 403).
    #[error("the platform rejected the request as unauthorized (HTTP {status}); check SKYBENCH_API_TOKEN")]
    Unauthorized {
        /// The status returned by the platform.
        status: StatusCode,
    },

    /// A non-success status without more specific semantics.
    #[error("`{path}` returned HTTP {status}: {body}")]
    Http {
        /// The request path.
        path: String,
        /// The status returned by the platform.
        status: StatusCode,
        /// A snippet of the response body.
        body: String,
    },

    /// A 2xx response whose body did not deserialize into the expected shape.
    #[error("failed to decode the response from `{path}`")]
    Decode {
        /// The request path.
        path: String,
        /// The underlying error.
        #[source]
        err: reqwest::Error,
    },
}

/// A supervise parameter failed validation.
///
/// All variants are detected before any network call is made.
#[derive(Debug, Error)]
pub enum InvalidSuperviseParams {
    /// `--max-rerun-attempts` was below the minimum of 1.
    #[error("--max-rerun-attempts must be at least 1 (got {value})")]
    MaxRerunAttemptsTooLow {
        /// The rejected value.
        value: u32,
    },

    /// `--rerun-max-failure-percent` was outside the half-open interval
    /// (0, 100].
    #[error("--rerun-max-failure-percent must be within (0, 100] (got {value})")]
    FailurePercentOutOfRange {
        /// The rejected value.
        value: f64,
    },

    /// `--rerun-on-states` was empty.
    #[error("--rerun-on-states requires at least one state")]
    NoRerunStates,

    /// A `--rerun-on-states` entry did not name a rerun trigger.
    #[error(
        "unrecognized rerun state `{value}` (known states: {})",
        RerunTrigger::variants().join(", ")
    )]
    UnknownRerunState {
        /// The rejected value.
        value: String,
    },

    /// Neither `--batch-id` nor `--batch-name` was supplied.
    #[error("one of --batch-id or --batch-name is required")]
    BatchSelectorMissing,

    /// Both `--batch-id` and `--batch-name` were supplied.
    #[error("--batch-id and --batch-name are mutually exclusive")]
    BatchSelectorConflict,

    /// `--batch-id` was not a valid UUID.
    #[error("invalid batch id `{input}`")]
    InvalidBatchId {
        /// The rejected input.
        input: String,
        /// The underlying error.
        #[source]
        err: uuid::Error,
    },
}

/// An error returned while resolving a batch selector to a batch record.
#[derive(Debug, Error)]
pub enum LocateError {
    /// No batch matched the selector.
    #[error("batch {selector} not found in project `{project_id}`")]
    NotFound {
        /// The project that was searched.
        project_id: ProjectId,
        /// The selector that did not match.
        selector: BatchSelector,
    },

    /// The platform call failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// An error returned while waiting for a batch to reach a terminal status.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The wall-clock deadline passed before the batch finished.
    ///
    /// The deadline is checked after each poll, so the last observed batch is
    /// always available for logging.
    #[error(
        "deadline exceeded waiting for batch `{}` (last observed status: {last_status})",
        .last_batch.batch_id
    )]
    Timeout {
        /// The status string seen on the final poll.
        last_status: String,
        /// The batch retrieved by the final poll.
        last_batch: Box<Batch>,
    },

    /// The platform returned a batch without a status field.
    #[error("no status returned for batch `{batch_id}`")]
    MissingStatus {
        /// The affected batch.
        batch_id: BatchId,
    },

    /// The platform returned a status this client cannot classify.
    #[error("batch `{batch_id}` reported unrecognized status `{value}`")]
    UnknownStatus {
        /// The affected batch.
        batch_id: BatchId,
        /// The raw status value.
        value: String,
    },

    /// A shutdown signal arrived while waiting; a best-effort cancel request
    /// was issued for the batch.
    #[error("interrupted while waiting for batch `{batch_id}`")]
    Interrupted {
        /// The batch being waited on when the signal arrived.
        batch_id: BatchId,
    },

    /// The poll itself failed.
    #[error(transparent)]
    Locate(#[from] LocateError),

    /// The signal handler could not be installed.
    #[error(transparent)]
    SignalSetup(#[from] SignalHandlerSetupError),
}

impl WaitError {
    /// Returns true if this error is the distinguished timeout kind.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// An error returned while submitting a rerun.
#[derive(Debug, Error)]
pub enum RerunSubmitError {
    /// Every attempt was rejected with 409 Conflict: max retries reached.
    #[error("rerun of batch `{batch_id}` rejected with a conflict {attempts} times: max retries reached")]
    ConflictsExhausted {
        /// The parent batch of the rerun.
        batch_id: BatchId,
        /// The number of attempts made.
        attempts: usize,
    },

    /// The platform call failed for a reason other than a conflict.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// An error returned by a supervision run.
#[derive(Debug, Error)]
pub enum SuperviseError {
    /// Waiting for the current generation failed.
    #[error(transparent)]
    Wait(#[from] WaitError),

    /// Enumerating the jobs of a completed batch failed.
    #[error("failed to enumerate jobs for batch `{batch_id}`")]
    JobEnumeration {
        /// The affected batch.
        batch_id: BatchId,
        /// The underlying error.
        #[source]
        err: ApiError,
    },

    /// Submitting a rerun failed.
    #[error(transparent)]
    Submit(#[from] RerunSubmitError),
}

/// An error occurred while setting up the signal handler.
#[derive(Debug, Error)]
#[error("error setting up signal handler")]
pub struct SignalHandlerSetupError(#[from] std::io::Error);
