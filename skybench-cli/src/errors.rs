// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::StderrStyles;
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use skybench_client::{
    api::models::BatchId,
    errors::{
        ApiError, InvalidSuperviseParams, LocateError, SignalHandlerSetupError, SuperviseError,
        WaitError,
    },
};
use skybench_metadata::SkybenchExitCode;
use std::error::Error;
use thiserror::Error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error that occurred while running a skybench command.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("no API token provided")]
    ApiTokenMissing,
    #[error("failed to build Tokio runtime")]
    RuntimeBuildFailed { err: std::io::Error },
    #[error("failed to construct API client")]
    ClientBuildFailed { err: ApiError },
    #[error("invalid supervise parameters")]
    InvalidParams {
        #[from]
        err: InvalidSuperviseParams,
    },
    #[error("project not found")]
    ProjectNotFound { requested: String },
    #[error("batch lookup failed")]
    BatchLookupFailed { err: LocateError },
    #[error("API request failed")]
    ApiFailed { err: ApiError },
    #[error("deadline exceeded waiting for batch")]
    WaitTimeout {
        batch_id: BatchId,
        last_status: String,
    },
    #[error("interrupted")]
    Interrupted { batch_id: BatchId },
    #[error("waiting for batch failed")]
    WaitFailed { err: WaitError },
    #[error("batch supervision failed")]
    SuperviseFailed { err: SuperviseError },
    #[error("error setting up signal handler")]
    SignalHandlerSetup {
        #[from]
        err: SignalHandlerSetupError,
    },
    #[error("GITHUB_OUTPUT not set")]
    GithubOutputMissing,
    #[error("failed to write GitHub output")]
    GithubOutputWriteFailed {
        path: Utf8PathBuf,
        err: std::io::Error,
    },
    #[error("failed to serialize report")]
    JsonSerializeFailed { err: serde_json::Error },
    #[error("failed to write to stdout")]
    StdoutWriteFailed { err: std::io::Error },
}

impl ExpectedError {
    /// Converts a wait error, pulling out the variants that carry their own
    /// exit codes.
    pub(crate) fn from_wait_error(err: WaitError) -> Self {
        match err {
            WaitError::Timeout {
                last_status,
                last_batch,
            } => Self::WaitTimeout {
                batch_id: last_batch.batch_id,
                last_status,
            },
            WaitError::Interrupted { batch_id } => Self::Interrupted { batch_id },
            WaitError::Locate(err) => Self::BatchLookupFailed { err },
            WaitError::SignalSetup(err) => Self::SignalHandlerSetup { err },
            other => Self::WaitFailed { err: other },
        }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::WaitTimeout { .. } => SkybenchExitCode::WAIT_TIMEOUT,
            Self::Interrupted { .. } => SkybenchExitCode::BATCH_CANCELLED,
            Self::ApiTokenMissing
            | Self::RuntimeBuildFailed { .. }
            | Self::ClientBuildFailed { .. }
            | Self::InvalidParams { .. }
            | Self::ProjectNotFound { .. }
            | Self::BatchLookupFailed { .. }
            | Self::ApiFailed { .. }
            | Self::WaitFailed { .. }
            | Self::SuperviseFailed { .. }
            | Self::SignalHandlerSetup { .. }
            | Self::GithubOutputMissing
            | Self::GithubOutputWriteFailed { .. }
            | Self::JsonSerializeFailed { .. }
            | Self::StdoutWriteFailed { .. } => SkybenchExitCode::FATAL_ERROR,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::ApiTokenMissing => {
                log::error!(
                    "no API token provided (pass {} or set {})",
                    "--api-token".style(styles.bold),
                    "SKYBENCH_API_TOKEN".style(styles.bold),
                );
                None
            }
            Self::RuntimeBuildFailed { err } => {
                log::error!("failed to build Tokio runtime");
                Some(err as &dyn Error)
            }
            Self::ClientBuildFailed { err } => {
                log::error!("failed to construct API client");
                Some(err as &dyn Error)
            }
            Self::InvalidParams { err } => {
                log::error!("{err}");
                err.source()
            }
            Self::ProjectNotFound { requested } => {
                log::error!(
                    "project `{}` not found (pass a project id or the name of a known project)",
                    requested.style(styles.bold),
                );
                None
            }
            Self::BatchLookupFailed { err } => {
                log::error!("{err}");
                err.source()
            }
            Self::ApiFailed { err } => {
                log::error!("{err}");
                err.source()
            }
            Self::WaitTimeout {
                batch_id,
                last_status,
            } => {
                log::error!(
                    "deadline exceeded waiting for batch `{}` (last observed status: {})",
                    batch_id.style(styles.bold),
                    last_status.style(styles.warning_text),
                );
                None
            }
            Self::Interrupted { batch_id } => {
                log::error!(
                    "interrupted; cancellation requested for batch `{}`",
                    batch_id.style(styles.bold),
                );
                None
            }
            Self::WaitFailed { err } => {
                log::error!("{err}");
                err.source()
            }
            Self::SuperviseFailed { err } => {
                log::error!("{err}");
                err.source()
            }
            Self::SignalHandlerSetup { err } => {
                log::error!("error setting up signal handler");
                Some(err as &dyn Error)
            }
            Self::GithubOutputMissing => {
                log::error!(
                    "{} was passed but {} is not set (is this a GitHub Actions run?)",
                    "--github-output".style(styles.bold),
                    "GITHUB_OUTPUT".style(styles.bold),
                );
                None
            }
            Self::GithubOutputWriteFailed { path, err } => {
                log::error!(
                    "failed to append to GitHub output file `{}`",
                    path.style(styles.bold),
                );
                Some(err as &dyn Error)
            }
            Self::JsonSerializeFailed { err } => {
                log::error!("failed to serialize supervision report");
                Some(err as &dyn Error)
            }
            Self::StdoutWriteFailed { err } => {
                log::error!("failed to write to stdout");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            log::error!(target: "skybench_cli::no_heading", "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

impl From<SuperviseError> for ExpectedError {
    fn from(err: SuperviseError) -> Self {
        match err {
            SuperviseError::Wait(err) => Self::from_wait_error(err),
            other => Self::SuperviseFailed { err: other },
        }
    }
}

impl From<WaitError> for ExpectedError {
    fn from(err: WaitError) -> Self {
        Self::from_wait_error(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use skybench_client::api::models::{Batch, BatchStatus};

    fn running_batch(batch_id: BatchId) -> Batch {
        Batch {
            batch_id,
            friendly_name: Some("nightly".to_owned()),
            status: Some(BatchStatus::ExperiencesRunning),
            parent_batch_id: None,
            creation_timestamp: Utc::now(),
            job_counts: None,
        }
    }

    #[test]
    fn wait_timeout_peels_to_its_own_exit_code() {
        let id = BatchId::new_v4();
        let err = ExpectedError::from_wait_error(WaitError::Timeout {
            last_status: "RUNNING".to_owned(),
            last_batch: Box::new(running_batch(id)),
        });
        assert!(
            matches!(
                &err,
                ExpectedError::WaitTimeout { batch_id, last_status }
                    if *batch_id == id && last_status == "RUNNING"
            ),
            "timeout carries the last observed batch: {err:?}"
        );
        assert_eq!(err.process_exit_code(), SkybenchExitCode::WAIT_TIMEOUT);
    }

    #[test]
    fn interruption_maps_to_the_cancelled_exit_code() {
        let err = ExpectedError::from_wait_error(WaitError::Interrupted {
            batch_id: BatchId::new_v4(),
        });
        assert_eq!(err.process_exit_code(), SkybenchExitCode::BATCH_CANCELLED);
    }

    #[test]
    fn supervise_wait_errors_peel_through() {
        let err: ExpectedError = SuperviseError::Wait(WaitError::Timeout {
            last_status: "QUEUED".to_owned(),
            last_batch: Box::new(running_batch(BatchId::new_v4())),
        })
        .into();
        assert_eq!(err.process_exit_code(), SkybenchExitCode::WAIT_TIMEOUT);
    }

    #[test]
    fn residual_errors_are_fatal() {
        let err = ExpectedError::from_wait_error(WaitError::MissingStatus {
            batch_id: BatchId::new_v4(),
        });
        assert!(matches!(&err, ExpectedError::WaitFailed { .. }));
        assert_eq!(err.process_exit_code(), SkybenchExitCode::FATAL_ERROR);
    }
}
