// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    api::{
        Platform,
        models::{BatchId, JobId, ProjectId},
    },
    errors::{ApiError, RerunSubmitError},
};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Retry policy for rerun submissions rejected with a conflict.
#[derive(Clone, Debug)]
pub struct ConflictRetryPolicy {
    /// How many submissions to attempt before giving up. At least one
    /// submission is always made.
    pub attempts: usize,

    /// How long to pause between attempts.
    pub backoff: Duration,
}

impl Default for ConflictRetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Submits a rerun of `job_ids` against `batch_id`, returning the new
/// batch's identifier.
///
/// The platform rejects reruns with a conflict while it is still finalizing
/// the parent batch; those rejections are retried after a pause. Any other
/// failure is returned immediately.
pub async fn submit_rerun(
    platform: &dyn Platform,
    project_id: ProjectId,
    batch_id: BatchId,
    job_ids: &[JobId],
    retry: &ConflictRetryPolicy,
) -> Result<BatchId, RerunSubmitError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match platform.rerun_batch(project_id, batch_id, job_ids).await {
            Ok(new_batch_id) => return Ok(new_batch_id),
            Err(ApiError::Conflict { .. }) if attempt < retry.attempts => {
                warn!(
                    "rerun of batch `{batch_id}` conflicted (attempt {attempt} of {}), \
                     retrying in {:?}",
                    retry.attempts, retry.backoff,
                );
                sleep(retry.backoff).await;
            }
            Err(ApiError::Conflict { .. }) => {
                return Err(RerunSubmitError::ConflictsExhausted {
                    batch_id,
                    attempts: retry.attempts,
                });
            }
            Err(err) => return Err(err.into()),
        }
    }
}
