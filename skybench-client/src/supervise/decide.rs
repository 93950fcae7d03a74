// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    api::{
        Platform,
        models::{Batch, BatchStatus, JobId, ProjectId},
    },
    errors::ApiError,
    supervise::SuperviseParams,
};
use tracing::{debug, info, warn};

/// Page size used when enumerating a batch's jobs.
pub(crate) const JOB_PAGE_SIZE: u32 = 100;

/// Decides which jobs of a terminal batch should be rerun.
///
/// Returns an empty set without touching the platform when the attempt
/// ceiling has been reached or the batch was cancelled. Otherwise enumerates
/// every job in the batch and returns the identifiers of those whose
/// conflated status matches an undesired state, unless their share of the
/// batch exceeds the failure threshold.
pub(crate) async fn matching_jobs(
    platform: &dyn Platform,
    project_id: ProjectId,
    params: &SuperviseParams,
    batch: &Batch,
    status: &BatchStatus,
    attempt: u32,
) -> Result<Vec<JobId>, ApiError> {
    if attempt >= params.max_rerun_attempts {
        debug!(
            "attempt ceiling reached ({attempt} of {}), not rerunning",
            params.max_rerun_attempts,
        );
        return Ok(Vec::new());
    }
    if matches!(status, BatchStatus::Cancelled) {
        info!("batch `{}` was cancelled, not rerunning", batch.batch_id);
        return Ok(Vec::new());
    }

    let mut total = 0_u64;
    let mut undesired = Vec::new();
    let mut page_token: Option<String> = None;
    loop {
        let page = platform
            .list_jobs(
                project_id,
                batch.batch_id,
                JOB_PAGE_SIZE,
                page_token.as_deref(),
            )
            .await?;
        total += page.jobs.len() as u64;
        undesired.extend(page.jobs.iter().filter_map(|job| {
            // Jobs without a conflated status have no verdict to match.
            let conflated = job.conflated_status?;
            params
                .undesired_states
                .iter()
                .any(|trigger| trigger.matches(conflated))
                .then_some(job.job_id)
        }));
        match page.next_token() {
            Some(token) => page_token = Some(token.to_owned()),
            None => break,
        }
    }

    if undesired.is_empty() {
        debug!(
            "batch `{}`: no jobs ended in undesired states",
            batch.batch_id,
        );
        return Ok(Vec::new());
    }
    if exceeds_failure_threshold(undesired.len() as u64, total, params.rerun_max_failure_percent) {
        warn!(
            "batch `{}`: {} of {total} jobs ended in undesired states, over the {}% threshold; \
             withholding rerun",
            batch.batch_id,
            undesired.len(),
            params.rerun_max_failure_percent,
        );
        return Ok(Vec::new());
    }

    info!(
        "batch `{}`: {} of {total} jobs will be rerun",
        batch.batch_id,
        undesired.len(),
    );
    Ok(undesired)
}

/// Whether `undesired` out of `total` jobs is over `max_failure_percent`.
///
/// The comparison is strict: a batch exactly at the threshold may still be
/// rerun.
fn exceeds_failure_threshold(undesired: u64, total: u64, max_failure_percent: f64) -> bool {
    total > 0 && (undesired * 100) as f64 > max_failure_percent * total as f64
}
