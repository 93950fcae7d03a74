// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch supervision.
//!
//! Supervision drives a submitted batch to a terminal status:
//!
//! 1. locate the batch ([`locate_batch`]),
//! 2. poll until its status is terminal ([`wait_for_completion`]),
//! 3. decide which jobs ended in undesired states,
//! 4. submit a rerun of exactly those jobs ([`submit_rerun`]),
//!
//! then repeat against the rerun batch until a generation comes back clean,
//! the attempt ceiling is reached, or a condition reruns cannot fix is
//! observed (cancellation, or too large a share of jobs failing).
//!
//! [`Supervisor`] ties the steps together; each step is also usable on its
//! own, which is what the `batch wait` and `batch rerun` commands do.

use crate::{
    api::{
        Platform,
        models::{Batch, BatchId, BatchStatus, ConflatedStatus, ProjectId, parse_typed_uuid},
    },
    errors::{InvalidSuperviseParams, SignalHandlerSetupError, SuperviseError, WaitError},
    signal::{SignalHandler, SignalHandlerKind},
    time::stopwatch,
};
use chrono::{DateTime, Local};
use std::{collections::BTreeSet, fmt, str::FromStr, time::Duration};
use tracing::info;

mod decide;
mod locate;
mod submit;
#[cfg(test)]
mod tests;
mod wait;

pub use locate::locate_batch;
pub use submit::{ConflictRetryPolicy, submit_rerun};
pub use wait::wait_for_completion;

/// Designates the batch to operate on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BatchSelector {
    /// An exact batch identifier.
    ById(BatchId),

    /// A friendly name. Names are not unique; a name resolves to the most
    /// recently created batch carrying it.
    ByName(String),
}

impl BatchSelector {
    /// Builds a selector from mutually exclusive command-line inputs.
    ///
    /// Exactly one of `batch_id` and `batch_name` must be provided.
    pub fn new(
        batch_id: Option<&str>,
        batch_name: Option<&str>,
    ) -> Result<Self, InvalidSuperviseParams> {
        match (batch_id, batch_name) {
            (Some(_), Some(_)) => Err(InvalidSuperviseParams::BatchSelectorConflict),
            (None, None) => Err(InvalidSuperviseParams::BatchSelectorMissing),
            (Some(input), None) => {
                let batch_id =
                    parse_typed_uuid(input).map_err(|err| InvalidSuperviseParams::InvalidBatchId {
                        input: input.to_owned(),
                        err,
                    })?;
                Ok(Self::ById(batch_id))
            }
            (None, Some(name)) => Ok(Self::ByName(name.to_owned())),
        }
    }
}

impl fmt::Display for BatchSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ById(batch_id) => write!(f, "`{batch_id}`"),
            Self::ByName(name) => write!(f, "named `{name}`"),
        }
    }
}

/// A job end state that counts as undesired and triggers a rerun.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RerunTrigger {
    /// The job completed with warnings.
    Warning,

    /// The job ended in an error.
    Error,

    /// The job hit a blocking failure.
    Blocker,
}

impl RerunTrigger {
    /// The accepted string forms, as shown in help and error output.
    pub fn variants() -> [&'static str; 3] {
        ["warning", "error", "blocker"]
    }

    pub(crate) fn matches(self, status: ConflatedStatus) -> bool {
        match self {
            Self::Warning => status == ConflatedStatus::Warning,
            Self::Error => status == ConflatedStatus::Error,
            Self::Blocker => status == ConflatedStatus::Blocker,
        }
    }
}

impl FromStr for RerunTrigger {
    type Err = InvalidSuperviseParams;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "blocker" => Ok(Self::Blocker),
            _ => Err(InvalidSuperviseParams::UnknownRerunState {
                value: input.to_owned(),
            }),
        }
    }
}

impl fmt::Display for RerunTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let out = match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Blocker => "blocker",
        };
        f.write_str(out)
    }
}

/// Validated parameters for a supervision run.
///
/// Construct through [`SuperviseParams::new`], which enforces the range
/// checks; the fields are public for reading back. Validation is purely
/// local, so callers can reject bad input before touching the platform.
/// The project to supervise in is passed to [`Supervisor::new`] alongside
/// the platform handle, like the standalone operations take it.
#[derive(Clone, Debug)]
pub struct SuperviseParams {
    /// The batch to supervise.
    pub selector: BatchSelector,

    /// The rerun attempt ceiling (at least 1).
    pub max_rerun_attempts: u32,

    /// Reruns are withheld when more than this percentage of a batch's jobs
    /// ended in undesired states. In `(0, 100]`.
    pub rerun_max_failure_percent: f64,

    /// The job end states that count as undesired.
    pub undesired_states: BTreeSet<RerunTrigger>,

    /// How long each generation may take to reach a terminal status.
    pub wait_timeout: Duration,

    /// How long to sleep between status polls.
    pub poll_interval: Duration,
}

impl SuperviseParams {
    /// Validates and assembles supervision parameters.
    pub fn new(
        selector: BatchSelector,
        max_rerun_attempts: u32,
        rerun_max_failure_percent: f64,
        rerun_on_states: &[String],
        wait_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, InvalidSuperviseParams> {
        if max_rerun_attempts < 1 {
            return Err(InvalidSuperviseParams::MaxRerunAttemptsTooLow {
                value: max_rerun_attempts,
            });
        }
        // Negated form so that NaN is rejected as well.
        if !(rerun_max_failure_percent > 0.0 && rerun_max_failure_percent <= 100.0) {
            return Err(InvalidSuperviseParams::FailurePercentOutOfRange {
                value: rerun_max_failure_percent,
            });
        }
        if rerun_on_states.is_empty() {
            return Err(InvalidSuperviseParams::NoRerunStates);
        }
        let undesired_states = rerun_on_states
            .iter()
            .map(|state| state.parse())
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Self {
            selector,
            max_rerun_attempts,
            rerun_max_failure_percent,
            undesired_states,
            wait_timeout,
            poll_interval,
        })
    }
}

/// The result of a completed supervision run.
#[derive(Clone, Debug)]
pub struct SuperviseOutcome {
    /// The batch that reached a terminal status. If any reruns were
    /// submitted, this is the last rerun, not the batch supervision started
    /// with.
    pub final_batch: Batch,

    /// The terminal status of `final_batch`.
    pub final_status: BatchStatus,

    /// How many batch generations were observed: the original plus any
    /// reruns.
    pub generations: u32,

    /// How many reruns were submitted.
    pub rerun_submissions: u32,

    /// When supervision started.
    pub started_at: DateTime<Local>,

    /// When supervision finished.
    pub finished_at: DateTime<Local>,
}

/// Drives a batch through rerun generations until supervision ends.
pub struct Supervisor<'a> {
    platform: &'a dyn Platform,
    project_id: ProjectId,
    params: SuperviseParams,
    signal_handler: SignalHandler,
    conflict_retry: ConflictRetryPolicy,
}

impl<'a> Supervisor<'a> {
    /// Creates a supervisor, installing the signal handler that makes the run
    /// cancellable.
    pub fn new(
        platform: &'a dyn Platform,
        project_id: ProjectId,
        params: SuperviseParams,
        signal_kind: SignalHandlerKind,
    ) -> Result<Self, SignalHandlerSetupError> {
        let signal_handler = signal_kind.build()?;
        Ok(Self {
            platform,
            project_id,
            params,
            signal_handler,
            conflict_retry: ConflictRetryPolicy::default(),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_conflict_retry(mut self, conflict_retry: ConflictRetryPolicy) -> Self {
        self.conflict_retry = conflict_retry;
        self
    }

    /// Runs supervision to completion.
    ///
    /// Returns once a generation reaches a terminal status and no rerun is
    /// warranted. At most [`max_rerun_attempts`](SuperviseParams::max_rerun_attempts)
    /// reruns are submitted along the way.
    pub async fn run(mut self) -> Result<SuperviseOutcome, SuperviseError> {
        let stopwatch = stopwatch();
        let mut selector = self.params.selector.clone();
        let mut rerun_submissions = 0_u32;

        // One iteration per generation. The decider returns an empty set on
        // the last iteration, so the loop always exits through a return.
        for attempt in 0..=self.params.max_rerun_attempts {
            let batch = wait::wait_with_handler(
                self.platform,
                self.project_id,
                &selector,
                self.params.wait_timeout,
                self.params.poll_interval,
                &mut self.signal_handler,
            )
            .await?;
            let status = batch
                .status
                .clone()
                .ok_or_else(|| WaitError::MissingStatus {
                    batch_id: batch.batch_id,
                })?;

            let rerun_ids = decide::matching_jobs(
                self.platform,
                self.project_id,
                &self.params,
                &batch,
                &status,
                attempt,
            )
            .await
            .map_err(|err| SuperviseError::JobEnumeration {
                batch_id: batch.batch_id,
                err,
            })?;

            if rerun_ids.is_empty() {
                let snapshot = stopwatch.snapshot();
                return Ok(SuperviseOutcome {
                    final_status: status,
                    final_batch: batch,
                    generations: attempt + 1,
                    rerun_submissions,
                    started_at: snapshot.start_time,
                    finished_at: snapshot.end_time(),
                });
            }

            let new_batch_id = submit::submit_rerun(
                self.platform,
                self.project_id,
                batch.batch_id,
                &rerun_ids,
                &self.conflict_retry,
            )
            .await?;
            rerun_submissions += 1;
            info!(
                "submitted rerun `{new_batch_id}` of {} job(s) (attempt {} of {})",
                rerun_ids.len(),
                attempt + 1,
                self.params.max_rerun_attempts,
            );
            selector = BatchSelector::ById(new_batch_id);
        }

        unreachable!("matching_jobs returns an empty set once attempt == max_rerun_attempts")
    }
}
