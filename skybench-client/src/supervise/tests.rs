// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scenario tests for batch supervision against a scripted platform.
//!
//! [`FakePlatform`] pops pre-loaded responses per operation and panics on any
//! call it has no script for. The panics are load-bearing: several tests
//! assert that an operation is *not* called by leaving its queue empty.

use super::{
    BatchSelector, ConflictRetryPolicy, RerunTrigger, SuperviseParams, Supervisor, decide,
    locate_batch, submit_rerun, wait, wait_for_completion,
};
use crate::{
    api::{
        Platform,
        models::{
            Batch, BatchId, BatchPage, BatchStatus, ConflatedStatus, Job, JobId, JobPage,
            ProjectId,
        },
    },
    errors::{ApiError, LocateError, RerunSubmitError, SuperviseError, WaitError},
    signal::SignalHandlerKind,
};
use async_trait::async_trait;
use chrono::Utc;
use maplit::btreeset;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use std::{collections::VecDeque, sync::Mutex, time::Duration};

#[derive(Debug, Default)]
struct FakePlatform {
    get_batch: Mutex<VecDeque<Result<Batch, ApiError>>>,
    list_batches: Mutex<VecDeque<Result<BatchPage, ApiError>>>,
    list_jobs: Mutex<VecDeque<Result<JobPage, ApiError>>>,
    rerun_batch: Mutex<VecDeque<Result<BatchId, ApiError>>>,
    cancel_batch: Mutex<VecDeque<Result<(), ApiError>>>,
    calls: Mutex<CallCounts>,
    rerun_requests: Mutex<Vec<(BatchId, Vec<JobId>)>>,
    cancelled: Mutex<Vec<BatchId>>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct CallCounts {
    get_batch: usize,
    list_batches: usize,
    list_jobs: usize,
    rerun_batch: usize,
    cancel_batch: usize,
}

impl FakePlatform {
    fn push_get_batch(&self, result: Result<Batch, ApiError>) {
        self.get_batch.lock().unwrap().push_back(result);
    }

    fn push_list_batches(&self, result: Result<BatchPage, ApiError>) {
        self.list_batches.lock().unwrap().push_back(result);
    }

    fn push_list_jobs(&self, result: Result<JobPage, ApiError>) {
        self.list_jobs.lock().unwrap().push_back(result);
    }

    fn push_rerun_batch(&self, result: Result<BatchId, ApiError>) {
        self.rerun_batch.lock().unwrap().push_back(result);
    }

    fn push_cancel_batch(&self, result: Result<(), ApiError>) {
        self.cancel_batch.lock().unwrap().push_back(result);
    }

    fn calls(&self) -> CallCounts {
        *self.calls.lock().unwrap()
    }

    fn rerun_requests(&self) -> Vec<(BatchId, Vec<JobId>)> {
        self.rerun_requests.lock().unwrap().clone()
    }

    fn cancelled(&self) -> Vec<BatchId> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn get_batch(
        &self,
        _project_id: ProjectId,
        batch_id: BatchId,
    ) -> Result<Batch, ApiError> {
        self.calls.lock().unwrap().get_batch += 1;
        let result = self
            .get_batch
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected get_batch call for `{batch_id}`"));
        if let Ok(batch) = &result {
            // Scripted responses double as an ordering check: each fetch must
            // be for the batch the script expects next.
            assert_eq!(batch.batch_id, batch_id, "get_batch queried out of order");
        }
        result
    }

    async fn list_batches(
        &self,
        _project_id: ProjectId,
        _page_token: Option<&str>,
    ) -> Result<BatchPage, ApiError> {
        self.calls.lock().unwrap().list_batches += 1;
        self.list_batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected list_batches call"))
    }

    async fn list_jobs(
        &self,
        _project_id: ProjectId,
        batch_id: BatchId,
        page_size: u32,
        _page_token: Option<&str>,
    ) -> Result<JobPage, ApiError> {
        assert_eq!(page_size, decide::JOB_PAGE_SIZE, "job enumeration page size");
        self.calls.lock().unwrap().list_jobs += 1;
        self.list_jobs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected list_jobs call for `{batch_id}`"))
    }

    async fn rerun_batch(
        &self,
        _project_id: ProjectId,
        batch_id: BatchId,
        job_ids: &[JobId],
    ) -> Result<BatchId, ApiError> {
        self.calls.lock().unwrap().rerun_batch += 1;
        self.rerun_requests
            .lock()
            .unwrap()
            .push((batch_id, job_ids.to_vec()));
        self.rerun_batch
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected rerun_batch call for `{batch_id}`"))
    }

    async fn cancel_batch(&self, _project_id: ProjectId, batch_id: BatchId) -> Result<(), ApiError> {
        self.calls.lock().unwrap().cancel_batch += 1;
        self.cancelled.lock().unwrap().push(batch_id);
        self.cancel_batch
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected cancel_batch call for `{batch_id}`"))
    }
}

fn batch(batch_id: BatchId, status: BatchStatus) -> Batch {
    Batch {
        batch_id,
        friendly_name: None,
        status: Some(status),
        parent_batch_id: None,
        creation_timestamp: Utc::now(),
        job_counts: None,
    }
}

fn named_batch(batch_id: BatchId, name: &str, status: BatchStatus) -> Batch {
    Batch {
        friendly_name: Some(name.to_owned()),
        ..batch(batch_id, status)
    }
}

fn job(conflated_status: Option<ConflatedStatus>) -> Job {
    Job {
        job_id: JobId::new_v4(),
        name: None,
        conflated_status,
    }
}

fn job_page(jobs: Vec<Job>, next_page_token: Option<&str>) -> JobPage {
    JobPage {
        jobs,
        next_page_token: next_page_token.map(str::to_owned),
    }
}

fn batch_page(batches: Vec<Batch>, next_page_token: Option<&str>) -> BatchPage {
    BatchPage {
        batches,
        next_page_token: next_page_token.map(str::to_owned),
    }
}

fn server_error(path: &str) -> ApiError {
    ApiError::Http {
        path: path.to_owned(),
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: "internal error".to_owned(),
    }
}

/// Baseline supervision parameters: rerun on error/blocker, up to 3
/// attempts, 60% failure threshold, fast polling.
fn params(selector: BatchSelector) -> SuperviseParams {
    SuperviseParams::new(
        selector,
        3,
        60.0,
        &["error".to_owned(), "blocker".to_owned()],
        Duration::from_secs(5),
        Duration::from_millis(10),
    )
    .expect("baseline test params are valid")
}

// ---
// Locating
// ---

#[tokio::test]
async fn locate_by_id_returns_batch() {
    let platform = FakePlatform::default();
    let project_id = ProjectId::new_v4();
    let batch_id = BatchId::new_v4();
    platform.push_get_batch(Ok(batch(batch_id, BatchStatus::Submitted)));

    let found = locate_batch(&platform, project_id, &BatchSelector::ById(batch_id))
        .await
        .expect("batch is found");
    assert_eq!(found.batch_id, batch_id);
    assert_eq!(platform.calls().get_batch, 1);
}

#[tokio::test]
async fn locate_by_id_maps_missing_batch() {
    let platform = FakePlatform::default();
    let project_id = ProjectId::new_v4();
    let batch_id = BatchId::new_v4();
    platform.push_get_batch(Err(ApiError::NotFound {
        path: "/batches".to_owned(),
    }));

    let err = locate_batch(&platform, project_id, &BatchSelector::ById(batch_id))
        .await
        .unwrap_err();
    match &err {
        LocateError::NotFound { selector, .. } => {
            assert_eq!(selector, &BatchSelector::ById(batch_id));
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert!(
        err.to_string().contains(&project_id.to_string()),
        "message names the project: {err}"
    );
}

#[tokio::test]
async fn locate_by_id_propagates_other_errors() {
    let platform = FakePlatform::default();
    platform.push_get_batch(Err(server_error("/batches")));

    let err = locate_batch(
        &platform,
        ProjectId::new_v4(),
        &BatchSelector::ById(BatchId::new_v4()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, LocateError::Api(ApiError::Http { .. })));
}

#[tokio::test]
async fn locate_by_name_picks_newest_match() {
    let platform = FakePlatform::default();
    let newest = BatchId::new_v4();
    let older = BatchId::new_v4();
    // The platform returns batches newest-first.
    platform.push_list_batches(Ok(batch_page(
        vec![
            named_batch(BatchId::new_v4(), "other", BatchStatus::Succeeded),
            named_batch(newest, "nightly", BatchStatus::Submitted),
            named_batch(older, "nightly", BatchStatus::Succeeded),
        ],
        None,
    )));

    let found = locate_batch(
        &platform,
        ProjectId::new_v4(),
        &BatchSelector::ByName("nightly".to_owned()),
    )
    .await
    .expect("batch is found");
    assert_eq!(found.batch_id, newest);
}

#[tokio::test]
async fn locate_by_name_walks_pages() {
    let platform = FakePlatform::default();
    let wanted = BatchId::new_v4();
    platform.push_list_batches(Ok(batch_page(
        vec![named_batch(
            BatchId::new_v4(),
            "other",
            BatchStatus::Succeeded,
        )],
        Some("page-2"),
    )));
    platform.push_list_batches(Ok(batch_page(
        vec![named_batch(wanted, "nightly", BatchStatus::Submitted)],
        None,
    )));

    let found = locate_batch(
        &platform,
        ProjectId::new_v4(),
        &BatchSelector::ByName("nightly".to_owned()),
    )
    .await
    .expect("batch is found");
    assert_eq!(found.batch_id, wanted);
    assert_eq!(platform.calls().list_batches, 2);
}

#[tokio::test]
async fn locate_by_name_reports_no_match() {
    let platform = FakePlatform::default();
    platform.push_list_batches(Ok(batch_page(
        vec![named_batch(
            BatchId::new_v4(),
            "other",
            BatchStatus::Succeeded,
        )],
        None,
    )));

    let err = locate_batch(
        &platform,
        ProjectId::new_v4(),
        &BatchSelector::ByName("nightly".to_owned()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, LocateError::NotFound { .. }));
    assert!(err.to_string().contains("nightly"), "message names the batch: {err}");
}

// ---
// Waiting
// ---

#[tokio::test]
async fn wait_returns_on_terminal_success() {
    let platform = FakePlatform::default();
    let project_id = ProjectId::new_v4();
    let batch_id = BatchId::new_v4();
    platform.push_get_batch(Ok(batch(batch_id, BatchStatus::Submitted)));
    platform.push_get_batch(Ok(batch(batch_id, BatchStatus::ExperiencesRunning)));
    platform.push_get_batch(Ok(batch(batch_id, BatchStatus::Succeeded)));

    let finished = wait_for_completion(
        &platform,
        project_id,
        &BatchSelector::ById(batch_id),
        Duration::from_secs(5),
        Duration::from_millis(10),
        SignalHandlerKind::Noop,
    )
    .await
    .expect("batch completes");
    assert_eq!(finished.status, Some(BatchStatus::Succeeded));
    assert_eq!(platform.calls().get_batch, 3);
}

#[tokio::test]
async fn wait_returns_failed_batches_without_erroring() {
    // ERROR is terminal for the waiter; turning it into an exit code is the
    // caller's business.
    let platform = FakePlatform::default();
    let batch_id = BatchId::new_v4();
    platform.push_get_batch(Ok(batch(batch_id, BatchStatus::Error)));

    let finished = wait_for_completion(
        &platform,
        ProjectId::new_v4(),
        &BatchSelector::ById(batch_id),
        Duration::from_secs(5),
        Duration::from_millis(10),
        SignalHandlerKind::Noop,
    )
    .await
    .expect("wait itself succeeds");
    assert_eq!(finished.status, Some(BatchStatus::Error));
}

#[tokio::test]
async fn wait_flags_missing_status() {
    let platform = FakePlatform::default();
    let batch_id = BatchId::new_v4();
    let mut no_status = batch(batch_id, BatchStatus::Submitted);
    no_status.status = None;
    platform.push_get_batch(Ok(no_status));

    let err = wait_for_completion(
        &platform,
        ProjectId::new_v4(),
        &BatchSelector::ById(batch_id),
        Duration::from_secs(5),
        Duration::from_millis(10),
        SignalHandlerKind::Noop,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, WaitError::MissingStatus { batch_id: b } if b == batch_id));
}

#[tokio::test]
async fn wait_flags_unknown_status() {
    let platform = FakePlatform::default();
    let batch_id = BatchId::new_v4();
    platform.push_get_batch(Ok(batch(
        batch_id,
        BatchStatus::Unknown("ARCHIVED".to_owned()),
    )));

    let err = wait_for_completion(
        &platform,
        ProjectId::new_v4(),
        &BatchSelector::ById(batch_id),
        Duration::from_secs(5),
        Duration::from_millis(10),
        SignalHandlerKind::Noop,
    )
    .await
    .unwrap_err();
    match &err {
        WaitError::UnknownStatus { value, .. } => assert_eq!(value, "ARCHIVED"),
        other => panic!("expected UnknownStatus, got {other:?}"),
    }
    assert!(
        err.to_string().contains("ARCHIVED"),
        "message quotes the raw value: {err}"
    );
}

#[tokio::test]
async fn wait_times_out_with_last_observed_batch() {
    let platform = FakePlatform::default();
    let batch_id = BatchId::new_v4();
    // More polls than the deadline allows; names identify the final poll.
    for n in 1..=4 {
        platform.push_get_batch(Ok(named_batch(
            batch_id,
            &format!("poll-{n}"),
            BatchStatus::ExperiencesRunning,
        )));
    }

    let err = wait_for_completion(
        &platform,
        ProjectId::new_v4(),
        &BatchSelector::ById(batch_id),
        Duration::from_millis(50),
        Duration::from_millis(20),
        SignalHandlerKind::Noop,
    )
    .await
    .unwrap_err();

    let polls = platform.calls().get_batch;
    assert!(
        (2..=4).contains(&polls),
        "deadline is checked after polling: {polls} polls"
    );
    assert!(err.is_timeout());
    match err {
        WaitError::Timeout {
            last_status,
            last_batch,
        } => {
            assert_eq!(last_status, "EXPERIENCES_RUNNING");
            // The batch carried by the error is the one from the final poll.
            assert_eq!(last_batch.friendly_name, Some(format!("poll-{polls}")));
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn wait_zero_timeout_still_polls_once() {
    let platform = FakePlatform::default();
    let batch_id = BatchId::new_v4();
    platform.push_get_batch(Ok(batch(batch_id, BatchStatus::Succeeded)));

    let finished = wait_for_completion(
        &platform,
        ProjectId::new_v4(),
        &BatchSelector::ById(batch_id),
        Duration::ZERO,
        Duration::from_millis(10),
        SignalHandlerKind::Noop,
    )
    .await
    .expect("an already-terminal batch beats a zero timeout");
    assert_eq!(finished.status, Some(BatchStatus::Succeeded));
    assert_eq!(platform.calls().get_batch, 1);
}

#[tokio::test]
async fn wait_zero_timeout_reports_timeout_when_in_flight() {
    let platform = FakePlatform::default();
    let batch_id = BatchId::new_v4();
    platform.push_get_batch(Ok(batch(batch_id, BatchStatus::Submitted)));
    platform.push_get_batch(Ok(batch(batch_id, BatchStatus::Submitted)));

    let err = wait_for_completion(
        &platform,
        ProjectId::new_v4(),
        &BatchSelector::ById(batch_id),
        Duration::ZERO,
        Duration::from_millis(5),
        SignalHandlerKind::Noop,
    )
    .await
    .unwrap_err();
    assert!(err.is_timeout());
    assert!(platform.calls().get_batch >= 1);
}

#[tokio::test]
async fn wait_by_name_relocates_each_poll() {
    // Waiting on a name re-resolves it every poll, so supervision follows
    // the platform's record rather than a stale snapshot.
    let platform = FakePlatform::default();
    let batch_id = BatchId::new_v4();
    platform.push_list_batches(Ok(batch_page(
        vec![named_batch(batch_id, "nightly", BatchStatus::Submitted)],
        None,
    )));
    platform.push_list_batches(Ok(batch_page(
        vec![named_batch(batch_id, "nightly", BatchStatus::Succeeded)],
        None,
    )));

    let finished = wait_for_completion(
        &platform,
        ProjectId::new_v4(),
        &BatchSelector::ByName("nightly".to_owned()),
        Duration::from_secs(5),
        Duration::from_millis(10),
        SignalHandlerKind::Noop,
    )
    .await
    .expect("batch completes");
    assert_eq!(finished.status, Some(BatchStatus::Succeeded));
    assert_eq!(platform.calls().list_batches, 2);
}

// ---
// Interruption
// ---

#[cfg(unix)]
#[tokio::test]
async fn interrupt_issues_best_effort_cancel() {
    let platform = FakePlatform::default();
    let batch_id = BatchId::new_v4();
    for _ in 0..50 {
        platform.push_get_batch(Ok(batch(batch_id, BatchStatus::ExperiencesRunning)));
    }
    platform.push_cancel_batch(Ok(()));

    let mut handler = SignalHandlerKind::Standard
        .build()
        .expect("signal handler installs");
    let selector = BatchSelector::ById(batch_id);
    let wait_fut = wait::wait_with_handler(
        &platform,
        ProjectId::new_v4(),
        &selector,
        Duration::from_secs(30),
        Duration::from_millis(10),
        &mut handler,
    );
    let raise = async {
        tokio::time::sleep(Duration::from_millis(25)).await;
        // Raise SIGHUP at ourselves; the installed handler turns it into a
        // shutdown event instead of killing the test binary.
        unsafe {
            libc::raise(libc::SIGHUP);
        }
    };

    let (result, ()) = tokio::join!(wait_fut, raise);
    let err = result.unwrap_err();
    assert!(matches!(err, WaitError::Interrupted { batch_id: b } if b == batch_id));
    assert_eq!(platform.cancelled(), vec![batch_id]);
}

#[cfg(unix)]
#[tokio::test]
async fn interrupt_reported_even_if_cancel_fails() {
    let platform = FakePlatform::default();
    let batch_id = BatchId::new_v4();
    for _ in 0..50 {
        platform.push_get_batch(Ok(batch(batch_id, BatchStatus::ExperiencesRunning)));
    }
    platform.push_cancel_batch(Err(server_error("/cancel")));

    let mut handler = SignalHandlerKind::Standard
        .build()
        .expect("signal handler installs");
    let selector = BatchSelector::ById(batch_id);
    let wait_fut = wait::wait_with_handler(
        &platform,
        ProjectId::new_v4(),
        &selector,
        Duration::from_secs(30),
        Duration::from_millis(10),
        &mut handler,
    );
    let raise = async {
        tokio::time::sleep(Duration::from_millis(25)).await;
        unsafe {
            libc::raise(libc::SIGHUP);
        }
    };

    let (result, ()) = tokio::join!(wait_fut, raise);
    assert!(matches!(
        result.unwrap_err(),
        WaitError::Interrupted { batch_id: b } if b == batch_id
    ));
    assert_eq!(platform.calls().cancel_batch, 1);
}

// ---
// Deciding
// ---

#[tokio::test]
async fn decider_skips_platform_when_attempts_exhausted() {
    let platform = FakePlatform::default();
    let project_id = ProjectId::new_v4();
    let the_batch = batch(BatchId::new_v4(), BatchStatus::Error);
    let p = params(BatchSelector::ById(the_batch.batch_id));

    let ids = decide::matching_jobs(
        &platform,
        project_id,
        &p,
        &the_batch,
        &BatchStatus::Error,
        p.max_rerun_attempts,
    )
    .await
    .expect("decider succeeds");
    assert!(ids.is_empty());
    assert_eq!(platform.calls(), CallCounts::default());
}

#[tokio::test]
async fn decider_skips_platform_for_cancelled_batches() {
    let platform = FakePlatform::default();
    let project_id = ProjectId::new_v4();
    let the_batch = batch(BatchId::new_v4(), BatchStatus::Cancelled);
    let p = params(BatchSelector::ById(the_batch.batch_id));

    let ids = decide::matching_jobs(
        &platform,
        project_id,
        &p,
        &the_batch,
        &BatchStatus::Cancelled,
        0,
    )
    .await
    .expect("decider succeeds");
    assert!(ids.is_empty());
    assert_eq!(platform.calls(), CallCounts::default());
}

#[tokio::test]
async fn decider_collects_matching_jobs_across_pages() {
    let platform = FakePlatform::default();
    let project_id = ProjectId::new_v4();
    let the_batch = batch(BatchId::new_v4(), BatchStatus::Error);
    let mut p = params(BatchSelector::ById(the_batch.batch_id));
    p.rerun_max_failure_percent = 100.0;

    let erred = job(Some(ConflatedStatus::Error));
    let blocked = job(Some(ConflatedStatus::Blocker));
    let second_page_error = job(Some(ConflatedStatus::Error));
    platform.push_list_jobs(Ok(job_page(
        vec![
            job(Some(ConflatedStatus::Passed)),
            erred.clone(),
            // Cancelled jobs are not in the undesired set and stay put.
            job(Some(ConflatedStatus::Cancelled)),
            blocked.clone(),
        ],
        Some("page-2"),
    )));
    platform.push_list_jobs(Ok(job_page(
        vec![job(Some(ConflatedStatus::Warning)), second_page_error.clone()],
        None,
    )));

    let ids = decide::matching_jobs(&platform, project_id, &p, &the_batch, &BatchStatus::Error, 0)
        .await
        .expect("decider succeeds");
    assert_eq!(
        ids,
        vec![erred.job_id, blocked.job_id, second_page_error.job_id]
    );
    assert_eq!(platform.calls().list_jobs, 2);
}

#[tokio::test]
async fn decider_ignores_jobs_without_a_verdict() {
    let platform = FakePlatform::default();
    let project_id = ProjectId::new_v4();
    let the_batch = batch(BatchId::new_v4(), BatchStatus::Error);
    let mut p = params(BatchSelector::ById(the_batch.batch_id));
    p.undesired_states = btreeset! {RerunTrigger::Error};
    p.rerun_max_failure_percent = 100.0;

    let erred = job(Some(ConflatedStatus::Error));
    platform.push_list_jobs(Ok(job_page(
        vec![job(None), job(Some(ConflatedStatus::Passed)), erred.clone()],
        None,
    )));

    let ids = decide::matching_jobs(&platform, project_id, &p, &the_batch, &BatchStatus::Error, 0)
        .await
        .expect("decider succeeds");
    assert_eq!(ids, vec![erred.job_id]);
}

#[tokio::test]
async fn decider_withholds_rerun_over_failure_threshold() {
    let platform = FakePlatform::default();
    let project_id = ProjectId::new_v4();
    let the_batch = batch(BatchId::new_v4(), BatchStatus::Error);
    let mut p = params(BatchSelector::ById(the_batch.batch_id));
    p.rerun_max_failure_percent = 25.0;

    // 2 of 4 failed: 50% > 25%.
    platform.push_list_jobs(Ok(job_page(
        vec![
            job(Some(ConflatedStatus::Error)),
            job(Some(ConflatedStatus::Error)),
            job(Some(ConflatedStatus::Passed)),
            job(Some(ConflatedStatus::Passed)),
        ],
        None,
    )));

    let ids = decide::matching_jobs(&platform, project_id, &p, &the_batch, &BatchStatus::Error, 0)
        .await
        .expect("decider succeeds");
    assert!(ids.is_empty(), "rerun withheld over the threshold");
    assert_eq!(platform.calls().list_jobs, 1);
}

#[tokio::test]
async fn decider_allows_rerun_exactly_at_threshold() {
    let platform = FakePlatform::default();
    let project_id = ProjectId::new_v4();
    let the_batch = batch(BatchId::new_v4(), BatchStatus::Error);
    let mut p = params(BatchSelector::ById(the_batch.batch_id));
    p.rerun_max_failure_percent = 25.0;

    // 1 of 4 failed: exactly 25%, not over it.
    let erred = job(Some(ConflatedStatus::Error));
    platform.push_list_jobs(Ok(job_page(
        vec![
            erred.clone(),
            job(Some(ConflatedStatus::Passed)),
            job(Some(ConflatedStatus::Passed)),
            job(Some(ConflatedStatus::Passed)),
        ],
        None,
    )));

    let ids = decide::matching_jobs(&platform, project_id, &p, &the_batch, &BatchStatus::Error, 0)
        .await
        .expect("decider succeeds");
    assert_eq!(ids, vec![erred.job_id]);
}

#[tokio::test]
async fn decider_returns_empty_for_batches_without_jobs() {
    let platform = FakePlatform::default();
    let project_id = ProjectId::new_v4();
    let the_batch = batch(BatchId::new_v4(), BatchStatus::Succeeded);
    let p = params(BatchSelector::ById(the_batch.batch_id));

    platform.push_list_jobs(Ok(job_page(Vec::new(), None)));

    let ids = decide::matching_jobs(
        &platform,
        project_id,
        &p,
        &the_batch,
        &BatchStatus::Succeeded,
        0,
    )
    .await
    .expect("decider succeeds");
    assert!(ids.is_empty());
}

// ---
// Submitting
// ---

#[tokio::test]
async fn submit_rerun_returns_new_batch_id() {
    let platform = FakePlatform::default();
    let parent = BatchId::new_v4();
    let rerun = BatchId::new_v4();
    let job_ids = vec![JobId::new_v4(), JobId::new_v4()];
    platform.push_rerun_batch(Ok(rerun));

    let new_id = submit_rerun(
        &platform,
        ProjectId::new_v4(),
        parent,
        &job_ids,
        &ConflictRetryPolicy::default(),
    )
    .await
    .expect("rerun submits");
    assert_eq!(new_id, rerun);
    assert_eq!(platform.rerun_requests(), vec![(parent, job_ids)]);
}

#[tokio::test]
async fn submit_rerun_retries_conflicts() {
    let platform = FakePlatform::default();
    let parent = BatchId::new_v4();
    let rerun = BatchId::new_v4();
    platform.push_rerun_batch(Err(ApiError::Conflict {
        path: "/rerun".to_owned(),
    }));
    platform.push_rerun_batch(Err(ApiError::Conflict {
        path: "/rerun".to_owned(),
    }));
    platform.push_rerun_batch(Ok(rerun));

    let retry = ConflictRetryPolicy {
        attempts: 3,
        backoff: Duration::from_millis(5),
    };
    let new_id = submit_rerun(
        &platform,
        ProjectId::new_v4(),
        parent,
        &[JobId::new_v4()],
        &retry,
    )
    .await
    .expect("rerun submits on the third attempt");
    assert_eq!(new_id, rerun);
    assert_eq!(platform.calls().rerun_batch, 3);
}

#[tokio::test]
async fn submit_rerun_gives_up_after_conflict_budget() {
    let platform = FakePlatform::default();
    let parent = BatchId::new_v4();
    for _ in 0..3 {
        platform.push_rerun_batch(Err(ApiError::Conflict {
            path: "/rerun".to_owned(),
        }));
    }

    let retry = ConflictRetryPolicy {
        attempts: 3,
        backoff: Duration::from_millis(5),
    };
    let err = submit_rerun(
        &platform,
        ProjectId::new_v4(),
        parent,
        &[JobId::new_v4()],
        &retry,
    )
    .await
    .unwrap_err();
    match err {
        RerunSubmitError::ConflictsExhausted { batch_id, attempts } => {
            assert_eq!(batch_id, parent);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected ConflictsExhausted, got {other:?}"),
    }
    assert_eq!(platform.calls().rerun_batch, 3);
}

#[tokio::test]
async fn submit_rerun_does_not_retry_other_errors() {
    let platform = FakePlatform::default();
    platform.push_rerun_batch(Err(server_error("/rerun")));

    let err = submit_rerun(
        &platform,
        ProjectId::new_v4(),
        BatchId::new_v4(),
        &[JobId::new_v4()],
        &ConflictRetryPolicy::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RerunSubmitError::Api(ApiError::Http { .. })));
    assert_eq!(platform.calls().rerun_batch, 1);
}

// ---
// Supervising
// ---

#[tokio::test]
async fn supervisor_returns_clean_batch_without_rerun() {
    let platform = FakePlatform::default();
    let project_id = ProjectId::new_v4();
    let batch_id = BatchId::new_v4();
    platform.push_get_batch(Ok(batch(batch_id, BatchStatus::ExperiencesRunning)));
    platform.push_get_batch(Ok(batch(batch_id, BatchStatus::Succeeded)));
    platform.push_list_jobs(Ok(job_page(
        vec![job(Some(ConflatedStatus::Passed)), job(Some(ConflatedStatus::Passed))],
        None,
    )));

    let supervisor = Supervisor::new(
        &platform,
        project_id,
        params(BatchSelector::ById(batch_id)),
        SignalHandlerKind::Noop,
    )
    .expect("noop handler");
    let outcome = supervisor.run().await.expect("supervision completes");

    assert_eq!(outcome.final_batch.batch_id, batch_id);
    assert_eq!(outcome.final_status, BatchStatus::Succeeded);
    assert_eq!(outcome.generations, 1);
    assert_eq!(outcome.rerun_submissions, 0);
    assert!(outcome.finished_at >= outcome.started_at);
    assert_eq!(
        platform.calls(),
        CallCounts {
            get_batch: 2,
            list_jobs: 1,
            ..CallCounts::default()
        }
    );
}

#[tokio::test]
async fn supervisor_reruns_undesired_jobs_and_follows_new_batch() {
    let platform = FakePlatform::default();
    let project_id = ProjectId::new_v4();
    let original = BatchId::new_v4();
    let rerun = BatchId::new_v4();

    // Generation 1: the original batch fails one of three jobs.
    platform.push_get_batch(Ok(batch(original, BatchStatus::ExperiencesRunning)));
    platform.push_get_batch(Ok(batch(original, BatchStatus::Error)));
    let erred = job(Some(ConflatedStatus::Error));
    platform.push_list_jobs(Ok(job_page(
        vec![
            job(Some(ConflatedStatus::Passed)),
            erred.clone(),
            job(Some(ConflatedStatus::Passed)),
        ],
        None,
    )));
    platform.push_rerun_batch(Ok(rerun));

    // Generation 2: the rerun comes back clean.
    platform.push_get_batch(Ok(batch(rerun, BatchStatus::BatchMetricsRunning)));
    platform.push_get_batch(Ok(batch(rerun, BatchStatus::Succeeded)));
    platform.push_list_jobs(Ok(job_page(vec![job(Some(ConflatedStatus::Passed))], None)));

    let supervisor = Supervisor::new(
        &platform,
        project_id,
        params(BatchSelector::ById(original)),
        SignalHandlerKind::Noop,
    )
    .expect("noop handler");
    let outcome = supervisor.run().await.expect("supervision completes");

    assert_eq!(outcome.final_batch.batch_id, rerun);
    assert_eq!(outcome.final_status, BatchStatus::Succeeded);
    assert_eq!(outcome.generations, 2);
    assert_eq!(outcome.rerun_submissions, 1);
    // Exactly the undesired job was resubmitted, against the original batch.
    assert_eq!(platform.rerun_requests(), vec![(original, vec![erred.job_id])]);
    assert_eq!(
        platform.calls(),
        CallCounts {
            get_batch: 4,
            list_jobs: 2,
            rerun_batch: 1,
            ..CallCounts::default()
        }
    );
}

#[tokio::test]
async fn supervisor_stops_rerunning_at_attempt_ceiling() {
    let platform = FakePlatform::default();
    let project_id = ProjectId::new_v4();
    let gen1 = BatchId::new_v4();
    let gen2 = BatchId::new_v4();
    let gen3 = BatchId::new_v4();

    let mut p = params(BatchSelector::ById(gen1));
    p.max_rerun_attempts = 2;

    let first_failure = job(Some(ConflatedStatus::Error));
    platform.push_get_batch(Ok(batch(gen1, BatchStatus::Error)));
    platform.push_list_jobs(Ok(job_page(
        vec![first_failure.clone(), job(Some(ConflatedStatus::Passed))],
        None,
    )));
    platform.push_rerun_batch(Ok(gen2));

    let second_failure = job(Some(ConflatedStatus::Error));
    platform.push_get_batch(Ok(batch(gen2, BatchStatus::Error)));
    platform.push_list_jobs(Ok(job_page(
        vec![second_failure.clone(), job(Some(ConflatedStatus::Passed))],
        None,
    )));
    platform.push_rerun_batch(Ok(gen3));

    // The third generation still fails, but the ceiling has been reached:
    // there is deliberately no list_jobs script for it, so an enumeration
    // attempt would panic.
    platform.push_get_batch(Ok(batch(gen3, BatchStatus::Error)));

    let supervisor = Supervisor::new(&platform, project_id, p, SignalHandlerKind::Noop)
        .expect("noop handler");
    let outcome = supervisor.run().await.expect("supervision completes");

    assert_eq!(outcome.final_batch.batch_id, gen3);
    assert_eq!(outcome.final_status, BatchStatus::Error);
    assert_eq!(outcome.generations, 3);
    assert_eq!(outcome.rerun_submissions, 2);
    assert_eq!(
        platform.rerun_requests(),
        vec![(gen1, vec![first_failure.job_id]), (gen2, vec![second_failure.job_id])]
    );
}

#[tokio::test]
async fn supervisor_never_reruns_cancelled_batches() {
    let platform = FakePlatform::default();
    let project_id = ProjectId::new_v4();
    let batch_id = BatchId::new_v4();
    // No list_jobs or rerun_batch scripts: any such call panics.
    platform.push_get_batch(Ok(batch(batch_id, BatchStatus::Cancelled)));

    let supervisor = Supervisor::new(
        &platform,
        project_id,
        params(BatchSelector::ById(batch_id)),
        SignalHandlerKind::Noop,
    )
    .expect("noop handler");
    let outcome = supervisor.run().await.expect("supervision completes");

    assert_eq!(outcome.final_status, BatchStatus::Cancelled);
    assert_eq!(outcome.generations, 1);
    assert_eq!(outcome.rerun_submissions, 0);
}

#[tokio::test]
async fn supervisor_withholds_rerun_over_failure_threshold() {
    let platform = FakePlatform::default();
    let project_id = ProjectId::new_v4();
    let batch_id = BatchId::new_v4();
    let mut p = params(BatchSelector::ById(batch_id));
    p.rerun_max_failure_percent = 50.0;

    platform.push_get_batch(Ok(batch(batch_id, BatchStatus::Error)));
    // 3 of 4 failed: 75% > 50%, so no rerun despite matching jobs.
    platform.push_list_jobs(Ok(job_page(
        vec![
            job(Some(ConflatedStatus::Error)),
            job(Some(ConflatedStatus::Error)),
            job(Some(ConflatedStatus::Blocker)),
            job(Some(ConflatedStatus::Passed)),
        ],
        None,
    )));

    let supervisor = Supervisor::new(&platform, project_id, p, SignalHandlerKind::Noop)
        .expect("noop handler");
    let outcome = supervisor.run().await.expect("supervision completes");

    assert_eq!(outcome.final_status, BatchStatus::Error);
    assert_eq!(outcome.rerun_submissions, 0);
    assert_eq!(platform.calls().rerun_batch, 0);
}

#[tokio::test]
async fn supervisor_propagates_wait_timeouts() {
    let platform = FakePlatform::default();
    let project_id = ProjectId::new_v4();
    let batch_id = BatchId::new_v4();
    for _ in 0..4 {
        platform.push_get_batch(Ok(batch(batch_id, BatchStatus::Submitted)));
    }

    let mut p = params(BatchSelector::ById(batch_id));
    p.wait_timeout = Duration::from_millis(50);
    p.poll_interval = Duration::from_millis(20);

    let supervisor = Supervisor::new(&platform, project_id, p, SignalHandlerKind::Noop)
        .expect("noop handler");
    let err = supervisor.run().await.unwrap_err();
    assert!(matches!(
        err,
        SuperviseError::Wait(WaitError::Timeout { .. })
    ));
}

#[tokio::test]
async fn supervisor_surfaces_job_enumeration_failures() {
    let platform = FakePlatform::default();
    let project_id = ProjectId::new_v4();
    let batch_id = BatchId::new_v4();
    platform.push_get_batch(Ok(batch(batch_id, BatchStatus::Error)));
    platform.push_list_jobs(Err(server_error("/jobs")));

    let supervisor = Supervisor::new(
        &platform,
        project_id,
        params(BatchSelector::ById(batch_id)),
        SignalHandlerKind::Noop,
    )
    .expect("noop handler");
    let err = supervisor.run().await.unwrap_err();
    assert!(matches!(
        err,
        SuperviseError::JobEnumeration { batch_id: b, .. } if b == batch_id
    ));
}

#[tokio::test]
async fn supervisor_retries_conflicted_rerun_submission() {
    let platform = FakePlatform::default();
    let project_id = ProjectId::new_v4();
    let original = BatchId::new_v4();
    let rerun = BatchId::new_v4();

    platform.push_get_batch(Ok(batch(original, BatchStatus::Error)));
    platform.push_list_jobs(Ok(job_page(
        vec![job(Some(ConflatedStatus::Error)), job(Some(ConflatedStatus::Passed))],
        None,
    )));
    platform.push_rerun_batch(Err(ApiError::Conflict {
        path: "/rerun".to_owned(),
    }));
    platform.push_rerun_batch(Ok(rerun));

    platform.push_get_batch(Ok(batch(rerun, BatchStatus::Succeeded)));
    platform.push_list_jobs(Ok(job_page(vec![job(Some(ConflatedStatus::Passed))], None)));

    let supervisor = Supervisor::new(
        &platform,
        project_id,
        params(BatchSelector::ById(original)),
        SignalHandlerKind::Noop,
    )
    .expect("noop handler")
    .with_conflict_retry(ConflictRetryPolicy {
        attempts: 2,
        backoff: Duration::from_millis(5),
    });
    let outcome = supervisor.run().await.expect("supervision completes");

    assert_eq!(outcome.final_batch.batch_id, rerun);
    assert_eq!(outcome.rerun_submissions, 1, "a conflict retry is not a new rerun");
    assert_eq!(platform.calls().rerun_batch, 2);
}
