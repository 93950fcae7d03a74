// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire data model for the platform API.
//!
//! All types serialize to the JSON shapes the platform speaks. Identifiers
//! are typed UUIDs so a batch id cannot be passed where a job id is expected.

use chrono::{DateTime, Utc};
use newtype_uuid::{GenericUuid, TypedUuid, TypedUuidKind, TypedUuidTag};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($kind:ident, $alias:ident, $tag:literal, $entity:literal) => {
        #[doc = concat!("Type-level marker for ", $entity, " identifiers.")]
        pub enum $kind {}

        impl TypedUuidKind for $kind {
            fn tag() -> TypedUuidTag {
                const TAG: TypedUuidTag = TypedUuidTag::new($tag);
                TAG
            }
        }

        #[doc = concat!("Identifier of a ", $entity, ".")]
        pub type $alias = TypedUuid<$kind>;
    };
}

define_id!(ProjectKind, ProjectId, "project", "project");
define_id!(BatchKind, BatchId, "batch", "batch");
define_id!(JobKind, JobId, "job", "job");
define_id!(SystemKind, SystemId, "system", "system");
define_id!(BuildKind, BuildId, "build", "build");
define_id!(ExperienceKind, ExperienceId, "experience", "experience");
define_id!(SuiteKind, SuiteId, "suite", "test suite");
define_id!(SweepKind, SweepId, "sweep", "parameter sweep");

/// Parses a typed UUID from its canonical textual form.
pub fn parse_typed_uuid<K: TypedUuidKind>(input: &str) -> Result<TypedUuid<K>, uuid::Error> {
    input.parse::<Uuid>().map(TypedUuid::from_untyped_uuid)
}

/// Lifecycle status of a batch.
///
/// Unrecognized wire values are preserved in [`BatchStatus::Unknown`] so that
/// callers can fail loud while still quoting what the platform actually sent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BatchStatus {
    /// Accepted by the platform, not yet scheduled.
    Submitted,
    /// Experiences are executing.
    ExperiencesRunning,
    /// Execution finished; batch-level metrics are queued.
    BatchMetricsQueued,
    /// Batch-level metrics are computing.
    BatchMetricsRunning,
    /// Terminal: every phase finished successfully.
    Succeeded,
    /// Terminal: the batch failed.
    Error,
    /// Terminal: the batch was cancelled.
    Cancelled,
    /// A status this client does not recognize, with the raw value preserved.
    Unknown(String),
}

impl BatchStatus {
    /// Returns the wire representation of this status.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::ExperiencesRunning => "EXPERIENCES_RUNNING",
            Self::BatchMetricsQueued => "BATCH_METRICS_QUEUED",
            Self::BatchMetricsRunning => "BATCH_METRICS_RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Error => "ERROR",
            Self::Cancelled => "CANCELLED",
            Self::Unknown(raw) => raw,
        }
    }

    /// Partitions this status into the classes the completion waiter acts on.
    pub fn classify(&self) -> BatchStatusClass {
        match self {
            Self::Succeeded => BatchStatusClass::TerminalSuccess,
            Self::Error | Self::Cancelled => BatchStatusClass::TerminalFailure,
            Self::Submitted
            | Self::ExperiencesRunning
            | Self::BatchMetricsQueued
            | Self::BatchMetricsRunning => BatchStatusClass::InFlight,
            Self::Unknown(_) => BatchStatusClass::Unknown,
        }
    }

    /// Returns true for statuses a batch never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.classify(),
            BatchStatusClass::TerminalSuccess | BatchStatusClass::TerminalFailure
        )
    }
}

impl From<String> for BatchStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "SUBMITTED" => Self::Submitted,
            "EXPERIENCES_RUNNING" => Self::ExperiencesRunning,
            "BATCH_METRICS_QUEUED" => Self::BatchMetricsQueued,
            "BATCH_METRICS_RUNNING" => Self::BatchMetricsRunning,
            "SUCCEEDED" => Self::Succeeded,
            "ERROR" => Self::Error,
            "CANCELLED" => Self::Cancelled,
            _ => Self::Unknown(value),
        }
    }
}

impl From<BatchStatus> for String {
    fn from(value: BatchStatus) -> Self {
        match value {
            BatchStatus::Unknown(raw) => raw,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Waiter-facing classification of a [`BatchStatus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchStatusClass {
    /// SUCCEEDED.
    TerminalSuccess,
    /// ERROR or CANCELLED. Terminal for polling purposes; the exit-code
    /// classification happens later.
    TerminalFailure,
    /// The batch is still progressing.
    InFlight,
    /// A value this client cannot classify; polling fails loud rather than
    /// guessing.
    Unknown,
}

/// Per-job verdict fusing the execution outcome and the metrics verdict into
/// a single user-facing value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflatedStatus {
    /// The job is waiting to run.
    Queued,
    /// The job is running.
    Running,
    /// Execution and metrics both passed.
    Passed,
    /// Execution passed with metric warnings.
    Warning,
    /// The job failed.
    Error,
    /// The job failed in a way that blocks the whole batch.
    Blocker,
    /// The job was cancelled.
    Cancelled,
    /// Any value this client does not recognize.
    #[serde(other)]
    Unknown,
}

/// A run of a set of tests produced by submitting a build against a chosen
/// experience set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Platform-assigned identifier, stable for the batch's lifetime.
    pub batch_id: BatchId,
    /// Human-readable label. Not guaranteed unique; on by-name lookup the
    /// most recent match wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    /// Lifecycle status. Absent on some partial responses; polling treats an
    /// absent status as a protocol error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BatchStatus>,
    /// Set on rerun batches: the batch this one was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_batch_id: Option<BatchId>,
    /// When the platform created the batch.
    pub creation_timestamp: DateTime<Utc>,
    /// Aggregate job counters. Reporting only; supervision decisions always
    /// enumerate the jobs themselves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_counts: Option<JobCounts>,
}

/// Aggregate per-verdict job counts reported on a batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    /// Total number of jobs in the batch.
    #[serde(default)]
    pub total: u64,
    /// Jobs with conflated status PASSED.
    #[serde(default)]
    pub passed: u64,
    /// Jobs with conflated status WARNING.
    #[serde(default)]
    pub warning: u64,
    /// Jobs with conflated status ERROR.
    #[serde(default)]
    pub error: u64,
    /// Jobs with conflated status BLOCKER.
    #[serde(default)]
    pub blocker: u64,
    /// Jobs with conflated status CANCELLED.
    #[serde(default)]
    pub cancelled: u64,
}

/// One test execution within a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Platform-assigned identifier.
    pub job_id: JobId,
    /// The name of the test this job executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The job's conflated verdict. Absent while the job has not produced
    /// one; absent statuses never match a rerun trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflated_status: Option<ConflatedStatus>,
}

/// A project: the namespace every other entity lives in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Platform-assigned identifier.
    pub project_id: ProjectId,
    /// Unique project name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When the project was created.
    pub creation_timestamp: DateTime<Utc>,
}

/// A system: the device or vehicle configuration experiences run against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    /// Platform-assigned identifier.
    pub system_id: SystemId,
    /// System name.
    pub name: String,
    /// When the system was registered.
    pub creation_timestamp: DateTime<Utc>,
}

/// A build: one artifact submitted for testing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    /// Platform-assigned identifier.
    pub build_id: BuildId,
    /// The system this build targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_id: Option<SystemId>,
    /// Version label supplied at registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Location of the build image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
    /// When the build was registered.
    pub creation_timestamp: DateTime<Utc>,
}

/// An experience: one scenario a build can be exercised against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experience {
    /// Platform-assigned identifier.
    pub experience_id: ExperienceId,
    /// Experience name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tags used to select groups of experiences at batch creation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// A curated set of experiences.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suite {
    /// Platform-assigned identifier.
    pub suite_id: SuiteId,
    /// Suite name.
    pub name: String,
    /// The experiences this suite runs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub experience_ids: Vec<ExperienceId>,
}

/// A parameter sweep: a family of batches generated over a parameter grid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sweep {
    /// Platform-assigned identifier.
    pub sweep_id: SweepId,
    /// Sweep name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Sweep lifecycle status, as reported by the platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// The batches generated by this sweep so far.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub batch_ids: Vec<BatchId>,
}

fn non_empty_token(token: &Option<String>) -> Option<&str> {
    token.as_deref().filter(|token| !token.is_empty())
}

macro_rules! define_page {
    ($name:ident, $field:ident: $item:ty, $entity:literal) => {
        #[doc = concat!("One page of ", $entity, ".")]
        #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            #[doc = concat!("The ", $entity, " on this page.")]
            #[serde(default)]
            pub $field: Vec<$item>,
            /// Continuation token; empty or absent on the final page.
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub next_page_token: Option<String>,
        }

        impl $name {
            /// Returns the continuation token, treating an empty string as
            /// page-set exhaustion.
            pub fn next_token(&self) -> Option<&str> {
                non_empty_token(&self.next_page_token)
            }
        }
    };
}

define_page!(BatchPage, batches: Batch, "batches");
define_page!(JobPage, jobs: Job, "jobs");
define_page!(ProjectPage, projects: Project, "projects");
define_page!(SystemPage, systems: System, "systems");
define_page!(BuildPage, builds: Build, "builds");
define_page!(ExperiencePage, experiences: Experience, "experiences");
define_page!(SuitePage, suites: Suite, "test suites");
define_page!(SweepPage, sweeps: Sweep, "parameter sweeps");

/// Body of a create-project request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    /// Project name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Body of a create-system request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSystemRequest {
    /// System name.
    pub name: String,
}

/// Body of a create-build request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBuildRequest {
    /// The system this build targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_id: Option<SystemId>,
    /// Version label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Location of the build image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
}

/// Body of a create-experience request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateExperienceRequest {
    /// Experience name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Body of a tag-experience request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagExperienceRequest {
    /// The tag to attach.
    pub tag: String,
}

/// Body of a create-batch request: a build submitted against experiences
/// selected directly and/or via tags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBatchRequest {
    /// The build to test.
    pub build_id: BuildId,
    /// Experiences selected directly.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub experience_ids: Vec<ExperienceId>,
    /// Experiences selected by tag.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub experience_tags: Vec<String>,
    /// Optional friendly name for the new batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
}

/// Body of a rerun request. An empty job list asks the platform to rerun
/// only the aggregation phase of the parent batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerunBatchRequest {
    /// The jobs to re-execute.
    pub job_ids: Vec<JobId>,
}

/// Response to a rerun request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RerunBatchResponse {
    /// Identifier of the newly created rerun batch.
    pub batch_id: BatchId,
}
