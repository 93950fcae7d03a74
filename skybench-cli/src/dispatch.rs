// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ci,
    errors::{ExpectedError, Result},
    output::{OutputContext, OutputOpts, clap_styles},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use owo_colors::OwoColorize;
use skybench_client::{
    api::{
        ApiClient, Platform,
        models::{
            BatchId, BatchKind, BatchStatus, BuildId, BuildKind, CreateBatchRequest,
            CreateBuildRequest, CreateExperienceRequest, CreateProjectRequest,
            CreateSystemRequest, ExperienceId, ExperienceKind, JobId, JobKind, ProjectId,
            ProjectKind, RerunBatchResponse, SuiteId, SuiteKind, SweepId, SweepKind, SystemId,
            SystemKind, parse_typed_uuid,
        },
    },
    errors::WaitError,
    signal::SignalHandlerKind,
    supervise::{
        BatchSelector, ConflictRetryPolicy, SuperviseParams, Supervisor, locate_batch,
        submit_rerun, wait_for_completion,
    },
};
use skybench_metadata::{SUPERVISE_REPORT_VERSION, SkybenchExitCode, SuperviseReport};
use std::{io::Write, time::Duration};

/// A CI-friendly command-line client for the skybench simulation and test
/// platform.
#[derive(Debug, Parser)]
#[command(
    version,
    bin_name = "skybench",
    styles = clap_styles::style(),
    max_term_width = 100,
)]
pub struct SkybenchApp {
    #[command(flatten)]
    output: OutputOpts,

    #[command(flatten)]
    connect: ConnectOpts,

    #[command(subcommand)]
    command: Command,
}

impl SkybenchApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the selected command, returning the process exit code.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        let Self {
            output: _,
            connect,
            command,
        } = self;

        let client = connect.client()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| ExpectedError::RuntimeBuildFailed { err })?;

        runtime.block_on(command.exec(&client, output))
    }
}

#[derive(Clone, Debug, Args)]
#[command(next_help_heading = "Connection options")]
struct ConnectOpts {
    /// Base URL of the skybench API
    #[arg(
        long,
        global = true,
        value_name = "URL",
        env = "SKYBENCH_API_URL",
        default_value = "https://api.skybench.dev/v1"
    )]
    api_url: String,

    /// Bearer token for the skybench API
    #[arg(
        long,
        global = true,
        value_name = "TOKEN",
        env = "SKYBENCH_API_TOKEN",
        hide_env_values = true
    )]
    api_token: Option<String>,
}

impl ConnectOpts {
    fn client(&self) -> Result<ApiClient> {
        let token = self
            .api_token
            .as_deref()
            .ok_or(ExpectedError::ApiTokenMissing)?;
        ApiClient::builder(&self.api_url, token)
            .build()
            .map_err(|err| ExpectedError::ClientBuildFailed { err })
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Manage systems under test
    #[command(subcommand)]
    System(SystemCommand),
    /// Manage builds
    #[command(subcommand)]
    Build(BuildCommand),
    /// Manage experiences
    #[command(subcommand)]
    Experience(ExperienceCommand),
    /// Inspect test suites
    #[command(subcommand)]
    Suite(SuiteCommand),
    /// Inspect parameter sweeps
    #[command(subcommand)]
    Sweep(SweepCommand),
    /// Create, inspect and supervise batches
    #[command(subcommand)]
    Batch(BatchCommand),
}

impl Command {
    async fn exec(self, client: &ApiClient, output: OutputContext) -> Result<i32> {
        match self {
            Self::Project(command) => command.exec(client).await,
            Self::System(command) => command.exec(client).await,
            Self::Build(command) => command.exec(client).await,
            Self::Experience(command) => command.exec(client).await,
            Self::Suite(command) => command.exec(client).await,
            Self::Sweep(command) => command.exec(client).await,
            Self::Batch(command) => command.exec(client, output).await,
        }
    }
}

#[derive(Debug, Subcommand)]
enum ProjectCommand {
    /// List the projects visible to the caller
    List {
        /// Continue from an earlier page
        #[arg(long, value_name = "TOKEN")]
        page_token: Option<String>,
    },
    /// Show a single project
    Get {
        /// Project name or UUID
        #[arg(long, value_name = "PROJECT")]
        project: String,
    },
    /// Create a project
    Create {
        /// Project name
        #[arg(long, value_name = "NAME")]
        name: String,
        /// Free-form description
        #[arg(long, value_name = "TEXT")]
        description: Option<String>,
    },
}

impl ProjectCommand {
    async fn exec(self, client: &ApiClient) -> Result<i32> {
        match self {
            Self::List { page_token } => {
                let page = client
                    .list_projects(page_token.as_deref())
                    .await
                    .map_err(|err| ExpectedError::ApiFailed { err })?;
                print_json(&page)?;
            }
            Self::Get { project } => {
                let project_id = resolve_project(client, &project).await?;
                let project = client
                    .get_project(project_id)
                    .await
                    .map_err(|err| ExpectedError::ApiFailed { err })?;
                print_json(&project)?;
            }
            Self::Create { name, description } => {
                let request = CreateProjectRequest { name, description };
                let project = client
                    .create_project(&request)
                    .await
                    .map_err(|err| ExpectedError::ApiFailed { err })?;
                print_json(&project)?;
            }
        }
        Ok(SkybenchExitCode::OK)
    }
}

#[derive(Debug, Subcommand)]
enum SystemCommand {
    /// List a project's systems
    List {
        /// Project name or UUID
        #[arg(long, value_name = "PROJECT")]
        project: String,
        /// Continue from an earlier page
        #[arg(long, value_name = "TOKEN")]
        page_token: Option<String>,
    },
    /// Register a system
    Create {
        /// Project name or UUID
        #[arg(long, value_name = "PROJECT")]
        project: String,
        /// System name
        #[arg(long, value_name = "NAME")]
        name: String,
    },
}

impl SystemCommand {
    async fn exec(self, client: &ApiClient) -> Result<i32> {
        match self {
            Self::List {
                project,
                page_token,
            } => {
                let project_id = resolve_project(client, &project).await?;
                let page = client
                    .list_systems(project_id, page_token.as_deref())
                    .await
                    .map_err(|err| ExpectedError::ApiFailed { err })?;
                print_json(&page)?;
            }
            Self::Create { project, name } => {
                let project_id = resolve_project(client, &project).await?;
                let request = CreateSystemRequest { name };
                let system = client
                    .create_system(project_id, &request)
                    .await
                    .map_err(|err| ExpectedError::ApiFailed { err })?;
                print_json(&system)?;
            }
        }
        Ok(SkybenchExitCode::OK)
    }
}

#[derive(Debug, Subcommand)]
enum BuildCommand {
    /// List a project's builds
    List {
        /// Project name or UUID
        #[arg(long, value_name = "PROJECT")]
        project: String,
        /// Continue from an earlier page
        #[arg(long, value_name = "TOKEN")]
        page_token: Option<String>,
    },
    /// Register a build
    Create {
        /// Project name or UUID
        #[arg(long, value_name = "PROJECT")]
        project: String,
        /// The system this build targets
        #[arg(long = "system", value_name = "SYSTEM_ID", value_parser = parse_typed_uuid::<SystemKind>)]
        system_id: Option<SystemId>,
        /// Version label
        #[arg(long, value_name = "VERSION")]
        version: Option<String>,
        /// Location of the build image
        #[arg(long, value_name = "URI")]
        image_uri: Option<String>,
    },
}

impl BuildCommand {
    async fn exec(self, client: &ApiClient) -> Result<i32> {
        match self {
            Self::List {
                project,
                page_token,
            } => {
                let project_id = resolve_project(client, &project).await?;
                let page = client
                    .list_builds(project_id, page_token.as_deref())
                    .await
                    .map_err(|err| ExpectedError::ApiFailed { err })?;
                print_json(&page)?;
            }
            Self::Create {
                project,
                system_id,
                version,
                image_uri,
            } => {
                let project_id = resolve_project(client, &project).await?;
                let request = CreateBuildRequest {
                    system_id,
                    version,
                    image_uri,
                };
                let build = client
                    .create_build(project_id, &request)
                    .await
                    .map_err(|err| ExpectedError::ApiFailed { err })?;
                print_json(&build)?;
            }
        }
        Ok(SkybenchExitCode::OK)
    }
}

#[derive(Debug, Subcommand)]
enum ExperienceCommand {
    /// List a project's experiences
    List {
        /// Project name or UUID
        #[arg(long, value_name = "PROJECT")]
        project: String,
        /// Continue from an earlier page
        #[arg(long, value_name = "TOKEN")]
        page_token: Option<String>,
    },
    /// Create an experience
    Create {
        /// Project name or UUID
        #[arg(long, value_name = "PROJECT")]
        project: String,
        /// Experience name
        #[arg(long, value_name = "NAME")]
        name: String,
        /// Free-form description
        #[arg(long, value_name = "TEXT")]
        description: Option<String>,
    },
    /// Attach a tag to an experience
    Tag {
        /// Project name or UUID
        #[arg(long, value_name = "PROJECT")]
        project: String,
        /// The experience to tag
        #[arg(long = "experience", value_name = "EXPERIENCE_ID", value_parser = parse_typed_uuid::<ExperienceKind>)]
        experience_id: ExperienceId,
        /// The tag to attach
        #[arg(long, value_name = "TAG")]
        tag: String,
    },
    /// Detach a tag from an experience
    Untag {
        /// Project name or UUID
        #[arg(long, value_name = "PROJECT")]
        project: String,
        /// The experience to untag
        #[arg(long = "experience", value_name = "EXPERIENCE_ID", value_parser = parse_typed_uuid::<ExperienceKind>)]
        experience_id: ExperienceId,
        /// The tag to detach
        #[arg(long, value_name = "TAG")]
        tag: String,
    },
}

impl ExperienceCommand {
    async fn exec(self, client: &ApiClient) -> Result<i32> {
        match self {
            Self::List {
                project,
                page_token,
            } => {
                let project_id = resolve_project(client, &project).await?;
                let page = client
                    .list_experiences(project_id, page_token.as_deref())
                    .await
                    .map_err(|err| ExpectedError::ApiFailed { err })?;
                print_json(&page)?;
            }
            Self::Create {
                project,
                name,
                description,
            } => {
                let project_id = resolve_project(client, &project).await?;
                let request = CreateExperienceRequest { name, description };
                let experience = client
                    .create_experience(project_id, &request)
                    .await
                    .map_err(|err| ExpectedError::ApiFailed { err })?;
                print_json(&experience)?;
            }
            Self::Tag {
                project,
                experience_id,
                tag,
            } => {
                let project_id = resolve_project(client, &project).await?;
                client
                    .tag_experience(project_id, experience_id, &tag)
                    .await
                    .map_err(|err| ExpectedError::ApiFailed { err })?;
                log::info!("tagged experience `{experience_id}` with `{tag}`");
            }
            Self::Untag {
                project,
                experience_id,
                tag,
            } => {
                let project_id = resolve_project(client, &project).await?;
                client
                    .untag_experience(project_id, experience_id, &tag)
                    .await
                    .map_err(|err| ExpectedError::ApiFailed { err })?;
                log::info!("removed tag `{tag}` from experience `{experience_id}`");
            }
        }
        Ok(SkybenchExitCode::OK)
    }
}

#[derive(Debug, Subcommand)]
enum SuiteCommand {
    /// List a project's test suites
    List {
        /// Project name or UUID
        #[arg(long, value_name = "PROJECT")]
        project: String,
        /// Continue from an earlier page
        #[arg(long, value_name = "TOKEN")]
        page_token: Option<String>,
    },
    /// Show a single test suite
    Get {
        /// Project name or UUID
        #[arg(long, value_name = "PROJECT")]
        project: String,
        /// The suite to show
        #[arg(long = "suite", value_name = "SUITE_ID", value_parser = parse_typed_uuid::<SuiteKind>)]
        suite_id: SuiteId,
    },
}

impl SuiteCommand {
    async fn exec(self, client: &ApiClient) -> Result<i32> {
        match self {
            Self::List {
                project,
                page_token,
            } => {
                let project_id = resolve_project(client, &project).await?;
                let page = client
                    .list_suites(project_id, page_token.as_deref())
                    .await
                    .map_err(|err| ExpectedError::ApiFailed { err })?;
                print_json(&page)?;
            }
            Self::Get { project, suite_id } => {
                let project_id = resolve_project(client, &project).await?;
                let suite = client
                    .get_suite(project_id, suite_id)
                    .await
                    .map_err(|err| ExpectedError::ApiFailed { err })?;
                print_json(&suite)?;
            }
        }
        Ok(SkybenchExitCode::OK)
    }
}

#[derive(Debug, Subcommand)]
enum SweepCommand {
    /// List a project's parameter sweeps
    List {
        /// Project name or UUID
        #[arg(long, value_name = "PROJECT")]
        project: String,
        /// Continue from an earlier page
        #[arg(long, value_name = "TOKEN")]
        page_token: Option<String>,
    },
    /// Show a single parameter sweep
    Get {
        /// Project name or UUID
        #[arg(long, value_name = "PROJECT")]
        project: String,
        /// The sweep to show
        #[arg(long = "sweep", value_name = "SWEEP_ID", value_parser = parse_typed_uuid::<SweepKind>)]
        sweep_id: SweepId,
    },
}

impl SweepCommand {
    async fn exec(self, client: &ApiClient) -> Result<i32> {
        match self {
            Self::List {
                project,
                page_token,
            } => {
                let project_id = resolve_project(client, &project).await?;
                let page = client
                    .list_sweeps(project_id, page_token.as_deref())
                    .await
                    .map_err(|err| ExpectedError::ApiFailed { err })?;
                print_json(&page)?;
            }
            Self::Get { project, sweep_id } => {
                let project_id = resolve_project(client, &project).await?;
                let sweep = client
                    .get_sweep(project_id, sweep_id)
                    .await
                    .map_err(|err| ExpectedError::ApiFailed { err })?;
                print_json(&sweep)?;
            }
        }
        Ok(SkybenchExitCode::OK)
    }
}

#[derive(Debug, Subcommand)]
enum BatchCommand {
    /// Submit a new batch
    Create(CreateBatchOpts),
    /// Show a single batch
    Get(BatchSelectorOpts),
    /// List a project's batches, newest first
    List {
        /// Project name or UUID
        #[arg(long, value_name = "PROJECT")]
        project: String,
        /// Continue from an earlier page
        #[arg(long, value_name = "TOKEN")]
        page_token: Option<String>,
    },
    /// List the jobs of a batch
    Jobs(JobsOpts),
    /// Request cancellation of a batch
    Cancel(BatchSelectorOpts),
    /// Resubmit jobs of a batch as a new rerun batch
    Rerun(RerunOpts),
    /// Wait for a batch to reach a terminal status
    Wait(WaitOpts),
    /// Supervise a batch through reruns until it settles
    Supervise(SuperviseOpts),
}

impl BatchCommand {
    async fn exec(self, client: &ApiClient, output: OutputContext) -> Result<i32> {
        match self {
            Self::Create(opts) => opts.exec(client).await,
            Self::Get(opts) => {
                let (project_id, selector) = opts.resolve(client).await?;
                let batch = locate_batch(client, project_id, &selector)
                    .await
                    .map_err(|err| ExpectedError::BatchLookupFailed { err })?;
                print_json(&batch)?;
                Ok(SkybenchExitCode::OK)
            }
            Self::List {
                project,
                page_token,
            } => {
                let project_id = resolve_project(client, &project).await?;
                let page = client
                    .list_batches(project_id, page_token.as_deref())
                    .await
                    .map_err(|err| ExpectedError::ApiFailed { err })?;
                print_json(&page)?;
                Ok(SkybenchExitCode::OK)
            }
            Self::Jobs(opts) => {
                let project_id = resolve_project(client, &opts.project).await?;
                let page = client
                    .list_jobs(
                        project_id,
                        opts.batch_id,
                        opts.page_size,
                        opts.page_token.as_deref(),
                    )
                    .await
                    .map_err(|err| ExpectedError::ApiFailed { err })?;
                print_json(&page)?;
                Ok(SkybenchExitCode::OK)
            }
            Self::Cancel(opts) => {
                let (project_id, selector) = opts.resolve(client).await?;
                let batch = locate_batch(client, project_id, &selector)
                    .await
                    .map_err(|err| ExpectedError::BatchLookupFailed { err })?;
                client
                    .cancel_batch(project_id, batch.batch_id)
                    .await
                    .map_err(|err| ExpectedError::ApiFailed { err })?;
                let styles = output.stderr_styles();
                log::info!(
                    "cancellation requested for batch `{}`",
                    batch.batch_id.style(styles.bold)
                );
                Ok(SkybenchExitCode::OK)
            }
            Self::Rerun(opts) => opts.exec(client, output).await,
            Self::Wait(opts) => opts.exec(client, output).await,
            Self::Supervise(opts) => opts.exec(client, output).await,
        }
    }
}

#[derive(Debug, Args)]
struct BatchSelectorOpts {
    /// Project name or UUID
    #[arg(long, value_name = "PROJECT")]
    project: String,

    /// Batch identifier (UUID)
    #[arg(long, value_name = "BATCH_ID")]
    batch_id: Option<String>,

    /// Batch friendly name; resolves to the newest batch carrying it
    #[arg(long, value_name = "NAME")]
    batch_name: Option<String>,
}

impl BatchSelectorOpts {
    /// Validates the selector pair without touching the platform. Validation
    /// happens here rather than in clap so that selector errors share the
    /// fatal exit code with the other parameter checks.
    fn selector(&self) -> Result<BatchSelector> {
        Ok(BatchSelector::new(
            self.batch_id.as_deref(),
            self.batch_name.as_deref(),
        )?)
    }

    /// Validates the selector pair, then resolves the project.
    async fn resolve(&self, client: &ApiClient) -> Result<(ProjectId, BatchSelector)> {
        let selector = self.selector()?;
        let project_id = resolve_project(client, &self.project).await?;
        Ok((project_id, selector))
    }
}

#[derive(Debug, Args)]
struct CreateBatchOpts {
    /// Project name or UUID
    #[arg(long, value_name = "PROJECT")]
    project: String,

    /// The build to test
    #[arg(long = "build", value_name = "BUILD_ID", value_parser = parse_typed_uuid::<BuildKind>)]
    build_id: BuildId,

    /// An experience to run (repeatable)
    #[arg(long = "experience", value_name = "EXPERIENCE_ID", value_parser = parse_typed_uuid::<ExperienceKind>)]
    experience_ids: Vec<ExperienceId>,

    /// Run every experience carrying this tag (repeatable)
    #[arg(long = "experience-tag", value_name = "TAG")]
    experience_tags: Vec<String>,

    /// Friendly name for the new batch
    #[arg(long, value_name = "NAME")]
    name: Option<String>,

    /// Append the created batch id to the file GITHUB_OUTPUT points to
    #[arg(long)]
    github_output: bool,
}

impl CreateBatchOpts {
    async fn exec(self, client: &ApiClient) -> Result<i32> {
        let project_id = resolve_project(client, &self.project).await?;
        let request = CreateBatchRequest {
            build_id: self.build_id,
            experience_ids: self.experience_ids,
            experience_tags: self.experience_tags,
            friendly_name: self.name,
        };
        let batch = client
            .create_batch(project_id, &request)
            .await
            .map_err(|err| ExpectedError::ApiFailed { err })?;
        print_json(&batch)?;

        if self.github_output {
            write_github_output(&[("batch_id", batch.batch_id.to_string())])?;
        }
        Ok(SkybenchExitCode::OK)
    }
}

#[derive(Debug, Args)]
struct JobsOpts {
    /// Project name or UUID
    #[arg(long, value_name = "PROJECT")]
    project: String,

    /// The batch whose jobs to list
    #[arg(long, value_name = "BATCH_ID", value_parser = parse_typed_uuid::<BatchKind>)]
    batch_id: BatchId,

    /// Jobs per page
    #[arg(long, value_name = "N", default_value_t = 100)]
    page_size: u32,

    /// Continue from an earlier page
    #[arg(long, value_name = "TOKEN")]
    page_token: Option<String>,
}

#[derive(Debug, Args)]
struct RerunOpts {
    /// Project name or UUID
    #[arg(long, value_name = "PROJECT")]
    project: String,

    /// The parent batch to rerun
    #[arg(long, value_name = "BATCH_ID", value_parser = parse_typed_uuid::<BatchKind>)]
    batch_id: BatchId,

    /// A job to re-execute (repeatable); omit to rerun only the aggregation
    /// phase
    #[arg(long = "job", value_name = "JOB_ID", value_parser = parse_typed_uuid::<JobKind>)]
    jobs: Vec<JobId>,
}

impl RerunOpts {
    async fn exec(self, client: &ApiClient, output: OutputContext) -> Result<i32> {
        let project_id = resolve_project(client, &self.project).await?;
        let new_batch_id = submit_rerun(
            client,
            project_id,
            self.batch_id,
            &self.jobs,
            &ConflictRetryPolicy::default(),
        )
        .await
        .map_err(|err| ExpectedError::SuperviseFailed { err: err.into() })?;

        let styles = output.stderr_styles();
        log::info!(
            "submitted rerun `{}` of batch `{}` ({} job(s))",
            new_batch_id.style(styles.bold),
            self.batch_id,
            self.jobs.len(),
        );
        print_json(&RerunBatchResponse {
            batch_id: new_batch_id,
        })?;
        Ok(SkybenchExitCode::OK)
    }
}

#[derive(Debug, Args)]
struct WaitOpts {
    #[command(flatten)]
    selector: BatchSelectorOpts,

    /// How long to wait for a terminal status
    #[arg(
        long,
        value_name = "DURATION",
        value_parser = humantime::parse_duration,
        default_value = "1h"
    )]
    wait_timeout: Duration,

    /// How long to pause between status polls
    #[arg(
        long,
        value_name = "DURATION",
        value_parser = humantime::parse_duration,
        default_value = "30s"
    )]
    poll_every: Duration,
}

impl WaitOpts {
    async fn exec(self, client: &ApiClient, output: OutputContext) -> Result<i32> {
        let (project_id, selector) = self.selector.resolve(client).await?;
        let batch = wait_for_completion(
            client,
            project_id,
            &selector,
            self.wait_timeout,
            self.poll_every,
            SignalHandlerKind::Standard,
        )
        .await?;

        let Some(status) = batch.status.clone() else {
            return Err(ExpectedError::from_wait_error(WaitError::MissingStatus {
                batch_id: batch.batch_id,
            }));
        };
        let styles = output.stderr_styles();
        log::info!(
            "batch `{}` finished with status {}",
            batch.batch_id.style(styles.bold),
            status,
        );
        Ok(exit_code_for_status(&status))
    }
}

#[derive(Debug, Args)]
struct SuperviseOpts {
    #[command(flatten)]
    wait: WaitOpts,

    /// Maximum rerun submissions before supervision settles (at least 1)
    #[arg(long, value_name = "N")]
    max_rerun_attempts: u32,

    /// Withhold reruns when more than this percentage of jobs failed
    #[arg(long, value_name = "PERCENT")]
    rerun_max_failure_percent: f64,

    /// Job end states that trigger a rerun (comma-separated: warning, error,
    /// blocker; case-insensitive)
    #[arg(long, value_delimiter = ',', required = true, value_name = "STATES")]
    rerun_on_states: Vec<String>,

    /// Report format
    #[arg(long, value_enum, default_value_t, value_name = "FORMAT")]
    message_format: MessageFormat,

    /// Append batch_id, batch_status and exit_code to the file GITHUB_OUTPUT
    /// points to
    #[arg(long)]
    github_output: bool,
}

impl SuperviseOpts {
    /// Validates every supervision knob client-side. Kept free of network
    /// calls so that usage errors surface before the first request.
    fn validated_params(&self) -> Result<SuperviseParams> {
        let selector = self.wait.selector.selector()?;
        Ok(SuperviseParams::new(
            selector,
            self.max_rerun_attempts,
            self.rerun_max_failure_percent,
            &self.rerun_on_states,
            self.wait.wait_timeout,
            self.wait.poll_every,
        )?)
    }

    async fn exec(self, client: &ApiClient, output: OutputContext) -> Result<i32> {
        let params = self.validated_params()?;
        let project_id = resolve_project(client, &self.wait.selector.project).await?;

        let supervisor = Supervisor::new(client, project_id, params, SignalHandlerKind::Standard)?;
        let outcome = supervisor.run().await?;

        let exit_code = exit_code_for_status(&outcome.final_status);
        let report = SuperviseReport {
            report_version: SUPERVISE_REPORT_VERSION,
            project_id: project_id.to_string(),
            batch_id: outcome.final_batch.batch_id.to_string(),
            batch_name: outcome.final_batch.friendly_name.clone(),
            final_status: outcome.final_status.to_string(),
            generations: outcome.generations,
            rerun_submissions: outcome.rerun_submissions,
            exit_code,
            started_at: outcome.started_at.to_utc(),
            finished_at: outcome.finished_at.to_utc(),
        };

        match self.message_format {
            MessageFormat::Human => {
                let styles = output.stderr_styles();
                log::info!(
                    "batch `{}` settled with status {} after {} generation(s) and {} rerun \
                     submission(s)",
                    report.batch_id.style(styles.bold),
                    report.final_status,
                    report.generations,
                    report.rerun_submissions,
                );
                if output.verbose {
                    log::info!(
                        target: "skybench_cli::no_heading",
                        "  supervision ran from {} to {}",
                        outcome.started_at,
                        outcome.finished_at,
                    );
                }
            }
            MessageFormat::Json => {
                print_json(&report)?;
            }
        }

        if self.github_output {
            write_github_output(&[
                ("batch_id", report.batch_id.clone()),
                ("batch_status", report.final_status.clone()),
                ("exit_code", report.exit_code.to_string()),
            ])?;
        }

        Ok(exit_code)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
enum MessageFormat {
    /// A one-line summary on stderr
    #[default]
    Human,
    /// A JSON report on stdout
    Json,
}

/// Maps a terminal batch status to the documented process exit code.
fn exit_code_for_status(status: &BatchStatus) -> i32 {
    match status {
        BatchStatus::Succeeded => SkybenchExitCode::OK,
        BatchStatus::Error => SkybenchExitCode::BATCH_ERROR,
        BatchStatus::Cancelled => SkybenchExitCode::BATCH_CANCELLED,
        _ => SkybenchExitCode::FATAL_ERROR,
    }
}

/// Resolves `--project` input, which may be a project UUID or a project name.
async fn resolve_project(client: &ApiClient, requested: &str) -> Result<ProjectId> {
    if let Ok(project_id) = parse_typed_uuid::<ProjectKind>(requested) {
        return Ok(project_id);
    }

    let mut page_token: Option<String> = None;
    loop {
        let page = client
            .list_projects(page_token.as_deref())
            .await
            .map_err(|err| ExpectedError::ApiFailed { err })?;
        let next = page.next_token().map(str::to_owned);
        if let Some(project) = page.projects.into_iter().find(|p| p.name == requested) {
            log::debug!(
                "resolved project `{requested}` to `{}`",
                project.project_id
            );
            return Ok(project.project_id);
        }
        match next {
            Some(token) => page_token = Some(token),
            None => {
                return Err(ExpectedError::ProjectNotFound {
                    requested: requested.to_owned(),
                });
            }
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|err| ExpectedError::JsonSerializeFailed { err })?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{json}").map_err(|err| ExpectedError::StdoutWriteFailed { err })
}

fn write_github_output(entries: &[(&str, String)]) -> Result<()> {
    let path = ci::github_output_path().ok_or(ExpectedError::GithubOutputMissing)?;
    ci::append_github_output(&path, entries)
        .map_err(|err| ExpectedError::GithubOutputWriteFailed { path, err })
}
