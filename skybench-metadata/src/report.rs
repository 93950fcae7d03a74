// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The report format version emitted by this version of skybench.
pub const SUPERVISE_REPORT_VERSION: u32 = 1;

/// Machine-readable summary of one `batch supervise` invocation.
///
/// Printed to stdout as a single JSON document when `--message-format json`
/// is passed. Identifiers and statuses are carried as plain strings so that
/// consumers do not need skybench's wire model to parse a report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SuperviseReport {
    /// Version of this format. Incremented on incompatible changes.
    pub report_version: u32,

    /// The project the supervised batch belongs to.
    pub project_id: String,

    /// The batch the run finished on. After one or more reruns this is the
    /// latest generation, not the batch supervision started with.
    pub batch_id: String,

    /// Friendly name of the final batch, if the platform assigned one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_name: Option<String>,

    /// Lifecycle status of the final batch, e.g. `SUCCEEDED`.
    pub final_status: String,

    /// Number of generations observed, counting the initial batch as 1.
    pub generations: u32,

    /// Number of rerun submissions performed. Always strictly less than the
    /// configured `--max-rerun-attempts` plus one.
    pub rerun_submissions: u32,

    /// The process exit code the CLI derived from `final_status`. See
    /// [`SkybenchExitCode`](crate::SkybenchExitCode).
    pub exit_code: i32,

    /// Wall-clock time supervision started.
    pub started_at: DateTime<Utc>,

    /// Wall-clock time supervision finished.
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn report_round_trip() {
        let report = SuperviseReport {
            report_version: SUPERVISE_REPORT_VERSION,
            project_id: "0195a3b8-1111-7abc-9def-000000000001".to_owned(),
            batch_id: "0195a3b8-2222-7abc-9def-000000000002".to_owned(),
            batch_name: Some("nightly-regression".to_owned()),
            final_status: "SUCCEEDED".to_owned(),
            generations: 2,
            rerun_submissions: 1,
            exit_code: 0,
            started_at: Utc.with_ymd_and_hms(2025, 11, 4, 3, 0, 0).unwrap(),
            finished_at: Utc.with_ymd_and_hms(2025, 11, 4, 3, 42, 17).unwrap(),
        };

        let json = serde_json::to_string(&report).expect("report serializes");
        let back: SuperviseReport = serde_json::from_str(&json).expect("report deserializes");
        assert_eq!(report, back, "round-tripped report matches");
    }

    #[test]
    fn report_field_names_are_kebab_case() {
        let report = SuperviseReport {
            report_version: SUPERVISE_REPORT_VERSION,
            project_id: "p".to_owned(),
            batch_id: "b".to_owned(),
            batch_name: None,
            final_status: "ERROR".to_owned(),
            generations: 1,
            rerun_submissions: 0,
            exit_code: 2,
            started_at: Utc.with_ymd_and_hms(2025, 11, 4, 3, 0, 0).unwrap(),
            finished_at: Utc.with_ymd_and_hms(2025, 11, 4, 3, 1, 0).unwrap(),
        };

        let value = serde_json::to_value(&report).expect("report serializes");
        let object = value.as_object().expect("report is an object");
        for key in [
            "report-version",
            "project-id",
            "batch-id",
            "final-status",
            "generations",
            "rerun-submissions",
            "exit-code",
            "started-at",
            "finished-at",
        ] {
            assert!(object.contains_key(key), "missing key {key}");
        }
        assert!(
            !object.contains_key("batch-name"),
            "absent name is not serialized"
        );
    }
}
