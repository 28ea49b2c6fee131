//! Session record persisted for every wrapped command.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a session run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Command is currently running (or the wrapper died before saving).
    Running,
    /// Command exited on its own with a successful status.
    Completed,
    /// Command was interrupted or failed and may be resumed.
    Interrupted,
}

impl SessionStatus {
    /// Convert status to its on-disk string form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One tracked invocation of an external command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique session identifier.
    pub identifier: String,
    /// Command line exactly as given by the operator.
    pub command_line: String,
    /// Directory the command runs in.
    pub working_directory: PathBuf,
    /// When the session was created; resumed runs keep it.
    pub start_time: DateTime<Utc>,
    /// When the latest run reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Current status.
    pub status: SessionStatus,
    /// Exit code of the last completed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Append-only output log for this session.
    pub log_path: PathBuf,
}

impl SessionRecord {
    /// Create a new running session.
    pub fn new(
        identifier: String,
        command_line: String,
        working_directory: PathBuf,
        log_path: PathBuf,
    ) -> Self {
        Self {
            identifier,
            command_line,
            working_directory,
            start_time: Utc::now(),
            end_time: None,
            status: SessionStatus::Running,
            exit_code: None,
            log_path,
        }
    }

    /// First eight characters of the identifier, as shown in listings.
    pub fn short_id(&self) -> &str {
        self.identifier
            .get(..8)
            .unwrap_or(self.identifier.as_str())
    }

    /// Whether `resume` should relaunch this session.
    pub const fn is_resumable(&self) -> bool {
        !matches!(self.status, SessionStatus::Completed)
    }

    /// Start a new run against this record.
    ///
    /// Each run's own start time is written to the log header.
    pub fn mark_running(&mut self) {
        self.status = SessionStatus::Running;
        self.end_time = None;
        self.exit_code = None;
    }

    /// Record a natural, successful completion.
    pub fn mark_completed(&mut self, exit_code: i32) {
        self.status = SessionStatus::Completed;
        self.exit_code = Some(exit_code);
        self.end_time = Some(Utc::now());
    }

    /// Record an interruption or failure.
    pub fn mark_interrupted(&mut self) {
        self.status = SessionStatus::Interrupted;
        self.exit_code = None;
        self.end_time = Some(Utc::now());
    }
}
