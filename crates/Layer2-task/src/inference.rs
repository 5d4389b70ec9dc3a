//! Completion inference
//!
//! The daemon never sees a task's exit code. Once a session is gone, the
//! task log is the only evidence left, and this module turns it into a
//! terminal verdict. While the session is alive it also scrapes progress
//! hints from the log.
//!
//! Rule order for a finished session:
//! 1. success marker for this task id  → completed, progress 100
//! 2. failure marker for this task id  → failed, last keyword line as message
//! 3. neither                          → failed (`Error::InferenceAmbiguous`)
//!
//! A marker only counts when it is a whole line and its timestamp parses as
//! RFC 3339. Echoed shell input and partial writes never match.

use crate::task::TaskId;
use chrono::{DateTime, Utc};
use fleet_foundation::Error;
use lazy_static::lazy_static;
use regex::Regex;

/// Success marker tag, written as `[TASK_COMPLETED:<id>:<timestamp>]`
pub const COMPLETED_TAG: &str = "TASK_COMPLETED";
/// Failure marker tag, written as `[TASK_FAILED:<id>:<timestamp>]`
pub const FAILED_TAG: &str = "TASK_FAILED";

pub const MSG_FAILURE_STATUS: &str = "command exited with failure status";

const ERROR_KEYWORDS: &[&str] = &["error", "failed", "exception"];

lazy_static! {
    static ref PROGRESS_PCT: Regex = Regex::new(r"(?i)progress:?\s*(\d+)%").unwrap();
    static ref PCT_COMPLETE: Regex = Regex::new(r"(?i)(\d+)%\s+complete").unwrap();
    static ref N_OF_M: Regex = Regex::new(r"(?i)processing.*?(\d+)\s+of\s+(\d+)").unwrap();
}

/// Marker line as it appears in a log
pub fn marker(tag: &str, id: &TaskId, timestamp: &str) -> String {
    format!("[{}:{}:{}]", tag, id, timestamp)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
}

/// Terminal verdict for a task whose session has ended
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub outcome: Outcome,
    pub error_message: Option<String>,
    /// Timestamp carried by the success marker, when parseable
    pub finished_at: Option<DateTime<Utc>>,
}

impl Verdict {
    fn completed(finished_at: Option<DateTime<Utc>>) -> Self {
        Self {
            outcome: Outcome::Completed,
            error_message: None,
            finished_at,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Failed,
            error_message: Some(message.into()),
            finished_at: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Completed
    }
}

/// Completion inference trait - swap in a richer signal without touching
/// the monitor or the queue
pub trait CompletionInference: Send + Sync {
    /// Classify a finished session from its full log
    fn classify(&self, id: &TaskId, log: &str) -> Verdict;

    /// Latest progress hint in the log, 0-100
    fn extract_progress(&self, log: &str) -> Option<u8>;
}

/// Sentinel-marker protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct SentinelInference;

impl SentinelInference {
    /// Timestamp of the last `[TAG:<id>:<rfc3339>]` line in the log
    fn find_marker(log: &str, tag: &str, id: &TaskId) -> Option<DateTime<Utc>> {
        let prefix = format!("[{}:{}:", tag, id);
        log.lines().rev().find_map(|line| {
            let stamp = line.trim().strip_prefix(prefix.as_str())?.strip_suffix(']')?;
            DateTime::parse_from_rfc3339(stamp)
                .ok()
                .map(|t| t.with_timezone(&Utc))
        })
    }

    /// Marker lines and echoed marker commands
    fn is_marker_line(line: &str) -> bool {
        line.contains(COMPLETED_TAG) || line.contains(FAILED_TAG)
    }

    fn last_error_line(log: &str) -> Option<&str> {
        log.lines()
            .filter(|line| !Self::is_marker_line(line))
            .filter(|line| {
                let lower = line.to_lowercase();
                ERROR_KEYWORDS.iter().any(|k| lower.contains(k))
            })
            .last()
            .map(str::trim)
    }
}

impl CompletionInference for SentinelInference {
    fn classify(&self, id: &TaskId, log: &str) -> Verdict {
        if let Some(finished_at) = Self::find_marker(log, COMPLETED_TAG, id) {
            return Verdict::completed(Some(finished_at));
        }
        if Self::find_marker(log, FAILED_TAG, id).is_some() {
            let message = Self::last_error_line(log).unwrap_or(MSG_FAILURE_STATUS);
            return Verdict::failed(message);
        }
        Verdict::failed(Error::InferenceAmbiguous.to_string())
    }

    fn extract_progress(&self, log: &str) -> Option<u8> {
        let pct = |m: &str| m.parse::<u64>().ok().map(|v| v.min(100) as u8);

        if let Some(c) = PROGRESS_PCT.captures_iter(log).last() {
            return pct(&c[1]);
        }
        if let Some(c) = PCT_COMPLETE.captures_iter(log).last() {
            return pct(&c[1]);
        }
        if let Some(c) = N_OF_M.captures_iter(log).last() {
            let current: u64 = c[1].parse().ok()?;
            let total: u64 = c[2].parse().ok()?;
            if total == 0 {
                return None;
            }
            return Some((current.saturating_mul(100) / total).min(100) as u8);
        }
        None
    }
}
