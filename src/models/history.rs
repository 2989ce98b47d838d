//! Run history record.
//!
//! A `RunHistory` is created in the `working` state when a batch starts and is
//! confirmed exactly once as `finished`, `failed`, or `canceled`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Lifecycle state of a recorded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Working,
    Finished,
    Failed,
    Canceled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Working => "working",
            RunStatus::Finished => "finished",
            RunStatus::Failed => "failed",
            RunStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Working)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "working" => Ok(RunStatus::Working),
            "finished" => Ok(RunStatus::Finished),
            "failed" => Ok(RunStatus::Failed),
            "canceled" => Ok(RunStatus::Canceled),
            other => Err(AppError::storage(format!("unknown run status '{other}'"))),
        }
    }
}

/// Durable record of one batch execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHistory {
    pub id: i64,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    /// Serialized options the run was started with
    pub options: serde_json::Value,
}

impl RunHistory {
    /// Compute the confirmed copy of this record without touching `self`.
    ///
    /// Fails with `AlreadyConfirmed` if the record has left `working`.
    pub fn confirmed(&self, status: RunStatus, at: DateTime<Utc>) -> Result<RunHistory> {
        if self.status.is_terminal() {
            return Err(AppError::AlreadyConfirmed {
                id: self.id,
                status: self.status.to_string(),
            });
        }
        Ok(RunHistory {
            finished_at: Some(at),
            status,
            ..self.clone()
        })
    }
}
