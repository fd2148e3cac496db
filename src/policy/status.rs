use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    NotStarted,
    InProgress,
    Completed,
    Reviewed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusActor {
    Owner,
    Reviewer,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusTransitionError {
    #[error("unknown assessment status `{0}`")]
    Unknown(String),
    #[error("cannot move assessment from {from} back to {to}")]
    Backward {
        from: AssessmentStatus,
        to: AssessmentStatus,
    },
    #[error("only an assessor or HR can mark an assessment {0}")]
    ReviewerOnly(AssessmentStatus),
}

impl AssessmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AssessmentStatus::NotStarted => "not_started",
            AssessmentStatus::InProgress => "in_progress",
            AssessmentStatus::Completed => "completed",
            AssessmentStatus::Reviewed => "reviewed",
        }
    }

    pub fn accepts_self_ratings(self) -> bool {
        matches!(
            self,
            AssessmentStatus::NotStarted | AssessmentStatus::InProgress
        )
    }

    pub fn accepts_assessor_ratings(self) -> bool {
        self != AssessmentStatus::Reviewed
    }

    /// Forward moves only; skipping steps is allowed and staying put is a no-op.
    pub fn transition(
        self,
        to: AssessmentStatus,
        actor: StatusActor,
    ) -> Result<AssessmentStatus, StatusTransitionError> {
        if to < self {
            return Err(StatusTransitionError::Backward { from: self, to });
        }
        if to == AssessmentStatus::Reviewed && to != self && actor != StatusActor::Reviewer {
            return Err(StatusTransitionError::ReviewerOnly(to));
        }
        Ok(to)
    }
}

impl fmt::Display for AssessmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssessmentStatus {
    type Err = StatusTransitionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "not_started" => Ok(AssessmentStatus::NotStarted),
            "in_progress" => Ok(AssessmentStatus::InProgress),
            "completed" => Ok(AssessmentStatus::Completed),
            "reviewed" => Ok(AssessmentStatus::Reviewed),
            other => Err(StatusTransitionError::Unknown(other.to_string())),
        }
    }
}
