//! Run lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tool::ScanStatus;

/// State of a single tool run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Constructed, not yet started.
    Pending,
    /// Tool logic is executing.
    Running,
    /// Tool logic returned normally.
    Completed,
    /// Tool logic returned an error or panicked.
    Failed,
    /// A cancellation checkpoint fired.
    Cancelled,
}

impl RunState {
    /// Checks if the run can move to the given state.
    ///
    /// Terminal states are final and nothing re-enters `Running`.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed | Self::Failed | Self::Cancelled)
        )
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl From<ScanStatus> for RunState {
    fn from(status: ScanStatus) -> Self {
        match status {
            ScanStatus::Completed => Self::Completed,
            ScanStatus::Failed => Self::Failed,
            ScanStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
