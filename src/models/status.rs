//! Task status values reported to requesters

use serde::{Deserialize, Serialize};

/// Pipeline state of a task, as seen by the requester.
///
/// The numeric codes are part of the external contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Fetching or decoding failed; terminal
    DownloadFailed,
    /// A download worker picked the task up
    DownloadStarted,
    /// The raw payload is available
    DownloadComplete,
    /// A decode worker picked the task up
    DecodeStarted,
    /// Pixels were handed to the resource manager; terminal
    TaskComplete,
    /// Waiting in the download queue
    TaskQueued,
    /// Idle in the pool
    #[default]
    TaskNone,
}

impl Status {
    /// Get all statuses
    pub const fn all() -> &'static [Self] {
        &[
            Self::DownloadFailed,
            Self::DownloadStarted,
            Self::DownloadComplete,
            Self::DecodeStarted,
            Self::TaskComplete,
            Self::TaskQueued,
            Self::TaskNone,
        ]
    }

    /// Get the wire code
    pub const fn code(&self) -> i32 {
        match self {
            Self::DownloadFailed => -1,
            Self::DownloadStarted => 1,
            Self::DownloadComplete => 2,
            Self::DecodeStarted => 3,
            Self::TaskComplete => 4,
            Self::TaskQueued => 5,
            Self::TaskNone => 100,
        }
    }

    /// Parse from a wire code
    pub fn from_code(code: i32) -> Option<Self> {
        Self::all().iter().copied().find(|s| s.code() == code)
    }

    /// Get the display name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DownloadFailed => "DOWNLOAD_FAILED",
            Self::DownloadStarted => "DOWNLOAD_STARTED",
            Self::DownloadComplete => "DOWNLOAD_COMPLETE",
            Self::DecodeStarted => "DECODE_STARTED",
            Self::TaskComplete => "TASK_COMPLETE",
            Self::TaskQueued => "TASK_QUEUED",
            Self::TaskNone => "TASK_NONE",
        }
    }

    /// Terminal states end the task and send it back to the pool
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::TaskComplete | Self::DownloadFailed)
    }

    /// Whether the state machine has an edge from `self` to `next`.
    ///
    /// Activation out of `TaskNone` may land in `TaskQueued` (cache miss) or
    /// directly in `DownloadComplete` (memory cache hit). Decode failures
    /// reuse `DownloadFailed`.
    pub const fn can_advance_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::TaskNone, Self::TaskQueued | Self::DownloadComplete)
                | (Self::TaskQueued, Self::DownloadStarted)
                | (
                    Self::DownloadStarted,
                    Self::DownloadComplete | Self::DownloadFailed
                )
                | (Self::DownloadComplete, Self::DecodeStarted)
                | (Self::DecodeStarted, Self::TaskComplete | Self::DownloadFailed)
        )
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_contract() {
        assert_eq!(Status::DownloadFailed.code(), -1);
        assert_eq!(Status::DownloadStarted.code(), 1);
        assert_eq!(Status::DownloadComplete.code(), 2);
        assert_eq!(Status::DecodeStarted.code(), 3);
        assert_eq!(Status::TaskComplete.code(), 4);
        assert_eq!(Status::TaskQueued.code(), 5);
        assert_eq!(Status::TaskNone.code(), 100);
        assert_eq!(Status::from_code(4), Some(Status::TaskComplete));
        assert_eq!(Status::from_code(42), None);
    }

    #[test]
    fn test_success_path_is_connected() {
        let path = [
            Status::TaskNone,
            Status::TaskQueued,
            Status::DownloadStarted,
            Status::DownloadComplete,
            Status::DecodeStarted,
            Status::TaskComplete,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for next in Status::all() {
            assert!(!Status::TaskComplete.can_advance_to(*next));
            assert!(!Status::DownloadFailed.can_advance_to(*next));
        }
        assert!(!Status::DownloadComplete.can_advance_to(Status::TaskQueued));
    }
}
