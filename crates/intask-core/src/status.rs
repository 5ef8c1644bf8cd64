//! Activity statuses and the transitions between them.
//!
//! Running statuses (`Started`, `Continued`) and the paused one (`Suspended`)
//! each have an ended counterpart stored once the activity gets its `ends`
//! timestamp. A task's current status is the status of its latest activity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::TransitionError;

/// Status of one activity row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum ActivityStatus {
    /// Task created, never started.
    Created,
    /// Timer running.
    Started,
    /// `Started` that has ended.
    Ended,
    /// Paused.
    Suspended,
    /// `Suspended` that has ended.
    EndedSuspended,
    /// Resumed after a pause.
    Continued,
    /// `Continued` that has ended.
    EndedContinued,
}

impl ActivityStatus {
    /// Every status in code order.
    pub const ALL: [Self; 7] = [
        Self::Created,
        Self::Started,
        Self::Ended,
        Self::Suspended,
        Self::EndedSuspended,
        Self::Continued,
        Self::EndedContinued,
    ];

    /// Stored integer code.
    pub const fn code(self) -> i64 {
        match self {
            Self::Created => 0,
            Self::Started => 1,
            Self::Ended => 2,
            Self::Suspended => 3,
            Self::EndedSuspended => 4,
            Self::Continued => 5,
            Self::EndedContinued => 6,
        }
    }

    /// Parse a stored code.
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Lowercase label used in messages.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Ended => "ended",
            Self::Suspended => "suspended",
            Self::EndedSuspended => "ended_suspended",
            Self::Continued => "continued",
            Self::EndedContinued => "ended_continued",
        }
    }

    /// Timer is counting (`Started` or `Continued`).
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Started | Self::Continued)
    }

    /// One of the ended counterparts.
    pub const fn is_ended(self) -> bool {
        matches!(
            self,
            Self::Ended | Self::EndedSuspended | Self::EndedContinued
        )
    }

    /// The ended counterpart of a running or paused status.
    pub const fn ended_counterpart(self) -> Option<Self> {
        match self {
            Self::Started => Some(Self::Ended),
            Self::Suspended => Some(Self::EndedSuspended),
            Self::Continued => Some(Self::EndedContinued),
            _ => None,
        }
    }

    /// Whether time spent in this status counts towards a task's duration.
    pub const fn counts_duration(self) -> bool {
        matches!(
            self,
            Self::Started | Self::Ended | Self::Continued | Self::EndedContinued
        )
    }

    /// Check that a task whose current status is `from` may move to `self`.
    ///
    /// `from` is `None` when the task has no activity for the user yet.
    pub fn check_transition(self, from: Option<Self>) -> Result<(), TransitionError> {
        if transition_allowed(from, self) {
            Ok(())
        } else {
            Err(TransitionError {
                from: from.map_or("none", Self::label).to_string(),
                to: self.label().to_string(),
            })
        }
    }
}

fn transition_allowed(from: Option<ActivityStatus>, to: ActivityStatus) -> bool {
    use ActivityStatus::{
        Continued, Created, Ended, EndedContinued, EndedSuspended, Started, Suspended,
    };

    match from {
        None => matches!(to, Created | Started),
        Some(Created) => matches!(to, Started),
        Some(Started) => matches!(to, Suspended | Ended),
        Some(Suspended) => matches!(to, Continued | EndedSuspended),
        Some(Continued) => matches!(to, Suspended | EndedContinued),
        Some(Ended | EndedSuspended | EndedContinued) => matches!(to, Started),
    }
}

impl From<ActivityStatus> for i64 {
    fn from(status: ActivityStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i64> for ActivityStatus {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("unknown activity status {code}"))
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ActivityStatus::*;

    #[test]
    fn codes_round_trip() {
        for status in ActivityStatus::ALL {
            assert_eq!(ActivityStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(ActivityStatus::from_code(7), None);
        assert_eq!(ActivityStatus::from_code(-1), None);
    }

    #[test]
    fn serializes_as_code() {
        assert_eq!(serde_json::to_string(&Suspended).unwrap(), "3");
        let parsed: ActivityStatus = serde_json::from_str("5").unwrap();
        assert_eq!(parsed, Continued);
        assert!(serde_json::from_str::<ActivityStatus>("9").is_err());
    }

    #[test]
    fn ended_counterparts() {
        assert_eq!(Started.ended_counterpart(), Some(Ended));
        assert_eq!(Suspended.ended_counterpart(), Some(EndedSuspended));
        assert_eq!(Continued.ended_counterpart(), Some(EndedContinued));
        assert_eq!(Created.ended_counterpart(), None);
        assert_eq!(Ended.ended_counterpart(), None);
    }

    #[test]
    fn running_and_ended() {
        assert!(Started.is_running());
        assert!(Continued.is_running());
        assert!(!Suspended.is_running());
        assert!(EndedSuspended.is_ended());
        assert!(!Created.is_ended());
    }

    #[test]
    fn first_activity_is_created_or_started() {
        assert!(Created.check_transition(None).is_ok());
        assert!(Started.check_transition(None).is_ok());
        assert!(Suspended.check_transition(None).is_err());
    }

    #[test]
    fn pause_resume_cycle() {
        assert!(Started.check_transition(Some(Created)).is_ok());
        assert!(Suspended.check_transition(Some(Started)).is_ok());
        assert!(Continued.check_transition(Some(Suspended)).is_ok());
        assert!(Suspended.check_transition(Some(Continued)).is_ok());
        assert!(EndedContinued.check_transition(Some(Continued)).is_ok());
        assert!(Started.check_transition(Some(EndedContinued)).is_ok());
    }

    #[test]
    fn disallowed_transitions() {
        let err = Continued.check_transition(Some(Started)).unwrap_err();
        assert_eq!(err.from, "started");
        assert_eq!(err.to, "continued");

        assert!(Continued.check_transition(Some(Created)).is_err());
        assert!(Suspended.check_transition(Some(Ended)).is_err());
        assert!(Created.check_transition(Some(Started)).is_err());
    }

    #[test]
    fn none_label_in_error() {
        let err = EndedSuspended.check_transition(None).unwrap_err();
        assert_eq!(err.from, "none");
    }
}
