//! Signature and signer lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle state shared by envelopes and individual signers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Draft,
    Sent,
    Delivered,
    Completed,
    Declined,
}

/// Rejected status values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidStatus {
    #[error("Unknown status: {0:?}")]
    Unknown(String),

    #[error("Status cannot move from {from} to {to}")]
    Backward { from: Status, to: Status },
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Draft,
        Status::Sent,
        Status::Delivered,
        Status::Completed,
        Status::Declined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Draft => "draft",
            Status::Sent => "sent",
            Status::Delivered => "delivered",
            Status::Completed => "completed",
            Status::Declined => "declined",
        }
    }

    /// Position along `draft -> sent -> delivered -> completed`.
    /// `declined` sits beside `completed` as the alternate terminal.
    pub fn rank(&self) -> u8 {
        match self {
            Status::Draft => 0,
            Status::Sent => 1,
            Status::Delivered => 2,
            Status::Completed | Status::Declined => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Declined)
    }

    /// Whether a notification reporting `next` may be applied to an entity in `self`.
    ///
    /// Re-delivery of the current status is accepted so that repeated
    /// notifications from the signing service stay idempotent.
    pub fn can_transition_to(&self, next: Status) -> bool {
        if *self == next {
            return true;
        }
        match next {
            Status::Declined => matches!(self, Status::Sent | Status::Delivered),
            _ => !self.is_terminal() && next.rank() > self.rank(),
        }
    }

    pub fn check_transition(&self, next: Status) -> Result<(), InvalidStatus> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(InvalidStatus::Backward {
                from: *self,
                to: next,
            })
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Status::Draft),
            "sent" => Ok(Status::Sent),
            "delivered" => Ok(Status::Delivered),
            "completed" => Ok(Status::Completed),
            "declined" => Ok(Status::Declined),
            other => Err(InvalidStatus::Unknown(other.to_string())),
        }
    }
}
