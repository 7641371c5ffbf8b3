use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::org::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaveRequestId(pub String);

impl fmt::Display for LeaveRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

impl LeaveStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for LeaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaveStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => {
                Err(DomainError::UnknownValue { kind: "leave status", value: other.to_owned() })
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Approve,
    Reject,
}

impl DecisionAction {
    pub const fn target_status(self) -> LeaveStatus {
        match self {
            Self::Approve => LeaveStatus::Approved,
            Self::Reject => LeaveStatus::Rejected,
        }
    }
}

impl FromStr for DecisionAction {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            other => {
                Err(DomainError::UnknownValue { kind: "decision action", value: other.to_owned() })
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: LeaveRequestId,
    pub requester_id: UserId,
    pub status: LeaveStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub decided_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeaveRequest {
    /// Inclusive on both ends.
    pub fn covers(&self, day: NaiveDate) -> bool {
        self.start_date <= day && day <= self.end_date
    }

    /// Whether this request makes its requester absent on `day`.
    pub fn marks_absent_on(&self, day: NaiveDate) -> bool {
        self.status == LeaveStatus::Approved && self.covers(day)
    }

    pub fn transition(&self, action: DecisionAction) -> Result<LeaveStatus, DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidLeaveTransition {
                from: self.status,
                to: action.target_status(),
            });
        }
        Ok(action.target_status())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::{DecisionAction, LeaveRequest, LeaveRequestId, LeaveStatus};
    use crate::errors::DomainError;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).expect("valid date")
    }

    fn request(status: LeaveStatus) -> LeaveRequest {
        let now = Utc::now();
        LeaveRequest {
            id: LeaveRequestId("LR-1".to_owned()),
            requester_id: "u-1".into(),
            status,
            start_date: day(10),
            end_date: day(12),
            decided_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn approved_request_marks_absence_inclusively() {
        let approved = request(LeaveStatus::Approved);
        assert!(approved.marks_absent_on(day(10)));
        assert!(approved.marks_absent_on(day(12)));
        assert!(!approved.marks_absent_on(day(13)));
        assert!(!request(LeaveStatus::Pending).marks_absent_on(day(11)));
    }

    #[test]
    fn only_pending_requests_can_transition() {
        assert_eq!(
            request(LeaveStatus::Pending).transition(DecisionAction::Reject),
            Ok(LeaveStatus::Rejected)
        );
        assert_eq!(
            request(LeaveStatus::Approved).transition(DecisionAction::Reject),
            Err(DomainError::InvalidLeaveTransition {
                from: LeaveStatus::Approved,
                to: LeaveStatus::Rejected,
            })
        );
    }
}
