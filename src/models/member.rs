//! Member eligibility as seen by the loan engine

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

pub type MemberId = i64;

/// Member status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum MemberStatus {
    Active = 0,
    Inactive = 1,
    Suspended = 2,
}

impl MemberStatus {
    pub fn can_borrow(self) -> bool {
        self == MemberStatus::Active
    }
}

impl TryFrom<i16> for MemberStatus {
    type Error = AppError;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(MemberStatus::Active),
            1 => Ok(MemberStatus::Inactive),
            2 => Ok(MemberStatus::Suspended),
            other => Err(AppError::Internal(format!("Unknown member status code {}", other))),
        }
    }
}

impl From<MemberStatus> for i16 {
    fn from(s: MemberStatus) -> Self {
        s as i16
    }
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            MemberStatus::Active => "active",
            MemberStatus::Inactive => "inactive",
            MemberStatus::Suspended => "suspended",
        };
        write!(f, "{}", label)
    }
}
