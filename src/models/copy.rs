//! Copy (physical unit of a catalog book) model and related types

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::transaction::TransactionId;
use crate::error::AppError;

pub type CopyId = i64;
pub type BookId = i64;

/// Circulation status of a copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum CopyStatus {
    Available = 0,
    Borrowed = 1,
    Maintenance = 2,
    Lost = 3,
    Damaged = 4,
}

impl CopyStatus {
    /// Transition table.
    ///
    /// `Borrowed` is entered only from `Available` (a reservation). Every other
    /// move is an administrative one, including overriding a borrowed copy.
    pub fn can_transition_to(self, next: CopyStatus) -> bool {
        match (self, next) {
            (CopyStatus::Available, CopyStatus::Borrowed) => true,
            (_, CopyStatus::Borrowed) => false,
            (from, to) => from != to,
        }
    }

    /// Moves staff may make directly: any legal transition except entering
    /// `Borrowed`, which only a reservation does.
    pub fn allows_override_to(self, next: CopyStatus) -> bool {
        next != CopyStatus::Borrowed && self.can_transition_to(next)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CopyStatus::Available => "available",
            CopyStatus::Borrowed => "borrowed",
            CopyStatus::Maintenance => "maintenance",
            CopyStatus::Lost => "lost",
            CopyStatus::Damaged => "damaged",
        }
    }
}

impl TryFrom<i16> for CopyStatus {
    type Error = AppError;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(CopyStatus::Available),
            1 => Ok(CopyStatus::Borrowed),
            2 => Ok(CopyStatus::Maintenance),
            3 => Ok(CopyStatus::Lost),
            4 => Ok(CopyStatus::Damaged),
            other => Err(AppError::Internal(format!("Unknown copy status code {}", other))),
        }
    }
}

impl From<CopyStatus> for i16 {
    fn from(s: CopyStatus) -> Self {
        s as i16
    }
}

impl std::fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A physical copy and its current status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BookCopy {
    pub id: CopyId,
    pub book_id: BookId,
    pub status: CopyStatus,
    /// Loan holding the copy while it is borrowed
    pub loan_id: Option<TransactionId>,
}

impl BookCopy {
    pub fn available(id: CopyId, book_id: BookId) -> Self {
        Self {
            id,
            book_id,
            status: CopyStatus::Available,
            loan_id: None,
        }
    }

    /// Borrowed and held by `loan_id`
    pub fn is_held_by(&self, loan_id: TransactionId) -> bool {
        self.status == CopyStatus::Borrowed && self.loan_id == Some(loan_id)
    }

    /// Error for a release by `loan_id` that does not hold this copy
    pub fn release_refusal(&self, loan_id: TransactionId) -> AppError {
        match self.loan_id {
            Some(holder) if self.status == CopyStatus::Borrowed && holder != loan_id => {
                AppError::invalid_transition(
                    format!("{} by loan {}", self.status, holder),
                    format!("{} for loan {}", CopyStatus::Available, loan_id),
                )
            }
            _ => AppError::invalid_transition(self.status, CopyStatus::Available),
        }
    }
}

/// Row as stored in the `copies` table
#[derive(Debug, Clone, FromRow)]
pub struct BookCopyRow {
    pub id: i64,
    pub book_id: i64,
    pub status: i16,
    pub loan_id: Option<i64>,
}

impl TryFrom<BookCopyRow> for BookCopy {
    type Error = AppError;

    fn try_from(row: BookCopyRow) -> Result<Self, Self::Error> {
        Ok(BookCopy {
            id: row.id,
            book_id: row.book_id,
            status: CopyStatus::try_from(row.status)?,
            loan_id: row.loan_id,
        })
    }
}

/// Administrative status change request
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCopyStatus {
    pub status: CopyStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_borrowed_only_from_available() {
        assert!(CopyStatus::Available.can_transition_to(CopyStatus::Borrowed));
        for from in [
            CopyStatus::Borrowed,
            CopyStatus::Maintenance,
            CopyStatus::Lost,
            CopyStatus::Damaged,
        ] {
            assert!(!from.can_transition_to(CopyStatus::Borrowed), "{from} -> borrowed");
        }
    }

    #[test]
    fn test_administrative_moves() {
        assert!(CopyStatus::Borrowed.can_transition_to(CopyStatus::Available));
        assert!(CopyStatus::Available.can_transition_to(CopyStatus::Maintenance));
        assert!(CopyStatus::Lost.can_transition_to(CopyStatus::Available));
        assert!(CopyStatus::Borrowed.can_transition_to(CopyStatus::Lost));
        assert!(!CopyStatus::Damaged.can_transition_to(CopyStatus::Damaged));
    }

    #[test]
    fn test_overrides_follow_transition_table() {
        assert!(CopyStatus::Borrowed.allows_override_to(CopyStatus::Available));
        assert!(CopyStatus::Available.allows_override_to(CopyStatus::Lost));
        assert!(!CopyStatus::Available.allows_override_to(CopyStatus::Borrowed));
        assert!(!CopyStatus::Damaged.allows_override_to(CopyStatus::Damaged));
        assert!(!CopyStatus::Available.allows_override_to(CopyStatus::Available));
    }

    #[test]
    fn test_held_by_requires_borrowed() {
        let mut copy = BookCopy::available(1, 10);
        assert!(!copy.is_held_by(7));
        copy.status = CopyStatus::Borrowed;
        copy.loan_id = Some(7);
        assert!(copy.is_held_by(7));
        assert!(!copy.is_held_by(8));
    }

    #[test]
    fn test_status_codes() {
        for status in [
            CopyStatus::Available,
            CopyStatus::Borrowed,
            CopyStatus::Maintenance,
            CopyStatus::Lost,
            CopyStatus::Damaged,
        ] {
            assert_eq!(CopyStatus::try_from(i16::from(status)).unwrap(), status);
        }
        assert!(CopyStatus::try_from(42).is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&CopyStatus::Maintenance).unwrap();
        assert_eq!(json, "\"maintenance\"");
    }
}
