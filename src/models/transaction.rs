//! Borrowing transaction (loan episode) model and related types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::copy::{BookId, CopyId};
use super::member::MemberId;
use crate::error::AppError;

pub type TransactionId = i64;

/// Loan status.
///
/// `Active -> Overdue -> Returned`, or `Active -> Returned`. `Returned` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum TransactionStatus {
    Active = 0,
    Overdue = 1,
    Returned = 2,
}

impl TransactionStatus {
    /// Active or Overdue
    pub fn is_open(self) -> bool {
        !matches!(self, TransactionStatus::Returned)
    }

    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Active, TransactionStatus::Overdue)
                | (TransactionStatus::Active, TransactionStatus::Returned)
                | (TransactionStatus::Overdue, TransactionStatus::Returned)
        )
    }
}

impl TryFrom<i16> for TransactionStatus {
    type Error = AppError;

    fn try_from(v: i16) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(TransactionStatus::Active),
            1 => Ok(TransactionStatus::Overdue),
            2 => Ok(TransactionStatus::Returned),
            other => Err(AppError::Internal(format!(
                "Unknown transaction status code {}",
                other
            ))),
        }
    }
}

impl From<TransactionStatus> for i16 {
    fn from(s: TransactionStatus) -> Self {
        s as i16
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransactionStatus::Active => "active",
            TransactionStatus::Overdue => "overdue",
            TransactionStatus::Returned => "returned",
        };
        write!(f, "{}", label)
    }
}

/// One borrow-to-return cycle of a copy by a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LoanTransaction {
    pub id: TransactionId,
    pub copy_id: CopyId,
    pub member_id: MemberId,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: TransactionStatus,
}

impl LoanTransaction {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Open and past its due date
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.returned_at.is_none() && self.due_at < now
    }

    /// Flagged overdue by a sweep, or past due and not swept yet
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.status == TransactionStatus::Overdue || self.is_past_due(now)
    }

    /// Apply a status transition, rejecting anything outside the transition table
    pub fn transition(&mut self, next: TransactionStatus) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::invalid_transition(self.status, next));
        }
        self.status = next;
        Ok(())
    }
}

/// Row as stored in the `loan_transactions` table
#[derive(Debug, Clone, FromRow)]
pub struct LoanTransactionRow {
    pub id: i64,
    pub copy_id: i64,
    pub member_id: i64,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: i16,
}

impl TryFrom<LoanTransactionRow> for LoanTransaction {
    type Error = AppError;

    fn try_from(row: LoanTransactionRow) -> Result<Self, Self::Error> {
        Ok(LoanTransaction {
            id: row.id,
            copy_id: row.copy_id,
            member_id: row.member_id,
            borrowed_at: row.borrowed_at,
            due_at: row.due_at,
            returned_at: row.returned_at,
            status: TransactionStatus::try_from(row.status)?,
        })
    }
}

/// Values of a loan about to be appended to the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoan {
    /// Identifier reserved through `BorrowingLedger::next_id`; the ledger
    /// assigns one when absent
    pub id: Option<TransactionId>,
    pub copy_id: CopyId,
    pub member_id: MemberId,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

impl NewLoan {
    /// Due date is fixed here and never recomputed
    pub fn starting_at(
        copy_id: CopyId,
        member_id: MemberId,
        borrowed_at: DateTime<Utc>,
        loan_period_days: i64,
    ) -> Self {
        Self {
            id: None,
            copy_id,
            member_id,
            borrowed_at,
            due_at: borrowed_at + Duration::days(loan_period_days),
        }
    }

    pub fn with_id(mut self, id: TransactionId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Ledger history filter. Every field narrows the result; the date range
/// applies to `borrowed_at` as a half-open interval `[from, to)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub copy_id: Option<CopyId>,
    pub member_id: Option<MemberId>,
    pub book_id: Option<BookId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status: Option<TransactionStatus>,
}

impl HistoryFilter {
    /// Check a transaction against every criterion except `book_id`,
    /// which needs the catalog to resolve.
    pub fn matches(&self, tx: &LoanTransaction) -> bool {
        self.copy_id.map_or(true, |id| tx.copy_id == id)
            && self.member_id.map_or(true, |id| tx.member_id == id)
            && self.from.map_or(true, |from| tx.borrowed_at >= from)
            && self.to.map_or(true, |to| tx.borrowed_at < to)
            && self.status.map_or(true, |status| tx.status == status)
    }
}
