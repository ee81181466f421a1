//! Read-side views produced by the rental query service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::copy::{BookId, CopyId};
use super::member::MemberId;
use super::transaction::TransactionId;

/// Someone currently holding a copy of a book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BorrowerEntry {
    pub member_id: MemberId,
    pub copy_id: CopyId,
    pub transaction_id: TransactionId,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub overdue: bool,
}

/// A book currently held by a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MemberLoanEntry {
    pub book_id: BookId,
    pub copy_id: CopyId,
    pub transaction_id: TransactionId,
    pub due_at: DateTime<Utc>,
    pub overdue: bool,
}

/// Borrow count of a book over a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PopularityEntry {
    pub book_id: BookId,
    pub borrow_count: i64,
}

/// Window of a popularity ranking, half-open on `borrowed_at`
#[derive(Debug, Clone, Default)]
pub struct PopularityWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Open and overdue loan counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LoanSummary {
    pub open: i64,
    pub overdue: i64,
}
