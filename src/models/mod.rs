//! Data models for the circulation server

pub mod copy;
pub mod member;
pub mod rental;
pub mod transaction;

// Re-export commonly used types
pub use copy::{BookCopy, BookId, CopyId, CopyStatus};
pub use member::{MemberId, MemberStatus};
pub use rental::{BorrowerEntry, LoanSummary, MemberLoanEntry, PopularityEntry, PopularityWindow};
pub use transaction::{HistoryFilter, LoanTransaction, NewLoan, TransactionId, TransactionStatus};
