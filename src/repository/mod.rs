//! Repository layer: storage traits and their backends
//!
//! The loan engine only talks to the traits declared here. Two backends
//! implement them: PostgreSQL (`copies`, `loans`, `catalog`) and an
//! in-process store (`memory`) used for development and tests.

pub mod catalog;
pub mod copies;
pub mod loans;
pub mod memory;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use tokio_stream::Stream;

use crate::{
    error::AppResult,
    models::{
        BookCopy, BookId, CopyId, CopyStatus, HistoryFilter, LoanTransaction, MemberId,
        MemberStatus, NewLoan, TransactionId,
    },
};

/// Lazily consumed, finite sequence of ledger records
pub type TransactionStream<'a> = Pin<Box<dyn Stream<Item = AppResult<LoanTransaction>> + Send + 'a>>;

/// Source of truth for copy status.
///
/// Every transition is a single compare-and-set: concurrent callers racing on
/// the same copy are totally ordered and at most one of them wins.
#[async_trait]
pub trait CopyAvailabilityStore: Send + Sync {
    async fn get(&self, copy_id: CopyId) -> AppResult<BookCopy>;

    /// Available -> Borrowed, held by `loan_id`. Fails with `CopyNotFound`
    /// or `CopyUnavailable`.
    async fn try_reserve(&self, copy_id: CopyId, loan_id: TransactionId) -> AppResult<BookCopy>;

    /// Borrowed -> Available, only while the copy is still held by
    /// `loan_id`. Fails with `InvalidStateTransition` otherwise.
    async fn release(&self, copy_id: CopyId, loan_id: TransactionId) -> AppResult<BookCopy>;

    /// Move a copy to Maintenance/Lost/Damaged or back to Available along
    /// `CopyStatus::allows_override_to`, dropping any loan hold.
    /// Returns the updated copy and the status it had before.
    async fn set_administrative_status(
        &self,
        copy_id: CopyId,
        status: CopyStatus,
    ) -> AppResult<(BookCopy, CopyStatus)>;
}

/// Append-mostly record of loan episodes
#[async_trait]
pub trait BorrowingLedger: Send + Sync {
    /// Reserve an identifier for a loan that is not recorded yet
    async fn next_id(&self) -> AppResult<TransactionId>;

    /// Record a new Active loan unconditionally
    async fn append(&self, loan: NewLoan) -> AppResult<LoanTransaction>;

    /// Record a new Active loan only if the member has fewer than `limit`
    /// open loans at commit time and the copy has no open loan. Serialized
    /// per member.
    async fn append_within_limit(&self, loan: NewLoan, limit: i64) -> AppResult<LoanTransaction>;

    async fn get(&self, id: TransactionId) -> AppResult<LoanTransaction>;

    /// Active/Overdue -> Returned
    async fn mark_returned(
        &self,
        id: TransactionId,
        returned_at: DateTime<Utc>,
    ) -> AppResult<LoanTransaction>;

    /// Active -> Overdue when past due at `now`; no-op when already Overdue
    async fn mark_overdue(&self, id: TransactionId, now: DateTime<Utc>) -> AppResult<LoanTransaction>;

    async fn find_open_by_copy(&self, copy_id: CopyId) -> AppResult<Option<LoanTransaction>>;

    async fn find_open_by_member(&self, member_id: MemberId) -> AppResult<Vec<LoanTransaction>>;

    async fn count_open_by_member(&self, member_id: MemberId) -> AppResult<i64>;

    async fn count_open(&self) -> AppResult<i64>;

    /// Open loans whose due date is before `now`, oldest due first
    async fn find_past_due(&self, now: DateTime<Utc>) -> AppResult<Vec<LoanTransaction>>;

    /// Records matching `filter`, ordered by borrow time. Each call starts a
    /// fresh pass over the ledger.
    async fn find_history<'a>(&'a self, filter: HistoryFilter) -> AppResult<TransactionStream<'a>>;
}

/// Catalog facts the engine consumes but does not own
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn book_of(&self, copy_id: CopyId) -> AppResult<Option<BookId>>;

    async fn copies_of(&self, book_id: BookId) -> AppResult<Vec<CopyId>>;
}

/// Member eligibility as published by the member registry
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// `None` when the member does not exist
    async fn member_status(&self, member_id: MemberId) -> AppResult<Option<MemberStatus>>;
}

/// Bundle of storage handles shared by the services
#[derive(Clone)]
pub struct Repository {
    pub copies: Arc<dyn CopyAvailabilityStore>,
    pub ledger: Arc<dyn BorrowingLedger>,
    pub catalog: Arc<dyn CatalogLookup>,
    pub members: Arc<dyn MemberDirectory>,
    pool: Option<Pool<Postgres>>,
}

impl Repository {
    /// Create a PostgreSQL-backed repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        let catalog = Arc::new(catalog::CatalogRepository::new(pool.clone()));
        Self {
            copies: Arc::new(copies::CopiesRepository::new(pool.clone())),
            ledger: Arc::new(loans::LoansRepository::new(pool.clone())),
            catalog: catalog.clone(),
            members: catalog,
            pool: Some(pool),
        }
    }

    /// Create a repository over a single in-process store
    pub fn in_memory(store: memory::InMemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            copies: store.clone(),
            ledger: store.clone(),
            catalog: store.clone(),
            members: store,
            pool: None,
        }
    }

    /// Assemble a repository from individual parts
    pub fn from_parts(
        copies: Arc<dyn CopyAvailabilityStore>,
        ledger: Arc<dyn BorrowingLedger>,
        catalog: Arc<dyn CatalogLookup>,
        members: Arc<dyn MemberDirectory>,
    ) -> Self {
        Self {
            copies,
            ledger,
            catalog,
            members,
            pool: None,
        }
    }

    /// Check that the backing database answers
    pub async fn ping(&self) -> AppResult<()> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}
