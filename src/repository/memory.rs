//! In-process store implementing every repository trait
//!
//! Copies, transactions and members live behind separate locks. Each
//! compare-and-set or conditional append runs under one write guard, and no
//! guard is held while waiting on another lock.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{BorrowingLedger, CatalogLookup, CopyAvailabilityStore, MemberDirectory, TransactionStream};
use crate::{
    config::SeedConfig,
    error::{AppError, AppResult},
    models::{
        BookCopy, BookId, CopyId, CopyStatus, HistoryFilter, LoanTransaction, MemberId,
        MemberStatus, NewLoan, TransactionId, TransactionStatus,
    },
};

#[derive(Clone, Default)]
pub struct InMemoryStore {
    copies: Arc<RwLock<HashMap<CopyId, BookCopy>>>,
    transactions: Arc<RwLock<BTreeMap<TransactionId, LoanTransaction>>>,
    members: Arc<RwLock<HashMap<MemberId, MemberStatus>>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an Available copy of `book_id`
    pub async fn add_copy(&self, copy_id: CopyId, book_id: BookId) {
        self.add_copy_with_status(copy_id, book_id, CopyStatus::Available)
            .await;
    }

    pub async fn add_copy_with_status(&self, copy_id: CopyId, book_id: BookId, status: CopyStatus) {
        let copy = BookCopy {
            status,
            ..BookCopy::available(copy_id, book_id)
        };
        self.copies.write().await.insert(copy_id, copy);
    }

    /// Register or update a member
    pub async fn add_member(&self, member_id: MemberId, status: MemberStatus) {
        self.members.write().await.insert(member_id, status);
    }

    /// Load the copies and members listed in the `storage.seed` config
    pub async fn seed(&self, seed: &SeedConfig) {
        for copy in &seed.copies {
            self.add_copy(copy.id, copy.book_id).await;
        }
        for member in &seed.members {
            self.add_member(member.id, member.status).await;
        }
    }

    /// Snapshot of every recorded transaction, in creation order
    pub async fn transactions(&self) -> Vec<LoanTransaction> {
        self.transactions.read().await.values().cloned().collect()
    }

    fn next_transaction_id(&self) -> TransactionId {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn insert_loan(
        &self,
        ledger: &mut BTreeMap<TransactionId, LoanTransaction>,
        loan: NewLoan,
    ) -> LoanTransaction {
        let tx = LoanTransaction {
            id: loan.id.unwrap_or_else(|| self.next_transaction_id()),
            copy_id: loan.copy_id,
            member_id: loan.member_id,
            borrowed_at: loan.borrowed_at,
            due_at: loan.due_at,
            returned_at: None,
            status: TransactionStatus::Active,
        };
        ledger.insert(tx.id, tx.clone());
        tx
    }

    async fn copy_ids_of_book(&self, book_id: BookId) -> HashSet<CopyId> {
        self.copies
            .read()
            .await
            .values()
            .filter(|c| c.book_id == book_id)
            .map(|c| c.id)
            .collect()
    }
}

#[async_trait]
impl CopyAvailabilityStore for InMemoryStore {
    async fn get(&self, copy_id: CopyId) -> AppResult<BookCopy> {
        self.copies
            .read()
            .await
            .get(&copy_id)
            .cloned()
            .ok_or(AppError::CopyNotFound(copy_id))
    }

    async fn try_reserve(&self, copy_id: CopyId, loan_id: TransactionId) -> AppResult<BookCopy> {
        let mut copies = self.copies.write().await;
        let copy = copies.get_mut(&copy_id).ok_or(AppError::CopyNotFound(copy_id))?;
        if copy.status != CopyStatus::Available {
            return Err(AppError::CopyUnavailable(copy_id));
        }
        copy.status = CopyStatus::Borrowed;
        copy.loan_id = Some(loan_id);
        Ok(copy.clone())
    }

    async fn release(&self, copy_id: CopyId, loan_id: TransactionId) -> AppResult<BookCopy> {
        let mut copies = self.copies.write().await;
        let copy = copies.get_mut(&copy_id).ok_or(AppError::CopyNotFound(copy_id))?;
        if !copy.is_held_by(loan_id) {
            return Err(copy.release_refusal(loan_id));
        }
        copy.status = CopyStatus::Available;
        copy.loan_id = None;
        Ok(copy.clone())
    }

    async fn set_administrative_status(
        &self,
        copy_id: CopyId,
        status: CopyStatus,
    ) -> AppResult<(BookCopy, CopyStatus)> {
        let mut copies = self.copies.write().await;
        let copy = copies.get_mut(&copy_id).ok_or(AppError::CopyNotFound(copy_id))?;
        let previous = copy.status;
        if !previous.allows_override_to(status) {
            return Err(AppError::invalid_transition(previous, status));
        }
        copy.status = status;
        copy.loan_id = None;
        Ok((copy.clone(), previous))
    }
}

#[async_trait]
impl BorrowingLedger for InMemoryStore {
    async fn next_id(&self) -> AppResult<TransactionId> {
        Ok(self.next_transaction_id())
    }

    async fn append(&self, loan: NewLoan) -> AppResult<LoanTransaction> {
        let mut ledger = self.transactions.write().await;
        Ok(self.insert_loan(&mut ledger, loan))
    }

    async fn append_within_limit(&self, loan: NewLoan, limit: i64) -> AppResult<LoanTransaction> {
        let mut ledger = self.transactions.write().await;
        if ledger.values().any(|t| t.copy_id == loan.copy_id && t.is_open()) {
            return Err(AppError::CopyUnavailable(loan.copy_id));
        }
        let open = ledger
            .values()
            .filter(|t| t.member_id == loan.member_id && t.is_open())
            .count() as i64;
        if open >= limit {
            return Err(AppError::MemberLimitExceeded {
                member_id: loan.member_id,
                open,
                limit,
            });
        }
        Ok(self.insert_loan(&mut ledger, loan))
    }

    async fn get(&self, id: TransactionId) -> AppResult<LoanTransaction> {
        self.transactions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(AppError::TransactionNotFound(id))
    }

    async fn mark_returned(
        &self,
        id: TransactionId,
        returned_at: DateTime<Utc>,
    ) -> AppResult<LoanTransaction> {
        let mut ledger = self.transactions.write().await;
        let tx = ledger.get_mut(&id).ok_or(AppError::TransactionNotFound(id))?;
        if !tx.is_open() {
            return Err(AppError::TransactionAlreadyReturned(id));
        }
        tx.transition(TransactionStatus::Returned)?;
        tx.returned_at = Some(returned_at);
        Ok(tx.clone())
    }

    async fn mark_overdue(&self, id: TransactionId, now: DateTime<Utc>) -> AppResult<LoanTransaction> {
        let mut ledger = self.transactions.write().await;
        let tx = ledger.get_mut(&id).ok_or(AppError::TransactionNotFound(id))?;
        match tx.status {
            TransactionStatus::Overdue => Ok(tx.clone()),
            TransactionStatus::Active if tx.is_past_due(now) => {
                tx.transition(TransactionStatus::Overdue)?;
                Ok(tx.clone())
            }
            current => Err(AppError::invalid_transition(current, TransactionStatus::Overdue)),
        }
    }

    async fn find_open_by_copy(&self, copy_id: CopyId) -> AppResult<Option<LoanTransaction>> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .find(|t| t.copy_id == copy_id && t.is_open())
            .cloned())
    }

    async fn find_open_by_member(&self, member_id: MemberId) -> AppResult<Vec<LoanTransaction>> {
        let mut open: Vec<_> = self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| t.member_id == member_id && t.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|t| (t.due_at, t.id));
        Ok(open)
    }

    async fn count_open_by_member(&self, member_id: MemberId) -> AppResult<i64> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| t.member_id == member_id && t.is_open())
            .count() as i64)
    }

    async fn count_open(&self) -> AppResult<i64> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| t.is_open())
            .count() as i64)
    }

    async fn find_past_due(&self, now: DateTime<Utc>) -> AppResult<Vec<LoanTransaction>> {
        let mut past_due: Vec<_> = self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| t.is_past_due(now))
            .cloned()
            .collect();
        past_due.sort_by_key(|t| (t.due_at, t.id));
        Ok(past_due)
    }

    async fn find_history<'a>(&'a self, filter: HistoryFilter) -> AppResult<TransactionStream<'a>> {
        let book_copies = match filter.book_id {
            Some(book_id) => Some(self.copy_ids_of_book(book_id).await),
            None => None,
        };

        let mut records: Vec<_> = self
            .transactions
            .read()
            .await
            .values()
            .filter(|t| filter.matches(t))
            .filter(|t| book_copies.as_ref().map_or(true, |ids| ids.contains(&t.copy_id)))
            .cloned()
            .collect();
        records.sort_by_key(|t| (t.borrowed_at, t.id));

        Ok(Box::pin(tokio_stream::iter(records.into_iter().map(Ok))))
    }
}

#[async_trait]
impl CatalogLookup for InMemoryStore {
    async fn book_of(&self, copy_id: CopyId) -> AppResult<Option<BookId>> {
        Ok(self.copies.read().await.get(&copy_id).map(|c| c.book_id))
    }

    async fn copies_of(&self, book_id: BookId) -> AppResult<Vec<CopyId>> {
        let mut ids: Vec<_> = self.copy_ids_of_book(book_id).await.into_iter().collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[async_trait]
impl MemberDirectory for InMemoryStore {
    async fn member_status(&self, member_id: MemberId) -> AppResult<Option<MemberStatus>> {
        Ok(self.members.read().await.get(&member_id).copied())
    }
}
