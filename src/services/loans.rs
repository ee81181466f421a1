//! Loan policy engine: checkout, return and overdue detection
//!
//! This is the only writer combining the copy store and the ledger. A
//! checkout reserves a loan id, reserves the copy for that id
//! (compare-and-set), then appends the loan through the ledger's conditional
//! insert, which re-counts the member's open loans under a per-member lock.
//! If the append fails the reservation is released again, so a reserved copy
//! without a loan is never left behind. Releases name the holding loan: a
//! return never frees a copy that was meanwhile handed to someone else.
//!
//! The reserve/append and return/release pairs run on a spawned task: a
//! caller that goes away mid-request cannot stop the pair halfway.

use chrono::{DateTime, Utc};

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
    models::{
        BookCopy, CopyId, CopyStatus, LoanTransaction, MemberId, NewLoan, TransactionId,
        TransactionStatus,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    config: LoansConfig,
}

impl LoansService {
    pub fn new(repository: Repository, config: LoansConfig) -> Self {
        Self { repository, config }
    }

    pub fn config(&self) -> &LoansConfig {
        &self.config
    }

    /// Borrow a copy for a member, starting now
    pub async fn checkout(
        &self,
        member_id: MemberId,
        copy_id: CopyId,
        loan_period_days: Option<i64>,
    ) -> AppResult<LoanTransaction> {
        self.checkout_at(member_id, copy_id, loan_period_days, Utc::now())
            .await
    }

    /// Borrow a copy for a member with an explicit borrow time
    pub async fn checkout_at(
        &self,
        member_id: MemberId,
        copy_id: CopyId,
        loan_period_days: Option<i64>,
        now: DateTime<Utc>,
    ) -> AppResult<LoanTransaction> {
        let period = self.loan_period(loan_period_days)?;
        self.ensure_eligible(member_id).await?;

        // Early rejection; the binding check happens again at append time
        let limit = self.config.max_open_loans;
        let open = self.repository.ledger.count_open_by_member(member_id).await?;
        if open >= limit {
            tracing::info!(member_id, open, limit, "Checkout refused: loan limit reached");
            return Err(AppError::MemberLimitExceeded {
                member_id,
                open,
                limit,
            });
        }

        let loan = NewLoan::starting_at(copy_id, member_id, now, period);
        let this = self.clone();
        tokio::spawn(async move { this.reserve_and_record(loan, limit).await })
            .await
            .map_err(|e| AppError::Internal(format!("Checkout task failed: {}", e)))?
    }

    async fn reserve_and_record(&self, loan: NewLoan, limit: i64) -> AppResult<LoanTransaction> {
        let loan_id = self.repository.ledger.next_id().await?;
        let loan = loan.with_id(loan_id);
        let copy = self.repository.copies.try_reserve(loan.copy_id, loan_id).await?;

        match self.repository.ledger.append_within_limit(loan, limit).await {
            Ok(tx) => {
                tracing::info!(
                    transaction_id = tx.id,
                    member_id = tx.member_id,
                    copy_id = tx.copy_id,
                    due_at = %tx.due_at,
                    "Copy checked out"
                );
                Ok(tx)
            }
            Err(err) => {
                if let Err(release_err) = self.repository.copies.release(copy.id, loan_id).await {
                    tracing::error!(
                        copy_id = copy.id,
                        error = %release_err,
                        "Failed to release copy after aborted checkout"
                    );
                }
                Err(err)
            }
        }
    }

    /// Return a loan, now
    pub async fn return_book(&self, transaction_id: TransactionId) -> AppResult<LoanTransaction> {
        self.return_book_at(transaction_id, Utc::now()).await
    }

    /// Return a loan with an explicit return time
    pub async fn return_book_at(
        &self,
        transaction_id: TransactionId,
        now: DateTime<Utc>,
    ) -> AppResult<LoanTransaction> {
        let tx = self.repository.ledger.get(transaction_id).await?;
        if !tx.is_open() {
            return Err(AppError::TransactionAlreadyReturned(transaction_id));
        }

        let this = self.clone();
        tokio::spawn(async move { this.record_return(tx, now).await })
            .await
            .map_err(|e| AppError::Internal(format!("Return task failed: {}", e)))?
    }

    /// Return the open loan of a copy (desk return by scanning the copy)
    pub async fn return_by_copy(&self, copy_id: CopyId) -> AppResult<LoanTransaction> {
        let tx = self
            .repository
            .ledger
            .find_open_by_copy(copy_id)
            .await?
            .ok_or(AppError::NoOpenTransaction(copy_id))?;
        self.return_book(tx.id).await
    }

    async fn record_return(&self, tx: LoanTransaction, now: DateTime<Utc>) -> AppResult<LoanTransaction> {
        // The conditional ledger update decides which of two concurrent
        // returns wins; only the winner touches the copy, and only while the
        // copy is still held by this loan.
        let returned = self.repository.ledger.mark_returned(tx.id, now).await?;

        match self.repository.copies.release(returned.copy_id, returned.id).await {
            Ok(_) => {}
            Err(err @ AppError::StorageUnavailable(_)) => {
                tracing::error!(
                    transaction_id = returned.id,
                    copy_id = returned.copy_id,
                    error = %err,
                    "Loan recorded as returned but the copy could not be released"
                );
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(
                    transaction_id = returned.id,
                    copy_id = returned.copy_id,
                    error = %err,
                    "Copy no longer held by this loan, recording the return anyway"
                );
            }
        }

        tracing::info!(
            transaction_id = returned.id,
            member_id = returned.member_id,
            copy_id = returned.copy_id,
            was_overdue = tx.status == TransactionStatus::Overdue,
            "Copy returned"
        );
        Ok(returned)
    }

    /// Mark every Active loan past due at `now` as Overdue.
    ///
    /// Returns how many loans changed status. Records that fail to update
    /// are logged and skipped.
    pub async fn sweep_overdue(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let candidates = self.repository.ledger.find_past_due(now).await?;

        let mut marked = 0;
        for tx in candidates
            .into_iter()
            .filter(|t| t.status == TransactionStatus::Active)
        {
            match self.repository.ledger.mark_overdue(tx.id, now).await {
                Ok(_) => marked += 1,
                Err(err) => {
                    tracing::warn!(transaction_id = tx.id, error = %err, "Skipping overdue update");
                }
            }
        }

        tracing::info!(marked, "Overdue sweep finished");
        Ok(marked)
    }

    pub async fn get_transaction(&self, transaction_id: TransactionId) -> AppResult<LoanTransaction> {
        self.repository.ledger.get(transaction_id).await
    }

    pub async fn get_copy(&self, copy_id: CopyId) -> AppResult<BookCopy> {
        self.repository.copies.get(copy_id).await
    }

    /// Administrative status change (maintenance, lost, damaged, back to available)
    pub async fn set_copy_status(&self, copy_id: CopyId, status: CopyStatus) -> AppResult<BookCopy> {
        let (copy, previous) = self
            .repository
            .copies
            .set_administrative_status(copy_id, status)
            .await?;

        if previous == CopyStatus::Borrowed {
            tracing::warn!(
                copy_id,
                status = %status,
                "Administrative override of a borrowed copy"
            );
        } else {
            tracing::info!(copy_id, from = %previous, to = %status, "Copy status changed");
        }
        Ok(copy)
    }

    fn loan_period(&self, requested: Option<i64>) -> AppResult<i64> {
        let days = requested.unwrap_or(self.config.default_loan_period_days);
        if days < 1 || days > self.config.max_loan_period_days {
            return Err(AppError::BadRequest(format!(
                "Loan period must be between 1 and {} days, got {}",
                self.config.max_loan_period_days, days
            )));
        }
        Ok(days)
    }

    async fn ensure_eligible(&self, member_id: MemberId) -> AppResult<()> {
        let status = self
            .repository
            .members
            .member_status(member_id)
            .await?
            .ok_or(AppError::MemberNotFound(member_id))?;

        if !status.can_borrow() {
            return Err(AppError::MemberIneligible { member_id, status });
        }
        Ok(())
    }
}
