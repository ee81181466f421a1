//! Loans repository (PostgreSQL borrowing ledger)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use tokio_stream::StreamExt;

use super::{BorrowingLedger, TransactionStream};
use crate::{
    error::{AppError, AppResult},
    models::{
        copy::CopyId,
        member::MemberId,
        transaction::{
            HistoryFilter, LoanTransaction, LoanTransactionRow, NewLoan, TransactionId,
            TransactionStatus,
        },
    },
};

const COLUMNS: &str = "id, copy_id, member_id, borrowed_at, due_at, returned_at, status";

const OPEN: &str = "status IN (0, 1)";

const ID_SEQUENCE: &str = "pg_get_serial_sequence('loan_transactions', 'id')";

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn into_transactions(rows: Vec<LoanTransactionRow>) -> AppResult<Vec<LoanTransaction>> {
        rows.into_iter().map(LoanTransaction::try_from).collect()
    }
}

#[async_trait]
impl BorrowingLedger for LoansRepository {
    async fn next_id(&self) -> AppResult<TransactionId> {
        let id: i64 = sqlx::query_scalar(&format!("SELECT nextval({ID_SEQUENCE})"))
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    async fn append(&self, loan: NewLoan) -> AppResult<LoanTransaction> {
        sqlx::query_as::<_, LoanTransactionRow>(&format!(
            r#"
            INSERT INTO loan_transactions (id, copy_id, member_id, borrowed_at, due_at, status)
            VALUES (COALESCE($5, nextval({ID_SEQUENCE})), $1, $2, $3, $4, 0)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(loan.copy_id)
        .bind(loan.member_id)
        .bind(loan.borrowed_at)
        .bind(loan.due_at)
        .bind(loan.id)
        .fetch_one(&self.pool)
        .await?
        .try_into()
    }

    async fn append_within_limit(&self, loan: NewLoan, limit: i64) -> AppResult<LoanTransaction> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent checkouts of the same member until commit
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(loan.member_id)
            .execute(&mut *tx)
            .await?;

        // A copy put back to Available by an override may still have a loan
        let copy_taken: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM loan_transactions WHERE copy_id = $1 AND {OPEN})"
        ))
        .bind(loan.copy_id)
        .fetch_one(&mut *tx)
        .await?;

        if copy_taken {
            return Err(AppError::CopyUnavailable(loan.copy_id));
        }

        let open: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM loan_transactions WHERE member_id = $1 AND {OPEN}"
        ))
        .bind(loan.member_id)
        .fetch_one(&mut *tx)
        .await?;

        if open >= limit {
            // Dropping `tx` rolls back and frees the lock
            return Err(AppError::MemberLimitExceeded {
                member_id: loan.member_id,
                open,
                limit,
            });
        }

        let row = sqlx::query_as::<_, LoanTransactionRow>(&format!(
            r#"
            INSERT INTO loan_transactions (id, copy_id, member_id, borrowed_at, due_at, status)
            VALUES (COALESCE($5, nextval({ID_SEQUENCE})), $1, $2, $3, $4, 0)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(loan.copy_id)
        .bind(loan.member_id)
        .bind(loan.borrowed_at)
        .bind(loan.due_at)
        .bind(loan.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        row.try_into()
    }

    async fn get(&self, id: TransactionId) -> AppResult<LoanTransaction> {
        sqlx::query_as::<_, LoanTransactionRow>(&format!(
            "SELECT {COLUMNS} FROM loan_transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::TransactionNotFound(id))?
        .try_into()
    }

    async fn mark_returned(
        &self,
        id: TransactionId,
        returned_at: DateTime<Utc>,
    ) -> AppResult<LoanTransaction> {
        let updated = sqlx::query_as::<_, LoanTransactionRow>(&format!(
            r#"
            UPDATE loan_transactions SET status = 2, returned_at = $2
            WHERE id = $1 AND {OPEN}
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(returned_at)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => row.try_into(),
            None => {
                // Either missing or already returned; `get` tells which
                let existing = self.get(id).await?;
                Err(AppError::TransactionAlreadyReturned(existing.id))
            }
        }
    }

    async fn mark_overdue(&self, id: TransactionId, now: DateTime<Utc>) -> AppResult<LoanTransaction> {
        let updated = sqlx::query_as::<_, LoanTransactionRow>(&format!(
            r#"
            UPDATE loan_transactions SET status = 1
            WHERE id = $1 AND status = 0 AND returned_at IS NULL AND due_at < $2
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return row.try_into();
        }

        let existing = self.get(id).await?;
        match existing.status {
            TransactionStatus::Overdue => Ok(existing),
            current => Err(AppError::invalid_transition(current, TransactionStatus::Overdue)),
        }
    }

    async fn find_open_by_copy(&self, copy_id: CopyId) -> AppResult<Option<LoanTransaction>> {
        sqlx::query_as::<_, LoanTransactionRow>(&format!(
            "SELECT {COLUMNS} FROM loan_transactions WHERE copy_id = $1 AND {OPEN}"
        ))
        .bind(copy_id)
        .fetch_optional(&self.pool)
        .await?
        .map(LoanTransaction::try_from)
        .transpose()
    }

    async fn find_open_by_member(&self, member_id: MemberId) -> AppResult<Vec<LoanTransaction>> {
        let rows = sqlx::query_as::<_, LoanTransactionRow>(&format!(
            "SELECT {COLUMNS} FROM loan_transactions WHERE member_id = $1 AND {OPEN} ORDER BY due_at"
        ))
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;

        Self::into_transactions(rows)
    }

    async fn count_open_by_member(&self, member_id: MemberId) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM loan_transactions WHERE member_id = $1 AND {OPEN}"
        ))
        .bind(member_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_open(&self) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM loan_transactions WHERE {OPEN}"))
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn find_past_due(&self, now: DateTime<Utc>) -> AppResult<Vec<LoanTransaction>> {
        let rows = sqlx::query_as::<_, LoanTransactionRow>(&format!(
            r#"
            SELECT {COLUMNS} FROM loan_transactions
            WHERE {OPEN} AND returned_at IS NULL AND due_at < $1
            ORDER BY due_at, id
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Self::into_transactions(rows)
    }

    async fn find_history<'a>(&'a self, filter: HistoryFilter) -> AppResult<TransactionStream<'a>> {
        // Static text so the stream only borrows the pool
        const HISTORY: &str = r#"
            SELECT t.id, t.copy_id, t.member_id, t.borrowed_at, t.due_at, t.returned_at, t.status
            FROM loan_transactions t
            JOIN copies c ON c.id = t.copy_id
            WHERE ($1::BIGINT IS NULL OR t.copy_id = $1)
              AND ($2::BIGINT IS NULL OR t.member_id = $2)
              AND ($3::BIGINT IS NULL OR c.book_id = $3)
              AND ($4::TIMESTAMPTZ IS NULL OR t.borrowed_at >= $4)
              AND ($5::TIMESTAMPTZ IS NULL OR t.borrowed_at < $5)
              AND ($6::SMALLINT IS NULL OR t.status = $6)
            ORDER BY t.borrowed_at, t.id
        "#;

        let stream = sqlx::query_as::<_, LoanTransactionRow>(HISTORY)
            .bind(filter.copy_id)
            .bind(filter.member_id)
            .bind(filter.book_id)
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.status.map(i16::from))
            .fetch(&self.pool)
            .map(|row| row.map_err(AppError::from).and_then(LoanTransaction::try_from));

        Ok(Box::pin(stream))
    }
}
