//! Copies repository (PostgreSQL copy availability store)

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::CopyAvailabilityStore;
use crate::{
    error::{AppError, AppResult},
    models::{
        copy::{BookCopy, BookCopyRow, CopyId, CopyStatus},
        transaction::TransactionId,
    },
};

const COLUMNS: &str = "id, book_id, status, loan_id";

#[derive(Clone)]
pub struct CopiesRepository {
    pool: Pool<Postgres>,
}

impl CopiesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CopyAvailabilityStore for CopiesRepository {
    async fn get(&self, copy_id: CopyId) -> AppResult<BookCopy> {
        sqlx::query_as::<_, BookCopyRow>(&format!("SELECT {COLUMNS} FROM copies WHERE id = $1"))
            .bind(copy_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::CopyNotFound(copy_id))?
            .try_into()
    }

    async fn try_reserve(&self, copy_id: CopyId, loan_id: TransactionId) -> AppResult<BookCopy> {
        let reserved = sqlx::query_as::<_, BookCopyRow>(&format!(
            r#"
            UPDATE copies SET status = 1, loan_id = $2
            WHERE id = $1 AND status = 0
            RETURNING {COLUMNS}
            "#
        ))
        .bind(copy_id)
        .bind(loan_id)
        .fetch_optional(&self.pool)
        .await?;

        match reserved {
            Some(row) => row.try_into(),
            // Missing or taken; `get` tells which
            None => {
                let copy = self.get(copy_id).await?;
                Err(AppError::CopyUnavailable(copy.id))
            }
        }
    }

    async fn release(&self, copy_id: CopyId, loan_id: TransactionId) -> AppResult<BookCopy> {
        let released = sqlx::query_as::<_, BookCopyRow>(&format!(
            r#"
            UPDATE copies SET status = 0, loan_id = NULL
            WHERE id = $1 AND status = 1 AND loan_id = $2
            RETURNING {COLUMNS}
            "#
        ))
        .bind(copy_id)
        .bind(loan_id)
        .fetch_optional(&self.pool)
        .await?;

        match released {
            Some(row) => row.try_into(),
            None => Err(self.get(copy_id).await?.release_refusal(loan_id)),
        }
    }

    async fn set_administrative_status(
        &self,
        copy_id: CopyId,
        status: CopyStatus,
    ) -> AppResult<(BookCopy, CopyStatus)> {
        let mut tx = self.pool.begin().await?;

        // Row lock: the status checked is the status replaced
        let current: Option<i16> =
            sqlx::query_scalar("SELECT status FROM copies WHERE id = $1 FOR UPDATE")
                .bind(copy_id)
                .fetch_optional(&mut *tx)
                .await?;
        let previous = CopyStatus::try_from(current.ok_or(AppError::CopyNotFound(copy_id))?)?;

        if !previous.allows_override_to(status) {
            return Err(AppError::invalid_transition(previous, status));
        }

        let row = sqlx::query_as::<_, BookCopyRow>(&format!(
            "UPDATE copies SET status = $2, loan_id = NULL WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(copy_id)
        .bind(i16::from(status))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((row.try_into()?, previous))
    }
}
