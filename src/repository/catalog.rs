//! Catalog and member lookups backed by the collaborator-owned tables

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::{CatalogLookup, MemberDirectory};
use crate::{
    error::AppResult,
    models::{BookId, CopyId, MemberId, MemberStatus},
};

#[derive(Clone)]
pub struct CatalogRepository {
    pool: Pool<Postgres>,
}

impl CatalogRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogLookup for CatalogRepository {
    async fn book_of(&self, copy_id: CopyId) -> AppResult<Option<BookId>> {
        let book_id = sqlx::query_scalar("SELECT book_id FROM copies WHERE id = $1")
            .bind(copy_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book_id)
    }

    async fn copies_of(&self, book_id: BookId) -> AppResult<Vec<CopyId>> {
        let ids = sqlx::query_scalar("SELECT id FROM copies WHERE book_id = $1 ORDER BY id")
            .bind(book_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}

#[async_trait]
impl MemberDirectory for CatalogRepository {
    async fn member_status(&self, member_id: MemberId) -> AppResult<Option<MemberStatus>> {
        let status: Option<i16> = sqlx::query_scalar("SELECT status FROM members WHERE id = $1")
            .bind(member_id)
            .fetch_optional(&self.pool)
            .await?;
        status.map(MemberStatus::try_from).transpose()
    }
}
