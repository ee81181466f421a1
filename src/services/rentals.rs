//! Read-only rental queries over the ledger

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio_stream::StreamExt;

use crate::{
    error::AppResult,
    models::{
        BookId, BorrowerEntry, CopyId, HistoryFilter, LoanSummary, LoanTransaction, MemberId,
        MemberLoanEntry, PopularityEntry, PopularityWindow,
    },
    repository::{Repository, TransactionStream},
};

/// Whose history to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySubject {
    Book(BookId),
    Member(MemberId),
}

#[derive(Clone)]
pub struct RentalsService {
    repository: Repository,
}

impl RentalsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Members currently holding a copy of `book_id`
    pub async fn current_borrowers_of(
        &self,
        book_id: BookId,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<BorrowerEntry>> {
        let copies = self.repository.catalog.copies_of(book_id).await?;

        let mut borrowers = Vec::new();
        for copy_id in copies {
            if let Some(tx) = self.repository.ledger.find_open_by_copy(copy_id).await? {
                borrowers.push(BorrowerEntry {
                    member_id: tx.member_id,
                    copy_id,
                    transaction_id: tx.id,
                    borrowed_at: tx.borrowed_at,
                    due_at: tx.due_at,
                    overdue: tx.is_overdue_at(now),
                });
            }
        }

        tracing::debug!(book_id, borrowers = borrowers.len(), "Resolved current borrowers");
        Ok(borrowers)
    }

    /// Books a member currently holds, soonest due first
    pub async fn current_books_of(
        &self,
        member_id: MemberId,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<MemberLoanEntry>> {
        let open = self.repository.ledger.find_open_by_member(member_id).await?;

        let mut books = Vec::with_capacity(open.len());
        for tx in open {
            let Some(book_id) = self.repository.catalog.book_of(tx.copy_id).await? else {
                tracing::debug!(
                    copy_id = tx.copy_id,
                    transaction_id = tx.id,
                    "Copy no longer in catalog, left out of member loans"
                );
                continue;
            };
            books.push(MemberLoanEntry {
                book_id,
                copy_id: tx.copy_id,
                transaction_id: tx.id,
                due_at: tx.due_at,
                overdue: tx.is_overdue_at(now),
            });
        }
        Ok(books)
    }

    /// Loan history of a book or a member, narrowed by `filter`
    pub async fn history_of(
        &self,
        subject: HistorySubject,
        mut filter: HistoryFilter,
    ) -> AppResult<TransactionStream<'_>> {
        match subject {
            HistorySubject::Book(book_id) => filter.book_id = Some(book_id),
            HistorySubject::Member(member_id) => filter.member_id = Some(member_id),
        }
        self.repository.ledger.find_history(filter).await
    }

    /// Books ranked by number of loans started in the window, open or closed.
    /// Ties are broken by book id.
    pub async fn popularity(&self, window: PopularityWindow) -> AppResult<Vec<PopularityEntry>> {
        let filter = HistoryFilter {
            from: window.from,
            to: window.to,
            ..Default::default()
        };

        let mut per_copy: HashMap<CopyId, i64> = HashMap::new();
        let mut history = self.repository.ledger.find_history(filter).await?;
        while let Some(tx) = history.next().await {
            *per_copy.entry(tx?.copy_id).or_default() += 1;
        }

        let mut per_book: HashMap<BookId, i64> = HashMap::new();
        for (copy_id, count) in per_copy {
            match self.repository.catalog.book_of(copy_id).await? {
                Some(book_id) => *per_book.entry(book_id).or_default() += count,
                None => tracing::debug!(copy_id, "Copy no longer in catalog, left out of ranking"),
            }
        }

        let mut ranking: Vec<_> = per_book
            .into_iter()
            .map(|(book_id, borrow_count)| PopularityEntry {
                book_id,
                borrow_count,
            })
            .collect();
        ranking.sort_by(|a, b| {
            b.borrow_count
                .cmp(&a.borrow_count)
                .then(a.book_id.cmp(&b.book_id))
        });
        if let Some(limit) = window.limit {
            ranking.truncate(limit);
        }
        Ok(ranking)
    }

    /// Open loans past their due date at `now`
    pub async fn overdue_loans(&self, now: DateTime<Utc>) -> AppResult<Vec<LoanTransaction>> {
        self.repository.ledger.find_past_due(now).await
    }

    pub async fn loan_summary(&self, now: DateTime<Utc>) -> AppResult<LoanSummary> {
        let open = self.repository.ledger.count_open().await?;
        let overdue = self.repository.ledger.find_past_due(now).await?.len() as i64;
        Ok(LoanSummary { open, overdue })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::models::NewLoan;
    use crate::repository::{
        memory::InMemoryStore, BorrowingLedger, MockCatalogLookup, MockMemberDirectory,
    };

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, d, 12, 0, 0).unwrap()
    }

    fn service(store: &InMemoryStore, catalog: MockCatalogLookup) -> RentalsService {
        RentalsService::new(Repository::from_parts(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(catalog),
            Arc::new(MockMemberDirectory::new()),
        ))
    }

    #[tokio::test]
    async fn test_popularity_ranks_by_count_then_book() {
        let store = InMemoryStore::new();
        // copies 1, 2 -> book 10; copy 3 -> book 20; copy 4 -> book 30
        for (copy_id, at) in [(1, 1), (2, 2), (3, 3), (1, 5), (4, 6), (3, 7)] {
            store
                .append(NewLoan::starting_at(copy_id, 99, day(at), 14))
                .await
                .unwrap();
        }

        let mut catalog = MockCatalogLookup::new();
        catalog.expect_book_of().returning(|copy_id| {
            Ok(match copy_id {
                1 | 2 => Some(10),
                3 => Some(20),
                4 => Some(30),
                _ => None,
            })
        });
        let service = service(&store, catalog);

        let ranking = service
            .popularity(PopularityWindow::default())
            .await
            .unwrap();
        assert_eq!(
            ranking,
            vec![
                PopularityEntry { book_id: 10, borrow_count: 3 },
                PopularityEntry { book_id: 20, borrow_count: 2 },
                PopularityEntry { book_id: 30, borrow_count: 1 },
            ]
        );

        let windowed = service
            .popularity(PopularityWindow {
                from: Some(day(3)),
                to: Some(day(7)),
                limit: Some(2),
            })
            .await
            .unwrap();
        assert_eq!(
            windowed,
            vec![
                PopularityEntry { book_id: 10, borrow_count: 1 },
                PopularityEntry { book_id: 20, borrow_count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_current_books_of_flags_overdue() {
        let store = InMemoryStore::new();
        let early = store
            .append(NewLoan::starting_at(1, 5, day(1), 3))
            .await
            .unwrap();
        store
            .append(NewLoan::starting_at(2, 5, day(2), 14))
            .await
            .unwrap();

        let mut catalog = MockCatalogLookup::new();
        catalog
            .expect_book_of()
            .returning(|copy_id| Ok(Some(copy_id * 100)));
        let service = service(&store, catalog);

        let books = service.current_books_of(5, day(1) + Duration::days(5)).await.unwrap();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].transaction_id, early.id);
        assert_eq!(books[0].book_id, 100);
        assert!(books[0].overdue);
        assert!(!books[1].overdue);
    }

    #[tokio::test]
    async fn test_current_books_of_skips_uncatalogued_copy() {
        let store = InMemoryStore::new();
        store
            .append(NewLoan::starting_at(1, 5, day(1), 14))
            .await
            .unwrap();
        store
            .append(NewLoan::starting_at(2, 5, day(2), 14))
            .await
            .unwrap();

        let mut catalog = MockCatalogLookup::new();
        catalog
            .expect_book_of()
            .returning(|copy_id| Ok((copy_id == 2).then_some(200)));
        let service = service(&store, catalog);

        let books = service.current_books_of(5, day(3)).await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].copy_id, 2);
        assert_eq!(books[0].book_id, 200);
    }

    #[tokio::test]
    async fn test_loan_summary() {
        let store = InMemoryStore::new();
        let returned = store
            .append(NewLoan::starting_at(1, 5, day(1), 1))
            .await
            .unwrap();
        store.mark_returned(returned.id, day(2)).await.unwrap();
        store
            .append(NewLoan::starting_at(2, 5, day(1), 1))
            .await
            .unwrap();
        store
            .append(NewLoan::starting_at(3, 6, day(1), 30))
            .await
            .unwrap();

        let service = service(&store, MockCatalogLookup::new());
        let summary = service.loan_summary(day(10)).await.unwrap();
        assert_eq!(summary, LoanSummary { open: 2, overdue: 1 });
    }
}
