//! Rental query endpoints (borrowers, member loans, history, popularity)

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_stream::StreamExt;
use utoipa::IntoParams;

use crate::{
    error::{AppError, AppResult},
    models::{
        BookId, BorrowerEntry, HistoryFilter, LoanTransaction, MemberId, MemberLoanEntry,
        PopularityEntry, PopularityWindow, TransactionStatus,
    },
    services::rentals::HistorySubject,
};

/// History query parameters
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Only loans in this status
    pub status: Option<TransactionStatus>,
    /// Borrowed at or after (RFC 3339)
    pub from: Option<DateTime<Utc>>,
    /// Borrowed before (RFC 3339)
    pub to: Option<DateTime<Utc>>,
}

impl From<HistoryQuery> for HistoryFilter {
    fn from(q: HistoryQuery) -> Self {
        HistoryFilter {
            status: q.status,
            from: q.from,
            to: q.to,
            ..Default::default()
        }
    }
}

/// Popularity query parameters
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PopularityQuery {
    /// Window start (RFC 3339)
    pub from: Option<DateTime<Utc>>,
    /// Window end, exclusive (RFC 3339)
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of books (default: 20)
    pub limit: Option<usize>,
}

async fn collect_history(
    state: &crate::AppState,
    subject: HistorySubject,
    query: HistoryQuery,
) -> AppResult<Vec<LoanTransaction>> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(AppError::BadRequest("'from' must not be after 'to'".to_string()));
        }
    }

    state
        .services
        .rentals
        .history_of(subject, query.into())
        .await?
        .collect::<AppResult<Vec<_>>>()
        .await
}

/// Members currently borrowing a copy of a book
#[utoipa::path(
    get,
    path = "/books/{id}/borrowers",
    tag = "rentals",
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Current borrowers", body = Vec<BorrowerEntry>)
    )
)]
pub async fn book_borrowers(
    State(state): State<crate::AppState>,
    Path(book_id): Path<BookId>,
) -> AppResult<Json<Vec<BorrowerEntry>>> {
    let borrowers = state
        .services
        .rentals
        .current_borrowers_of(book_id, Utc::now())
        .await?;
    Ok(Json(borrowers))
}

/// Loan history of a book
#[utoipa::path(
    get,
    path = "/books/{id}/history",
    tag = "rentals",
    params(
        ("id" = i64, Path, description = "Book ID"),
        HistoryQuery
    ),
    responses(
        (status = 200, description = "Loans of the book", body = Vec<LoanTransaction>)
    )
)]
pub async fn book_history(
    State(state): State<crate::AppState>,
    Path(book_id): Path<BookId>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<LoanTransaction>>> {
    let history = collect_history(&state, HistorySubject::Book(book_id), query).await?;
    Ok(Json(history))
}

/// Books a member currently holds
#[utoipa::path(
    get,
    path = "/members/{id}/loans",
    tag = "rentals",
    params(
        ("id" = i64, Path, description = "Member ID")
    ),
    responses(
        (status = 200, description = "Member's open loans", body = Vec<MemberLoanEntry>)
    )
)]
pub async fn member_loans(
    State(state): State<crate::AppState>,
    Path(member_id): Path<MemberId>,
) -> AppResult<Json<Vec<MemberLoanEntry>>> {
    let loans = state
        .services
        .rentals
        .current_books_of(member_id, Utc::now())
        .await?;
    Ok(Json(loans))
}

/// Loan history of a member
#[utoipa::path(
    get,
    path = "/members/{id}/history",
    tag = "rentals",
    params(
        ("id" = i64, Path, description = "Member ID"),
        HistoryQuery
    ),
    responses(
        (status = 200, description = "Loans of the member", body = Vec<LoanTransaction>)
    )
)]
pub async fn member_history(
    State(state): State<crate::AppState>,
    Path(member_id): Path<MemberId>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<LoanTransaction>>> {
    let history = collect_history(&state, HistorySubject::Member(member_id), query).await?;
    Ok(Json(history))
}

/// Most borrowed books over a window
#[utoipa::path(
    get,
    path = "/stats/popularity",
    tag = "rentals",
    params(PopularityQuery),
    responses(
        (status = 200, description = "Books ranked by loan count", body = Vec<PopularityEntry>)
    )
)]
pub async fn popularity(
    State(state): State<crate::AppState>,
    Query(query): Query<PopularityQuery>,
) -> AppResult<Json<Vec<PopularityEntry>>> {
    let ranking = state
        .services
        .rentals
        .popularity(PopularityWindow {
            from: query.from,
            to: query.to,
            limit: Some(query.limit.unwrap_or(20)),
        })
        .await?;
    Ok(Json(ranking))
}
