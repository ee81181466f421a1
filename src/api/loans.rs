//! Loan endpoints: checkout, return, overdue handling

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{CopyId, LoanSummary, LoanTransaction, MemberId, TransactionId},
};

/// Create loan request
#[derive(Deserialize, ToSchema)]
pub struct CreateLoanRequest {
    /// Borrowing member
    pub member_id: MemberId,
    /// Copy to lend
    pub copy_id: CopyId,
    /// Loan period in days (server default when omitted)
    pub loan_period_days: Option<i64>,
}

/// Overdue sweep request
#[derive(Deserialize, ToSchema, Default)]
pub struct SweepRequest {
    /// Reference time, current time when omitted
    pub now: Option<DateTime<Utc>>,
}

/// Overdue sweep result
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SweepResponse {
    /// Number of loans newly marked overdue
    pub marked: usize,
}

/// Create a new loan (check out a copy)
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    request_body = CreateLoanRequest,
    responses(
        (status = 201, description = "Loan created", body = LoanTransaction),
        (status = 400, description = "Invalid loan period"),
        (status = 403, description = "Member not eligible"),
        (status = 404, description = "Member or copy not found"),
        (status = 409, description = "Copy not available"),
        (status = 422, description = "Member loan limit reached")
    )
)]
pub async fn create_loan(
    State(state): State<crate::AppState>,
    Json(request): Json<CreateLoanRequest>,
) -> AppResult<(StatusCode, Json<LoanTransaction>)> {
    let loan = state
        .services
        .loans
        .checkout(request.member_id, request.copy_id, request.loan_period_days)
        .await?;

    Ok((StatusCode::CREATED, Json(loan)))
}

/// Get a loan
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    params(
        ("id" = i64, Path, description = "Transaction ID")
    ),
    responses(
        (status = 200, description = "Loan", body = LoanTransaction),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<crate::AppState>,
    Path(transaction_id): Path<TransactionId>,
) -> AppResult<Json<LoanTransaction>> {
    let loan = state.services.loans.get_transaction(transaction_id).await?;
    Ok(Json(loan))
}

/// Return a borrowed copy
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    params(
        ("id" = i64, Path, description = "Transaction ID")
    ),
    responses(
        (status = 200, description = "Copy returned", body = LoanTransaction),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn return_loan(
    State(state): State<crate::AppState>,
    Path(transaction_id): Path<TransactionId>,
) -> AppResult<Json<LoanTransaction>> {
    let loan = state.services.loans.return_book(transaction_id).await?;
    Ok(Json(loan))
}

/// List open loans past their due date
#[utoipa::path(
    get,
    path = "/loans/overdue",
    tag = "loans",
    responses(
        (status = 200, description = "Overdue loans, oldest due first", body = Vec<LoanTransaction>)
    )
)]
pub async fn list_overdue(
    State(state): State<crate::AppState>,
) -> AppResult<Json<Vec<LoanTransaction>>> {
    let loans = state.services.rentals.overdue_loans(Utc::now()).await?;
    Ok(Json(loans))
}

/// Count open and overdue loans
#[utoipa::path(
    get,
    path = "/loans/summary",
    tag = "loans",
    responses(
        (status = 200, description = "Loan counters", body = LoanSummary)
    )
)]
pub async fn loan_summary(State(state): State<crate::AppState>) -> AppResult<Json<LoanSummary>> {
    let summary = state.services.rentals.loan_summary(Utc::now()).await?;
    Ok(Json(summary))
}

/// Mark loans past due as overdue (called by an external scheduler)
#[utoipa::path(
    post,
    path = "/loans/sweep",
    tag = "loans",
    request_body = SweepRequest,
    responses(
        (status = 200, description = "Sweep done", body = SweepResponse)
    )
)]
pub async fn sweep_overdue(
    State(state): State<crate::AppState>,
    request: Option<Json<SweepRequest>>,
) -> AppResult<Json<SweepResponse>> {
    let now = request.and_then(|Json(r)| r.now).unwrap_or_else(Utc::now);
    let marked = state.services.loans.sweep_overdue(now).await?;
    Ok(Json(SweepResponse { marked }))
}
