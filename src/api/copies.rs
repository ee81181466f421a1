//! Copy endpoints: status lookup, administrative status, desk return

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::AppResult,
    models::{copy::UpdateCopyStatus, BookCopy, CopyId, LoanTransaction},
};

/// Get a copy and its circulation status
#[utoipa::path(
    get,
    path = "/copies/{id}",
    tag = "copies",
    params(
        ("id" = i64, Path, description = "Copy ID")
    ),
    responses(
        (status = 200, description = "Copy", body = BookCopy),
        (status = 404, description = "Copy not found")
    )
)]
pub async fn get_copy(
    State(state): State<crate::AppState>,
    Path(copy_id): Path<CopyId>,
) -> AppResult<Json<BookCopy>> {
    let copy = state.services.loans.get_copy(copy_id).await?;
    Ok(Json(copy))
}

/// Set an administrative status (maintenance, lost, damaged, available)
#[utoipa::path(
    put,
    path = "/copies/{id}/status",
    tag = "copies",
    params(
        ("id" = i64, Path, description = "Copy ID")
    ),
    request_body = UpdateCopyStatus,
    responses(
        (status = 200, description = "Status updated", body = BookCopy),
        (status = 404, description = "Copy not found"),
        (status = 409, description = "Status cannot be set directly")
    )
)]
pub async fn update_copy_status(
    State(state): State<crate::AppState>,
    Path(copy_id): Path<CopyId>,
    Json(request): Json<UpdateCopyStatus>,
) -> AppResult<Json<BookCopy>> {
    let copy = state
        .services
        .loans
        .set_copy_status(copy_id, request.status)
        .await?;
    Ok(Json(copy))
}

/// Return the open loan of a copy
#[utoipa::path(
    post,
    path = "/copies/{id}/return",
    tag = "copies",
    params(
        ("id" = i64, Path, description = "Copy ID")
    ),
    responses(
        (status = 200, description = "Copy returned", body = LoanTransaction),
        (status = 404, description = "No open loan for this copy")
    )
)]
pub async fn return_copy(
    State(state): State<crate::AppState>,
    Path(copy_id): Path<CopyId>,
) -> AppResult<Json<LoanTransaction>> {
    let loan = state.services.loans.return_by_copy(copy_id).await?;
    Ok(Json(loan))
}
