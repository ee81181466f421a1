//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{copies, health, loans, rentals};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Circulation API",
        version = "0.1.0",
        description = "Library loan transaction REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Loans
        loans::create_loan,
        loans::get_loan,
        loans::return_loan,
        loans::list_overdue,
        loans::loan_summary,
        loans::sweep_overdue,
        // Copies
        copies::get_copy,
        copies::update_copy_status,
        copies::return_copy,
        // Rentals
        rentals::book_borrowers,
        rentals::book_history,
        rentals::member_loans,
        rentals::member_history,
        rentals::popularity,
    ),
    components(
        schemas(
            // Loans
            loans::CreateLoanRequest,
            loans::SweepRequest,
            loans::SweepResponse,
            crate::models::LoanTransaction,
            crate::models::TransactionStatus,
            crate::models::LoanSummary,
            // Copies
            crate::models::BookCopy,
            crate::models::CopyStatus,
            crate::models::copy::UpdateCopyStatus,
            // Rentals
            crate::models::BorrowerEntry,
            crate::models::MemberLoanEntry,
            crate::models::PopularityEntry,
            // Health
            health::StatusResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "loans", description = "Checkout, return and overdue handling"),
        (name = "copies", description = "Copy status"),
        (name = "rentals", description = "Read-only rental queries")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
