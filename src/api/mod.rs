//! API handlers and router for the circulation REST endpoints

pub mod copies;
pub mod health;
pub mod loans;
pub mod openapi;
pub mod rentals;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Loans
        .route("/loans", post(loans::create_loan))
        .route("/loans/overdue", get(loans::list_overdue))
        .route("/loans/summary", get(loans::loan_summary))
        .route("/loans/sweep", post(loans::sweep_overdue))
        .route("/loans/:id", get(loans::get_loan))
        .route("/loans/:id/return", post(loans::return_loan))
        // Copies
        .route("/copies/:id", get(copies::get_copy))
        .route("/copies/:id/status", put(copies::update_copy_status))
        .route("/copies/:id/return", post(copies::return_copy))
        // Books
        .route("/books/:id/borrowers", get(rentals::book_borrowers))
        .route("/books/:id/history", get(rentals::book_history))
        // Members
        .route("/members/:id/loans", get(rentals::member_loans))
        .route("/members/:id/history", get(rentals::member_history))
        // Statistics
        .route("/stats/popularity", get(rentals::popularity))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
