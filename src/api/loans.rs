//! Loan endpoints: borrower requests and administrator decisions

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{AuditReport, Loan},
    AppState,
};

use super::{AdminUser, AuthenticatedUser};

/// Plain confirmation for operations that delete the loan
#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub loan_id: i64,
    pub message: String,
}

/// Request a loan of a book for the calling user
#[utoipa::path(
    post,
    path = "/api/loan/request/{book_id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 201, description = "Loan requested, pending approval", body = Loan),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "User not found")
    )
)]
pub async fn request_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i64>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let loan = state.services.loans.create(book_id, &claims.username).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// All open loans of the calling user
#[utoipa::path(
    get,
    path = "/api/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Pending and approved loans", body = Vec<Loan>)
    )
)]
pub async fn my_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Loan>>> {
    Ok(Json(state.services.loans.get_all_for_user(&claims.username).await?))
}

/// Loan requests of the calling user still waiting for approval
#[utoipa::path(
    get,
    path = "/api/loans/pending",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Pending loans", body = Vec<Loan>)
    )
)]
pub async fn my_pending_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Loan>>> {
    Ok(Json(state.services.loans.get_pending_for_user(&claims.username).await?))
}

/// Approved loans of the calling user
#[utoipa::path(
    get,
    path = "/api/loans/active",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Approved loans", body = Vec<Loan>)
    )
)]
pub async fn my_active_loans(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Loan>>> {
    Ok(Json(state.services.loans.get_active_for_user(&claims.username).await?))
}

/// One loan of the calling user
#[utoipa::path(
    get,
    path = "/api/loan/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan", body = Loan),
        (status = 404, description = "No such loan for this user")
    )
)]
pub async fn my_loan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<Loan>> {
    Ok(Json(state.services.loans.get_for_user(&claims.username, loan_id).await?))
}

/// Every loan in the library
#[utoipa::path(
    get,
    path = "/api/admin/loans",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All loans ordered by id", body = Vec<Loan>),
        (status = 403, description = "Administrator rights required")
    )
)]
pub async fn list_loans(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<Loan>>> {
    Ok(Json(state.services.loans.get_all().await?))
}

/// Every loan waiting for approval
#[utoipa::path(
    get,
    path = "/api/admin/loans/pending",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Pending loans ordered by id", body = Vec<Loan>)
    )
)]
pub async fn list_pending_loans(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<Loan>>> {
    Ok(Json(state.services.loans.get_all_pending().await?))
}

/// Every approved loan
#[utoipa::path(
    get,
    path = "/api/admin/loans/active",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Approved loans ordered by id", body = Vec<Loan>)
    )
)]
pub async fn list_active_loans(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<Loan>>> {
    Ok(Json(state.services.loans.get_all_active().await?))
}

/// Get any loan by ID
#[utoipa::path(
    get,
    path = "/api/admin/loan/{id}",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan", body = Loan),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<Loan>> {
    Ok(Json(state.services.loans.get_by_id(loan_id).await?))
}

/// Approve a pending loan
#[utoipa::path(
    post,
    path = "/api/admin/loans/approve/{id}",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan approved", body = Loan),
        (status = 404, description = "Loan or book not found"),
        (status = 409, description = "Loan already approved"),
        (status = 422, description = "No copy of the book available")
    )
)]
pub async fn approve_loan(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<Loan>> {
    let loan = state.services.loans.approve(loan_id).await?;
    tracing::debug!(loan_id, admin = %admin.username, "approval recorded");
    Ok(Json(loan))
}

/// Decline a pending loan
#[utoipa::path(
    post,
    path = "/api/admin/loans/decline/{id}",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan declined and removed", body = MessageResponse),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan already approved, it must be returned instead")
    )
)]
pub async fn decline_loan(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    state.services.loans.decline(loan_id).await?;
    Ok(Json(MessageResponse {
        loan_id,
        message: "loan declined successfully".to_string(),
    }))
}

/// Confirm that the book of an approved loan came back
#[utoipa::path(
    post,
    path = "/api/admin/loans/returned/{id}",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Return confirmed and loan removed", body = MessageResponse),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan not approved yet")
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<MessageResponse>> {
    state.services.loans.return_loan(loan_id).await?;
    Ok(Json(MessageResponse {
        loan_id,
        message: "return confirmed successfully".to_string(),
    }))
}

/// Check loans, user indexes and book counters against each other
#[utoipa::path(
    get,
    path = "/api/admin/loans/audit",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Consistency report, nothing is repaired", body = AuditReport)
    )
)]
pub async fn audit_loans(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<AuditReport>> {
    Ok(Json(state.services.audit.run().await?))
}
