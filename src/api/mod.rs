//! API handlers for the lending REST endpoints

pub mod health;
pub mod loans;
pub mod openapi;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    routing::{get, post},
    Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, models::user::UserClaims, AppState};

/// Extractor for the authenticated user from the bearer JWT
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Authentication("Missing bearer token".to_string()))?;

        let claims = UserClaims::from_token(bearer.token(), &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        if claims.username.is_empty() {
            return Err(AppError::Authentication("Token carries no username".to_string()));
        }

        Ok(AuthenticatedUser(claims))
    }
}

/// Authenticated user holding administrator rights
pub struct AdminUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(claims) = AuthenticatedUser::from_request_parts(parts, state).await?;
        claims.require_admin()?;
        Ok(AdminUser(claims))
    }
}

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Borrower endpoints
        .route("/api/loan/request/:book_id", post(loans::request_loan))
        .route("/api/loans", get(loans::my_loans))
        .route("/api/loans/pending", get(loans::my_pending_loans))
        .route("/api/loans/active", get(loans::my_active_loans))
        .route("/api/loan/:id", get(loans::my_loan))
        // Administrator endpoints
        .route("/api/admin/loans", get(loans::list_loans))
        .route("/api/admin/loans/pending", get(loans::list_pending_loans))
        .route("/api/admin/loans/active", get(loans::list_active_loans))
        .route("/api/admin/loans/audit", get(loans::audit_loans))
        .route("/api/admin/loan/:id", get(loans::get_loan))
        .route("/api/admin/loans/approve/:id", post(loans::approve_loan))
        .route("/api/admin/loans/decline/:id", post(loans::decline_loan))
        .route("/api/admin/loans/returned/:id", post(loans::return_loan))
        .with_state(state);

    Router::new()
        .merge(api)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
