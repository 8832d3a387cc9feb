//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{health, loans};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lending Server API",
        version = "0.1.0",
        description = "Book lending: loan requests, approvals and returns",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Borrowers
        loans::request_loan,
        loans::my_loans,
        loans::my_pending_loans,
        loans::my_active_loans,
        loans::my_loan,
        // Administrators
        loans::list_loans,
        loans::list_pending_loans,
        loans::list_active_loans,
        loans::get_loan,
        loans::approve_loan,
        loans::decline_loan,
        loans::return_loan,
        loans::audit_loans,
    ),
    components(
        schemas(
            crate::models::loan::Loan,
            crate::models::audit::AuditReport,
            crate::models::audit::IndexEntry,
            crate::models::audit::CounterMismatch,
            loans::MessageResponse,
            health::HealthResponse,
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "loans", description = "Loans of the authenticated user"),
        (name = "admin", description = "Loan administration")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
