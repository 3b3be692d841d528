//! HTTP handlers for billing-service.
//!
//! Every organization-scoped route checks the caller's membership role
//! before touching data: reads need `member`, writes need `admin`.

pub mod billing;
pub mod health;
pub mod invoices;
pub mod organizations;
pub mod payment_methods;
pub mod payments;
pub mod plans;
pub mod subscriptions;
pub mod usage;

use service_core::error::AppError;
use uuid::Uuid;

use crate::middleware::AuthUser;
use crate::models::MemberRole;
use crate::startup::AppState;

async fn authorize(
    state: &AppState,
    organization_id: Uuid,
    user: &AuthUser,
    minimum: MemberRole,
) -> Result<MemberRole, AppError> {
    state
        .organizations
        .require_role(organization_id, user.user_id, minimum)
        .await
}

/// Resources addressed through another organization's path look missing.
fn ensure_same_organization(
    owner: Uuid,
    organization_id: Uuid,
    resource: &'static str,
) -> Result<(), AppError> {
    if owner == organization_id {
        Ok(())
    } else {
        Err(AppError::NotFound(anyhow::anyhow!("{} not found", resource)))
    }
}
