//! Organizations, members and invitations.

use axum::extract::{Path, State};
use service_core::error::AppError;
use service_core::extract::ValidatedJson;
use service_core::response::{ApiListResponse, ApiResponse};
use uuid::Uuid;

use super::authorize;
use crate::dtos::{
    AcceptInvitationRequest, CreateOrganizationRequest, InviteMemberRequest,
    UpdateMemberRoleRequest,
};
use crate::middleware::AuthUser;
use crate::models::{MemberRole, Organization, OrganizationInvitation, OrganizationMember};
use crate::startup::AppState;

/// POST /organizations
#[tracing::instrument(skip(state, user, req), fields(user_id = %user.user_id))]
pub async fn create_organization(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateOrganizationRequest>,
) -> Result<ApiResponse<Organization>, AppError> {
    let organization = state
        .organizations
        .create_organization(user.user_id, user.email.as_deref(), &req.into())
        .await?;
    Ok(ApiResponse::created(organization))
}

/// GET /organizations
pub async fn list_my_organizations(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<ApiListResponse<Organization>, AppError> {
    Ok(ApiListResponse::unpaged(
        state.organizations.list_for_user(user.user_id).await?,
    ))
}

/// GET /organizations/:organization_id
pub async fn get_organization(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
) -> Result<ApiResponse<Organization>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    Ok(ApiResponse::success(
        state.organizations.get_organization(organization_id).await?,
    ))
}

/// GET /organizations/:organization_id/members
pub async fn list_members(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
) -> Result<ApiListResponse<OrganizationMember>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Member).await?;
    Ok(ApiListResponse::unpaged(
        state.organizations.list_members(organization_id).await?,
    ))
}

/// DELETE /organizations/:organization_id/members/:user_id
pub async fn remove_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, member_user_id)): Path<(Uuid, Uuid)>,
) -> Result<ApiResponse<()>, AppError> {
    state
        .organizations
        .remove_member(organization_id, user.user_id, member_user_id)
        .await?;
    Ok(ApiResponse::message("Member removed"))
}

/// PUT /organizations/:organization_id/members/:user_id/role
pub async fn update_member_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, member_user_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(req): ValidatedJson<UpdateMemberRoleRequest>,
) -> Result<ApiResponse<OrganizationMember>, AppError> {
    let member = state
        .organizations
        .update_member_role(organization_id, user.user_id, member_user_id, req.role)
        .await?;
    Ok(ApiResponse::success(member))
}

/// POST /organizations/:organization_id/invitations
#[tracing::instrument(skip(state, user, req), fields(organization_id = %organization_id))]
pub async fn invite_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<InviteMemberRequest>,
) -> Result<ApiResponse<OrganizationInvitation>, AppError> {
    let invitation = state
        .organizations
        .invite_member(organization_id, user.user_id, &req.into())
        .await?;
    Ok(ApiResponse::created(invitation))
}

/// GET /organizations/:organization_id/invitations
pub async fn list_invitations(
    State(state): State<AppState>,
    user: AuthUser,
    Path(organization_id): Path<Uuid>,
) -> Result<ApiListResponse<OrganizationInvitation>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    Ok(ApiListResponse::unpaged(
        state
            .organizations
            .list_pending_invitations(organization_id)
            .await?,
    ))
}

/// DELETE /organizations/:organization_id/invitations/:invitation_id
pub async fn cancel_invitation(
    State(state): State<AppState>,
    user: AuthUser,
    Path((organization_id, invitation_id)): Path<(Uuid, Uuid)>,
) -> Result<ApiResponse<OrganizationInvitation>, AppError> {
    authorize(&state, organization_id, &user, MemberRole::Admin).await?;
    let invitation = state
        .organizations
        .cancel_invitation(organization_id, invitation_id)
        .await?;
    Ok(ApiResponse::with_message("Invitation cancelled", invitation))
}

/// POST /invitations/accept
#[tracing::instrument(skip(state, user, req), fields(user_id = %user.user_id))]
pub async fn accept_invitation(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<AcceptInvitationRequest>,
) -> Result<ApiResponse<OrganizationMember>, AppError> {
    let member = state
        .organizations
        .accept_invitation(&req.token, user.user_id)
        .await?;
    Ok(ApiResponse::with_message("Invitation accepted", member))
}
