//! Organizations, memberships and invitations.

use crate::config::BillingSettings;
use crate::models::{
    CreateOrganization, InviteMember, MemberRole, Organization, OrganizationInvitation,
    OrganizationMember, UsageField,
};
use crate::services::database::{commit, lock_organization, organization_columns};
use crate::services::metrics::{record_membership_operation, DB_QUERY_DURATION};
use crate::services::notifier::{dispatch_invitation, InvitationNotice, Notifier};
use crate::services::usage::increment_in;
use crate::services::Database;
use chrono::{Duration, Utc};
use rand::RngCore;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

macro_rules! member_columns {
    () => {
        "id, organization_id, user_id, email, role, invited_by, invited_at, joined_at, status"
    };
}

macro_rules! invitation_columns {
    () => {
        "id, organization_id, email, role, token, invited_by, invited_at, expires_at, used_at, status"
    };
}

/// 32 random bytes, hex encoded.
fn generate_invitation_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Clone)]
pub struct Organizations {
    db: Database,
    notifier: Arc<dyn Notifier>,
    settings: BillingSettings,
}

impl Organizations {
    pub fn new(db: Database, notifier: Arc<dyn Notifier>, settings: BillingSettings) -> Self {
        Self {
            db,
            notifier,
            settings,
        }
    }

    // =========================================================================
    // Organizations
    // =========================================================================

    /// Create an organization with `actor` as its owner.
    #[instrument(skip(self, input), fields(slug = %input.slug, user_id = %actor))]
    pub async fn create_organization(
        &self,
        actor: Uuid,
        actor_email: Option<&str>,
        input: &CreateOrganization,
    ) -> Result<Organization, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_organization"])
            .start_timer();

        let mut tx = self.db.begin().await?;

        let organization = sqlx::query_as::<_, Organization>(concat!(
            r#"
            INSERT INTO organizations (id, name, slug, description, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING "#,
            organization_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.slug)
        .bind(&input.description)
        .bind(actor)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::BadRequest(anyhow::anyhow!("Organization slug already in use"))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create organization: {}", e)),
        })?;

        sqlx::query(
            r#"
            INSERT INTO organization_members (id, organization_id, user_id, email, role, joined_at, status)
            VALUES ($1, $2, $3, $4, 'owner', NOW(), 'joined')
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(organization.id)
        .bind(actor)
        .bind(actor_email.map(normalize_email))
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to add owner: {}", e)))?;

        increment_in(&mut tx, organization.id, UsageField::UsersCount, 1).await?;
        commit(tx).await?;

        timer.observe_duration();
        record_membership_operation("create_organization");
        info!(organization_id = %organization.id, "Organization created");

        Ok(organization)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn get_organization(&self, organization_id: Uuid) -> Result<Organization, AppError> {
        sqlx::query_as::<_, Organization>(concat!(
            "SELECT ",
            organization_columns!(),
            " FROM organizations WHERE id = $1"
        ))
        .bind(organization_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get organization: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Organization not found")))
    }

    /// Organizations the user belongs to.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Organization>, AppError> {
        sqlx::query_as::<_, Organization>(concat!(
            "SELECT ",
            organization_columns!(),
            r#" FROM organizations
            WHERE id IN (SELECT organization_id FROM organization_members WHERE user_id = $1 AND status = 'joined')
            ORDER BY created_at DESC"#
        ))
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list organizations: {}", e))
        })
    }

    // =========================================================================
    // Access control
    // =========================================================================

    pub async fn member_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<MemberRole>, AppError> {
        let role: Option<String> = sqlx::query_scalar(
            "SELECT role FROM organization_members WHERE organization_id = $1 AND user_id = $2 AND status = 'joined'",
        )
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get member role: {}", e)))?;

        Ok(role.as_deref().map(MemberRole::from_string))
    }

    /// Ensure `user_id` holds at least `minimum` in the organization.
    #[instrument(skip(self), fields(organization_id = %organization_id, user_id = %user_id))]
    pub async fn require_role(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        minimum: MemberRole,
    ) -> Result<MemberRole, AppError> {
        self.get_organization(organization_id).await?;

        match self.member_role(organization_id, user_id).await? {
            Some(role) if role >= minimum => Ok(role),
            Some(role) => {
                warn!(role = role.as_str(), required = minimum.as_str(), "Access denied: insufficient role");
                Err(AppError::Forbidden(anyhow::anyhow!(
                    "Insufficient permissions for this organization"
                )))
            }
            None => {
                warn!("Access denied: not a member");
                Err(AppError::Forbidden(anyhow::anyhow!(
                    "You are not a member of this organization"
                )))
            }
        }
    }

    // =========================================================================
    // Members
    // =========================================================================

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn list_members(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<OrganizationMember>, AppError> {
        sqlx::query_as::<_, OrganizationMember>(concat!(
            "SELECT ",
            member_columns!(),
            " FROM organization_members WHERE organization_id = $1 AND status = 'joined' ORDER BY joined_at ASC"
        ))
        .bind(organization_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list members: {}", e)))
    }

    /// Remove a member. Owners cannot be removed and nobody removes themselves.
    #[instrument(skip(self), fields(organization_id = %organization_id, user_id = %user_id))]
    pub async fn remove_member(
        &self,
        organization_id: Uuid,
        actor: Uuid,
        user_id: Uuid,
    ) -> Result<(), AppError> {
        self.require_role(organization_id, actor, MemberRole::Admin)
            .await?;

        if actor == user_id {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "You cannot remove yourself from the organization"
            )));
        }

        let mut tx = self.db.begin().await?;
        lock_organization(&mut tx, organization_id).await?;

        let member = sqlx::query_as::<_, OrganizationMember>(concat!(
            "SELECT ",
            member_columns!(),
            " FROM organization_members WHERE organization_id = $1 AND user_id = $2 FOR UPDATE"
        ))
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get member: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Member not found")))?;

        if member.role() == MemberRole::Owner {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "The organization owner cannot be removed"
            )));
        }

        sqlx::query("DELETE FROM organization_members WHERE id = $1")
            .bind(member.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to remove member: {}", e)))?;

        increment_in(&mut tx, organization_id, UsageField::UsersCount, -1).await?;
        commit(tx).await?;

        record_membership_operation("remove_member");
        info!(removed_by = %actor, "Member removed");

        Ok(())
    }

    /// Change another member's role to `member` or `admin`.
    #[instrument(skip(self), fields(organization_id = %organization_id, user_id = %user_id))]
    pub async fn update_member_role(
        &self,
        organization_id: Uuid,
        actor: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> Result<OrganizationMember, AppError> {
        self.require_role(organization_id, actor, MemberRole::Admin)
            .await?;

        if !role.is_assignable() {
            return Err(AppError::BadRequest(anyhow::anyhow!("Invalid role")));
        }
        if actor == user_id {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "You cannot change your own role"
            )));
        }

        let current = self
            .member_role(organization_id, user_id)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!(
                    "User is not a member of this organization"
                ))
            })?;
        if current == MemberRole::Owner {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "The organization owner's role cannot be changed"
            )));
        }

        let member = sqlx::query_as::<_, OrganizationMember>(concat!(
            "UPDATE organization_members SET role = $3 WHERE organization_id = $1 AND user_id = $2 AND role <> 'owner' RETURNING ",
            member_columns!()
        ))
        .bind(organization_id)
        .bind(user_id)
        .bind(role.as_str())
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update member role: {}", e)))?
        .ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "User is not a member of this organization"
            ))
        })?;

        record_membership_operation("update_role");
        info!(role = role.as_str(), changed_by = %actor, "Member role updated");

        Ok(member)
    }

    // =========================================================================
    // Invitations
    // =========================================================================

    /// Invite an address. The token only leaves the service via the notifier.
    #[instrument(skip(self, input), fields(organization_id = %organization_id, role = input.role.as_str()))]
    pub async fn invite_member(
        &self,
        organization_id: Uuid,
        actor: Uuid,
        input: &InviteMember,
    ) -> Result<OrganizationInvitation, AppError> {
        self.require_role(organization_id, actor, MemberRole::Admin)
            .await?;

        if !input.role.is_assignable() {
            return Err(AppError::BadRequest(anyhow::anyhow!("Invalid role")));
        }

        let organization = self.get_organization(organization_id).await?;
        let email = normalize_email(&input.email);

        let already_member: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM organization_members WHERE organization_id = $1 AND lower(email) = $2 AND status = 'joined')",
        )
        .bind(organization_id)
        .bind(&email)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to check membership: {}", e)))?;

        if already_member {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "User is already a member of this organization"
            )));
        }

        // An elapsed invitation must not block a fresh one for the same address.
        sqlx::query(
            "UPDATE organization_invitations SET status = 'expired' WHERE organization_id = $1 AND email = $2 AND status = 'pending' AND expires_at <= NOW()",
        )
        .bind(organization_id)
        .bind(&email)
        .execute(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to expire invitation: {}", e)))?;

        let expires_at = Utc::now() + Duration::days(self.settings.invitation_ttl_days);

        let invitation = sqlx::query_as::<_, OrganizationInvitation>(concat!(
            r#"
            INSERT INTO organization_invitations (id, organization_id, email, role, token, invited_by, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING "#,
            invitation_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(organization_id)
        .bind(&email)
        .bind(input.role.as_str())
        .bind(generate_invitation_token())
        .bind(actor)
        .bind(expires_at)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::BadRequest(anyhow::anyhow!(
                    "An invitation is already pending for this email"
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create invitation: {}", e)),
        })?;

        dispatch_invitation(
            self.notifier.clone(),
            InvitationNotice {
                invitation_id: invitation.id,
                organization_id,
                organization_name: organization.name,
                email: invitation.email.clone(),
                role: invitation.role.clone(),
                token: invitation.token.clone(),
                expires_at: invitation.expires_at,
            },
        );

        record_membership_operation("invite");
        info!(invitation_id = %invitation.id, "Invitation created");

        Ok(invitation)
    }

    /// Redeem a pending invitation. Tokens are single-use.
    #[instrument(skip(self, token), fields(user_id = %user_id))]
    pub async fn accept_invitation(
        &self,
        token: &str,
        user_id: Uuid,
    ) -> Result<OrganizationMember, AppError> {
        let mut tx = self.db.begin().await?;

        let invitation = sqlx::query_as::<_, OrganizationInvitation>(concat!(
            r#"
            UPDATE organization_invitations
            SET status = 'accepted', used_at = NOW()
            WHERE token = $1 AND status = 'pending' AND expires_at > NOW()
            RETURNING "#,
            invitation_columns!()
        ))
        .bind(token)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to accept invitation: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invitation not found or expired")))?;

        lock_organization(&mut tx, invitation.organization_id).await?;

        let member = sqlx::query_as::<_, OrganizationMember>(concat!(
            r#"
            INSERT INTO organization_members (id, organization_id, user_id, email, role, invited_by, invited_at, joined_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), 'joined')
            RETURNING "#,
            member_columns!()
        ))
        .bind(Uuid::new_v4())
        .bind(invitation.organization_id)
        .bind(user_id)
        .bind(&invitation.email)
        .bind(&invitation.role)
        .bind(invitation.invited_by)
        .bind(invitation.invited_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::BadRequest(anyhow::anyhow!(
                    "User is already a member of this organization"
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to add member: {}", e)),
        })?;

        increment_in(&mut tx, invitation.organization_id, UsageField::UsersCount, 1).await?;
        commit(tx).await?;

        record_membership_operation("accept_invitation");
        info!(
            organization_id = %invitation.organization_id,
            invitation_id = %invitation.id,
            "Invitation accepted"
        );

        Ok(member)
    }

    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn list_pending_invitations(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<OrganizationInvitation>, AppError> {
        sqlx::query_as::<_, OrganizationInvitation>(concat!(
            "SELECT ",
            invitation_columns!(),
            " FROM organization_invitations WHERE organization_id = $1 AND status = 'pending' AND expires_at > NOW() ORDER BY invited_at DESC"
        ))
        .bind(organization_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invitations: {}", e)))
    }

    #[instrument(skip(self), fields(organization_id = %organization_id, invitation_id = %invitation_id))]
    pub async fn cancel_invitation(
        &self,
        organization_id: Uuid,
        invitation_id: Uuid,
    ) -> Result<OrganizationInvitation, AppError> {
        let invitation = sqlx::query_as::<_, OrganizationInvitation>(concat!(
            "UPDATE organization_invitations SET status = 'cancelled' WHERE id = $1 AND organization_id = $2 AND status = 'pending' RETURNING ",
            invitation_columns!()
        ))
        .bind(invitation_id)
        .bind(organization_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to cancel invitation: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invitation not found")))?;

        record_membership_operation("cancel_invitation");
        info!("Invitation cancelled");

        Ok(invitation)
    }

    /// Mark every elapsed pending invitation as expired.
    #[instrument(skip(self))]
    pub async fn expire_invitations(&self) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE organization_invitations SET status = 'expired' WHERE status = 'pending' AND expires_at <= NOW()",
        )
        .execute(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to expire invitations: {}", e)))?;

        let expired = result.rows_affected();
        if expired > 0 {
            info!(expired = expired, "Expired pending invitations");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invitation_tokens_are_64_hex_chars_and_unique() {
        let a = generate_invitation_token();
        let b = generate_invitation_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Jane@Example.COM "), "jane@example.com");
    }
}
