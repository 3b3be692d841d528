//! Organization membership and invitation models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Member role. Ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Member,
    Admin,
    Owner,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Member => "member",
            MemberRole::Admin => "admin",
            MemberRole::Owner => "owner",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "owner" => MemberRole::Owner,
            "admin" => MemberRole::Admin,
            _ => MemberRole::Member,
        }
    }

    /// Roles that can be granted through an invitation or a role change.
    pub fn is_assignable(&self) -> bool {
        matches!(self, MemberRole::Member | MemberRole::Admin)
    }
}

/// Invitation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Expired,
    Cancelled,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Expired => "expired",
            InvitationStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "accepted" => InvitationStatus::Accepted,
            "expired" => InvitationStatus::Expired,
            "cancelled" => InvitationStatus::Cancelled,
            _ => InvitationStatus::Pending,
        }
    }
}

/// Organization member.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrganizationMember {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: String,
    pub invited_by: Option<Uuid>,
    pub invited_at: DateTime<Utc>,
    pub joined_at: Option<DateTime<Utc>>,
    pub status: String,
}

impl OrganizationMember {
    pub fn role(&self) -> MemberRole {
        MemberRole::from_string(&self.role)
    }
}

/// Pending or settled invitation. The token is never serialized back to API
/// callers; it travels only through the notifier.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrganizationInvitation {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub role: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub invited_by: Uuid,
    pub invited_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub status: String,
}

impl OrganizationInvitation {
    pub fn status(&self) -> InvitationStatus {
        InvitationStatus::from_string(&self.status)
    }
}

/// Input for inviting a member.
#[derive(Debug, Clone)]
pub struct InviteMember {
    pub email: String,
    pub role: MemberRole,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_ordered_by_privilege() {
        assert!(MemberRole::Owner > MemberRole::Admin);
        assert!(MemberRole::Admin > MemberRole::Member);
    }

    #[test]
    fn owner_is_not_assignable() {
        assert!(MemberRole::Member.is_assignable());
        assert!(MemberRole::Admin.is_assignable());
        assert!(!MemberRole::Owner.is_assignable());
    }

    #[test]
    fn role_round_trips_through_storage_string() {
        for role in [MemberRole::Member, MemberRole::Admin, MemberRole::Owner] {
            assert_eq!(MemberRole::from_string(role.as_str()), role);
        }
    }
}
