//! Organization membership and invitation integration tests.

mod common;

use billing_service::models::{InviteMember, MemberRole, UsageField};
use common::TestApp;
use service_core::error::AppError;
use uuid::Uuid;

fn invite(email: &str, role: MemberRole) -> InviteMember {
    InviteMember {
        email: email.to_string(),
        role,
    }
}

#[tokio::test]
async fn creator_becomes_owner_and_counts_as_user() {
    let app = TestApp::spawn().await;
    let (org, owner) = app.organization().await;

    let role = app.state.organizations.member_role(org.id, owner).await.unwrap();
    assert_eq!(role, Some(MemberRole::Owner));

    let usage = app.state.usage.get_current_usage(org.id).await.unwrap().unwrap();
    assert_eq!(usage.get(UsageField::UsersCount), 1);

    let mine = app.state.organizations.list_for_user(owner).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, org.id);

    app.cleanup().await;
}

#[tokio::test]
async fn invitation_is_single_use() {
    let app = TestApp::spawn().await;
    let (org, owner) = app.organization().await;

    let invitation = app
        .state
        .organizations
        .invite_member(org.id, owner, &invite("New.Person@Example.com", MemberRole::Admin))
        .await
        .unwrap();
    assert_eq!(invitation.email, "new.person@example.com");
    assert_eq!(invitation.token.len(), 64);

    let user = Uuid::new_v4();
    let member = app
        .state
        .organizations
        .accept_invitation(&invitation.token, user)
        .await
        .unwrap();
    assert_eq!(member.role(), MemberRole::Admin);
    assert_eq!(member.organization_id, org.id);

    let again = app
        .state
        .organizations
        .accept_invitation(&invitation.token, Uuid::new_v4())
        .await;
    assert!(matches!(again, Err(AppError::NotFound(_))));

    let members = app.state.organizations.list_members(org.id).await.unwrap();
    assert_eq!(members.len(), 2);
    let joined = members.iter().find(|m| m.user_id == user).unwrap();
    assert_eq!(joined.role(), MemberRole::Admin);
    assert!(joined.joined_at.is_some());
    let usage = app.state.usage.get_current_usage(org.id).await.unwrap().unwrap();
    assert_eq!(usage.users_count, 2);

    app.cleanup().await;
}

#[tokio::test]
async fn duplicate_pending_invitation_is_rejected() {
    let app = TestApp::spawn().await;
    let (org, owner) = app.organization().await;

    app.state
        .organizations
        .invite_member(org.id, owner, &invite("dup@example.com", MemberRole::Member))
        .await
        .unwrap();
    let second = app
        .state
        .organizations
        .invite_member(org.id, owner, &invite("dup@example.com", MemberRole::Admin))
        .await;
    assert!(matches!(second, Err(AppError::BadRequest(_))));

    let owner_role = app
        .state
        .organizations
        .invite_member(org.id, owner, &invite("boss@example.com", MemberRole::Owner))
        .await;
    assert!(matches!(owner_role, Err(AppError::BadRequest(_))));

    app.cleanup().await;
}

#[tokio::test]
async fn cancelled_invitation_cannot_be_accepted() {
    let app = TestApp::spawn().await;
    let (org, owner) = app.organization().await;

    let invitation = app
        .state
        .organizations
        .invite_member(org.id, owner, &invite("late@example.com", MemberRole::Member))
        .await
        .unwrap();
    app.state
        .organizations
        .cancel_invitation(org.id, invitation.id)
        .await
        .unwrap();

    assert!(app
        .state
        .organizations
        .list_pending_invitations(org.id)
        .await
        .unwrap()
        .is_empty());
    let accepted = app
        .state
        .organizations
        .accept_invitation(&invitation.token, Uuid::new_v4())
        .await;
    assert!(matches!(accepted, Err(AppError::NotFound(_))));

    app.cleanup().await;
}

#[tokio::test]
async fn expired_invitation_is_swept_and_refused() {
    let app = TestApp::spawn().await;
    let (org, owner) = app.organization().await;

    let invitation = app
        .state
        .organizations
        .invite_member(org.id, owner, &invite("old@example.com", MemberRole::Member))
        .await
        .unwrap();
    sqlx::query("UPDATE organization_invitations SET expires_at = NOW() - INTERVAL '1 day' WHERE id = $1")
        .bind(invitation.id)
        .execute(app.state.db.pool())
        .await
        .unwrap();

    let accepted = app
        .state
        .organizations
        .accept_invitation(&invitation.token, Uuid::new_v4())
        .await;
    assert!(matches!(accepted, Err(AppError::NotFound(_))));

    assert_eq!(app.state.organizations.expire_invitations().await.unwrap(), 1);

    // The address can be invited again once the old invitation has lapsed.
    app.state
        .organizations
        .invite_member(org.id, owner, &invite("old@example.com", MemberRole::Member))
        .await
        .unwrap();

    app.cleanup().await;
}

#[tokio::test]
async fn role_rules_protect_owner_and_self() {
    let app = TestApp::spawn().await;
    let (org, owner) = app.organization().await;

    let invitation = app
        .state
        .organizations
        .invite_member(org.id, owner, &invite("admin@example.com", MemberRole::Admin))
        .await
        .unwrap();
    let admin = Uuid::new_v4();
    app.state
        .organizations
        .accept_invitation(&invitation.token, admin)
        .await
        .unwrap();

    let remove_owner = app.state.organizations.remove_member(org.id, admin, owner).await;
    assert!(matches!(remove_owner, Err(AppError::BadRequest(_))));

    let demote_self = app
        .state
        .organizations
        .update_member_role(org.id, admin, admin, MemberRole::Member)
        .await;
    assert!(matches!(demote_self, Err(AppError::BadRequest(_))));

    let demoted = app
        .state
        .organizations
        .update_member_role(org.id, owner, admin, MemberRole::Member)
        .await
        .unwrap();
    assert_eq!(demoted.role(), MemberRole::Member);

    // A plain member may not manage others.
    let forbidden = app.state.organizations.remove_member(org.id, admin, owner).await;
    assert!(matches!(forbidden, Err(AppError::Forbidden(_))));

    app.state
        .organizations
        .remove_member(org.id, owner, admin)
        .await
        .unwrap();
    assert_eq!(app.state.organizations.member_role(org.id, admin).await.unwrap(), None);
    let usage = app.state.usage.get_current_usage(org.id).await.unwrap().unwrap();
    assert_eq!(usage.users_count, 1);

    app.cleanup().await;
}

#[tokio::test]
async fn outsiders_are_forbidden_and_unknown_orgs_not_found() {
    let app = TestApp::spawn().await;
    let (org, _) = app.organization().await;

    let outsider = app
        .state
        .organizations
        .require_role(org.id, Uuid::new_v4(), MemberRole::Member)
        .await;
    assert!(matches!(outsider, Err(AppError::Forbidden(_))));

    let missing = app
        .state
        .organizations
        .require_role(Uuid::new_v4(), Uuid::new_v4(), MemberRole::Member)
        .await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    app.cleanup().await;
}
