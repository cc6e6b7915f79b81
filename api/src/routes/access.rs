//! Wall collaborators and invitations (/walls/{id}/access/*, /walls/{id}/invitations/*,
//! /invitations/accept, /roles)

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::{AuthUser, normalize_email};
use crate::AppState;
use crate::constants::INVITATION_EXPIRY_DAYS;
use crate::domain::access::{Invitation, NewInvitation, WallMember};
use crate::domain::users::Role;
use crate::services::access::{ASSIGNABLE_ROLES, Permission, authorize_wall};
use crate::services::error::ApiError;
use crate::services::mailer::{self, Mailer};
use crate::services::session;
use crate::store::{AccessStore, StoreError, UserStore};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/walls/{id}/access", get(list_members))
        .route("/walls/{id}/access/{user_id}", delete(revoke_member))
        .route("/walls/{id}/invitations", get(list_invitations).post(invite))
        .route("/walls/{id}/invitations/{invitation_id}", delete(cancel_invitation))
        .route("/invitations/accept", post(accept_invitation))
        .route("/roles", get(list_roles))
}

#[derive(Debug, Serialize)]
struct MemberResponse {
    user_id: i64,
    email: String,
    name: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl From<WallMember> for MemberResponse {
    fn from(m: WallMember) -> Self {
        Self {
            user_id: m.user_id,
            email: m.email,
            name: m.name,
            role: m.role,
            created_at: m.created_at,
        }
    }
}

/// Invitations never expose their token
#[derive(Debug, Serialize)]
struct InvitationResponse {
    id: i64,
    wall_id: i64,
    email: String,
    role: String,
    invited_by: i64,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<Invitation> for InvitationResponse {
    fn from(i: Invitation) -> Self {
        Self {
            id: i.id,
            wall_id: i.wall_id,
            email: i.email,
            role: i.role,
            invited_by: i.invited_by,
            expires_at: i.expires_at,
            created_at: i.created_at,
        }
    }
}

/// GET /walls/{id}/access
async fn list_members(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(wall_id): Path<i64>,
) -> Result<Json<Vec<MemberResponse>>, ApiError> {
    authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::ViewWall).await?;
    let members = state.store.wall_members(wall_id).await?;
    Ok(Json(members.into_iter().map(MemberResponse::from).collect()))
}

/// DELETE /walls/{id}/access/{user_id}
async fn revoke_member(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path((wall_id, member_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::ManageAccess).await?;

    if !state.store.revoke_access(wall_id, member_id).await? {
        return Err(ApiError::not_found("Member not found"));
    }
    tracing::info!(wall_id, member_id, by = user_id, "access revoked");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /walls/{id}/invitations - Pending (unaccepted, unexpired) invitations
async fn list_invitations(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(wall_id): Path<i64>,
) -> Result<Json<Vec<InvitationResponse>>, ApiError> {
    authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::ManageAccess).await?;
    let invitations = state.store.pending_invitations(wall_id).await?;
    Ok(Json(invitations.into_iter().map(InvitationResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
struct InviteRequest {
    email: String,
    role: String,
}

impl InviteRequest {
    fn validate(&self) -> Result<(String, String), ApiError> {
        let email = normalize_email(&self.email).ok_or_else(|| ApiError::bad_request("Invalid email"))?;
        let role = self.role.trim().to_lowercase();
        if !ASSIGNABLE_ROLES.contains(&role.as_str()) {
            return Err(ApiError::bad_request(format!(
                "Role must be one of: {}",
                ASSIGNABLE_ROLES.join(", ")
            )));
        }
        Ok((email, role))
    }
}

/// POST /walls/{id}/invitations - Invite by email; the mail carries the accept link
async fn invite(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(wall_id): Path<i64>,
    Json(req): Json<InviteRequest>,
) -> Result<(StatusCode, Json<InvitationResponse>), ApiError> {
    let ctx = authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::ManageAccess).await?;
    let (email, role) = req.validate()?;

    let inviter = state
        .store
        .user_by_id(user_id)
        .await?
        .ok_or_else(ApiError::unauthorized)?;
    if inviter.email == email {
        return Err(ApiError::bad_request("You cannot invite yourself"));
    }
    if let Some(existing) = state.store.user_by_email(&email).await? {
        if existing.id == ctx.wall.owner_id
            || state.store.access_role(wall_id, existing.id).await?.is_some()
        {
            return Err(ApiError::Conflict("User already has access".into()));
        }
    }

    let token = session::generate_token();
    let invitation = state
        .store
        .create_invitation(NewInvitation {
            wall_id,
            email: email.clone(),
            role: role.clone(),
            token: token.clone(),
            invited_by: user_id,
            expires_at: Utc::now() + Duration::days(INVITATION_EXPIRY_DAYS),
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => ApiError::Conflict("Invitation already pending".into()),
            e => e.into(),
        })?;

    let mail = mailer::invitation_email(
        &email,
        &state.config.frontend_url,
        &inviter.name,
        &ctx.wall.title,
        &role,
        &token,
    );
    if let Err(e) = state.mailer.send(mail).await {
        tracing::error!(invitation_id = invitation.id, error = %e, "failed to send invitation mail");
    }
    tracing::info!(wall_id, invitation_id = invitation.id, role = %role, "invitation created");

    Ok((StatusCode::CREATED, Json(invitation.into())))
}

/// DELETE /walls/{id}/invitations/{invitation_id}
async fn cancel_invitation(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path((wall_id, invitation_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::ManageAccess).await?;

    if !state.store.delete_invitation(wall_id, invitation_id).await? {
        return Err(ApiError::not_found("Invitation not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct AcceptRequest {
    token: String,
}

#[derive(Debug, Serialize)]
struct AcceptResponse {
    wall_id: i64,
    role: String,
}

/// Why an invitation can't be accepted by this user right now
fn check_acceptable(invitation: &Invitation, user_email: &str, now: DateTime<Utc>) -> Result<(), ApiError> {
    if invitation.accepted_at.is_some() {
        return Err(ApiError::bad_request("Invitation already accepted"));
    }
    if invitation.expires_at <= now {
        return Err(ApiError::bad_request("Invitation expired"));
    }
    if !invitation.email.eq_ignore_ascii_case(user_email) {
        return Err(ApiError::forbidden("Invitation was sent to a different email"));
    }
    Ok(())
}

/// POST /invitations/accept - Grant the invited role to the caller
async fn accept_invitation(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<AcceptRequest>,
) -> Result<Json<AcceptResponse>, ApiError> {
    let user = state
        .store
        .user_by_id(user_id)
        .await?
        .ok_or_else(ApiError::unauthorized)?;
    let invitation = state
        .store
        .invitation_by_token(req.token.trim())
        .await?
        .ok_or_else(|| ApiError::not_found("Invitation not found"))?;

    check_acceptable(&invitation, &user.email, Utc::now())?;

    // Only the first accept flips accepted_at
    if !state.store.accept_invitation(invitation.id).await? {
        return Err(ApiError::bad_request("Invitation already accepted"));
    }
    state
        .store
        .grant_access(invitation.wall_id, user_id, &invitation.role)
        .await?;
    tracing::info!(wall_id = invitation.wall_id, user_id, role = %invitation.role, "invitation accepted");

    Ok(Json(AcceptResponse {
        wall_id: invitation.wall_id,
        role: invitation.role,
    }))
}

/// GET /roles - Role catalog
async fn list_roles(
    State(state): State<Arc<AppState>>,
    AuthUser(_): AuthUser,
) -> Result<Json<Vec<Role>>, ApiError> {
    Ok(Json(state.store.list_roles().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invitation(email: &str, accepted: bool, expires_in: Duration) -> Invitation {
        let now = Utc::now();
        Invitation {
            id: 1,
            wall_id: 2,
            email: email.into(),
            role: "editor".into(),
            token: "t".into(),
            invited_by: 3,
            accepted_at: accepted.then_some(now),
            expires_at: now + expires_in,
            created_at: now,
        }
    }

    #[test]
    fn test_invite_validation() {
        let req = InviteRequest {
            email: "Friend@Example.com".into(),
            role: "Editor".into(),
        };
        assert_eq!(req.validate().unwrap(), ("friend@example.com".into(), "editor".into()));

        let owner = InviteRequest {
            email: "friend@example.com".into(),
            role: "owner".into(),
        };
        assert!(owner.validate().is_err());
    }

    #[test]
    fn test_check_acceptable() {
        let now = Utc::now();
        assert!(check_acceptable(&invitation("a@x.com", false, Duration::days(1)), "A@x.com", now).is_ok());
        assert!(matches!(
            check_acceptable(&invitation("a@x.com", true, Duration::days(1)), "a@x.com", now),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            check_acceptable(&invitation("a@x.com", false, Duration::days(-1)), "a@x.com", now),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            check_acceptable(&invitation("a@x.com", false, Duration::days(1)), "b@x.com", now),
            Err(ApiError::Forbidden(_))
        ));
    }
}
