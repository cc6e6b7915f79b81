//! Wall-level authorization
//!
//! The owner of a wall and global admins may do anything with it. Everyone
//! else needs a `wall_access` row whose role grants the requested permission.

use crate::domain::walls::Wall;
use crate::services::error::ApiError;
use crate::store::{AccessStore, Store, UserStore, WallStore};

pub const ADMIN_ROLE: &str = "admin";
pub const OWNER_ROLE: &str = "owner";

/// Roles that can be handed out per wall
pub const ASSIGNABLE_ROLES: &[&str] = &["editor", "viewer"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ViewWall,
    EditWall,
    DeleteWall,
    ManageTweets,
    ManageAccess,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewWall => "wall:view",
            Permission::EditWall => "wall:edit",
            Permission::DeleteWall => "wall:delete",
            Permission::ManageTweets => "tweet:manage",
            Permission::ManageAccess => "access:manage",
        }
    }
}

/// A wall the caller is allowed to act on, and the role that allowed it
#[derive(Debug, Clone)]
pub struct WallContext {
    pub wall: Wall,
    pub role: String,
}

pub async fn authorize_wall(
    store: &dyn Store,
    user_id: i64,
    wall_id: i64,
    needed: Permission,
) -> Result<WallContext, ApiError> {
    let wall = store
        .wall_by_id(wall_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Wall not found"))?;

    if wall.owner_id == user_id {
        return Ok(WallContext {
            wall,
            role: OWNER_ROLE.to_string(),
        });
    }

    let user = store
        .user_by_id(user_id)
        .await?
        .ok_or_else(ApiError::unauthorized)?;
    if user.role == ADMIN_ROLE {
        return Ok(WallContext {
            wall,
            role: ADMIN_ROLE.to_string(),
        });
    }

    // Walls the caller has no access to look the same as missing ones
    let role = store
        .access_role(wall_id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Wall not found"))?;

    let granted = store
        .role(&role)
        .await?
        .is_some_and(|r| r.permissions.iter().any(|p| p == needed.as_str()));
    if !granted {
        return Err(ApiError::forbidden("Insufficient permissions"));
    }

    Ok(WallContext { wall, role })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::users::NewUser;
    use crate::domain::walls::{NewWall, Visibility};
    use crate::store::MemoryStore;

    async fn user(store: &MemoryStore, email: &str) -> i64 {
        store
            .create_user(NewUser {
                email: email.into(),
                name: email.into(),
                password_hash: None,
                google_id: None,
                email_verified: true,
            })
            .await
            .unwrap()
            .id
    }

    async fn setup() -> (MemoryStore, i64, i64) {
        let store = MemoryStore::new();
        let owner = user(&store, "owner@example.com").await;
        let wall = store
            .create_wall(NewWall {
                owner_id: owner,
                title: "Fans".into(),
                description: None,
                visibility: Visibility::Private,
            })
            .await
            .unwrap();
        (store, owner, wall.id)
    }

    #[tokio::test]
    async fn test_owner_has_everything() {
        let (store, owner, wall) = setup().await;
        let ctx = authorize_wall(&store, owner, wall, Permission::DeleteWall)
            .await
            .unwrap();
        assert_eq!(ctx.role, OWNER_ROLE);
    }

    #[tokio::test]
    async fn test_member_permissions_follow_role() {
        let (store, _, wall) = setup().await;
        let viewer = user(&store, "viewer@example.com").await;
        store.grant_access(wall, viewer, "viewer").await.unwrap();

        assert!(authorize_wall(&store, viewer, wall, Permission::ViewWall).await.is_ok());
        let err = authorize_wall(&store, viewer, wall, Permission::ManageTweets)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        store.grant_access(wall, viewer, "editor").await.unwrap();
        assert!(authorize_wall(&store, viewer, wall, Permission::ManageTweets).await.is_ok());
    }

    #[tokio::test]
    async fn test_stranger_sees_not_found() {
        let (store, _, wall) = setup().await;
        let stranger = user(&store, "stranger@example.com").await;
        let err = authorize_wall(&store, stranger, wall, Permission::ViewWall)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_admin_bypasses() {
        let (store, _, wall) = setup().await;
        let admin = user(&store, "admin@example.com").await;
        store.set_user_role(admin, ADMIN_ROLE);
        let ctx = authorize_wall(&store, admin, wall, Permission::ManageAccess)
            .await
            .unwrap();
        assert_eq!(ctx.role, ADMIN_ROLE);
    }
}
