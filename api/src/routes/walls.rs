//! Wall endpoints (/walls/*, /public/walls/*)

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::AuthUser;
use super::media::store_uploaded_image;
use super::tweets::TweetResponse;
use crate::AppState;
use crate::constants::MAX_WALL_TITLE_LENGTH;
use crate::domain::walls::{NewSocialLink, NewWall, SocialLink, Visibility, Wall, WallUpdate};
use crate::pagination::{Page, PageQuery, PageRequest};
use crate::services::access::{Permission, authorize_wall};
use crate::services::billing::effective_plan;
use crate::services::error::ApiError;
use crate::store::{TweetStore, WallStore};

const MAX_DESCRIPTION_LENGTH: usize = 1000;
const MAX_SOCIAL_LINKS: usize = 20;

#[derive(Debug, Serialize)]
pub struct WallResponse {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub logo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Wall> for WallResponse {
    fn from(w: Wall) -> Self {
        Self {
            id: w.id,
            owner_id: w.owner_id,
            title: w.title,
            description: w.description,
            visibility: w.visibility,
            logo_url: w.logo_url,
            created_at: w.created_at,
            updated_at: w.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SocialLinkDto {
    pub platform: String,
    pub url: String,
}

impl From<SocialLink> for SocialLinkDto {
    fn from(l: SocialLink) -> Self {
        Self {
            platform: l.platform,
            url: l.url,
        }
    }
}

#[derive(Debug, Serialize)]
struct WallDetailResponse {
    #[serde(flatten)]
    wall: WallResponse,
    social_links: Vec<SocialLinkDto>,
    /// The caller's role on this wall
    role: String,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/walls", get(list_walls).post(create_wall))
        .route("/walls/{id}", get(get_wall).patch(update_wall).delete(delete_wall))
        .route("/walls/{id}/social-links", put(replace_social_links))
        .route("/walls/{id}/logo", post(upload_logo))
        .route("/walls/{id}/share", get(share_wall))
        .route("/public/walls/{id}", get(public_wall))
}

fn check_title(title: &str) -> Result<String, ApiError> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > MAX_WALL_TITLE_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Title must be 1-{MAX_WALL_TITLE_LENGTH} characters"
        )));
    }
    Ok(title.to_string())
}

/// Blank descriptions clear the field
fn check_description(description: Option<String>) -> Result<Option<String>, ApiError> {
    match description.map(|d| d.trim().to_string()) {
        Some(d) if d.chars().count() > MAX_DESCRIPTION_LENGTH => Err(ApiError::bad_request(format!(
            "Description must be at most {MAX_DESCRIPTION_LENGTH} characters"
        ))),
        Some(d) if d.is_empty() => Ok(None),
        other => Ok(other),
    }
}

/// GET /walls - Walls the caller owns or has been granted access to
async fn list_walls(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<WallResponse>>, ApiError> {
    let page = state
        .store
        .list_walls_for_user(user_id, PageRequest::from(&query))
        .await?;
    Ok(Json(page.map(WallResponse::from)))
}

#[derive(Debug, Deserialize)]
struct CreateWallRequest {
    title: String,
    description: Option<String>,
    #[serde(default)]
    visibility: Visibility,
}

impl CreateWallRequest {
    fn validate(self, owner_id: i64) -> Result<NewWall, ApiError> {
        Ok(NewWall {
            owner_id,
            title: check_title(&self.title)?,
            description: check_description(self.description)?,
            visibility: self.visibility,
        })
    }
}

/// POST /walls - Create a wall, within the plan's wall limit
async fn create_wall(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<CreateWallRequest>,
) -> Result<(StatusCode, Json<WallResponse>), ApiError> {
    let new = req.validate(user_id)?;

    if let Some(plan) = effective_plan(state.store.as_ref(), user_id).await? {
        let owned = state.store.count_owned_walls(user_id).await?;
        if owned >= i64::from(plan.max_walls) {
            return Err(ApiError::forbidden("Wall limit reached for this plan"));
        }
    }

    let wall = state.store.create_wall(new).await?;
    tracing::info!(wall_id = wall.id, owner_id = user_id, "wall created");
    Ok((StatusCode::CREATED, Json(wall.into())))
}

/// GET /walls/{id}
async fn get_wall(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(wall_id): Path<i64>,
) -> Result<Json<WallDetailResponse>, ApiError> {
    let ctx = authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::ViewWall).await?;
    let social_links = state.store.social_links(wall_id).await?;

    Ok(Json(WallDetailResponse {
        wall: ctx.wall.into(),
        social_links: social_links.into_iter().map(SocialLinkDto::from).collect(),
        role: ctx.role,
    }))
}

#[derive(Debug, Deserialize)]
struct UpdateWallRequest {
    title: Option<String>,
    description: Option<String>,
    visibility: Option<Visibility>,
}

impl UpdateWallRequest {
    fn validate(self) -> Result<WallUpdate, ApiError> {
        let title = self.title.as_deref().map(check_title).transpose()?;
        // An explicit empty description clears it
        let description = match self.description {
            Some(d) => Some(check_description(Some(d))?.unwrap_or_default()),
            None => None,
        };
        Ok(WallUpdate {
            title,
            description,
            visibility: self.visibility,
            logo_url: None,
        })
    }
}

/// PATCH /walls/{id}
async fn update_wall(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(wall_id): Path<i64>,
    Json(req): Json<UpdateWallRequest>,
) -> Result<Json<WallResponse>, ApiError> {
    authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::EditWall).await?;
    let update = req.validate()?;

    let wall = state
        .store
        .update_wall(wall_id, update)
        .await?
        .ok_or_else(|| ApiError::not_found("Wall not found"))?;
    Ok(Json(wall.into()))
}

/// DELETE /walls/{id} - Cascades to tweets, links, access, invitations and queued handles
async fn delete_wall(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(wall_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::DeleteWall).await?;

    if !state.store.delete_wall(wall_id).await? {
        return Err(ApiError::not_found("Wall not found"));
    }
    tracing::info!(wall_id, user_id, "wall deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct SocialLinksRequest {
    links: Vec<SocialLinkDto>,
}

impl SocialLinksRequest {
    fn validate(self) -> Result<Vec<NewSocialLink>, ApiError> {
        if self.links.len() > MAX_SOCIAL_LINKS {
            return Err(ApiError::bad_request(format!(
                "At most {MAX_SOCIAL_LINKS} social links"
            )));
        }
        self.links
            .into_iter()
            .map(|link| {
                let platform = link.platform.trim().to_lowercase();
                let url = link.url.trim().to_string();
                if platform.is_empty() || platform.len() > 50 {
                    return Err(ApiError::bad_request("Invalid social link platform"));
                }
                if !(url.starts_with("https://") || url.starts_with("http://")) || url.len() > 2048 {
                    return Err(ApiError::bad_request("Invalid social link URL"));
                }
                Ok(NewSocialLink { platform, url })
            })
            .collect()
    }
}

/// PUT /walls/{id}/social-links - Replace the ordered list
async fn replace_social_links(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(wall_id): Path<i64>,
    Json(req): Json<SocialLinksRequest>,
) -> Result<Json<Vec<SocialLinkDto>>, ApiError> {
    authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::EditWall).await?;
    let links = req.validate()?;

    let saved = state.store.replace_social_links(wall_id, links).await?;
    Ok(Json(saved.into_iter().map(SocialLinkDto::from).collect()))
}

/// POST /walls/{id}/logo - multipart `file`
async fn upload_logo(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(wall_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<WallResponse>, ApiError> {
    authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::EditWall).await?;
    let url = store_uploaded_image(&state, &mut multipart, "logos", "wall", wall_id).await?;

    let wall = state
        .store
        .update_wall(
            wall_id,
            WallUpdate {
                logo_url: Some(url),
                ..Default::default()
            },
        )
        .await?
        .ok_or_else(|| ApiError::not_found("Wall not found"))?;
    Ok(Json(wall.into()))
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct ShareResponse {
    share_url: String,
    embed_url: String,
    embed_code: String,
    is_public: bool,
}

fn share_links(frontend_url: &str, wall: &Wall) -> ShareResponse {
    let base = frontend_url.trim_end_matches('/');
    let share_url = format!("{base}/walls/{}", wall.id);
    let embed_url = format!("{base}/embed/walls/{}", wall.id);
    let embed_code = format!(
        r#"<iframe src="{embed_url}" width="100%" height="600" style="border:0" loading="lazy" title="{}"></iframe>"#,
        html_escape(&wall.title)
    );
    ShareResponse {
        share_url,
        embed_url,
        embed_code,
        is_public: wall.visibility == Visibility::Public,
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// GET /walls/{id}/share - Share URL and embed snippet
async fn share_wall(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(wall_id): Path<i64>,
) -> Result<Json<ShareResponse>, ApiError> {
    let ctx = authorize_wall(state.store.as_ref(), user_id, wall_id, Permission::ViewWall).await?;
    Ok(Json(share_links(&state.config.frontend_url, &ctx.wall)))
}

#[derive(Debug, Serialize)]
struct PublicWallResponse {
    #[serde(flatten)]
    wall: WallResponse,
    social_links: Vec<SocialLinkDto>,
    tweets: Vec<TweetResponse>,
}

/// GET /public/walls/{id} - Public walls only, tweets in display order
async fn public_wall(
    State(state): State<Arc<AppState>>,
    Path(wall_id): Path<i64>,
) -> Result<Json<PublicWallResponse>, ApiError> {
    let wall = state
        .store
        .wall_by_id(wall_id)
        .await?
        .filter(|w| w.visibility == Visibility::Public)
        .ok_or_else(|| ApiError::not_found("Wall not found"))?;

    let social_links = state.store.social_links(wall_id).await?;
    let tweets = state.store.ordered_wall_tweets(wall_id).await?;

    Ok(Json(PublicWallResponse {
        wall: wall.into(),
        social_links: social_links.into_iter().map(SocialLinkDto::from).collect(),
        tweets: tweets.into_iter().map(TweetResponse::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall(title: &str, visibility: Visibility) -> Wall {
        Wall {
            id: 9,
            owner_id: 1,
            title: title.into(),
            description: None,
            visibility,
            logo_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_title_validation() {
        assert_eq!(check_title("  Kind words ").unwrap(), "Kind words");
        assert!(check_title("   ").is_err());
        assert!(check_title(&"x".repeat(MAX_WALL_TITLE_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_update_clears_blank_description() {
        let update = UpdateWallRequest {
            title: None,
            description: Some("   ".into()),
            visibility: Some(Visibility::Public),
        }
        .validate()
        .unwrap();
        assert_eq!(update.description.as_deref(), Some(""));
        assert_eq!(update.visibility, Some(Visibility::Public));
    }

    #[test]
    fn test_social_link_validation() {
        let ok = SocialLinksRequest {
            links: vec![SocialLinkDto {
                platform: " GitHub ".into(),
                url: "https://github.com/acme".into(),
            }],
        }
        .validate()
        .unwrap();
        assert_eq!(ok[0].platform, "github");

        let bad = SocialLinksRequest {
            links: vec![SocialLinkDto {
                platform: "site".into(),
                url: "javascript:alert(1)".into(),
            }],
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_share_links_escape_title() {
        let share = share_links("https://love.example.com/", &wall("A \"great\" <wall>", Visibility::Private));
        assert_eq!(share.share_url, "https://love.example.com/walls/9");
        assert_eq!(share.embed_url, "https://love.example.com/embed/walls/9");
        assert!(share.embed_code.contains("title=\"A &quot;great&quot; &lt;wall&gt;\""));
        assert!(!share.is_public);
    }
}
