//! Wall domain - the wall aggregate root and its social links

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::{Decode, Encode, Executor, PgPool, Postgres, Type};

use crate::pagination::PageRequest;

/// Who can see a wall without being granted access
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "public" => Visibility::Public,
            _ => Visibility::Private,
        }
    }
}

// Stored as TEXT
impl Type<Postgres> for Visibility {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <String as Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for Visibility {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <String as Decode<Postgres>>::decode(value)?;
        Ok(Visibility::from_str(&s))
    }
}

impl Encode<'_, Postgres> for Visibility {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        <String as Encode<Postgres>>::encode_by_ref(&self.as_str().to_owned(), buf)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Wall {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub logo_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWall {
    pub owner_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Default)]
pub struct WallUpdate {
    pub title: Option<String>,
    /// `Some("")` clears the description
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SocialLink {
    pub id: i64,
    pub wall_id: i64,
    pub platform: String,
    pub url: String,
    pub position: i32,
}

#[derive(Debug, Clone)]
pub struct NewSocialLink {
    pub platform: String,
    pub url: String,
}

const WALL_COLUMNS: &str =
    "id, owner_id, title, description, visibility, logo_url, created_at, updated_at";

pub async fn insert_wall<'e, E>(executor: E, new: &NewWall) -> Result<Wall, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"
        INSERT INTO walls (owner_id, title, description, visibility)
        VALUES ($1, $2, $3, $4)
        RETURNING {WALL_COLUMNS}
        "#
    );
    sqlx::query_as(&query)
        .bind(new.owner_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.visibility)
        .fetch_one(executor)
        .await
}

pub async fn get_wall<'e, E>(executor: E, wall_id: i64) -> Result<Option<Wall>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT {WALL_COLUMNS} FROM walls WHERE id = $1");
    sqlx::query_as(&query)
        .bind(wall_id)
        .fetch_optional(executor)
        .await
}

pub async fn count_owned_walls<'e, E>(executor: E, owner_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM walls WHERE owner_id = $1")
        .bind(owner_id)
        .fetch_one(executor)
        .await?;
    Ok(count)
}

/// Walls a user owns or has been granted access to
const VISIBLE_WALLS_WHERE: &str = r#"
    owner_id = $1
    OR id IN (SELECT wall_id FROM wall_access WHERE user_id = $1)
"#;

pub async fn count_walls_for_user<'e, E>(executor: E, user_id: i64) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT COUNT(*) FROM walls WHERE {VISIBLE_WALLS_WHERE}");
    let (count,): (i64,) = sqlx::query_as(&query)
        .bind(user_id)
        .fetch_one(executor)
        .await?;
    Ok(count)
}

pub async fn list_walls_for_user<'e, E>(
    executor: E,
    user_id: i64,
    page: PageRequest,
) -> Result<Vec<Wall>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"SELECT {WALL_COLUMNS} FROM walls
           WHERE {VISIBLE_WALLS_WHERE}
           ORDER BY created_at DESC, id DESC
           LIMIT $2 OFFSET $3"#
    );
    sqlx::query_as(&query)
        .bind(user_id)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(executor)
        .await
}

pub async fn update_wall<'e, E>(
    executor: E,
    wall_id: i64,
    update: &WallUpdate,
) -> Result<Option<Wall>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!(
        r#"
        UPDATE walls SET
            title = COALESCE($2, title),
            description = CASE WHEN $3 = '' THEN NULL ELSE COALESCE($3, description) END,
            visibility = COALESCE($4, visibility),
            logo_url = COALESCE($5, logo_url),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {WALL_COLUMNS}
        "#
    );
    sqlx::query_as(&query)
        .bind(wall_id)
        .bind(&update.title)
        .bind(&update.description)
        .bind(update.visibility)
        .bind(&update.logo_url)
        .fetch_optional(executor)
        .await
}

/// Delete a wall; tweets, links, access rows and queue entries cascade
pub async fn delete_wall<'e, E>(executor: E, wall_id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM walls WHERE id = $1")
        .bind(wall_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_social_links<'e, E>(
    executor: E,
    wall_id: i64,
) -> Result<Vec<SocialLink>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT id, wall_id, platform, url, position
        FROM social_links
        WHERE wall_id = $1
        ORDER BY position, id
        "#,
    )
    .bind(wall_id)
    .fetch_all(executor)
    .await
}

/// Replace the wall's social links with `links`, positions following slice order
pub async fn replace_social_links(
    db: &PgPool,
    wall_id: i64,
    links: &[NewSocialLink],
) -> Result<Vec<SocialLink>, sqlx::Error> {
    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM social_links WHERE wall_id = $1")
        .bind(wall_id)
        .execute(&mut *tx)
        .await?;

    for (position, link) in links.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO social_links (wall_id, platform, url, position)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(wall_id)
        .bind(&link.platform)
        .bind(&link.url)
        .bind(position as i32)
        .execute(&mut *tx)
        .await?;
    }

    let saved = list_social_links(&mut *tx, wall_id).await?;
    tx.commit().await?;

    Ok(saved)
}
