use axum::extract::{Path, Query, State};
use axum::Extension;
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use bytes::Bytes;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::api::common::utils::timeout_query;
use crate::api::common::{ApiResponse, Page};
use crate::api::v1::user::CurrentUser;
use crate::errors::AppError;
use crate::media::{stage_and_upload, TempMedia};
use crate::InnerState;

const LIST_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(10000);

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub owner_id: String,
    pub video_url: String,
    pub video_public_id: String,
    pub thumbnail_url: String,
    pub thumbnail_public_id: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Compact owner projection joined into video reads.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSummary {
    pub username: String,
    pub full_name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, FromRow)]
pub struct VideoWithOwnerRow {
    #[sqlx(flatten)]
    pub video: Video,
    pub owner_username: String,
    pub owner_full_name: String,
    pub owner_avatar: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoView {
    #[serde(flatten)]
    pub video: Video,
    pub owner: OwnerSummary,
}

impl From<VideoWithOwnerRow> for VideoView {
    fn from(row: VideoWithOwnerRow) -> Self {
        Self {
            owner: OwnerSummary {
                username: row.owner_username,
                full_name: row.owner_full_name,
                avatar: row.owner_avatar,
            },
            video: row.video,
        }
    }
}

/// Listing parameters accepted by `GET /videos`.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VideoListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub query: Option<String>,
    pub sort_by: Option<String>,
    pub sort_type: Option<String>,
    pub user_id: Option<String>,
}

/// Assembles the listing query as an ordered sequence of stages. The stage
/// order is a contract: search, owner filter, publish filter, sort, owner
/// join, pagination.
#[derive(Debug)]
pub struct VideoQueryBuilder {
    filters: Vec<String>,
    binds: Vec<String>,
    order_by: String,
    limit: i64,
    offset: i64,
}

impl Default for VideoQueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoQueryBuilder {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            binds: Vec::new(),
            order_by: "v.created_at DESC".to_string(),
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }

    /// Case-insensitive text match over title and description.
    pub fn search(mut self, query: Option<&str>) -> Self {
        if let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) {
            self.binds.push(format!("%{}%", q));
            let n = self.binds.len();
            self.filters
                .push(format!("(v.title ILIKE ${n} OR v.description ILIKE ${n})"));
        }
        self
    }

    pub fn owned_by(mut self, user_id: Option<&str>) -> Result<Self, AppError> {
        if let Some(raw) = user_id.map(str::trim).filter(|v| !v.is_empty()) {
            Uuid::parse_str(raw).map_err(|_| AppError::Validation("Invalid userId".to_string()))?;
            self.binds.push(raw.to_string());
            self.filters
                .push(format!("v.owner_id = ${}", self.binds.len()));
        }
        Ok(self)
    }

    /// Listings only ever expose published videos.
    pub fn published_only(mut self) -> Self {
        self.filters.push("v.is_published = TRUE".to_string());
        self
    }

    /// Whitelisted sort columns; anything else falls back to newest-first.
    pub fn sort(mut self, sort_by: Option<&str>, sort_type: Option<&str>) -> Self {
        let column = match sort_by {
            Some("createdAt") => Some("v.created_at"),
            Some("title") => Some("v.title"),
            Some("duration") => Some("v.duration"),
            Some("views") => Some("v.views"),
            _ => None,
        };
        if let Some(column) = column {
            let direction = match sort_type {
                Some("asc") => "ASC",
                _ => "DESC",
            };
            self.order_by = format!("{column} {direction}");
        }
        self
    }

    pub fn paginate(mut self, page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        self.limit = limit;
        self.offset = (page - 1) * limit;
        self
    }

    pub fn page(&self) -> i64 {
        self.offset / self.limit + 1
    }

    pub fn binds(&self) -> &[String] {
        &self.binds
    }

    fn where_clause(&self) -> String {
        if self.filters.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.filters.join(" AND "))
        }
    }

    /// Count query over the filter stages only.
    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) FROM videos v{}", self.where_clause())
    }

    /// Item query: filters, sort, owner join, pagination.
    pub fn items_sql(&self) -> String {
        format!(
            "SELECT v.*, u.username AS owner_username, u.full_name AS owner_full_name, \
             u.avatar AS owner_avatar \
             FROM videos v INNER JOIN users u ON u.id = v.owner_id{} \
             ORDER BY {} LIMIT ${} OFFSET ${}",
            self.where_clause(),
            self.order_by,
            self.binds.len() + 1,
            self.binds.len() + 2,
        )
    }

    pub async fn fetch_page(&self, pool: &PgPool) -> Result<Page<VideoView>, AppError> {
        let count_sql = self.count_sql();
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for bind in &self.binds {
            count_query = count_query.bind(bind);
        }
        let total_items = timeout_query(LIST_TIMEOUT, count_query.fetch_one(pool)).await?;

        let items_sql = self.items_sql();
        let mut items_query = sqlx::query_as::<_, VideoWithOwnerRow>(&items_sql);
        for bind in &self.binds {
            items_query = items_query.bind(bind);
        }
        let rows = timeout_query(
            LIST_TIMEOUT,
            items_query.bind(self.limit).bind(self.offset).fetch_all(pool),
        )
        .await?;

        Ok(Page::new(
            rows.into_iter().map(VideoView::from).collect(),
            self.page(),
            self.limit,
            total_items,
        ))
    }
}

#[tracing::instrument(name = "List videos", skip(inner))]
pub async fn list_videos(
    State(inner): State<InnerState>,
    Query(params): Query<VideoListParams>,
) -> Result<ApiResponse<Page<VideoView>>, AppError> {
    let builder = VideoQueryBuilder::new()
        .search(params.query.as_deref())
        .owned_by(params.user_id.as_deref())?
        .published_only()
        .sort(params.sort_by.as_deref(), params.sort_type.as_deref())
        .paginate(params.page, params.limit);

    let page = builder.fetch_page(&inner.db).await?;
    Ok(ApiResponse::ok(page, "Videos fetched successfully"))
}

#[derive(TryFromMultipart)]
pub struct PublishVideoForm {
    pub title: String,
    pub description: String,
    #[form_data(field_name = "videoFile")]
    pub video_file: Option<FieldData<Bytes>>,
    pub thumbnail: Option<FieldData<Bytes>>,
}

#[tracing::instrument(name = "Publish video", skip(inner, current, form), fields(user_id = %current.0.id))]
pub async fn publish_video(
    State(inner): State<InnerState>,
    Extension(current): Extension<CurrentUser>,
    TypedMultipart(form): TypedMultipart<PublishVideoForm>,
) -> Result<ApiResponse<Video>, AppError> {
    let InnerState { db, media, .. } = inner;

    let mut missing = Vec::new();
    if form.title.trim().is_empty() {
        missing.push("title is required".to_string());
    }
    if form.description.trim().is_empty() {
        missing.push("description is required".to_string());
    }
    if !missing.is_empty() {
        return Err(AppError::ValidationErrors(missing));
    }

    let video_upload = form
        .video_file
        .ok_or_else(|| AppError::Validation("Video file is required".to_string()))?;
    let thumbnail_upload = form
        .thumbnail
        .ok_or_else(|| AppError::Validation("Thumbnail is required".to_string()))?;

    let video_file = TempMedia::stage(video_upload.metadata.file_name, video_upload.contents).await?;
    let thumbnail_file =
        TempMedia::stage(thumbnail_upload.metadata.file_name, thumbnail_upload.contents).await?;

    // Both staged files are unlinked when the guards drop, whether or not
    // the uploads succeed.
    let (video_asset, thumbnail_asset) =
        futures::try_join!(media.upload(&video_file), media.upload(&thumbnail_file)).map_err(
            |e| {
                tracing::error!("Media upload failed while publishing: {:?}", e);
                AppError::Validation("Error while uploading to the media host".to_string())
            },
        )?;

    let id = Uuid::new_v4().to_string();

    // Videos start unpublished; the owner flips visibility explicitly.
    let video = sqlx::query_as::<_, Video>(
        r#"INSERT INTO videos
             (id, owner_id, video_url, video_public_id, thumbnail_url, thumbnail_public_id,
              title, description, duration, is_published)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE)
           RETURNING *"#,
    )
    .bind(&id)
    .bind(&current.0.id)
    .bind(&video_asset.url)
    .bind(&video_asset.public_id)
    .bind(&thumbnail_asset.url)
    .bind(&thumbnail_asset.public_id)
    .bind(form.title.trim())
    .bind(form.description.trim())
    .bind(video_asset.duration.unwrap_or(0.0))
    .fetch_one(&db)
    .await?;

    tracing::info!("Video {} uploaded by user {}", video.id, current.0.id);
    Ok(ApiResponse::created(video, "Video uploaded successfully"))
}

fn parse_video_id(raw: &str) -> Result<&str, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation("Invalid videoId".to_string()))?;
    Ok(raw)
}

async fn require_owned_video(
    pool: &PgPool,
    video_id: &str,
    user_id: &str,
) -> Result<Video, AppError> {
    let video = sqlx::query_as::<_, Video>("SELECT * FROM videos WHERE id = $1")
        .bind(video_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Video not found".to_string()))?;

    if video.owner_id != user_id {
        tracing::warn!(
            "User {} attempted to modify video {} owned by {}",
            user_id,
            video_id,
            video.owner_id
        );
        return Err(AppError::Authentication(anyhow::anyhow!(
            "Only the owner can modify this video"
        )));
    }
    Ok(video)
}

#[tracing::instrument(name = "Get video by id", skip(inner, current), fields(user_id = %current.0.id))]
pub async fn get_video_by_id(
    State(inner): State<InnerState>,
    Extension(current): Extension<CurrentUser>,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<VideoView>, AppError> {
    let InnerState { db, .. } = inner;
    let video_id = parse_video_id(&video_id)?;

    let updated = sqlx::query("UPDATE videos SET views = views + 1 WHERE id = $1")
        .bind(video_id)
        .execute(&db)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("Video not found".to_string()));
    }

    let row = sqlx::query_as::<_, VideoWithOwnerRow>(
        r#"SELECT v.*, u.username AS owner_username, u.full_name AS owner_full_name,
                  u.avatar AS owner_avatar
           FROM videos v INNER JOIN users u ON u.id = v.owner_id
           WHERE v.id = $1"#,
    )
    .bind(video_id)
    .fetch_one(&db)
    .await?;

    sqlx::query(
        r#"INSERT INTO watch_history (user_id, video_id)
           VALUES ($1, $2)
           ON CONFLICT (user_id, video_id) DO UPDATE SET watched_at = CURRENT_TIMESTAMP"#,
    )
    .bind(&current.0.id)
    .bind(video_id)
    .execute(&db)
    .await?;

    Ok(ApiResponse::ok(
        VideoView::from(row),
        "Video fetched successfully",
    ))
}

#[derive(TryFromMultipart)]
pub struct UpdateVideoForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<FieldData<Bytes>>,
}

#[tracing::instrument(name = "Update video", skip(inner, current, form), fields(user_id = %current.0.id))]
pub async fn update_video(
    State(inner): State<InnerState>,
    Extension(current): Extension<CurrentUser>,
    Path(video_id): Path<String>,
    TypedMultipart(form): TypedMultipart<UpdateVideoForm>,
) -> Result<ApiResponse<Video>, AppError> {
    let InnerState { db, media, .. } = inner;
    let video_id = parse_video_id(&video_id)?;

    require_owned_video(&db, video_id, &current.0.id).await?;

    let thumbnail = match form.thumbnail {
        Some(upload) => Some(stage_and_upload(&media, upload, "Thumbnail").await?),
        None => None,
    };

    let video = sqlx::query_as::<_, Video>(
        r#"UPDATE videos SET
             title = COALESCE($1, title),
             description = COALESCE($2, description),
             thumbnail_url = COALESCE($3, thumbnail_url),
             thumbnail_public_id = COALESCE($4, thumbnail_public_id),
             updated_at = CURRENT_TIMESTAMP
           WHERE id = $5
           RETURNING *"#,
    )
    .bind(
        form.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty()),
    )
    .bind(
        form.description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty()),
    )
    .bind(thumbnail.as_ref().map(|a| a.url.clone()))
    .bind(thumbnail.as_ref().map(|a| a.public_id.clone()))
    .bind(video_id)
    .fetch_one(&db)
    .await?;

    Ok(ApiResponse::ok(video, "Video updated successfully"))
}

#[tracing::instrument(name = "Delete video", skip(inner, current), fields(user_id = %current.0.id))]
pub async fn delete_video(
    State(inner): State<InnerState>,
    Extension(current): Extension<CurrentUser>,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<Value>, AppError> {
    let InnerState { db, media, .. } = inner;
    let video_id = parse_video_id(&video_id)?;

    let video = require_owned_video(&db, video_id, &current.0.id).await?;

    sqlx::query("DELETE FROM videos WHERE id = $1")
        .bind(video_id)
        .execute(&db)
        .await?;

    // Media cleanup is best-effort: a failure leaves an orphaned asset but
    // the record is already gone.
    for public_id in [&video.video_public_id, &video.thumbnail_public_id] {
        if let Err(e) = media.destroy(public_id).await {
            tracing::warn!("Failed to delete media asset {}: {:?}", public_id, e);
        }
    }

    Ok(ApiResponse::ok(json!({}), "Video deleted successfully"))
}

#[tracing::instrument(name = "Toggle publish status", skip(inner, current), fields(user_id = %current.0.id))]
pub async fn toggle_publish_status(
    State(inner): State<InnerState>,
    Extension(current): Extension<CurrentUser>,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<Video>, AppError> {
    let InnerState { db, .. } = inner;
    let video_id = parse_video_id(&video_id)?;

    require_owned_video(&db, video_id, &current.0.id).await?;

    let video = sqlx::query_as::<_, Video>(
        r#"UPDATE videos SET is_published = NOT is_published, updated_at = CURRENT_TIMESTAMP
           WHERE id = $1
           RETURNING *"#,
    )
    .bind(video_id)
    .fetch_one(&db)
    .await?;

    Ok(ApiResponse::ok(
        video,
        "Publish status toggled successfully",
    ))
}
