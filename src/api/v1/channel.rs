use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Extension;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::api::common::middleware::extract_token_from_headers;
use crate::api::common::utils::timeout_query;
use crate::api::common::ApiResponse;
use crate::api::v1::user::CurrentUser;
use crate::api::v1::video::{VideoView, VideoWithOwnerRow};
use crate::errors::AppError;
use crate::InnerState;

const CHANNEL_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(10000);

/// Public channel projection with subscription aggregates.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProfile {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub cover_image: Option<String>,
    pub subscriber_count: i64,
    pub subscribed_to_count: i64,
    pub is_subscribed: bool,
}

#[tracing::instrument(name = "Get channel profile", skip(inner, headers))]
pub async fn get_channel_profile(
    State(inner): State<InnerState>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Result<ApiResponse<ChannelProfile>, AppError> {
    let InnerState { db, tokens, .. } = inner;

    // The viewer is optional here: anonymous requests simply see
    // `isSubscribed = false`.
    let viewer_id = extract_token_from_headers(&headers)
        .and_then(|token| tokens.decode_access_token(&token).ok())
        .map(|claims| claims.id)
        .unwrap_or_default();

    let profile = timeout_query(
        CHANNEL_TIMEOUT,
        sqlx::query_as::<_, ChannelProfile>(
            r#"SELECT u.id, u.username, u.full_name, u.email, u.avatar, u.cover_image,
                 (SELECT COUNT(*) FROM subscriptions s WHERE s.channel_id = u.id)
                     AS subscriber_count,
                 (SELECT COUNT(*) FROM subscriptions s WHERE s.subscriber_id = u.id)
                     AS subscribed_to_count,
                 EXISTS(SELECT 1 FROM subscriptions s
                        WHERE s.channel_id = u.id AND s.subscriber_id = $2)
                     AS is_subscribed
               FROM users u
               WHERE u.username = $1"#,
        )
        .bind(username.trim().to_lowercase())
        .bind(&viewer_id)
        .fetch_optional(&db),
    )
    .await?
    .ok_or_else(|| AppError::NotFound("Channel does not exist".to_string()))?;

    Ok(ApiResponse::ok(
        profile,
        "Channel profile fetched successfully",
    ))
}

#[tracing::instrument(name = "Get watch history", skip(inner, current), fields(user_id = %current.0.id))]
pub async fn get_watch_history(
    State(inner): State<InnerState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<ApiResponse<Vec<VideoView>>, AppError> {
    let rows = timeout_query(
        CHANNEL_TIMEOUT,
        sqlx::query_as::<_, VideoWithOwnerRow>(
            r#"SELECT v.*, u.username AS owner_username, u.full_name AS owner_full_name,
                      u.avatar AS owner_avatar
               FROM watch_history wh
               INNER JOIN videos v ON v.id = wh.video_id
               INNER JOIN users u ON u.id = v.owner_id
               WHERE wh.user_id = $1
               ORDER BY wh.watched_at DESC"#,
        )
        .bind(&current.0.id)
        .fetch_all(&inner.db),
    )
    .await?;

    let history: Vec<VideoView> = rows.into_iter().map(VideoView::from).collect();
    Ok(ApiResponse::ok(
        history,
        "Watch history fetched successfully",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_profile_serializes_the_aggregates() {
        let profile = ChannelProfile {
            id: "u-1".to_string(),
            username: "maria".to_string(),
            full_name: "Maria Silva".to_string(),
            email: "maria@example.com".to_string(),
            avatar: None,
            cover_image: None,
            subscriber_count: 12,
            subscribed_to_count: 3,
            is_subscribed: true,
        };

        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["subscriberCount"], 12);
        assert_eq!(value["subscribedToCount"], 3);
        assert_eq!(value["isSubscribed"], true);
        assert!(value.get("passwordHash").is_none());
        assert!(value.get("refreshToken").is_none());
    }
}
