use axum::extract::{Path, State};
use axum::Extension;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::common::ApiResponse;
use crate::api::v1::user::CurrentUser;
use crate::errors::AppError;
use crate::InnerState;

#[tracing::instrument(name = "Toggle subscription", skip(inner, current), fields(subscriber_id = %current.0.id))]
pub async fn toggle_subscription(
    State(inner): State<InnerState>,
    Extension(current): Extension<CurrentUser>,
    Path(channel_id): Path<String>,
) -> Result<ApiResponse<Value>, AppError> {
    let InnerState { db, .. } = inner;

    Uuid::parse_str(&channel_id)
        .map_err(|_| AppError::Validation("Invalid channelId".to_string()))?;

    if channel_id == current.0.id {
        return Err(AppError::Validation(
            "You cannot subscribe to your own channel".to_string(),
        ));
    }

    let channel = sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE id = $1")
        .bind(&channel_id)
        .fetch_optional(&db)
        .await?;
    if channel.is_none() {
        return Err(AppError::NotFound("Channel does not exist".to_string()));
    }

    let deleted =
        sqlx::query("DELETE FROM subscriptions WHERE subscriber_id = $1 AND channel_id = $2")
            .bind(&current.0.id)
            .bind(&channel_id)
            .execute(&db)
            .await?;

    if deleted.rows_affected() > 0 {
        tracing::info!("User {} unsubscribed from {}", current.0.id, channel_id);
        return Ok(ApiResponse::ok(
            json!({ "subscribed": false }),
            "Unsubscribed successfully",
        ));
    }

    sqlx::query(
        r#"INSERT INTO subscriptions (id, subscriber_id, channel_id)
           VALUES ($1, $2, $3)
           ON CONFLICT (subscriber_id, channel_id) DO NOTHING"#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&current.0.id)
    .bind(&channel_id)
    .execute(&db)
    .await?;

    tracing::info!("User {} subscribed to {}", current.0.id, channel_id);
    Ok(ApiResponse::ok(
        json!({ "subscribed": true }),
        "Subscribed successfully",
    ))
}
