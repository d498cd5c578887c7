use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_cookies::Cookies;

use crate::api::common::utils::{clear_session_cookies, set_session_cookies};
use crate::api::common::ApiResponse;
use crate::api::v1::user::{CurrentUser, User, UserProfile};
use crate::authentication::verify_password_hash;
use crate::errors::AppError;
use crate::InnerState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: String,
}

#[tracing::instrument(name = "Login user", skip(cookies, inner, body))]
pub async fn login_user(
    cookies: Cookies,
    State(inner): State<InnerState>,
    Json(body): Json<LoginRequest>,
) -> Result<ApiResponse<SessionPayload>, AppError> {
    let InnerState { db, tokens, .. } = inner;

    let username = body
        .username
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let email = body
        .email
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if username.is_none() && email.is_none() {
        return Err(AppError::Validation(
            "Username or email is required".to_string(),
        ));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1 OR email = $2")
        .bind(username.map(str::to_lowercase))
        .bind(email.map(str::to_lowercase))
        .fetch_optional(&db)
        .await?
        .ok_or_else(|| AppError::NotFound("User does not exist".to_string()))?;

    verify_password_hash(&user.password_hash, &body.password).map_err(|_| {
        tracing::warn!("Password verification failed for user {}", user.id);
        AppError::Authentication(anyhow::anyhow!("Invalid user credentials"))
    })?;

    let profile = UserProfile::from(user);
    let access_token = tokens.issue_access_token(&profile)?;
    let refresh_token = tokens.issue_refresh_token(&profile.id)?;

    // The persisted value is what logout and rotation later invalidate.
    sqlx::query("UPDATE users SET refresh_token = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(&refresh_token)
        .bind(&profile.id)
        .execute(&db)
        .await?;

    set_session_cookies(&cookies, &access_token, &refresh_token, &tokens);

    tracing::info!("User {} logged in", profile.id);
    Ok(ApiResponse::ok(
        SessionPayload {
            user: profile,
            access_token,
            refresh_token,
        },
        "User logged in successfully",
    ))
}

#[tracing::instrument(name = "Logout user", skip(cookies, inner, current), fields(user_id = %current.0.id))]
pub async fn logout_user(
    cookies: Cookies,
    State(inner): State<InnerState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<ApiResponse<Value>, AppError> {
    sqlx::query(
        "UPDATE users SET refresh_token = NULL, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
    )
    .bind(&current.0.id)
    .execute(&inner.db)
    .await?;

    clear_session_cookies(&cookies);

    Ok(ApiResponse::ok(json!({}), "User logged out successfully"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[tracing::instrument(name = "Refresh access token", skip(cookies, inner, body))]
pub async fn refresh_access_token(
    cookies: Cookies,
    State(inner): State<InnerState>,
    body: Option<Json<RefreshRequest>>,
) -> Result<ApiResponse<SessionPayload>, AppError> {
    let InnerState { db, tokens, .. } = inner;

    let presented = cookies
        .get("refreshToken")
        .map(|c| c.value().to_string())
        .or_else(|| body.and_then(|Json(b)| b.refresh_token))
        .ok_or_else(|| AppError::Authentication(anyhow::anyhow!("Unauthorized request")))?;

    let claims = tokens.decode_refresh_token(&presented)?;
    let new_refresh = tokens.issue_refresh_token(&claims.id)?;

    // Compare-and-swap against the persisted value: an unknown user or a
    // stale/reused token matches zero rows and nothing is mutated.
    let profile = sqlx::query_as::<_, UserProfile>(
        r#"UPDATE users SET refresh_token = $1, updated_at = CURRENT_TIMESTAMP
           WHERE id = $2 AND refresh_token = $3
           RETURNING id, username, email, full_name, avatar, cover_image, created_at, updated_at"#,
    )
    .bind(&new_refresh)
    .bind(&claims.id)
    .bind(&presented)
    .fetch_optional(&db)
    .await?
    .ok_or_else(|| {
        tracing::warn!("Presented refresh token does not match the persisted one");
        AppError::Authentication(anyhow::anyhow!("Refresh token is expired or already used"))
    })?;

    let access_token = tokens.issue_access_token(&profile)?;
    set_session_cookies(&cookies, &access_token, &new_refresh, &tokens);

    Ok(ApiResponse::ok(
        SessionPayload {
            user: profile,
            access_token,
            refresh_token: new_refresh,
        },
        "Access token refreshed successfully",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_payload_exposes_tokens_and_profile_only() {
        let payload = SessionPayload {
            user: UserProfile {
                id: "u-1".to_string(),
                username: "maria".to_string(),
                email: "maria@example.com".to_string(),
                full_name: "Maria Silva".to_string(),
                avatar: None,
                cover_image: None,
                created_at: chrono::NaiveDateTime::default(),
                updated_at: chrono::NaiveDateTime::default(),
            },
            access_token: "access.jwt".to_string(),
            refresh_token: "refresh.jwt".to_string(),
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["accessToken"], "access.jwt");
        assert_eq!(value["refreshToken"], "refresh.jwt");
        assert_eq!(value["user"]["username"], "maria");
        assert!(value["user"].get("passwordHash").is_none());
    }

    #[test]
    fn login_request_accepts_either_identifier() {
        let by_email: LoginRequest =
            serde_json::from_value(json!({"email": "a@b.c", "password": "pw"})).unwrap();
        assert!(by_email.username.is_none());
        assert_eq!(by_email.email.as_deref(), Some("a@b.c"));

        let by_username: LoginRequest =
            serde_json::from_value(json!({"username": "maria", "password": "pw"})).unwrap();
        assert!(by_username.email.is_none());
    }
}
