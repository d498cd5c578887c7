use axum::extract::State;
use axum::{Extension, Json};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use bytes::Bytes;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::api::common::ApiResponse;
use crate::authentication::{compute_password_hash, verify_password_hash};
use crate::errors::AppError;
use crate::media::{stage_and_upload, TempMedia};
use crate::InnerState;

/// Full user row. Not serializable: responses always go through
/// [`UserProfile`], which carries neither the password hash nor the
/// refresh token.
#[derive(Debug, Deserialize, FromRow, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub avatar: Option<String>,
    pub cover_image: Option<String>,
    pub refresh_token: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Public projection of a user, safe to return to clients.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: Option<String>,
    pub cover_image: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            avatar: user.avatar,
            cover_image: user.cover_image,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Authenticated user attached to the request by the auth middleware.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserProfile);

#[tracing::instrument(name = "Fetch user profile", skip(pool))]
pub async fn find_profile_by_id(pool: &PgPool, user_id: &str) -> Result<UserProfile, AppError> {
    let profile = sqlx::query_as::<_, UserProfile>(
        r#"SELECT id, username, email, full_name, avatar, cover_image, created_at, updated_at
           FROM users WHERE id = $1"#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(profile)
}

fn map_unique_violation(e: sqlx::Error, message: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        // 23505 is Postgres unique_violation
        if db_err.code().as_deref() == Some("23505") {
            return AppError::Conflict(message.to_string());
        }
    }
    AppError::from(e)
}

#[derive(TryFromMultipart)]
pub struct RegisterForm {
    #[form_data(field_name = "fullName")]
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub avatar: Option<FieldData<Bytes>>,
    #[form_data(field_name = "coverImage")]
    pub cover_image: Option<FieldData<Bytes>>,
}

#[tracing::instrument(name = "Register user", skip(inner, form))]
pub async fn register_user(
    State(inner): State<InnerState>,
    TypedMultipart(form): TypedMultipart<RegisterForm>,
) -> Result<ApiResponse<UserProfile>, AppError> {
    let InnerState { db, media, .. } = inner;

    let mut missing = Vec::new();
    for (field, value) in [
        ("fullName", &form.full_name),
        ("email", &form.email),
        ("username", &form.username),
        ("password", &form.password),
    ] {
        if value.trim().is_empty() {
            missing.push(format!("{} is required", field));
        }
    }
    if !missing.is_empty() {
        return Err(AppError::ValidationErrors(missing));
    }

    let username = form.username.trim().to_lowercase();
    let email = form.email.trim().to_lowercase();

    let existing =
        sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE username = $1 OR email = $2")
            .bind(&username)
            .bind(&email)
            .fetch_optional(&db)
            .await?;

    if existing.is_some() {
        tracing::warn!("Attempted to register an already taken username or email");
        return Err(AppError::Conflict(
            "User with email or username already exists".to_string(),
        ));
    }

    let avatar_upload = form
        .avatar
        .ok_or_else(|| AppError::Validation("Avatar file is required".to_string()))?;
    let avatar = stage_and_upload(&media, avatar_upload, "Avatar").await?;

    // The cover image is optional and best-effort: a failed upload does not
    // block registration.
    let cover_image = match form.cover_image {
        Some(upload) => {
            let file = TempMedia::stage(upload.metadata.file_name, upload.contents).await?;
            match media.upload(&file).await {
                Ok(asset) => Some(asset.url),
                Err(e) => {
                    tracing::warn!("Cover image upload failed, continuing without it: {:?}", e);
                    None
                }
            }
        }
        None => None,
    };

    let id = Uuid::new_v4().to_string();
    let password_hash = compute_password_hash(form.password).await?;

    let profile = sqlx::query_as::<_, UserProfile>(
        r#"INSERT INTO users (id, username, email, full_name, password_hash, avatar, cover_image)
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           RETURNING id, username, email, full_name, avatar, cover_image, created_at, updated_at"#,
    )
    .bind(&id)
    .bind(&username)
    .bind(&email)
    .bind(form.full_name.trim())
    .bind(&password_hash)
    .bind(&avatar.url)
    .bind(&cover_image)
    .fetch_one(&db)
    .await
    .map_err(|e| map_unique_violation(e, "User with email or username already exists"))?;

    tracing::info!("Registered user {}", profile.id);
    Ok(ApiResponse::created(
        profile,
        "User registered successfully",
    ))
}

pub async fn current_user(
    Extension(current): Extension<CurrentUser>,
) -> ApiResponse<UserProfile> {
    ApiResponse::ok(current.0, "Current user fetched successfully")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    pub full_name: String,
    pub email: String,
}

#[tracing::instrument(name = "Update account details", skip(inner, current, body), fields(user_id = %current.0.id))]
pub async fn update_account(
    State(inner): State<InnerState>,
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<UpdateAccountRequest>,
) -> Result<ApiResponse<UserProfile>, AppError> {
    if body.full_name.trim().is_empty() || body.email.trim().is_empty() {
        return Err(AppError::Validation(
            "Full name and email are required".to_string(),
        ));
    }

    let profile = sqlx::query_as::<_, UserProfile>(
        r#"UPDATE users SET full_name = $1, email = $2, updated_at = CURRENT_TIMESTAMP
           WHERE id = $3
           RETURNING id, username, email, full_name, avatar, cover_image, created_at, updated_at"#,
    )
    .bind(body.full_name.trim())
    .bind(body.email.trim().to_lowercase())
    .bind(&current.0.id)
    .fetch_one(&inner.db)
    .await
    .map_err(|e| map_unique_violation(e, "Email already in use"))?;

    Ok(ApiResponse::ok(
        profile,
        "Account details updated successfully",
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[tracing::instrument(name = "Change password", skip(inner, current, body), fields(user_id = %current.0.id))]
pub async fn change_password(
    State(inner): State<InnerState>,
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    let InnerState { db, .. } = inner;

    let stored_hash =
        sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE id = $1")
            .bind(&current.0.id)
            .fetch_one(&db)
            .await?;

    verify_password_hash(&stored_hash, &body.old_password)
        .map_err(|_| AppError::Authentication(anyhow::anyhow!("Invalid old password")))?;

    let password_hash = compute_password_hash(body.new_password).await?;

    sqlx::query("UPDATE users SET password_hash = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(&password_hash)
        .bind(&current.0.id)
        .execute(&db)
        .await?;

    tracing::info!("Password changed for user {}", current.0.id);
    Ok(ApiResponse::ok(json!({}), "Password changed successfully"))
}

#[derive(TryFromMultipart)]
pub struct AvatarForm {
    pub avatar: Option<FieldData<Bytes>>,
}

#[tracing::instrument(name = "Update avatar", skip(inner, current, form), fields(user_id = %current.0.id))]
pub async fn update_avatar(
    State(inner): State<InnerState>,
    Extension(current): Extension<CurrentUser>,
    TypedMultipart(form): TypedMultipart<AvatarForm>,
) -> Result<ApiResponse<UserProfile>, AppError> {
    let upload = form
        .avatar
        .ok_or_else(|| AppError::Validation("Avatar file is required".to_string()))?;

    let asset = stage_and_upload(&inner.media, upload, "Avatar").await?;

    // The replaced asset stays on the media host; only the URL is swapped.
    let profile = sqlx::query_as::<_, UserProfile>(
        r#"UPDATE users SET avatar = $1, updated_at = CURRENT_TIMESTAMP
           WHERE id = $2
           RETURNING id, username, email, full_name, avatar, cover_image, created_at, updated_at"#,
    )
    .bind(&asset.url)
    .bind(&current.0.id)
    .fetch_one(&inner.db)
    .await?;

    Ok(ApiResponse::ok(profile, "Avatar updated successfully"))
}

#[derive(TryFromMultipart)]
pub struct CoverImageForm {
    #[form_data(field_name = "coverImage")]
    pub cover_image: Option<FieldData<Bytes>>,
}

#[tracing::instrument(name = "Update cover image", skip(inner, current, form), fields(user_id = %current.0.id))]
pub async fn update_cover_image(
    State(inner): State<InnerState>,
    Extension(current): Extension<CurrentUser>,
    TypedMultipart(form): TypedMultipart<CoverImageForm>,
) -> Result<ApiResponse<UserProfile>, AppError> {
    let upload = form
        .cover_image
        .ok_or_else(|| AppError::Validation("Cover image file is required".to_string()))?;

    let asset = stage_and_upload(&inner.media, upload, "Cover image").await?;

    let profile = sqlx::query_as::<_, UserProfile>(
        r#"UPDATE users SET cover_image = $1, updated_at = CURRENT_TIMESTAMP
           WHERE id = $2
           RETURNING id, username, email, full_name, avatar, cover_image, created_at, updated_at"#,
    )
    .bind(&asset.url)
    .bind(&current.0.id)
    .fetch_one(&inner.db)
    .await?;

    Ok(ApiResponse::ok(profile, "Cover image updated successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        UserProfile {
            id: "u-1".to_string(),
            username: "maria".to_string(),
            email: "maria@example.com".to_string(),
            full_name: "Maria Silva".to_string(),
            avatar: Some("https://media.example.com/a.png".to_string()),
            cover_image: None,
            created_at: NaiveDateTime::default(),
            updated_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn profile_projection_never_contains_secrets() {
        let user = User {
            id: "u-1".to_string(),
            username: "maria".to_string(),
            email: "maria@example.com".to_string(),
            full_name: "Maria Silva".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            avatar: None,
            cover_image: None,
            refresh_token: Some("refresh.jwt.value".to_string()),
            created_at: NaiveDateTime::default(),
            updated_at: NaiveDateTime::default(),
        };

        let value = serde_json::to_value(UserProfile::from(user)).unwrap();
        let rendered = value.to_string();

        assert!(value.get("password").is_none());
        assert!(value.get("passwordHash").is_none());
        assert!(value.get("refreshToken").is_none());
        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("refresh.jwt.value"));
    }

    #[test]
    fn profile_serializes_with_camel_case_keys() {
        let value = serde_json::to_value(profile()).unwrap();
        assert_eq!(value["fullName"], "Maria Silva");
        assert_eq!(value["coverImage"], serde_json::Value::Null);
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn unique_violation_message_is_not_leaked_for_other_errors() {
        let mapped = map_unique_violation(sqlx::Error::RowNotFound, "duplicate");
        assert!(matches!(mapped, AppError::NotFound(_)));
    }
}
