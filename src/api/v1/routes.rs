//! V1 API route definitions

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use crate::api::common::middleware::auth_middleware;
use crate::api::v1::channel::{get_channel_profile, get_watch_history};
use crate::api::v1::login::{login_user, logout_user, refresh_access_token};
use crate::api::v1::subscriptions::toggle_subscription;
use crate::api::v1::user::{
    change_password, current_user, register_user, update_account, update_avatar,
    update_cover_image,
};
use crate::api::v1::video::{
    delete_video, get_video_by_id, list_videos, publish_video, toggle_publish_status, update_video,
};
use crate::InnerState;

/// Routes gated by the authenticated-request middleware.
fn protected_routes(state: InnerState) -> Router<InnerState> {
    Router::new()
        // Session + account routes
        .route("/users/logout", post(logout_user))
        .route("/users/change-password", post(change_password))
        .route("/users/current-user", get(current_user))
        .route("/users/update-account", patch(update_account))
        .route("/users/avatar", patch(update_avatar))
        .route("/users/cover-image", patch(update_cover_image))
        .route("/users/watch-history", get(get_watch_history))
        // Video routes
        .route("/videos", get(list_videos).post(publish_video))
        .route(
            "/videos/:video_id",
            get(get_video_by_id).patch(update_video).delete(delete_video),
        )
        .route(
            "/videos/toggle/publish/:video_id",
            patch(toggle_publish_status),
        )
        // Subscription routes
        .route("/subscriptions/channel/:channel_id", post(toggle_subscription))
        .layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Creates the V1 API routes.
#[tracing::instrument(name = "create_v1_routes", skip(state))]
pub fn create_v1_routes(state: InnerState) -> Router<InnerState> {
    Router::new()
        .route("/users/register", post(register_user))
        .route("/users/login", post(login_user))
        .route("/users/refresh-token", post(refresh_access_token))
        // Channel profiles are public; the viewer is resolved opportunistically
        .route("/users/channel/:username", get(get_channel_profile))
        .merge(protected_routes(state))
}
