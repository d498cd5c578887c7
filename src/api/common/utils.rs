use cookie::{Cookie, SameSite};
use time::OffsetDateTime;
use tower_cookies::Cookies;

use crate::authentication::TokenSettings;
use crate::errors::AppError;

fn session_cookie(name: &'static str, value: String, max_age: chrono::Duration) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);

    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_secure(true);
    cookie.set_same_site(SameSite::None);

    let mut expires = OffsetDateTime::now_utc();
    expires += time::Duration::seconds(max_age.num_seconds());
    cookie.set_expires(expires);

    cookie
}

/// Sets both session cookies. Http-only and secure: readable by the server
/// only, never by frontend scripts.
pub fn set_session_cookies(
    cookies: &Cookies,
    access_token: &str,
    refresh_token: &str,
    settings: &TokenSettings,
) {
    cookies.add(session_cookie(
        "accessToken",
        access_token.to_owned(),
        settings.access_expiry(),
    ));
    cookies.add(session_cookie(
        "refreshToken",
        refresh_token.to_owned(),
        settings.refresh_expiry(),
    ));
}

pub fn clear_session_cookies(cookies: &Cookies) {
    for name in ["accessToken", "refreshToken"] {
        let mut cookie = Cookie::from(name);
        cookie.set_path("/");
        cookie.set_same_site(SameSite::None);
        cookie.make_removal();
        cookies.remove(cookie);
    }
}

pub async fn timeout_query<T, F>(duration: std::time::Duration, fut: F) -> Result<T, AppError>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(Ok(res)) => Ok(res),
        Ok(Err(e)) => Err(AppError::from(e)),
        Err(_) => Err(AppError::Database(anyhow::anyhow!(
            "Query timeout after {:?}",
            duration
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookies_are_http_only_and_secure() {
        let cookie = session_cookie(
            "accessToken",
            "token-value".to_string(),
            chrono::Duration::minutes(15),
        );

        assert_eq!(cookie.name(), "accessToken");
        assert_eq!(cookie.value(), "token-value");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[tokio::test]
    async fn timeout_query_surfaces_the_inner_result() {
        let ok = timeout_query(std::time::Duration::from_secs(1), async {
            Ok::<_, sqlx::Error>(42)
        })
        .await;
        assert_eq!(ok.unwrap(), 42);

        let err = timeout_query(std::time::Duration::from_secs(1), async {
            Err::<i32, _>(sqlx::Error::RowNotFound)
        })
        .await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn timeout_query_times_out_slow_futures() {
        let result = timeout_query(std::time::Duration::from_millis(10), async {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok::<_, sqlx::Error>(1)
        })
        .await;
        assert!(matches!(result, Err(AppError::Database(_))));
    }
}
