use axum::{
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use cookie::Cookie;

use crate::api::v1::user::{find_profile_by_id, CurrentUser};
use crate::errors::AppError;
use crate::InnerState;

/// Gate for protected routes: verifies the bearer token and attaches the
/// resolved user (minus secrets) to the request. Downstream handlers trust
/// this extension and never re-verify.
pub async fn auth_middleware(
    State(inner): State<InnerState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(&request)
        .ok_or_else(|| AppError::Authentication(anyhow::anyhow!("Unauthorized request")))?;

    let claims = inner.tokens.decode_access_token(&token)?;

    let user = match find_profile_by_id(&inner.db, &claims.id).await {
        Ok(user) => user,
        Err(AppError::NotFound(_)) => {
            tracing::warn!("Access token references a user that no longer exists");
            return Err(AppError::Authentication(anyhow::anyhow!(
                "Invalid access token"
            )));
        }
        Err(e) => return Err(e),
    };

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

/// Extracts the access JWT from either the `Authorization` header or the
/// `accessToken` cookie.
pub fn extract_token<B>(req: &Request<B>) -> Option<String> {
    extract_token_from_headers(req.headers())
}

pub fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    // Check Authorization: Bearer <token>
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    // Check Cookie: accessToken=<token>
    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Ok(parsed) = Cookie::parse(cookie.trim()) {
                    if parsed.name() == "accessToken" {
                        return Some(parsed.value().to_string());
                    }
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn bearer_header_is_extracted() {
        let headers = headers(&[(header::AUTHORIZATION, "Bearer abc.def.ghi")]);
        assert_eq!(
            extract_token_from_headers(&headers),
            Some("abc.def.ghi".to_string())
        );
    }

    #[test]
    fn access_token_cookie_is_extracted() {
        let headers = headers(&[(header::COOKIE, "foo=bar; accessToken=abc.def.ghi")]);
        assert_eq!(
            extract_token_from_headers(&headers),
            Some("abc.def.ghi".to_string())
        );
    }

    #[test]
    fn authorization_header_wins_over_the_cookie() {
        let headers = headers(&[
            (header::AUTHORIZATION, "Bearer from-header"),
            (header::COOKIE, "accessToken=from-cookie"),
        ]);
        assert_eq!(
            extract_token_from_headers(&headers),
            Some("from-header".to_string())
        );
    }

    #[test]
    fn missing_or_malformed_credentials_yield_none() {
        assert_eq!(extract_token_from_headers(&HeaderMap::new()), None);

        let headers = headers(&[(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")]);
        assert_eq!(extract_token_from_headers(&headers), None);

        let headers = headers(&[(header::COOKIE, "refreshToken=only-refresh")]);
        assert_eq!(extract_token_from_headers(&headers), None);
    }
}
