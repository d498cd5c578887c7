use anyhow::anyhow;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use crate::api::v1::user::UserProfile;
use crate::errors::AppError;

/// Claims carried by the short-lived access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub id: String,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub exp: usize,
}

/// Claims carried by the long-lived refresh token. Identity only.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshClaims {
    pub id: String,
    pub exp: usize,
}

/// Signing secrets and expiries for both token kinds, read once at startup.
#[derive(Clone)]
pub struct TokenSettings {
    access_secret: Secret<String>,
    refresh_secret: Secret<String>,
    access_expiry: Duration,
    refresh_expiry: Duration,
}

impl TokenSettings {
    pub fn new(
        access_secret: String,
        refresh_secret: String,
        access_expiry: Duration,
        refresh_expiry: Duration,
    ) -> Self {
        Self {
            access_secret: Secret::new(access_secret),
            refresh_secret: Secret::new(refresh_secret),
            access_expiry,
            refresh_expiry,
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        let access_secret = std::env::var("ACCESS_TOKEN_SECRET").map_err(|e| {
            AppError::Unexpected(anyhow!(e).context("ACCESS_TOKEN_SECRET env var not set"))
        })?;
        let refresh_secret = std::env::var("REFRESH_TOKEN_SECRET").map_err(|e| {
            AppError::Unexpected(anyhow!(e).context("REFRESH_TOKEN_SECRET env var not set"))
        })?;

        let access_expiry =
            parse_expiry(&std::env::var("ACCESS_TOKEN_EXPIRY").unwrap_or_else(|_| "1d".into()))?;
        let refresh_expiry =
            parse_expiry(&std::env::var("REFRESH_TOKEN_EXPIRY").unwrap_or_else(|_| "10d".into()))?;

        Ok(Self::new(
            access_secret,
            refresh_secret,
            access_expiry,
            refresh_expiry,
        ))
    }

    pub fn access_expiry(&self) -> Duration {
        self.access_expiry
    }

    pub fn refresh_expiry(&self) -> Duration {
        self.refresh_expiry
    }

    pub fn issue_access_token(&self, user: &UserProfile) -> Result<String, AppError> {
        let claims = AccessClaims {
            id: user.id.clone(),
            email: user.email.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            exp: (Utc::now() + self.access_expiry).timestamp() as usize,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.access_secret.expose_secret().as_bytes()),
        )
        .map_err(|e| {
            AppError::Unexpected(anyhow::Error::new(e).context("Failed to encode access token"))
        })
    }

    pub fn issue_refresh_token(&self, user_id: &str) -> Result<String, AppError> {
        let claims = RefreshClaims {
            id: user_id.to_owned(),
            exp: (Utc::now() + self.refresh_expiry).timestamp() as usize,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.refresh_secret.expose_secret().as_bytes()),
        )
        .map_err(|e| {
            AppError::Unexpected(anyhow::Error::new(e).context("Failed to encode refresh token"))
        })
    }

    /// Fails on signature mismatch or expiry; both normalize to 401.
    pub fn decode_access_token(&self, token: &str) -> Result<AccessClaims, AppError> {
        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.access_secret.expose_secret().as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            AppError::Authentication(anyhow::Error::new(e).context("Invalid access token"))
        })
    }

    pub fn decode_refresh_token(&self, token: &str) -> Result<RefreshClaims, AppError> {
        decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(self.refresh_secret.expose_secret().as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            AppError::Authentication(anyhow::Error::new(e).context("Invalid refresh token"))
        })
    }
}

/// Parses `30s` / `15m` / `12h` / `7d` expiry strings; a bare number is
/// taken as seconds.
pub fn parse_expiry(raw: &str) -> Result<Duration, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::Unexpected(anyhow!("Token expiry is empty")));
    }

    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };

    let value: i64 = digits
        .parse()
        .map_err(|_| AppError::Unexpected(anyhow!("Invalid token expiry '{}'", raw)))?;

    match unit {
        "s" => Ok(Duration::seconds(value)),
        "m" => Ok(Duration::minutes(value)),
        "h" => Ok(Duration::hours(value)),
        "d" => Ok(Duration::days(value)),
        _ => Err(AppError::Unexpected(anyhow!(
            "Invalid token expiry '{}'",
            raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn settings() -> TokenSettings {
        TokenSettings::new(
            "access-secret".to_string(),
            "refresh-secret".to_string(),
            Duration::minutes(15),
            Duration::days(10),
        )
    }

    fn profile() -> UserProfile {
        UserProfile {
            id: "4dbb9eab-0c21-4a77-9c1c-6b7a86771b9c".to_string(),
            username: "maria".to_string(),
            email: "maria@example.com".to_string(),
            full_name: "Maria Silva".to_string(),
            avatar: None,
            cover_image: None,
            created_at: NaiveDateTime::default(),
            updated_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn access_token_roundtrips_its_claims() {
        let settings = settings();
        let token = settings.issue_access_token(&profile()).unwrap();
        let claims = settings.decode_access_token(&token).unwrap();

        assert_eq!(claims.id, "4dbb9eab-0c21-4a77-9c1c-6b7a86771b9c");
        assert_eq!(claims.email, "maria@example.com");
        assert_eq!(claims.username, "maria");
        assert_eq!(claims.full_name, "Maria Silva");
    }

    #[test]
    fn refresh_token_carries_identity_only() {
        let settings = settings();
        let token = settings.issue_refresh_token("user-1").unwrap();
        let claims = settings.decode_refresh_token(&token).unwrap();
        assert_eq!(claims.id, "user-1");
    }

    #[test]
    fn tokens_are_not_interchangeable_between_secrets() {
        let settings = settings();
        let other = TokenSettings::new(
            "other-access".to_string(),
            "other-refresh".to_string(),
            Duration::minutes(15),
            Duration::days(10),
        );

        let token = settings.issue_access_token(&profile()).unwrap();
        assert!(matches!(
            other.decode_access_token(&token),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let settings = TokenSettings::new(
            "access-secret".to_string(),
            "refresh-secret".to_string(),
            Duration::seconds(-300),
            Duration::seconds(-300),
        );
        let token = settings.issue_refresh_token("user-1").unwrap();
        assert!(matches!(
            settings.decode_refresh_token(&token),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let settings = settings();
        let token = settings.issue_access_token(&profile()).unwrap();
        let tampered = format!("{}x", token);
        assert!(settings.decode_access_token(&tampered).is_err());
    }

    #[test]
    fn expiry_strings_parse_per_unit() {
        assert_eq!(parse_expiry("30s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_expiry("15m").unwrap(), Duration::minutes(15));
        assert_eq!(parse_expiry("12h").unwrap(), Duration::hours(12));
        assert_eq!(parse_expiry("7d").unwrap(), Duration::days(7));
        assert_eq!(parse_expiry("90").unwrap(), Duration::seconds(90));
    }

    #[test]
    fn bad_expiry_strings_are_rejected() {
        assert!(parse_expiry("").is_err());
        assert!(parse_expiry("d").is_err());
        assert!(parse_expiry("10w").is_err());
        assert!(parse_expiry("ten minutes").is_err());
    }
}
