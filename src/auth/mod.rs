pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization, Cookie};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::{error::AppError, models::is_corrector_role, state::AppState};

pub const ACCESS_COOKIE_NAME: &str = "access_token";
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";
pub const BOT_SECRET_HEADER: &str = "x-bot-secret";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: uuid::Uuid,
    pub username: String,
    pub role: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = match TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
        {
            Ok(TypedHeader(Authorization(bearer))) => bearer.token().to_owned(),
            Err(_) => {
                let TypedHeader(cookies) =
                    TypedHeader::<Cookie>::from_request_parts(parts, state)
                        .await
                        .map_err(|_| AppError::unauthorized())?;
                cookies
                    .get(ACCESS_COOKIE_NAME)
                    .map(str::to_owned)
                    .ok_or_else(AppError::unauthorized)?
            }
        };

        let claims = state
            .jwt
            .verify_token(&token)
            .map_err(|_| AppError::unauthorized())?;

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            username: claims.username,
            role: claims.role,
        })
    }
}

/// Staff member allowed to review correction orders.
#[derive(Debug, Clone)]
pub struct CorrectorUser(pub AuthenticatedUser);

#[async_trait]
impl FromRequestParts<AppState> for CorrectorUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if !is_corrector_role(&user.role) {
            return Err(AppError::forbidden("corrector role required"));
        }
        Ok(CorrectorUser(user))
    }
}

/// Caller holding the shared bot secret.
#[derive(Debug, Clone, Copy)]
pub struct BotChannel;

#[async_trait]
impl FromRequestParts<AppState> for BotChannel {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(BOT_SECRET_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(AppError::unauthorized)?;

        if !secrets_match(provided, &state.config.bot_secret_key) {
            tracing::warn!("rejected bot request with invalid secret");
            return Err(AppError::unauthorized());
        }
        Ok(BotChannel)
    }
}

fn secrets_match(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}
