use crate::server::ServerError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use simplesocial_common::model::{
    auth::{AuthToken, AuthTokenHash},
    user::User,
};
use simplesocial_db::client::DbClient;
use std::sync::Arc;
use time::UtcDateTime;
use tracing::debug;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// The active user behind a valid bearer token.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser {
    pub user: User,
    pub token_hash: AuthTokenHash,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let request_token: AuthToken = AuthorizationHeader::from_request_parts(parts, state)
            .await
            .map_err(ServerError::InvalidAuthorizationHeader)?
            .token()
            .parse()?;

        let token_hash = request_token.hash()?;

        let db = Arc::<DbClient>::from_ref(state);
        let authentication = db
            .fetch_auth(&token_hash)
            .await?
            .ok_or(ServerError::InvalidToken)?;

        if authentication.user != request_token.user_id {
            debug!(user = %request_token.user_id, "Token presented for the wrong user");
            return Err(ServerError::InvalidToken);
        }
        if authentication.is_expired_at(UtcDateTime::now()) {
            debug!(user = %authentication.user, "Token expired");
            return Err(ServerError::InvalidToken);
        }

        let user = db
            .fetch_user(authentication.user)
            .await?
            .filter(|user| user.permissions.is_active)
            .ok_or(ServerError::InvalidToken)?;

        Ok(Self { user, token_hash })
    }
}
