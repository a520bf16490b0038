use crate::server::{Result, ServerError, ServerRouter, json::Json};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use simplesocial_common::model::user::UserProfile;
use simplesocial_db::client::DbClient;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(get_user)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{username}", rejection(ServerError))]
struct GetUserPath {
    username: String,
}

async fn get_user(
    GetUserPath { username }: GetUserPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<UserProfile>> {
    let user = db
        .fetch_user_by_handle(&username)
        .await?
        .ok_or(ServerError::UserByHandleNotFound(username))?;
    let groups = db.fetch_user_groups(user.id).await?;

    Ok(Json(UserProfile { user, groups }))
}
