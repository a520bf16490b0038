use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    json::{Created, Json},
    notice::Notice,
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use simplesocial_common::model::{
    Id,
    post::{CreatePost, Post, PostFields, PostMarker, UpdatePost, UserPosts},
};
use simplesocial_db::client::DbClient;
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_posts)
        .typed_post(create_post)
        .typed_get(get_user_posts)
        .typed_get(get_user_post)
        .typed_patch(update_post)
        .typed_delete(delete_post)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts", rejection(ServerError))]
struct PostsPath();

async fn list_posts(
    PostsPath(): PostsPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Vec<Post>>> {
    Ok(Json(db.fetch_posts().await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/new", rejection(ServerError))]
struct CreatePostPath();

async fn create_post(
    CreatePostPath(): CreatePostPath,
    State(db): State<Arc<DbClient>>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    Json(post): Json<CreatePost>,
) -> Result<Created<Post>> {
    let group = match post.group {
        Some(slug) => Some(
            db.fetch_group(&slug)
                .await?
                .ok_or(ServerError::GroupBySlugNotFound(slug))?
                .id,
        ),
        None => None,
    };

    let post = db
        .create_post(user.id, &PostFields::derive(post.message), group)
        .await?;

    info!(%user, post = %post.id, "Post created");
    Ok(Created(post))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/by/{username}", rejection(ServerError))]
struct UserPostsPath {
    username: String,
}

async fn get_user_posts(
    UserPostsPath { username }: UserPostsPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<UserPosts>> {
    let posts = db
        .fetch_user_posts(&username)
        .await?
        .ok_or(ServerError::UserByHandleNotFound(username))?;

    Ok(Json(posts))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/by/{username}/{id}", rejection(ServerError))]
struct UserPostPath {
    username: String,
    id: Id<PostMarker>,
}

async fn get_user_post(
    UserPostPath { username, id }: UserPostPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Post>> {
    let post = db
        .fetch_user_post(&username, id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(post))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

async fn update_post(
    PostPath { id }: PostPath,
    State(db): State<Arc<DbClient>>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    Json(update): Json<UpdatePost>,
) -> Result<Json<Post>> {
    let post = db
        .update_post(user.id, id, &PostFields::derive(update.message))
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(post))
}

async fn delete_post(
    PostPath { id }: PostPath,
    State(db): State<Arc<DbClient>>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
) -> Result<Json<Notice>> {
    if !db.delete_post(user.id, id).await? {
        return Err(ServerError::PostByIdNotFound(id));
    }

    info!(%user, post = %id, "Post deleted");
    Ok(Json(Notice::success("Post Deleted")))
}
