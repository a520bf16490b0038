use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    json::{Created, Json},
    notice::Notice,
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use simplesocial_common::{
    model::{
        group::{
            CreateGroup, Group, GroupDetail, GroupSummary, JoinOutcome, LeaveOutcome, UpdateGroup,
        },
        user::User,
    },
    slug::Slug,
};
use simplesocial_db::client::DbClient;
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(list_groups)
        .typed_post(create_group)
        .typed_get(get_group)
        .typed_patch(update_group)
        .typed_delete(delete_group)
        .typed_post(join_group)
        .typed_post(leave_group)
}

fn require_group_manager(user: &User) -> Result<()> {
    if user.permissions.can_manage_groups() {
        Ok(())
    } else {
        Err(ServerError::MissingPermission)
    }
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/groups", rejection(ServerError))]
struct GroupsPath();

async fn list_groups(
    GroupsPath(): GroupsPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Vec<GroupSummary>>> {
    Ok(Json(db.fetch_groups().await?))
}

async fn create_group(
    GroupsPath(): GroupsPath,
    State(db): State<Arc<DbClient>>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    Json(group): Json<CreateGroup>,
) -> Result<Created<Group>> {
    let group = db.create_group(&group.into_fields()?).await?;

    info!(%user, slug = %group.slug, "Group created");
    Ok(Created(group))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/groups/{slug}", rejection(ServerError))]
struct GroupPath {
    slug: Slug,
}

async fn get_group(
    GroupPath { slug }: GroupPath,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<GroupDetail>> {
    let detail = db
        .fetch_group_detail(&slug)
        .await?
        .ok_or(ServerError::GroupBySlugNotFound(slug))?;

    Ok(Json(detail))
}

async fn update_group(
    GroupPath { slug }: GroupPath,
    State(db): State<Arc<DbClient>>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
    Json(update): Json<UpdateGroup>,
) -> Result<Json<Group>> {
    require_group_manager(&user)?;

    let Some(current) = db.fetch_group(&slug).await? else {
        return Err(ServerError::GroupBySlugNotFound(slug));
    };
    let fields = update.apply_to(&current)?;

    let group = db
        .update_group(current.id, &fields)
        .await?
        .ok_or(ServerError::GroupBySlugNotFound(slug))?;

    info!(%user, slug = %group.slug, "Group updated");
    Ok(Json(group))
}

async fn delete_group(
    GroupPath { slug }: GroupPath,
    State(db): State<Arc<DbClient>>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
) -> Result<Json<Notice>> {
    require_group_manager(&user)?;

    if !db.delete_group(&slug).await? {
        return Err(ServerError::GroupBySlugNotFound(slug));
    }

    info!(%user, %slug, "Group deleted");
    Ok(Json(Notice::success("Group deleted")))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/groups/{slug}/join", rejection(ServerError))]
struct JoinGroupPath {
    slug: Slug,
}

async fn join_group(
    JoinGroupPath { slug }: JoinGroupPath,
    State(db): State<Arc<DbClient>>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
) -> Result<Json<Notice>> {
    let outcome = db
        .join_group(user.id, &slug)
        .await?
        .ok_or_else(|| ServerError::GroupBySlugNotFound(slug.clone()))?;

    let notice = match outcome {
        JoinOutcome::Joined(_) => Notice::success(format!("You are now a member of {slug}")),
        JoinOutcome::AlreadyMember => {
            Notice::warning(format!("You are already a member of {slug}"))
        }
    };
    Ok(Json(notice))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/groups/{slug}/leave", rejection(ServerError))]
struct LeaveGroupPath {
    slug: Slug,
}

async fn leave_group(
    LeaveGroupPath { slug }: LeaveGroupPath,
    State(db): State<Arc<DbClient>>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
) -> Result<Json<Notice>> {
    let outcome = db
        .leave_group(user.id, &slug)
        .await?
        .ok_or_else(|| ServerError::GroupBySlugNotFound(slug.clone()))?;

    let notice = match outcome {
        LeaveOutcome::Left => Notice::success(format!("You have left {slug}")),
        LeaveOutcome::NotMember => {
            Notice::warning(format!("You can't leave {slug} because you aren't in it"))
        }
    };
    Ok(Json(notice))
}
