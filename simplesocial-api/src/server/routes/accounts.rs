use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    json::{Created, Json},
    notice::Notice,
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use simplesocial_common::{
    model::{
        auth::{AuthToken, Authentication, HashedPassword, Password},
        user::{Account, CreateUser, EmailAddress, Permissions, UserHandle},
    },
    util::PositiveDuration,
};
use simplesocial_db::client::DbClient;
use std::sync::Arc;
use time::UtcDateTime;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(signup)
        .typed_post(login)
        .typed_post(logout)
        .typed_get(get_account)
        .typed_delete(delete_account)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/accounts/signup", rejection(ServerError))]
struct SignupPath();

#[derive(Clone, Eq, PartialEq, Debug, Deserialize)]
struct SignupForm {
    username: UserHandle,
    email: EmailAddress,
    password1: String,
    password2: String,
}

async fn signup(
    SignupPath(): SignupPath,
    State(db): State<Arc<DbClient>>,
    Json(form): Json<SignupForm>,
) -> Result<Created<Account>> {
    if form.password1 != form.password2 {
        return Err(ServerError::PasswordMismatch);
    }
    let password = Password::new(form.password1)?.hash()?;

    let account = db
        .create_user(&CreateUser {
            handle: form.username,
            email: form.email,
            password,
            permissions: Permissions::default(),
        })
        .await?;

    Ok(Created(account))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/accounts/login", rejection(ServerError))]
struct LoginPath();

#[derive(Clone, Eq, PartialEq, Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct LoginResponse {
    token: String,
}

async fn login(
    LoginPath(): LoginPath,
    State(db): State<Arc<DbClient>>,
    State(token_lifetime): State<Option<PositiveDuration>>,
    Json(form): Json<LoginForm>,
) -> Result<Json<LoginResponse>> {
    let Some((user, password_hash)) = db.fetch_credentials(&form.username).await? else {
        HashedPassword::verify_unknown(&form.password);
        return Err(ServerError::InvalidCredentials);
    };

    if !password_hash.verify(&form.password)? || !user.permissions.is_active {
        return Err(ServerError::InvalidCredentials);
    }

    let token = AuthToken::generate_random(user.id);
    db.create_auth(&Authentication::issue(
        &token,
        UtcDateTime::now(),
        token_lifetime,
    )?)
    .await?;

    info!(%user, "Logged in");
    Ok(Json(LoginResponse {
        token: token.as_token_str(),
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/accounts/logout", rejection(ServerError))]
struct LogoutPath();

async fn logout(
    LogoutPath(): LogoutPath,
    State(db): State<Arc<DbClient>>,
    AuthenticatedUser { user, token_hash }: AuthenticatedUser,
) -> Result<Json<Notice>> {
    db.delete_auth(&token_hash).await?;

    info!(%user, "Logged out");
    Ok(Json(Notice::success("You have been logged out")))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/accounts/me", rejection(ServerError))]
struct AccountPath();

async fn get_account(
    AccountPath(): AccountPath,
    State(db): State<Arc<DbClient>>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
) -> Result<Json<Account>> {
    let account = db
        .fetch_account(user.id)
        .await?
        .ok_or_else(|| ServerError::UserByHandleNotFound(user.handle.into_inner()))?;

    Ok(Json(account))
}

async fn delete_account(
    AccountPath(): AccountPath,
    State(db): State<Arc<DbClient>>,
    AuthenticatedUser { user, .. }: AuthenticatedUser,
) -> Result<Json<Notice>> {
    if !db.delete_user(user.id).await? {
        return Err(ServerError::UserByHandleNotFound(user.handle.into_inner()));
    }

    info!(%user, "Deleted account");
    Ok(Json(Notice::success("Your account has been deleted")))
}
