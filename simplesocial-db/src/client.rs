use crate::record::{
    AccountRecord, AuthenticationRecord, CredentialsRecord, FullPostRecord, GroupRecord,
    GroupRefRecord, GroupSummaryRecord, UserRecord,
};
use simplesocial_common::{
    model::{
        Id, ModelValidationError, SimplesocialSnowflakeGenerator,
        auth::{AuthTokenHash, Authentication, HashedPassword},
        group::{
            Group, GroupDetail, GroupFields, GroupMarker, GroupRef, GroupSummary, JoinOutcome,
            LeaveOutcome, Membership,
        },
        post::{Post, PostFields, PostMarker, UserPosts},
        user::{Account, CreateUser, User, UserMarker, handle_key},
    },
    slug::Slug,
    snowflake::{ProcessId, SnowflakeTimestampError, WorkerId},
    util::unix_millis,
};
use sqlx::{
    SqliteExecutor, SqlitePool,
    migrate::MigrateError,
    query, query_as,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
    sync::{Mutex, PoisonError},
};
use thiserror::Error;
use time::UtcDateTime;
use tracing::{debug, info};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("A {0} with the same key already exists")]
    Conflict(UniqueViolation),
    #[error("Could not generate an id: {0}")]
    Snowflake(#[from] SnowflakeTimestampError),
    #[error("Could not migrate the database: {0}")]
    Migrate(#[from] MigrateError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Which uniqueness rule a write ran into.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum UniqueViolation {
    /// Handles are unique regardless of case.
    UserHandle,
    /// Group names and the slugs derived from them.
    Group,
    /// A user can't post the same message twice.
    Post,
}

impl Display for UniqueViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            UniqueViolation::UserHandle => "user",
            UniqueViolation::Group => "group",
            UniqueViolation::Post => "post",
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

trait ConflictExt<T> {
    fn or_conflict(self, violation: UniqueViolation) -> Result<T>;
}

impl<T> ConflictExt<T> for std::result::Result<T, sqlx::Error> {
    fn or_conflict(self, violation: UniqueViolation) -> Result<T> {
        self.map_err(|err| {
            if is_unique_violation(&err) {
                debug!(%violation, "Write rejected by uniqueness constraint");
                DbError::Conflict(violation)
            } else {
                DbError::Sqlx(err)
            }
        })
    }
}

fn convert_all<R, T>(records: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = ModelValidationError>,
{
    records
        .into_iter()
        .map(T::try_from)
        .collect::<Result<_, _>>()
        .map_err(DbError::from)
}

const USER_COLUMNS: &str = "
    users.user_snowflake,
    users.handle,
    users.is_active,
    users.is_staff,
    users.is_superuser,
    users.date_joined";

const GROUP_COLUMNS: &str = "
    social_groups.group_snowflake,
    social_groups.name,
    social_groups.slug,
    social_groups.description,
    social_groups.description_html";

const POST_SELECT: &str = "
    SELECT
        posts.post_snowflake,
        posts.message,
        posts.message_html,
        posts.created_at,
        users.user_snowflake,
        users.handle,
        users.is_active,
        users.is_staff,
        users.is_superuser,
        users.date_joined,
        social_groups.group_snowflake,
        social_groups.name AS group_name,
        social_groups.slug AS group_slug
    FROM
        posts
        JOIN users ON users.user_snowflake = posts.user_snowflake
        LEFT JOIN social_groups ON social_groups.group_snowflake = posts.group_snowflake";

const POST_ORDER: &str = "ORDER BY posts.created_at DESC, posts.post_snowflake DESC";

#[derive(Debug)]
pub struct DbClient {
    pool: SqlitePool,
    snowflake_generator: Mutex<SimplesocialSnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: SqlitePool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        let snowflake_generator = Mutex::new(SimplesocialSnowflakeGenerator::new(
            worker_id, process_id,
        ));

        Self {
            pool,
            snowflake_generator,
        }
    }

    /// Opens (creating if needed) the database at `database_url` and brings its schema up to date.
    ///
    /// An in-memory database only lives as long as its connection, so give it a
    /// single connection.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        worker_id: WorkerId,
        process_id: ProcessId,
    ) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let client = Self::new(pool, worker_id, process_id);
        client.migrate().await?;

        Ok(client)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        info!("Database schema is up to date");
        Ok(())
    }

    fn next_id<Marker>(&self) -> Result<Id<Marker>> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()?;

        Ok(snowflake.into())
    }

    pub async fn create_user(&self, user: &CreateUser) -> Result<Account> {
        let user_id = self.next_id::<UserMarker>()?;

        let record = query_as::<_, AccountRecord>(&format!(
            "
            INSERT INTO users (
                user_snowflake, handle, handle_key, email, password_hash,
                is_active, is_staff, is_superuser, date_joined
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {USER_COLUMNS}, users.email
            "
        ))
        .bind(user_id.to_db())
        .bind(user.handle.get())
        .bind(user.handle.key())
        .bind(user.email.get())
        .bind(user.password.as_phc())
        .bind(user.permissions.is_active)
        .bind(user.permissions.is_staff)
        .bind(user.permissions.is_superuser)
        .bind(unix_millis(UtcDateTime::now()))
        .fetch_one(&self.pool)
        .await
        .or_conflict(UniqueViolation::UserHandle)?;

        let account = Account::try_from(record)?;
        info!(user = %account.user, "Created user");
        Ok(account)
    }

    pub async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(&format!(
            "
            SELECT {USER_COLUMNS}
            FROM users
            WHERE users.user_snowflake = ?
            "
        ))
        .bind(user_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(User::try_from).transpose()?)
    }

    /// Handles match regardless of case.
    pub async fn fetch_user_by_handle(&self, handle: &str) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(&format!(
            "
            SELECT {USER_COLUMNS}
            FROM users
            WHERE users.handle_key = ?
            "
        ))
        .bind(handle_key(handle))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(User::try_from).transpose()?)
    }

    pub async fn fetch_account(&self, user_id: Id<UserMarker>) -> Result<Option<Account>> {
        let record = query_as::<_, AccountRecord>(&format!(
            "
            SELECT {USER_COLUMNS}, users.email
            FROM users
            WHERE users.user_snowflake = ?
            "
        ))
        .bind(user_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Account::try_from).transpose()?)
    }

    pub async fn fetch_credentials(&self, handle: &str) -> Result<Option<(User, HashedPassword)>> {
        let record = query_as::<_, CredentialsRecord>(&format!(
            "
            SELECT {USER_COLUMNS}, users.password_hash
            FROM users
            WHERE users.handle_key = ?
            "
        ))
        .bind(handle_key(handle))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(<(User, HashedPassword)>::try_from).transpose()?)
    }

    /// Memberships, posts and auth tokens of the user go with it.
    pub async fn delete_user(&self, user_id: Id<UserMarker>) -> Result<bool> {
        let result = query("DELETE FROM users WHERE user_snowflake = ?")
            .bind(user_id.to_db())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn fetch_user_groups(&self, user_id: Id<UserMarker>) -> Result<Vec<GroupRef>> {
        let records = query_as::<_, GroupRefRecord>(
            "
            SELECT
                social_groups.group_snowflake,
                social_groups.name,
                social_groups.slug
            FROM
                group_members
                JOIN social_groups
                    ON social_groups.group_snowflake = group_members.group_snowflake
            WHERE group_members.user_snowflake = ?
            ORDER BY social_groups.name
            ",
        )
        .bind(user_id.to_db())
        .fetch_all(&self.pool)
        .await?;

        convert_all(records)
    }

    pub async fn create_auth(&self, authentication: &Authentication) -> Result<()> {
        query(
            "
            INSERT INTO authentications (
                token_hash, user_snowflake, created_at, expires_after_seconds
            )
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(authentication.token_hash.as_bytes())
        .bind(authentication.user.to_db())
        .bind(unix_millis(authentication.created_at))
        .bind(
            authentication
                .expires_after
                .map(|lifetime| lifetime.get().whole_seconds()),
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fetch_auth(&self, token_hash: &AuthTokenHash) -> Result<Option<Authentication>> {
        let record = query_as::<_, AuthenticationRecord>(
            "
            SELECT
                authentications.user_snowflake,
                authentications.token_hash,
                authentications.created_at,
                authentications.expires_after_seconds
            FROM authentications
            WHERE authentications.token_hash = ?
            ",
        )
        .bind(token_hash.as_bytes())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Authentication::try_from).transpose()?)
    }

    pub async fn delete_auth(&self, token_hash: &AuthTokenHash) -> Result<bool> {
        let result = query("DELETE FROM authentications WHERE token_hash = ?")
            .bind(token_hash.as_bytes())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn create_group(&self, fields: &GroupFields) -> Result<Group> {
        let group_id = self.next_id::<GroupMarker>()?;

        let record = query_as::<_, GroupRecord>(&format!(
            "
            INSERT INTO social_groups (
                group_snowflake, name, slug, description, description_html
            )
            VALUES (?, ?, ?, ?, ?)
            RETURNING {GROUP_COLUMNS}
            "
        ))
        .bind(group_id.to_db())
        .bind(fields.name().get())
        .bind(fields.slug().get())
        .bind(fields.description())
        .bind(fields.description_html())
        .fetch_one(&self.pool)
        .await
        .or_conflict(UniqueViolation::Group)?;

        let group = Group::try_from(record)?;
        info!(slug = %group.slug, "Created group");
        Ok(group)
    }

    /// Rewrites every column of the group, derived ones included.
    pub async fn update_group(
        &self,
        group_id: Id<GroupMarker>,
        fields: &GroupFields,
    ) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(&format!(
            "
            UPDATE social_groups
            SET name = ?, slug = ?, description = ?, description_html = ?
            WHERE group_snowflake = ?
            RETURNING {GROUP_COLUMNS}
            "
        ))
        .bind(fields.name().get())
        .bind(fields.slug().get())
        .bind(fields.description())
        .bind(fields.description_html())
        .bind(group_id.to_db())
        .fetch_optional(&self.pool)
        .await
        .or_conflict(UniqueViolation::Group)?;

        Ok(record.map(Group::try_from).transpose()?)
    }

    pub async fn fetch_group(&self, slug: &Slug) -> Result<Option<Group>> {
        group_by_slug(&self.pool, slug).await
    }

    pub async fn fetch_groups(&self) -> Result<Vec<GroupSummary>> {
        let records = query_as::<_, GroupSummaryRecord>(&format!(
            "
            SELECT
                {GROUP_COLUMNS},
                (
                    SELECT COUNT(*) FROM group_members
                    WHERE group_members.group_snowflake = social_groups.group_snowflake
                ) AS member_count,
                (
                    SELECT COUNT(*) FROM posts
                    WHERE posts.group_snowflake = social_groups.group_snowflake
                ) AS post_count
            FROM social_groups
            ORDER BY social_groups.name
            "
        ))
        .fetch_all(&self.pool)
        .await?;

        convert_all(records)
    }

    /// Reads the group, its members and its posts from one snapshot.
    pub async fn fetch_group_detail(&self, slug: &Slug) -> Result<Option<GroupDetail>> {
        let mut transaction = self.pool.begin().await?;

        let Some(group) = group_by_slug(&mut *transaction, slug).await? else {
            return Ok(None);
        };
        let members = group_members(&mut *transaction, group.id).await?;
        let posts = group_posts(&mut *transaction, group.id).await?;

        transaction.commit().await?;

        Ok(Some(GroupDetail {
            group,
            members,
            posts,
        }))
    }

    pub async fn fetch_group_members(&self, group_id: Id<GroupMarker>) -> Result<Vec<User>> {
        group_members(&self.pool, group_id).await
    }

    /// Memberships and posts of the group go with it.
    pub async fn delete_group(&self, slug: &Slug) -> Result<bool> {
        let result = query("DELETE FROM social_groups WHERE slug = ?")
            .bind(slug.get())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            info!(%slug, "Deleted group");
        }
        Ok(result.rows_affected() > 0)
    }

    /// `None` if there is no group with that slug.
    pub async fn join_group(
        &self,
        user_id: Id<UserMarker>,
        slug: &Slug,
    ) -> Result<Option<JoinOutcome>> {
        let Some(group) = self.fetch_group(slug).await? else {
            return Ok(None);
        };
        let membership = Membership {
            id: self.next_id()?,
            group: group.id,
            user: user_id,
        };

        let inserted = query(
            "
            INSERT INTO group_members (membership_snowflake, group_snowflake, user_snowflake)
            VALUES (?, ?, ?)
            ",
        )
        .bind(membership.id.to_db())
        .bind(membership.group.to_db())
        .bind(membership.user.to_db())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(Some(JoinOutcome::Joined(membership))),
            // Also what the loser of two simultaneous joins sees.
            Err(err) if is_unique_violation(&err) => Ok(Some(JoinOutcome::AlreadyMember)),
            // The group was deleted since we looked it up.
            Err(err) if is_foreign_key_violation(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// `None` if there is no group with that slug.
    pub async fn leave_group(
        &self,
        user_id: Id<UserMarker>,
        slug: &Slug,
    ) -> Result<Option<LeaveOutcome>> {
        let Some(group) = self.fetch_group(slug).await? else {
            return Ok(None);
        };

        let result = query(
            "
            DELETE FROM group_members
            WHERE group_snowflake = ? AND user_snowflake = ?
            ",
        )
        .bind(group.id.to_db())
        .bind(user_id.to_db())
        .execute(&self.pool)
        .await?;

        Ok(Some(if result.rows_affected() > 0 {
            LeaveOutcome::Left
        } else {
            LeaveOutcome::NotMember
        }))
    }

    pub async fn create_post(
        &self,
        author: Id<UserMarker>,
        fields: &PostFields,
        group: Option<Id<GroupMarker>>,
    ) -> Result<Post> {
        let post_id = self.next_id::<PostMarker>()?;

        query(
            "
            INSERT INTO posts (
                post_snowflake, user_snowflake, group_snowflake,
                message, message_html, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(post_id.to_db())
        .bind(author.to_db())
        .bind(group.map(Id::to_db))
        .bind(fields.message().get())
        .bind(fields.message_html())
        .bind(unix_millis(UtcDateTime::now()))
        .execute(&self.pool)
        .await
        .or_conflict(UniqueViolation::Post)?;

        self.fetch_post(post_id)
            .await?
            .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = query_as::<_, FullPostRecord>(&format!(
            "{POST_SELECT} WHERE posts.post_snowflake = ?"
        ))
        .bind(post_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Post::try_from).transpose()?)
    }

    /// Only finds the post if `handle` (in any case) wrote it.
    pub async fn fetch_user_post(
        &self,
        handle: &str,
        post_id: Id<PostMarker>,
    ) -> Result<Option<Post>> {
        let record = query_as::<_, FullPostRecord>(&format!(
            "{POST_SELECT} WHERE posts.post_snowflake = ? AND users.handle_key = ?"
        ))
        .bind(post_id.to_db())
        .bind(handle_key(handle))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Post::try_from).transpose()?)
    }

    pub async fn fetch_posts(&self) -> Result<Vec<Post>> {
        let records = query_as::<_, FullPostRecord>(&format!("{POST_SELECT} {POST_ORDER}"))
            .fetch_all(&self.pool)
            .await?;

        convert_all(records)
    }

    /// `None` if no user has that handle.
    pub async fn fetch_user_posts(&self, handle: &str) -> Result<Option<UserPosts>> {
        let Some(user) = self.fetch_user_by_handle(handle).await? else {
            return Ok(None);
        };

        let records = query_as::<_, FullPostRecord>(&format!(
            "{POST_SELECT} WHERE posts.user_snowflake = ? {POST_ORDER}"
        ))
        .bind(user.id.to_db())
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(UserPosts {
            user,
            posts: convert_all(records)?,
        }))
    }

    /// Restamps `created_at`. A post of someone else is as good as missing.
    pub async fn update_post(
        &self,
        owner: Id<UserMarker>,
        post_id: Id<PostMarker>,
        fields: &PostFields,
    ) -> Result<Option<Post>> {
        let result = query(
            "
            UPDATE posts
            SET message = ?, message_html = ?, created_at = ?
            WHERE post_snowflake = ? AND user_snowflake = ?
            ",
        )
        .bind(fields.message().get())
        .bind(fields.message_html())
        .bind(unix_millis(UtcDateTime::now()))
        .bind(post_id.to_db())
        .bind(owner.to_db())
        .execute(&self.pool)
        .await
        .or_conflict(UniqueViolation::Post)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch_post(post_id).await
    }

    /// A post of someone else is as good as missing.
    pub async fn delete_post(
        &self,
        owner: Id<UserMarker>,
        post_id: Id<PostMarker>,
    ) -> Result<bool> {
        let result = query("DELETE FROM posts WHERE post_snowflake = ? AND user_snowflake = ?")
            .bind(post_id.to_db())
            .bind(owner.to_db())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

async fn group_by_slug<'e>(
    executor: impl SqliteExecutor<'e>,
    slug: &Slug,
) -> Result<Option<Group>> {
    let record = query_as::<_, GroupRecord>(&format!(
        "
        SELECT {GROUP_COLUMNS}
        FROM social_groups
        WHERE social_groups.slug = ?
        "
    ))
    .bind(slug.get())
    .fetch_optional(executor)
    .await?;

    Ok(record.map(Group::try_from).transpose()?)
}

async fn group_members<'e>(
    executor: impl SqliteExecutor<'e>,
    group_id: Id<GroupMarker>,
) -> Result<Vec<User>> {
    let records = query_as::<_, UserRecord>(&format!(
        "
        SELECT {USER_COLUMNS}
        FROM
            group_members
            JOIN users ON users.user_snowflake = group_members.user_snowflake
        WHERE group_members.group_snowflake = ?
        ORDER BY users.handle
        "
    ))
    .bind(group_id.to_db())
    .fetch_all(executor)
    .await?;

    convert_all(records)
}

async fn group_posts<'e>(
    executor: impl SqliteExecutor<'e>,
    group_id: Id<GroupMarker>,
) -> Result<Vec<Post>> {
    let records = query_as::<_, FullPostRecord>(&format!(
        "{POST_SELECT} WHERE posts.group_snowflake = ? {POST_ORDER}"
    ))
    .bind(group_id.to_db())
    .fetch_all(executor)
    .await?;

    convert_all(records)
}
