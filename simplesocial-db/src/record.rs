use simplesocial_common::{
    model::{
        Id, ModelValidationError,
        auth::{AuthTokenHash, Authentication, HashedPassword},
        group::{Group, GroupName, GroupRef, GroupSummary},
        post::{Post, PostMessage},
        user::{Account, EmailAddress, Permissions, User, UserHandle},
    },
    slug::Slug,
    util::from_unix_millis,
};
use sqlx::FromRow;
use time::Duration;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_snowflake: i64,
    pub handle: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: i64,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct AccountRecord {
    #[sqlx(flatten)]
    pub user: UserRecord,
    pub email: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct CredentialsRecord {
    #[sqlx(flatten)]
    pub user: UserRecord,
    pub password_hash: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct GroupRecord {
    pub group_snowflake: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub description_html: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct GroupSummaryRecord {
    #[sqlx(flatten)]
    pub group: GroupRecord,
    pub member_count: i64,
    pub post_count: i64,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct GroupRefRecord {
    pub group_snowflake: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct FullPostRecord {
    pub post_snowflake: i64,
    pub message: String,
    pub message_html: String,
    pub created_at: i64,
    #[sqlx(flatten)]
    pub author: UserRecord,
    pub group_snowflake: Option<i64>,
    pub group_name: Option<String>,
    pub group_slug: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct AuthenticationRecord {
    pub user_snowflake: i64,
    pub token_hash: Vec<u8>,
    pub created_at: i64,
    pub expires_after_seconds: Option<i64>,
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.user_snowflake),
            handle: UserHandle::new(value.handle)?,
            permissions: Permissions {
                is_active: value.is_active,
                is_staff: value.is_staff,
                is_superuser: value.is_superuser,
            },
            date_joined: from_unix_millis(value.date_joined)?,
        })
    }
}

impl TryFrom<AccountRecord> for Account {
    type Error = ModelValidationError;

    fn try_from(value: AccountRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: value.user.try_into()?,
            email: EmailAddress::new(value.email)?,
        })
    }
}

impl TryFrom<CredentialsRecord> for (User, HashedPassword) {
    type Error = ModelValidationError;

    fn try_from(value: CredentialsRecord) -> Result<Self, Self::Error> {
        Ok((
            value.user.try_into()?,
            HashedPassword::from_phc(value.password_hash),
        ))
    }
}

impl TryFrom<GroupRecord> for Group {
    type Error = ModelValidationError;

    fn try_from(value: GroupRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.group_snowflake),
            name: GroupName::new(value.name)?,
            slug: Slug::parse(value.slug)?,
            description: value.description,
            description_html: value.description_html,
        })
    }
}

impl TryFrom<GroupSummaryRecord> for GroupSummary {
    type Error = ModelValidationError;

    fn try_from(value: GroupSummaryRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            group: value.group.try_into()?,
            member_count: value.member_count.cast_unsigned(),
            post_count: value.post_count.cast_unsigned(),
        })
    }
}

impl TryFrom<GroupRefRecord> for GroupRef {
    type Error = ModelValidationError;

    fn try_from(value: GroupRefRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.group_snowflake),
            name: GroupName::new(value.name)?,
            slug: Slug::parse(value.slug)?,
        })
    }
}

impl TryFrom<FullPostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: FullPostRecord) -> Result<Self, Self::Error> {
        // The left join yields all three group columns or none of them.
        let group = match (value.group_snowflake, value.group_name, value.group_slug) {
            (Some(group_snowflake), Some(name), Some(slug)) => Some(
                GroupRefRecord {
                    group_snowflake,
                    name,
                    slug,
                }
                .try_into()?,
            ),
            _ => None,
        };

        Ok(Self {
            id: Id::from_db(value.post_snowflake),
            author: value.author.try_into()?,
            group,
            message: PostMessage::new(value.message)?,
            message_html: value.message_html,
            created_at: from_unix_millis(value.created_at)?,
        })
    }
}

impl TryFrom<AuthenticationRecord> for Authentication {
    type Error = ModelValidationError;

    fn try_from(value: AuthenticationRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: Id::from_db(value.user_snowflake),
            token_hash: AuthTokenHash::try_from(value.token_hash)?,
            created_at: from_unix_millis(value.created_at)?,
            expires_after: value
                .expires_after_seconds
                .map(|seconds| Duration::seconds(seconds).try_into())
                .transpose()?,
        })
    }
}
