use crate::{
    model::{Id, auth::HashedPassword, group::GroupRef},
    util::unix_millis_serde,
};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use time::UtcDateTime;

pub const USER_HANDLE_MAX_LEN: usize = 150;
pub const EMAIL_MAX_LEN: usize = 254;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

/// What a user may do beyond posting and joining groups.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Permissions {
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl Permissions {
    /// Editing and deleting groups.
    #[must_use]
    pub fn can_manage_groups(self) -> bool {
        self.is_active && (self.is_staff || self.is_superuser)
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            is_active: true,
            is_staff: false,
            is_superuser: false,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct User {
    pub id: Id<UserMarker>,
    pub handle: UserHandle,
    pub permissions: Permissions,
    #[serde(with = "unix_millis_serde")]
    pub date_joined: UtcDateTime,
}

impl Display for User {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.handle.get())
    }
}

/// A user as seen by themselves.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Account {
    #[serde(flatten)]
    pub user: User,
    pub email: EmailAddress,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CreateUser {
    pub handle: UserHandle,
    pub email: EmailAddress,
    pub password: HashedPassword,
    pub permissions: Permissions,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct UserProfile {
    pub user: User,
    pub groups: Vec<GroupRef>,
}

/// Display name, unique regardless of case.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct UserHandle(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The user handle is invalid: {0:?}")]
pub struct InvalidUserHandleError(String);

impl UserHandle {
    pub fn new(handle: String) -> Result<Self, InvalidUserHandleError> {
        let length = handle.chars().count();
        let legal_chars = handle
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));

        if (1..=USER_HANDLE_MAX_LEN).contains(&length) && legal_chars {
            Ok(UserHandle(handle))
        } else {
            Err(InvalidUserHandleError(handle))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    /// The form uniqueness and lookups are decided on.
    #[must_use]
    pub fn key(&self) -> String {
        handle_key(&self.0)
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Folds a handle so that any casing of it maps to the same key.
#[must_use]
pub fn handle_key(handle: &str) -> String {
    handle.to_lowercase()
}

impl<'de> Deserialize<'de> for UserHandle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        UserHandle::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"a user handle"))
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The email address is invalid: {0:?}")]
pub struct InvalidEmailError(String);

impl EmailAddress {
    /// Only checks the shape `local@domain`; deliverability is not our business.
    pub fn new(email: String) -> Result<Self, InvalidEmailError> {
        let trimmed = email.trim();
        let well_formed = match trimmed.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.is_empty()
                    && !domain.contains('@')
                    && !trimmed.contains(char::is_whitespace)
            }
            None => false,
        };

        if well_formed && trimmed.len() <= EMAIL_MAX_LEN {
            Ok(Self(trimmed.to_owned()))
        } else {
            Err(InvalidEmailError(email))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for EmailAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        EmailAddress::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"an email address"))
    }
}
