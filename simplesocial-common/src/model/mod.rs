pub mod auth;
pub mod group;
pub mod post;
pub mod user;

use crate::{
    model::{
        auth::InvalidAuthTokenHashError,
        group::InvalidGroupNameError,
        post::InvalidPostMessageError,
        user::{InvalidEmailError, InvalidUserHandleError},
    },
    slug::InvalidSlugError,
    snowflake::{Epoch, Snowflake, SnowflakeGenerator},
    util::{NonPositiveDurationError, TimestampOutOfRangeError},
};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, marker::PhantomData};
use thiserror::Error;
use time::{UtcDateTime, macros::utc_datetime};

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    UserHandle(#[from] InvalidUserHandleError),
    #[error(transparent)]
    Email(#[from] InvalidEmailError),
    #[error(transparent)]
    GroupName(#[from] InvalidGroupNameError),
    #[error(transparent)]
    Slug(#[from] InvalidSlugError),
    #[error(transparent)]
    PostMessage(#[from] InvalidPostMessageError),
    #[error(transparent)]
    NonPositiveDuration(#[from] NonPositiveDurationError),
    #[error(transparent)]
    TokenHash(#[from] InvalidAuthTokenHashError),
    #[error(transparent)]
    Timestamp(#[from] TimestampOutOfRangeError),
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct SimplesocialEpoch;
impl Epoch for SimplesocialEpoch {
    const EPOCH_TIME: UtcDateTime = utc_datetime!(2025-01-01 00:00);
}

pub type SimplesocialSnowflake = Snowflake<SimplesocialEpoch>;
pub type SimplesocialSnowflakeGenerator = SnowflakeGenerator<SimplesocialEpoch>;

/// A snowflake tagged with the kind of record it identifies.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Id<Marker>(
    SimplesocialSnowflake,
    #[serde(skip)] PhantomData<Marker>,
);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: SimplesocialSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    /// The representation stored in the database.
    #[must_use]
    pub fn to_db(self) -> i64 {
        self.0.get().cast_signed()
    }

    #[must_use]
    pub fn from_db(value: i64) -> Self {
        value.cast_unsigned().into()
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> From<SimplesocialSnowflake> for Id<Marker> {
    fn from(value: SimplesocialSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(SimplesocialSnowflake::new(value))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{Id, user::UserMarker};

    #[test]
    fn db_representation_keeps_high_bit() {
        let id = Id::<UserMarker>::from(u64::MAX - 5);

        assert!(id.to_db() < 0);
        assert_eq!(Id::<UserMarker>::from_db(id.to_db()), id);
    }

    #[test]
    fn id_is_a_bare_number_in_json() {
        let id = Id::<UserMarker>::from(42);

        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        assert_eq!(serde_json::from_str::<Id<UserMarker>>("42").unwrap(), id);
    }
}
