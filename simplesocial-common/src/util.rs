use thiserror::Error;
use time::{Duration, UtcDateTime};

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Default, Hash)]
pub struct PositiveDuration(Duration);

impl PositiveDuration {
    #[must_use]
    pub fn new(duration: Duration) -> Option<Self> {
        duration.is_positive().then_some(Self(duration))
    }

    #[must_use]
    pub fn get(&self) -> Duration {
        self.0
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The duration is not positive: {0}")]
pub struct NonPositiveDurationError(Duration);

impl TryFrom<Duration> for PositiveDuration {
    type Error = NonPositiveDurationError;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(NonPositiveDurationError(value))
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
#[error("Timestamp of {0} milliseconds is out of range")]
pub struct TimestampOutOfRangeError(pub i64);

/// Milliseconds since the unix epoch, the representation used for storage and JSON.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn unix_millis(time: UtcDateTime) -> i64 {
    // Any representable UtcDateTime is far inside the i64 millisecond range.
    (time.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_unix_millis(millis: i64) -> Result<UtcDateTime, TimestampOutOfRangeError> {
    UtcDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|_| TimestampOutOfRangeError(millis))
}

/// `#[serde(with = "...")]` helper that writes a [`UtcDateTime`] as unix milliseconds.
pub mod unix_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use time::UtcDateTime;

    pub fn serialize<S: Serializer>(time: &UtcDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(super::unix_millis(*time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<UtcDateTime, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        super::from_unix_millis(millis).map_err(D::Error::custom)
    }
}
