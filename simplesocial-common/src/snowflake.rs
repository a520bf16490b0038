//! Time-ordered 64 bit ids.
//!
//! From the most significant bit down: 42 bits of milliseconds since the
//! epoch, 5 bits worker id, 5 bits process id and a 12 bit sequence number.

use derive_where::derive_where;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
};
use thiserror::Error;
use time::{Duration, UtcDateTime};

const TIMESTAMP_BITS: u32 = 42;
const NODE_ID_BITS: u32 = 5;
const SEQUENCE_BITS: u32 = 12;

const PROCESS_ID_SHIFT: u32 = SEQUENCE_BITS;
const WORKER_ID_SHIFT: u32 = PROCESS_ID_SHIFT + NODE_ID_BITS;
const TIMESTAMP_SHIFT: u32 = WORKER_ID_SHIFT + NODE_ID_BITS;

const MAX_TIMESTAMP: u64 = (1 << TIMESTAMP_BITS) - 1;
const MAX_NODE_ID: u8 = (1 << NODE_ID_BITS) - 1;
const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;

pub trait Epoch {
    const EPOCH_TIME: UtcDateTime;
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeTimestampError {
    #[error("Specified time was before the snowflake epoch")]
    TimeBeforeEpoch,
    #[error("Specified time is too far past the snowflake epoch")]
    TimestampTooLarge,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
#[error("Node id {0} is larger than {max}", max = MAX_NODE_ID)]
pub struct NodeIdOutOfRangeError(u8);

macro_rules! node_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize,
            Deserialize,
        )]
        #[serde(try_from = "u8", into = "u8")]
        pub struct $name(u8);

        impl $name {
            #[must_use]
            pub fn new(id: u8) -> Option<Self> {
                Self::try_from(id).ok()
            }

            #[must_use]
            pub fn get(self) -> u8 {
                self.0
            }
        }

        impl TryFrom<u8> for $name {
            type Error = NodeIdOutOfRangeError;

            fn try_from(id: u8) -> Result<Self, Self::Error> {
                if id <= MAX_NODE_ID {
                    Ok(Self(id))
                } else {
                    Err(NodeIdOutOfRangeError(id))
                }
            }
        }

        impl From<$name> for u8 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

node_id!(
    /// Which machine handed out an id.
    WorkerId
);
node_id!(
    /// Which process on its worker handed out an id.
    ProcessId
);

/// A snowflake taken apart.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct SnowflakeParts {
    pub timestamp_millis: u64,
    pub worker_id: WorkerId,
    pub process_id: ProcessId,
    pub sequence: u16,
}

impl SnowflakeParts {
    /// Fields wider than their slot are truncated.
    #[must_use]
    pub fn pack<SnowflakeEpoch>(self) -> Snowflake<SnowflakeEpoch> {
        let packed = (self.timestamp_millis & MAX_TIMESTAMP) << TIMESTAMP_SHIFT
            | u64::from(self.worker_id.get()) << WORKER_ID_SHIFT
            | u64::from(self.process_id.get()) << PROCESS_ID_SHIFT
            | u64::from(self.sequence & MAX_SEQUENCE);

        Snowflake::new(packed)
    }
}

#[derive_where(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snowflake<SnowflakeEpoch>(u64, #[serde(skip)] PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> Snowflake<SnowflakeEpoch> {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner, PhantomData)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn parts(self) -> SnowflakeParts {
        let node_id = |shift: u32| (self.0 >> shift) as u8 & MAX_NODE_ID;

        SnowflakeParts {
            timestamp_millis: self.0 >> TIMESTAMP_SHIFT,
            worker_id: WorkerId(node_id(WORKER_ID_SHIFT)),
            process_id: ProcessId(node_id(PROCESS_ID_SHIFT)),
            sequence: self.0 as u16 & MAX_SEQUENCE,
        }
    }

    #[must_use]
    pub fn created_at(self) -> UtcDateTime
    where
        SnowflakeEpoch: Epoch,
    {
        // 42 bits of milliseconds always fit into an i64.
        let millis = self.parts().timestamp_millis.cast_signed();
        SnowflakeEpoch::EPOCH_TIME + Duration::milliseconds(millis)
    }
}

impl<SnowflakeEpoch> Display for Snowflake<SnowflakeEpoch> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<SnowflakeEpoch> From<u64> for Snowflake<SnowflakeEpoch> {
    fn from(inner: u64) -> Self {
        Self::new(inner)
    }
}

impl<SnowflakeEpoch> From<Snowflake<SnowflakeEpoch>> for u64 {
    fn from(snowflake: Snowflake<SnowflakeEpoch>) -> Self {
        snowflake.0
    }
}

pub fn millis_since_epoch<SnowflakeEpoch: Epoch>(
    time: UtcDateTime,
) -> Result<u64, SnowflakeTimestampError> {
    let millis = u64::try_from((time - SnowflakeEpoch::EPOCH_TIME).whole_milliseconds())
        .map_err(|_| SnowflakeTimestampError::TimeBeforeEpoch)?;

    if millis > MAX_TIMESTAMP {
        Err(SnowflakeTimestampError::TimestampTooLarge)
    } else {
        Ok(millis)
    }
}

/// Hands out strictly increasing snowflakes, even if the clock stalls or steps back.
#[derive_where(Clone, Eq, PartialEq, Debug, Hash)]
pub struct SnowflakeGenerator<SnowflakeEpoch> {
    worker_id: WorkerId,
    process_id: ProcessId,
    last: Option<(u64, u16)>,
    epoch: PhantomData<SnowflakeEpoch>,
}

impl<SnowflakeEpoch: Epoch> SnowflakeGenerator<SnowflakeEpoch> {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            worker_id,
            process_id,
            last: None,
            epoch: PhantomData,
        }
    }

    pub fn generate_at(
        &mut self,
        time: UtcDateTime,
    ) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeTimestampError> {
        let now = millis_since_epoch::<SnowflakeEpoch>(time)?;

        let (timestamp_millis, sequence) = match self.last {
            Some((last, sequence)) if now <= last && sequence < MAX_SEQUENCE => {
                (last, sequence + 1)
            }
            // Sequence exhausted; borrow the next millisecond.
            Some((last, _)) if now <= last => (last + 1, 0),
            _ => (now, 0),
        };
        if timestamp_millis > MAX_TIMESTAMP {
            return Err(SnowflakeTimestampError::TimestampTooLarge);
        }
        self.last = Some((timestamp_millis, sequence));

        Ok(SnowflakeParts {
            timestamp_millis,
            worker_id: self.worker_id,
            process_id: self.process_id,
            sequence,
        }
        .pack())
    }

    pub fn generate(&mut self) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeTimestampError> {
        self.generate_at(UtcDateTime::now())
    }
}

#[cfg(test)]
mod tests {
    use crate::snowflake::{
        Epoch, MAX_SEQUENCE, ProcessId, Snowflake, SnowflakeGenerator, SnowflakeParts,
        SnowflakeTimestampError, WorkerId, millis_since_epoch,
    };
    use time::{Duration, UtcDateTime, macros::utc_datetime};

    struct TestEpoch;
    impl Epoch for TestEpoch {
        const EPOCH_TIME: UtcDateTime = utc_datetime!(2020-01-01 00:00);
    }

    fn generator() -> SnowflakeGenerator<TestEpoch> {
        SnowflakeGenerator::new(WorkerId::new(3).unwrap(), ProcessId::new(7).unwrap())
    }

    #[test]
    fn node_ids_fit_in_five_bits() {
        assert_eq!(WorkerId::new(31).map(WorkerId::get), Some(31));
        assert!(WorkerId::new(32).is_none());
        assert!(ProcessId::new(u8::MAX).is_none());

        assert_eq!(serde_json::from_str::<ProcessId>("4").unwrap().get(), 4);
        assert!(serde_json::from_str::<ProcessId>("40").is_err());
    }

    #[test]
    fn epoch_bounds() {
        let epoch = TestEpoch::EPOCH_TIME;

        assert_eq!(millis_since_epoch::<TestEpoch>(epoch), Ok(0));
        assert_eq!(
            millis_since_epoch::<TestEpoch>(epoch + Duration::seconds(2)),
            Ok(2000)
        );
        assert_eq!(
            millis_since_epoch::<TestEpoch>(epoch - Duration::milliseconds(1)),
            Err(SnowflakeTimestampError::TimeBeforeEpoch)
        );
        assert_eq!(
            millis_since_epoch::<TestEpoch>(epoch + Duration::milliseconds(1 << 42)),
            Err(SnowflakeTimestampError::TimestampTooLarge)
        );
    }

    #[test]
    fn parts_unpack_to_what_was_packed() {
        let parts = SnowflakeParts {
            timestamp_millis: 987_654_321,
            worker_id: WorkerId::new(0b10110).unwrap(),
            process_id: ProcessId::new(0b01001).unwrap(),
            sequence: 4000,
        };
        let snowflake: Snowflake<TestEpoch> = parts.pack();

        assert_eq!(snowflake.parts(), parts);
        assert_eq!(
            snowflake.created_at(),
            TestEpoch::EPOCH_TIME + Duration::milliseconds(987_654_321)
        );
    }

    #[test]
    fn same_millisecond_bumps_sequence() {
        let mut generator = generator();
        let time = utc_datetime!(2025-03-14 15:09);

        let first = generator.generate_at(time).unwrap();
        let second = generator.generate_at(time).unwrap();

        assert_eq!(first.parts().sequence, 0);
        assert_eq!(second.parts().sequence, 1);
        assert!(first < second);
        assert_eq!(first.created_at(), time);
        assert_eq!(second.parts().worker_id.get(), 3);
        assert_eq!(second.parts().process_id.get(), 7);
    }

    #[test]
    fn clock_going_backwards_keeps_order() {
        let mut generator = generator();
        let time = utc_datetime!(2025-03-14 15:09);

        let before = generator.generate_at(time).unwrap();
        let after = generator
            .generate_at(time - Duration::seconds(5))
            .unwrap();

        assert!(before < after);
        assert_eq!(after.created_at(), time);
    }

    #[test]
    fn exhausted_sequence_moves_to_next_millisecond() {
        let mut generator = generator();
        let time = utc_datetime!(2025-03-14 15:09);

        let mut previous = generator.generate_at(time).unwrap();
        for _ in 0..MAX_SEQUENCE {
            let next = generator.generate_at(time).unwrap();
            assert!(previous < next);
            previous = next;
        }
        assert_eq!(previous.parts().sequence, MAX_SEQUENCE);

        let overflow = generator.generate_at(time).unwrap();
        assert!(previous < overflow);
        assert_eq!(overflow.parts().sequence, 0);
        assert_eq!(overflow.created_at(), time + Duration::milliseconds(1));
    }
}
