use std::ops::Sub;
use time::{
    format_description::well_known::Rfc3339, Duration, OffsetDateTime, PrimitiveDateTime,
    UtcOffset,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(PrimitiveDateTime);

impl UtcDateTime {
    pub fn assume_utc(datetime: PrimitiveDateTime) -> UtcDateTime {
        UtcDateTime(datetime)
    }

    pub fn now() -> UtcDateTime {
        UtcDateTime::from(OffsetDateTime::now_utc())
    }

    pub fn to_rfc3339(&self) -> Result<String, time::error::Format> {
        OffsetDateTime::from(*self).format(&Rfc3339)
    }

    /// `None` if the result falls outside the representable range.
    pub fn checked_add(self, duration: Duration) -> Option<UtcDateTime> {
        self.0.checked_add(duration).map(UtcDateTime)
    }
}

impl From<OffsetDateTime> for UtcDateTime {
    fn from(value: OffsetDateTime) -> Self {
        let value_utc = value.to_offset(UtcOffset::UTC);
        UtcDateTime(PrimitiveDateTime::new(value_utc.date(), value_utc.time()))
    }
}

impl From<UtcDateTime> for OffsetDateTime {
    fn from(value: UtcDateTime) -> Self {
        value.0.assume_utc()
    }
}

impl Sub<UtcDateTime> for UtcDateTime {
    type Output = Duration;

    fn sub(self, rhs: UtcDateTime) -> Self::Output {
        self.0 - rhs.0
    }
}
