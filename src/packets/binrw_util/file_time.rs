//! FILETIME is a wrapper around a u64 holding the number of 100-nanosecond
//! intervals since January 1, 1601 (UTC), per [MS-DTYP] 2.3.3.

use std::fmt::Display;
use std::ops::Deref;

use binrw::prelude::*;
use time::macros::datetime;
use time::{OffsetDateTime, PrimitiveDateTime};

#[derive(BinRead, BinWrite, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct FileTime {
    value: u64,
}

impl FileTime {
    const EPOCH: PrimitiveDateTime = datetime!(1601-01-01 00:00:00);
    /// Nanoseconds per FILETIME tick.
    const SCALE: u64 = 100;

    pub fn date_time(&self) -> PrimitiveDateTime {
        Self::EPOCH + core::time::Duration::from_nanos(self.value * Self::SCALE)
    }

    /// The current wall-clock time as a FILETIME.
    pub fn now() -> Self {
        let now = OffsetDateTime::now_utc();
        Self::from(PrimitiveDateTime::new(now.date(), now.time()))
    }
}

impl Display for FileTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.date_time().fmt(f)
    }
}

impl std::fmt::Debug for FileTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FileTime").field(&self.date_time()).finish()
    }
}

impl From<u64> for FileTime {
    fn from(value: u64) -> Self {
        Self { value }
    }
}

impl From<PrimitiveDateTime> for FileTime {
    fn from(dt: PrimitiveDateTime) -> Self {
        let duration = dt - Self::EPOCH;
        Self {
            value: duration.whole_nanoseconds() as u64 / Self::SCALE,
        }
    }
}

impl Deref for FileTime {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}
