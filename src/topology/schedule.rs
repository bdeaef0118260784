//! Weekly replication schedule
//!
//! A 7 x 24 grid with four 15-minute slots per hour. On the wire it is a
//! 188-byte blob: a 20-byte header (total size, bandwidth, schedule count,
//! schedule type, data offset; little-endian u32 each) followed by one byte
//! per hour whose low nibble holds the four quarter-hour slots.

use chrono::Weekday;

use crate::error::{DirectoryError, DirectoryResult};

pub const SCHEDULE_BLOB_LEN: usize = 188;
const HEADER_LEN: usize = 20;
const HOURS_PER_WEEK: usize = 7 * 24;
const SCHEDULE_TYPE_INTERVAL: u32 = 0;

/// Slot within an hour
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QuarterHour {
    Zero = 0,
    Fifteen = 1,
    Thirty = 2,
    FortyFive = 3,
}

impl QuarterHour {
    /// Only 0, 15, 30 and 45 are valid.
    pub fn from_minute(minute: u32) -> DirectoryResult<Self> {
        match minute {
            0 => Ok(QuarterHour::Zero),
            15 => Ok(QuarterHour::Fifteen),
            30 => Ok(QuarterHour::Thirty),
            45 => Ok(QuarterHour::FortyFive),
            _ => Err(DirectoryError::invalid_argument(
                "minute",
                "must be 0, 15, 30 or 45",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    hours: [u8; HOURS_PER_WEEK],
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

fn check_hour(hour: u32) -> DirectoryResult<usize> {
    if hour > 23 {
        return Err(DirectoryError::invalid_argument("hour", "must be 0..=23"));
    }
    Ok(hour as usize)
}

fn slot(day: Weekday, hour: usize, quarter: QuarterHour) -> usize {
    (day.num_days_from_sunday() as usize * 24 + hour) * 4 + quarter as usize
}

impl Schedule {
    /// No slot available
    pub fn new() -> Self {
        Self {
            hours: [0; HOURS_PER_WEEK],
        }
    }

    /// Every slot available
    pub fn always() -> Self {
        Self {
            hours: [0x0F; HOURS_PER_WEEK],
        }
    }

    pub fn is_available(&self, day: Weekday, hour: u32, quarter: QuarterHour) -> DirectoryResult<bool> {
        let index = slot(day, check_hour(hour)?, quarter);
        Ok(self.hours[index / 4] & (1 << (index % 4)) != 0)
    }

    /// Mark slots available from `from` through `to`, both inclusive.
    pub fn set_range(
        &mut self,
        day: Weekday,
        from_hour: u32,
        from: QuarterHour,
        to_hour: u32,
        to: QuarterHour,
    ) -> DirectoryResult<()> {
        let start = slot(day, check_hour(from_hour)?, from);
        let end = slot(day, check_hour(to_hour)?, to);
        if end < start {
            return Err(DirectoryError::invalid_argument("to", "range ends before it starts"));
        }
        for index in start..=end {
            self.hours[index / 4] |= 1 << (index % 4);
        }
        Ok(())
    }

    /// Same range on every day of the week.
    pub fn set_daily_range(
        &mut self,
        from_hour: u32,
        from: QuarterHour,
        to_hour: u32,
        to: QuarterHour,
    ) -> DirectoryResult<()> {
        for day in [
            Weekday::Sun,
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
        ] {
            self.set_range(day, from_hour, from, to_hour, to)?;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.hours = [0; HOURS_PER_WEEK];
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SCHEDULE_BLOB_LEN);
        for field in [SCHEDULE_BLOB_LEN as u32, 0, 1, SCHEDULE_TYPE_INTERVAL, HEADER_LEN as u32] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        out.extend_from_slice(&self.hours);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> DirectoryResult<Self> {
        let invalid = |reason: &str| DirectoryError::invalid_argument("schedule", reason);
        if bytes.len() != SCHEDULE_BLOB_LEN {
            return Err(invalid("blob must be 188 bytes"));
        }
        let field = |i: usize| {
            let mut word = [0u8; 4];
            word.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
            u32::from_le_bytes(word)
        };
        if field(0) as usize != SCHEDULE_BLOB_LEN || field(2) != 1 || field(4) as usize != HEADER_LEN {
            return Err(invalid("unexpected header"));
        }
        if field(3) != SCHEDULE_TYPE_INTERVAL {
            return Err(invalid("only interval schedules are supported"));
        }

        let mut hours = [0u8; HOURS_PER_WEEK];
        for (dst, src) in hours.iter_mut().zip(&bytes[HEADER_LEN..]) {
            *dst = src & 0x0F;
        }
        Ok(Self { hours })
    }
}
