use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

/// Packed MS-DOS (date, time) pair as stored in ZIP headers.
///
/// The fields are taken from the timestamp as given, in its own offset.
/// DOS time has two-second resolution and covers 1980..=2107; values outside
/// that range are clamped to its ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DosDateTime {
    pub date: u16,
    pub time: u16,
}

const MIN_YEAR: i32 = 1980;
const MAX_YEAR: i32 = 2107;

impl DosDateTime {
    pub fn from_datetime(t: OffsetDateTime) -> Self {
        let year = t.year();
        if year < MIN_YEAR {
            // 1980-01-01 00:00:00
            return Self {
                date: (1 << 5) | 1,
                time: 0,
            };
        }
        if year > MAX_YEAR {
            // 2107-12-31 23:59:58
            return Self {
                date: (((MAX_YEAR - MIN_YEAR) as u16) << 9) | (12 << 5) | 31,
                time: (23 << 11) | (59 << 5) | 29,
            };
        }
        let date = (((year - MIN_YEAR) as u16) << 9) | ((t.month() as u16) << 5) | t.day() as u16;
        let time =
            ((t.hour() as u16) << 11) | ((t.minute() as u16) << 5) | (t.second() as u16 / 2);
        Self { date, time }
    }

    /// Decode back into a UTC timestamp; `None` for out-of-range fields.
    pub fn to_datetime(self) -> Option<OffsetDateTime> {
        let year = MIN_YEAR + (self.date >> 9) as i32;
        let month = Month::try_from(((self.date >> 5) & 0x0f) as u8).ok()?;
        let day = (self.date & 0x1f) as u8;
        let date = Date::from_calendar_date(year, month, day).ok()?;
        let time = Time::from_hms(
            (self.time >> 11) as u8,
            ((self.time >> 5) & 0x3f) as u8,
            ((self.time & 0x1f) * 2) as u8,
        )
        .ok()?;
        Some(PrimitiveDateTime::new(date, time).assume_utc())
    }
}
