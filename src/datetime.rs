/// Calendar timestamp as stored in directory entries (2 s resolution).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// Supplies the current time for created and modified entries.
pub type DateTimeSource = fn() -> DateTime;

impl DateTime {
    /// 2000-01-01 01:00:00, stamped on entries when no clock is installed.
    pub const DEFAULT: Self = Self {
        year: 2000,
        month: 1,
        day: 1,
        hour: 1,
        minute: 0,
        second: 0,
    };

    /// Returns `None` outside the range a FAT timestamp can hold.
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Option<Self> {
        let valid = (1980..=2107).contains(&year)
            && (1..=12).contains(&month)
            && (1..=31).contains(&day)
            && hour <= 23
            && minute <= 59
            && second <= 59;
        valid.then_some(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        })
    }

    pub fn fat_date(&self) -> u16 {
        (self.year.saturating_sub(1980) << 9) | ((self.month as u16) << 5) | self.day as u16
    }

    pub fn fat_time(&self) -> u16 {
        ((self.hour as u16) << 11) | ((self.minute as u16) << 5) | (self.second as u16 >> 1)
    }

    /// Hundredths of a second past the even second in `fat_time`.
    pub fn fat_time_tenths(&self) -> u8 {
        if self.second & 1 != 0 {
            100
        } else {
            0
        }
    }

    pub fn from_fat(date: u16, time: u16) -> Self {
        Self {
            year: 1980 + (date >> 9),
            month: ((date >> 5) & 0x0F) as u8,
            day: (date & 0x1F) as u8,
            hour: (time >> 11) as u8,
            minute: ((time >> 5) & 0x3F) as u8,
            second: ((time & 0x1F) * 2) as u8,
        }
    }
}

impl Default for DateTime {
    fn default() -> Self {
        Self::DEFAULT
    }
}
