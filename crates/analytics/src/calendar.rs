//! Day arithmetic in the portal's configured timezone

use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, UtcOffset};

use crate::error::{AnalyticsError, AnalyticsResult};

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Longest range a single query may cover, in days
pub const MAX_RANGE_DAYS: i64 = 366;

/// Fixed-offset calendar; "today" is the current date at this offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageCalendar {
    offset: UtcOffset,
}

impl Default for UsageCalendar {
    fn default() -> Self {
        Self::utc()
    }
}

impl UsageCalendar {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(UtcOffset::UTC)
    }

    /// Parse `+HH:MM` / `-HH:MM` (e.g. `USAGE_UTC_OFFSET=+02:00`)
    pub fn from_offset_str(value: &str) -> AnalyticsResult<Self> {
        let offset = UtcOffset::parse(
            value.trim(),
            format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
        )
        .map_err(|e| AnalyticsError::Validation(format!("invalid UTC offset '{}': {}", value, e)))?;
        Ok(Self::new(offset))
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    pub fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }

    pub fn today(&self) -> Date {
        self.date_of(OffsetDateTime::now_utc())
    }

    /// Calendar date of an instant at the configured offset
    pub fn date_of(&self, instant: OffsetDateTime) -> Date {
        instant.to_offset(self.offset).date()
    }
}

pub fn parse_date(value: &str) -> AnalyticsResult<Date> {
    Date::parse(value.trim(), DATE_FORMAT).map_err(|_| {
        AnalyticsError::Validation(format!("invalid date '{}', expected YYYY-MM-DD", value))
    })
}

pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

/// Inclusive range of calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: Date,
    pub end: Date,
}

impl DateRange {
    pub fn new(start: Date, end: Date) -> AnalyticsResult<Self> {
        if start > end {
            return Err(AnalyticsError::Validation(
                "start date must not be after end date".to_string(),
            ));
        }
        let range = Self { start, end };
        if range.len_days() > MAX_RANGE_DAYS {
            return Err(AnalyticsError::Validation(format!(
                "date range may span at most {} days",
                MAX_RANGE_DAYS
            )));
        }
        Ok(range)
    }

    pub fn parse(start: &str, end: &str) -> AnalyticsResult<Self> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    /// Number of days, both ends included
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).whole_days() + 1
    }

    pub fn days(&self) -> impl Iterator<Item = Date> {
        let end = self.end;
        std::iter::successors(Some(self.start), move |d| d.next_day().filter(|n| *n <= end))
    }

    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }

    /// Period of equal length ending the day before this one starts
    pub fn previous(&self) -> Self {
        let len = Duration::days(self.len_days());
        Self {
            start: self.start - len,
            end: self.start - Duration::days(1),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn test_range_days_inclusive() {
        let range = DateRange::new(date!(2025 - 02 - 27), date!(2025 - 03 - 02)).unwrap();
        let days: Vec<Date> = range.days().collect();
        assert_eq!(range.len_days(), 4);
        assert_eq!(days.len(), 4);
        assert_eq!(days[0], date!(2025 - 02 - 27));
        assert_eq!(days[3], date!(2025 - 03 - 02));
    }

    #[test]
    fn test_range_validation() {
        assert!(DateRange::new(date!(2025 - 03 - 02), date!(2025 - 03 - 01)).is_err());
        assert!(DateRange::new(date!(2024 - 01 - 01), date!(2024 - 12 - 31)).is_ok());
        assert!(DateRange::new(date!(2024 - 01 - 01), date!(2025 - 01 - 01)).is_err());
        assert!(DateRange::parse("2025-1-1", "2025-01-02").is_err());
    }

    #[test]
    fn test_previous_period() {
        let range = DateRange::parse("2025-03-08", "2025-03-14").unwrap();
        let prev = range.previous();
        assert_eq!(prev.start, date!(2025 - 03 - 01));
        assert_eq!(prev.end, date!(2025 - 03 - 07));
        assert_eq!(prev.len_days(), range.len_days());
    }

    #[test]
    fn test_offset_moves_date() {
        let instant = datetime!(2025-06-30 23:30 UTC);
        assert_eq!(UsageCalendar::utc().date_of(instant), date!(2025 - 06 - 30));

        let ahead = UsageCalendar::from_offset_str("+02:00").unwrap();
        assert_eq!(ahead.date_of(instant), date!(2025 - 07 - 01));

        assert!(UsageCalendar::from_offset_str("2 hours").is_err());
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(date!(2025 - 01 - 05)), "2025-01-05");
        assert_eq!(parse_date("2025-01-05").unwrap(), date!(2025 - 01 - 05));
    }
}
