//! Recurrence rules.
//!
//! Human strings (`"daily"`, `"every 2 weeks"`, `"every monday"`, ...) are
//! parsed once into a [`Recurrence`] tagged variant; everything downstream
//! (RRULE rendering, next-occurrence calculation) works on that, never on
//! strings again.

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freq {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Freq {
    fn as_rrule_str(self) -> &'static str {
        match self {
            Freq::Daily => "DAILY",
            Freq::Weekly => "WEEKLY",
            Freq::Monthly => "MONTHLY",
            Freq::Yearly => "YEARLY",
        }
    }
}

/// A recurrence rule: an RRULE subset restricted to `FREQ`, `INTERVAL`, and
/// an optional `BYDAY` weekday set (only meaningful for `FREQ=WEEKLY`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recurrence {
    pub freq: Freq,
    pub interval: u32,
    pub byday: Vec<Weekday>,
}

impl Recurrence {
    pub fn new(freq: Freq, interval: u32) -> Self {
        Self {
            freq,
            interval: interval.max(1),
            byday: Vec::new(),
        }
    }

    pub fn with_byday(mut self, days: Vec<Weekday>) -> Self {
        self.byday = days;
        self
    }

    /// Render as an RRULE-subset string, e.g. `FREQ=WEEKLY;INTERVAL=2`.
    pub fn to_rrule_string(&self) -> String {
        let mut s = format!("FREQ={};INTERVAL={}", self.freq.as_rrule_str(), self.interval);
        if !self.byday.is_empty() {
            let days: Vec<&str> = self.byday.iter().map(|d| byday_code(*d)).collect();
            s.push_str(";BYDAY=");
            s.push_str(&days.join(","));
        }
        s
    }

    /// Compute the next occurrence strictly after `base`.
    pub fn next(&self, base: DateTime<Utc>) -> DateTime<Utc> {
        match self.freq {
            Freq::Daily => base + Duration::days(self.interval as i64),
            Freq::Weekly if self.byday.is_empty() => {
                base + Duration::weeks(self.interval as i64)
            }
            Freq::Weekly => self.next_byday(base),
            Freq::Monthly => add_months(base, self.interval),
            Freq::Yearly => add_months(base, self.interval * 12),
        }
    }

    /// Advance to the next matching weekday within `7 * interval` days, per
    /// the `BYDAY` semantics on a `WEEKLY` recurrence.
    fn next_byday(&self, base: DateTime<Utc>) -> DateTime<Utc> {
        let window = 7 * self.interval as i64;
        for offset in 1..=window {
            let candidate = base + Duration::days(offset);
            if self.byday.contains(&candidate.weekday()) {
                return candidate;
            }
        }
        // Defensive fallback: byday list was empty after all, or malformed.
        base + Duration::days(window)
    }
}

fn byday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

fn add_months(base: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    let total = base.month0() + months;
    let years_to_add = total / 12;
    let new_month0 = total % 12;
    let new_year = base.year() + years_to_add as i32;

    // Clamp the day of month so e.g. Jan 31 + 1 month lands on Feb 28/29
    // instead of overflowing into March.
    let days_in_month = days_in_month(new_year, new_month0 + 1);
    let new_day = base.day().min(days_in_month);

    base.with_day(1)
        .and_then(|d| d.with_year(new_year))
        .and_then(|d| d.with_month(new_month0 + 1))
        .and_then(|d| d.with_day(new_day))
        .unwrap_or(base)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next_month_first = if month == 12 {
        chrono::NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        chrono::NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid calendar arithmetic");
    let this_month_first =
        chrono::NaiveDate::from_ymd_opt(year, month, 1).expect("valid calendar arithmetic");
    (next_month_first - this_month_first).num_days() as u32
}

/// Parse a human-readable recurrence string into a [`Recurrence`].
///
/// Accepted forms: `daily|weekly|monthly|yearly`, `weekdays`, `weekends`,
/// `every <weekday>`, `every N day|week|month|year(s)`.
pub fn parse_recurrence(input: &str) -> Result<Recurrence> {
    let normalized = input.trim().to_lowercase();
    match normalized.as_str() {
        "daily" => return Ok(Recurrence::new(Freq::Daily, 1)),
        "weekly" => return Ok(Recurrence::new(Freq::Weekly, 1)),
        "monthly" => return Ok(Recurrence::new(Freq::Monthly, 1)),
        "yearly" => return Ok(Recurrence::new(Freq::Yearly, 1)),
        "weekdays" => {
            return Ok(Recurrence::new(Freq::Weekly, 1).with_byday(vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ]))
        }
        "weekends" => {
            return Ok(
                Recurrence::new(Freq::Weekly, 1).with_byday(vec![Weekday::Sat, Weekday::Sun])
            )
        }
        _ => {}
    }

    if let Some(day_name) = normalized.strip_prefix("every ") {
        if let Some(weekday) = parse_weekday(day_name) {
            return Ok(Recurrence::new(Freq::Weekly, 1).with_byday(vec![weekday]));
        }

        let tokens: Vec<&str> = day_name.split_whitespace().collect();
        if tokens.len() == 2 {
            let n: u32 = tokens[0]
                .parse()
                .map_err(|_| Error::Invariant(format!("invalid recurrence: {input:?}")))?;
            let unit = tokens[1].trim_end_matches('s');
            let freq = match unit {
                "day" => Freq::Daily,
                "week" => Freq::Weekly,
                "month" => Freq::Monthly,
                "year" => Freq::Yearly,
                _ => {
                    return Err(Error::Invariant(format!(
                        "unrecognized recurrence unit: {unit:?}"
                    )))
                }
            };
            return Ok(Recurrence::new(freq, n));
        }
    }

    Err(Error::Invariant(format!(
        "unrecognized recurrence string: {input:?}"
    )))
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    match s {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_every_n_weeks() {
        let r = parse_recurrence("every 2 weeks").unwrap();
        assert_eq!(r.to_rrule_string(), "FREQ=WEEKLY;INTERVAL=2");
    }

    #[test]
    fn every_2_weeks_advances_14_days() {
        let r = parse_recurrence("every 2 weeks").unwrap();
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let next = r.next(base);
        assert_eq!(next, base + Duration::days(14));
    }

    #[test]
    fn daily_advances_one_day() {
        let r = parse_recurrence("daily").unwrap();
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(r.next(base), base + Duration::days(1));
    }

    #[test]
    fn every_monday_lands_on_next_monday() {
        let r = parse_recurrence("every monday").unwrap();
        // 2025-01-01 is a Wednesday.
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let next = r.next(base);
        assert_eq!(next.weekday(), Weekday::Mon);
        assert!(next > base);
    }

    #[test]
    fn monthly_clamps_short_months() {
        let r = Recurrence::new(Freq::Monthly, 1);
        let base = Utc.with_ymd_and_hms(2025, 1, 31, 0, 0, 0).unwrap();
        let next = r.next(base);
        assert_eq!((next.year(), next.month(), next.day()), (2025, 2, 28));
    }

    #[test]
    fn unrecognized_string_is_invariant_error() {
        assert!(parse_recurrence("whenever I feel like it").is_err());
    }
}
