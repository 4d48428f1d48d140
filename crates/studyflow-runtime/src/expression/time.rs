//! Time arithmetic and value conversion utilities
//!
//! All calendar arithmetic is done in UTC. "Now" always comes from the
//! engine's clock so rules can be tested deterministically.

use super::Args;
use crate::error::{Result, RuntimeError};
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use rand::Rng;
use studyflow_core::ExprValue;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Optional reference time argument, falling back to the clock
async fn reference_time(args: &Args<'_>, index: usize) -> Result<i64> {
    Ok(match args.opt_num(index).await? {
        Some(ts) => ts.trunc() as i64,
        None => args.engine.now(),
    })
}

fn to_datetime(args: &Args<'_>, ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0).ok_or_else(|| {
        RuntimeError::invalid_args(args.name(), format!("timestamp {} is out of range", ts))
    })
}

fn midnight_utc(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// `timestampWithOffset(delta, ref?)`: reference (or now) plus delta seconds
pub(super) async fn timestamp_with_offset(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_range(1, 2)?;
    let delta = args.num(0).await?.trunc() as i64;
    let reference = reference_time(args, 1).await?;
    Ok(ExprValue::from(reference + delta))
}

/// Month number from 1 to 12, from a number or an English month name
fn parse_month(value: &ExprValue) -> Option<u32> {
    match value {
        ExprValue::Num(n) if n.fract() == 0.0 && (1.0..=12.0).contains(n) => Some(*n as u32),
        ExprValue::Str(s) => {
            let s = s.trim().to_lowercase();
            if let Ok(n) = s.parse::<u32>() {
                return (1..=12).contains(&n).then_some(n);
            }
            MONTHS
                .iter()
                .position(|name| *name == s || (s.len() == 3 && name.starts_with(&s)))
                .map(|i| i as u32 + 1)
        }
        _ => None,
    }
}

/// `getTsForNextStartOfMonth(month, ref?)`
///
/// First day of the next occurrence of `month` strictly after the reference
/// month: when the reference is already in or past that month, next year's.
pub(super) async fn next_start_of_month(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_range(1, 2)?;
    let month_arg = args.value(0).await?;
    let month = parse_month(&month_arg).ok_or_else(|| {
        RuntimeError::invalid_args(args.name(), format!("invalid month '{}'", month_arg))
    })?;
    let reference = to_datetime(args, reference_time(args, 1).await?)?;

    let year = if reference.month() >= month {
        reference.year() + 1
    } else {
        reference.year()
    };
    let date = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        RuntimeError::invalid_args(args.name(), format!("no date for {}-{}", year, month))
    })?;
    Ok(ExprValue::from(midnight_utc(date)))
}

/// `getTsForNextISOWeek(week, ref?)`
///
/// Monday 00:00 UTC of the next ISO week with the given number. Years
/// without a week 53 are skipped.
pub(super) async fn next_iso_week(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_range(1, 2)?;
    let week = args.num(0).await?;
    if week.fract() != 0.0 || !(1.0..=53.0).contains(&week) {
        return Err(RuntimeError::invalid_args(
            args.name(),
            format!("invalid ISO week {}", week),
        ));
    }
    let week = week as u32;
    let reference = to_datetime(args, reference_time(args, 1).await?)?;
    let current = reference.iso_week();

    let mut year = if current.week() >= week {
        current.year() + 1
    } else {
        current.year()
    };
    // a week 53 turns up at least once every seven years
    for _ in 0..8 {
        if let Some(date) = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon) {
            return Ok(ExprValue::from(midnight_utc(date)));
        }
        year += 1;
    }
    Err(RuntimeError::invalid_args(
        args.name(),
        format!("no ISO week {} found after {}", week, current.year()),
    ))
}

pub(super) async fn iso_week_for_ts(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(1)?;
    let ts = args.num(0).await?.trunc() as i64;
    let week = to_datetime(args, ts)?.iso_week().week();
    Ok(ExprValue::from(week as i64))
}

/// `dateToStr(ts, format)`
///
/// The format is a reference-date layout: `2006-01-02 15:04:05` renders the
/// date as year, month, day, hour, minute and second. Supported tokens are
/// `2006 06 January Jan 01 1 Monday Mon 02 2 15 03 3 04 4 05 5 PM pm`; any
/// other character is copied as is.
pub(super) async fn date_to_str(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(2)?;
    let ts = args.num(0).await?.trunc() as i64;
    let format = args.string(1).await?;
    let date = to_datetime(args, ts)?;
    Ok(ExprValue::Str(format_date(&date, &format)))
}

/// Layout tokens, longest first so that `January` wins over `Jan`
const TOKENS: [&str; 19] = [
    "January", "Monday", "2006", "Jan", "Mon", "01", "02", "03", "04", "05", "06", "15", "PM",
    "pm", "1", "2", "3", "4", "5",
];

fn format_date(date: &DateTime<Utc>, format: &str) -> String {
    let month_name = capitalize(MONTHS[date.month0() as usize]);
    let weekday_name = WEEKDAYS[date.weekday().num_days_from_monday() as usize];
    let (is_pm, hour12) = date.hour12();

    let mut out = String::with_capacity(format.len() + 8);
    let mut rest = format;
    while !rest.is_empty() {
        let Some(token) = TOKENS.iter().find(|t| rest.starts_with(**t)) else {
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                out.push(c);
            }
            rest = chars.as_str();
            continue;
        };
        let piece = match *token {
            "2006" => format!("{:04}", date.year()),
            "06" => format!("{:02}", date.year().rem_euclid(100)),
            "January" => month_name.clone(),
            "Jan" => month_name.chars().take(3).collect(),
            "01" => format!("{:02}", date.month()),
            "1" => date.month().to_string(),
            "Monday" => weekday_name.to_string(),
            "Mon" => weekday_name[..3].to_string(),
            "02" => format!("{:02}", date.day()),
            "2" => date.day().to_string(),
            "15" => format!("{:02}", date.hour()),
            "03" => format!("{:02}", hour12),
            "3" => hour12.to_string(),
            "04" => format!("{:02}", date.minute()),
            "4" => date.minute().to_string(),
            "05" => format!("{:02}", date.second()),
            "5" => date.second().to_string(),
            "PM" => (if is_pm { "PM" } else { "AM" }).to_string(),
            _ => (if is_pm { "pm" } else { "am" }).to_string(),
        };
        out.push_str(&piece);
        rest = &rest[token.len()..];
    }
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(super) async fn parse_value_as_num(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(1)?;
    match args.value(0).await? {
        ExprValue::Num(n) => Ok(ExprValue::Num(n)),
        ExprValue::Str(s) => s.trim().parse::<f64>().map(ExprValue::Num).map_err(|_| {
            RuntimeError::type_mismatch(args.name(), format!("'{}' is not a number", s))
        }),
        other => Err(RuntimeError::type_mismatch(
            args.name(),
            format!("cannot parse a {} as number", other.type_name()),
        )),
    }
}

/// Uniform integer in `[min, max]`
pub(super) async fn generate_random_number(args: &Args<'_>) -> Result<ExprValue> {
    args.expect_count(2)?;
    let min = args.num(0).await?.trunc() as i64;
    let max = args.num(1).await?.trunc() as i64;
    if min > max {
        return Err(RuntimeError::invalid_args(
            args.name(),
            format!("min {} is greater than max {}", min, max),
        ));
    }
    Ok(ExprValue::from(random_in_range(min, max)))
}

fn random_in_range(min: i64, max: i64) -> i64 {
    rand::thread_rng().gen_range(min..=max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ts: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(ts, 0).unwrap()
    }

    #[test]
    fn test_parse_month() {
        assert_eq!(parse_month(&ExprValue::Num(3.0)), Some(3));
        assert_eq!(parse_month(&ExprValue::from("September")), Some(9));
        assert_eq!(parse_month(&ExprValue::from("dec")), Some(12));
        assert_eq!(parse_month(&ExprValue::from("7")), Some(7));
        assert_eq!(parse_month(&ExprValue::from("ju")), None);
        assert_eq!(parse_month(&ExprValue::Num(13.0)), None);
        assert_eq!(parse_month(&ExprValue::Bool(true)), None);
    }

    #[test]
    fn test_format_date_tokens() {
        // 2024-03-05 07:08:09 UTC, a Tuesday
        let date = at(1_709_622_489);
        assert_eq!(format_date(&date, "2006-01-02 15:04:05"), "2024-03-05 07:08:09");
        assert_eq!(format_date(&date, "2006-01-02 15:04"), "2024-03-05 07:08");
        assert_eq!(format_date(&date, "2.1.06 3:4:5"), "5.3.24 7:8:9");
        assert_eq!(format_date(&date, "Monday, January 2"), "Tuesday, March 5");
        assert_eq!(format_date(&date, "Mon Jan"), "Tue Mar");
        assert_eq!(format_date(&date, "[week] x"), "[week] x");
    }

    #[test]
    fn test_format_date_twelve_hour_clock() {
        // 2024-03-05 19:08:09 UTC
        let evening = at(1_709_622_489 + 12 * 3600);
        assert_eq!(format_date(&evening, "03:04 PM"), "07:08 PM");
        assert_eq!(format_date(&evening, "3pm"), "7pm");
        assert_eq!(format_date(&at(1_709_622_489), "3 PM"), "7 AM");
        // midnight is 12 on a 12-hour clock
        assert_eq!(format_date(&at(1_709_596_800), "03:04 pm"), "12:00 am");
    }

    #[test]
    fn test_random_in_range_is_inclusive() {
        for _ in 0..100 {
            let n = random_in_range(1, 3);
            assert!((1..=3).contains(&n));
        }
        assert_eq!(random_in_range(5, 5), 5);
    }
}
