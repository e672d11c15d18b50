//! Lenient parsing of the free-text dates found in CVs.

use chrono::{Datelike, NaiveDate};

/// Words that mark an ongoing position. Matched case-insensitively as whole
/// words, so "Unknown" is not "now".
const PRESENT_TOKENS: &[&str] = &[
    "présent", "actuel", "actuellement", "en cours", "current", "currently", "present", "now",
    "ongoing",
];

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2100;

/// Parses `MM/YYYY`, `YYYY-MM`, `YYYY` (January 1st) or a present-like token
/// (`today`). Formats are matched at the start of the text; trailing text is
/// ignored.
///
/// A text that looks like `MM/YYYY` or `YYYY-MM` but holds an out-of-range
/// month or year is rejected rather than read as a bare year.
pub fn parse_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let text = text.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }
    if has_present_token(&text) {
        return Some(today);
    }
    if let Some((month, year)) = month_slash_year(&text) {
        return first_of_month(year, month);
    }
    if let Some((year, month)) = year_dash_month(&text) {
        return first_of_month(year, month);
    }
    let (year, _) = split_digits(&text, 4);
    if year.len() == 4 {
        return NaiveDate::from_ymd_opt(year.parse().ok()?, 1, 1);
    }
    None
}

/// Whole calendar months from `from` to `to`, negative when `to` is earlier.
/// A month only counts once its day-of-month has been reached.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    let mut months = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
    if months > 0 && to.day() < from.day() {
        months -= 1;
    } else if months < 0 && to.day() > from.day() {
        months += 1;
    }
    months
}

fn has_present_token(text: &str) -> bool {
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    PRESENT_TOKENS.iter().any(|token| {
        let token: Vec<&str> = token.split(' ').collect();
        words.windows(token.len()).any(|window| window == token.as_slice())
    })
}

fn split_digits(s: &str, max: usize) -> (&str, &str) {
    let n = s.bytes().take_while(u8::is_ascii_digit).take(max).count();
    s.split_at(n)
}

fn month_slash_year(s: &str) -> Option<(u32, i32)> {
    let (month, rest) = split_digits(s, 2);
    if month.is_empty() {
        return None;
    }
    let (year, _) = split_digits(rest.strip_prefix('/')?, 4);
    if year.len() != 4 {
        return None;
    }
    Some((month.parse().ok()?, year.parse().ok()?))
}

fn year_dash_month(s: &str) -> Option<(i32, u32)> {
    let (year, rest) = split_digits(s, 4);
    if year.len() != 4 {
        return None;
    }
    let (month, _) = split_digits(rest.strip_prefix('-')?, 2);
    if month.is_empty() {
        return None;
    }
    Some((year.parse().ok()?, month.parse().ok()?))
}

fn first_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    if !(1..=12).contains(&month) || !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, 1)
}
