//! Placeholder interpolation for request templates.
//!
//! Templates may embed tokens of the form `{$keyword}` or
//! `{$keyword|modifiers}` which are expanded every time a string is
//! interpolated:
//!
//! | Token | Expands to |
//! |---|---|
//! | `{$currentDate}` | today as `yyyy-MM-dd` |
//! | `{$currentDate\|days+1,months-2,years+3,format=dd/MM/yy}` | shifted and formatted date |
//! | `{$currentTimestamp}` | Unix epoch in milliseconds |
//! | `{$random\|a,b,c}` | one of the listed elements |
//! | `{$range\|min=1,max=9}` | an integer in the inclusive range |
//!
//! Expansion is best effort: a token that is unknown or malformed is left
//! in the output exactly as written. Every occurrence is resolved
//! independently, so two `{$random|a,b}` tokens in one string may differ.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeDelta};
use rand::Rng;
use rand::seq::SliceRandom;
use regex::{Captures, Regex};
use tracing::warn;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\$(\w+)(?:\|([^{}]*))?\}").expect("placeholder pattern is valid")
});

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// A parsed placeholder token.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Placeholder<'a> {
    CurrentDate(DateSpec),
    CurrentTimestamp,
    Random(Vec<&'a str>),
    Range { min: i64, max: i64 },
}

/// Offsets and output format for a `currentDate` token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct DateSpec {
    days: i64,
    months: i32,
    years: i32,
    /// Already translated to a chrono format string.
    format: Option<String>,
}

/// Expand every placeholder in `source` using the system clock and the
/// thread-local random source.
pub fn interpolate(source: &str) -> String {
    interpolate_with(source, Local::now(), &mut rand::thread_rng())
}

/// Expand every placeholder in `source` against an explicit clock reading
/// and random source.
pub fn interpolate_with<R: Rng + ?Sized>(source: &str, now: DateTime<Local>, rng: &mut R) -> String {
    PLACEHOLDER
        .replace_all(source, |caps: &Captures<'_>| {
            let token = &caps[0];
            match parse(&caps[1], caps.get(2).map(|m| m.as_str())) {
                Some(placeholder) => expand(token, placeholder, now, &mut *rng),
                None => token.to_string(),
            }
        })
        .into_owned()
}

fn parse<'a>(keyword: &str, modifiers: Option<&'a str>) -> Option<Placeholder<'a>> {
    match (keyword, modifiers) {
        ("currentDate", None) => Some(Placeholder::CurrentDate(DateSpec::default())),
        ("currentDate", Some(mods)) => parse_date_spec(mods).map(Placeholder::CurrentDate),
        ("currentTimestamp", None) => Some(Placeholder::CurrentTimestamp),
        ("random", Some(mods)) if !mods.is_empty() => {
            Some(Placeholder::Random(mods.split(',').collect()))
        }
        ("range", Some(mods)) => parse_range(mods),
        _ => None,
    }
}

fn parse_date_spec(modifiers: &str) -> Option<DateSpec> {
    let mut spec = DateSpec::default();
    for part in modifiers.split(',') {
        if let Some(rest) = part.strip_prefix("days") {
            spec.days = parse_offset(rest)?;
        } else if let Some(rest) = part.strip_prefix("months") {
            spec.months = parse_offset(rest)?;
        } else if let Some(rest) = part.strip_prefix("years") {
            spec.years = parse_offset(rest)?;
        } else if let Some(format) = part.strip_prefix("format=") {
            if format.is_empty() {
                return None;
            }
            spec.format = Some(to_chrono_format(format));
        } else {
            return None;
        }
    }
    Some(spec)
}

/// Parses `+5`, `-2` or `=+5`.
fn parse_offset<T: std::str::FromStr>(raw: &str) -> Option<T> {
    let raw = raw.strip_prefix('=').unwrap_or(raw);
    if raw.is_empty() {
        return None;
    }
    raw.parse().ok()
}

fn parse_range(modifiers: &str) -> Option<Placeholder<'_>> {
    let mut min = None;
    let mut max = None;
    for part in modifiers.split(',') {
        let (key, value) = part.split_once('=')?;
        let value: i64 = value.parse().ok()?;
        match key {
            "min" => min = Some(value),
            "max" => max = Some(value),
            _ => return None,
        }
    }
    Some(Placeholder::Range {
        min: min?,
        max: max?,
    })
}

fn expand<R: Rng + ?Sized>(
    token: &str,
    placeholder: Placeholder<'_>,
    now: DateTime<Local>,
    rng: &mut R,
) -> String {
    match placeholder {
        Placeholder::CurrentDate(spec) => {
            match shift_date(now.date_naive(), spec.years, spec.months, spec.days) {
                Some(date) => date
                    .format(spec.format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT))
                    .to_string(),
                None => {
                    warn!(%token, "date offset out of range");
                    token.to_string()
                }
            }
        }
        Placeholder::CurrentTimestamp => now.timestamp_millis().to_string(),
        Placeholder::Random(elements) => elements
            .choose(rng)
            .map(|element| element.to_string())
            .unwrap_or_else(|| token.to_string()),
        Placeholder::Range { min, max } => {
            if min > max {
                warn!(%token, min, max, "invalid range, min > max");
                return token.to_string();
            }
            rng.gen_range(min..=max).to_string()
        }
    }
}

/// Shift `date` by whole years, months and days at once.
///
/// Year and month are applied first; the day of month plus the day offset
/// is then counted from the first of the resulting month, so overflowing
/// days roll into the next month (Jan 31 + 1 month is Mar 3 in a
/// non-leap year) instead of being clamped.
pub fn shift_date(date: NaiveDate, years: i32, months: i32, days: i64) -> Option<NaiveDate> {
    let total_months = i64::from(date.year()) * 12
        + i64::from(date.month0())
        + i64::from(years) * 12
        + i64::from(months);
    let year = i32::try_from(total_months.div_euclid(12)).ok()?;
    let month = u32::try_from(total_months.rem_euclid(12)).ok()? + 1;
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let offset = TimeDelta::try_days(i64::from(date.day0()) + days)?;
    first.checked_add_signed(offset)
}

/// Translate a `yyyy`/`yy`/`MMM`/`MM`/`dd`/`d` pattern into a chrono
/// format string. Anything else is copied literally.
pub fn to_chrono_format(pattern: &str) -> String {
    const TOKENS: [(&str, &str); 6] = [
        ("yyyy", "%Y"),
        ("yy", "%y"),
        ("MMM", "%b"),
        ("MM", "%m"),
        ("dd", "%d"),
        ("d", "%-d"),
    ];

    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;
    'scan: while let Some(c) = rest.chars().next() {
        for (token, spec) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(spec);
                rest = tail;
                continue 'scan;
            }
        }
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn reference_now() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 1, 15, 12, 30, 0)
            .single()
            .expect("unambiguous reference time")
    }

    fn render(source: &str) -> String {
        interpolate_with(source, reference_now(), &mut StdRng::seed_from_u64(7))
    }

    #[test]
    fn text_without_tokens_is_unchanged() {
        let input = r#"post:/orders:{"id": 1, "tags": {"a": "b"}}"#;
        assert_eq!(interpolate(input), input);
    }

    #[test]
    fn current_date_defaults_to_iso() {
        assert_eq!(render("/db_{$currentDate}"), "/db_2024-01-15");
    }

    #[test]
    fn current_date_with_offsets_and_format() {
        let output = render(r#"{"date": "{$currentDate|days+5,months+2,years-1,format=yyyy-MM-dd}"}"#);
        assert_eq!(output, r#"{"date": "2023-03-20"}"#);
    }

    #[test]
    fn current_date_accepts_equals_form() {
        assert_eq!(render("{$currentDate|days=-15}"), "2023-12-31");
    }

    #[test]
    fn current_date_custom_formats() {
        assert_eq!(render("{$currentDate|format=dd/MM/yy}"), "15/01/24");
        assert_eq!(render("{$currentDate|days-10,format=d-MMM-yyyy}"), "5-Jan-2024");
    }

    #[test]
    fn shift_date_rolls_overflowing_days_forward() {
        let jan31 = NaiveDate::from_ymd_opt(2023, 1, 31).unwrap();
        assert_eq!(
            shift_date(jan31, 0, 1, 0),
            NaiveDate::from_ymd_opt(2023, 3, 3)
        );
        assert_eq!(
            shift_date(jan31, 0, -13, 1),
            NaiveDate::from_ymd_opt(2022, 1, 1)
        );
    }

    #[test]
    fn current_timestamp_is_epoch_millis() {
        let output = render("/path_{$currentTimestamp}");
        assert_eq!(
            output,
            format!("/path_{}", reference_now().timestamp_millis())
        );
        assert_eq!(interpolate("{$currentTimestamp}").len(), 13);
    }

    #[test]
    fn range_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let output = interpolate_with("{$range|min=1,max=2}", reference_now(), &mut rng);
            assert!(output == "1" || output == "2", "unexpected {output}");
        }
    }

    #[test]
    fn inverted_range_is_left_verbatim() {
        let input = r#"post:/path_{$range|min=2,max=1}:{"body": "{$range|min=2,max=1}"}"#;
        assert_eq!(interpolate(input), input);
    }

    #[test]
    fn random_picks_every_element() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut foo = 0;
        let mut bar = 0;
        for _ in 0..1000 {
            match interpolate_with("{$random|foo,bar}", reference_now(), &mut rng).as_str() {
                "foo" => foo += 1,
                "bar" => bar += 1,
                other => panic!("unexpected element {other}"),
            }
        }
        assert!(foo > 0 && bar > 0);
    }

    #[test]
    fn random_keeps_dashes_and_underscores() {
        let output = interpolate("{$random|fo-o,b_ar}");
        assert!(output == "fo-o" || output == "b_ar");
    }

    #[test]
    fn multiple_tokens_expand_independently() {
        let output = interpolate(r#"/path_{$range|min=1,max=2}_{$random|foo,bar}:{"body": "{$random|foo,bar} {$range|min=1,max=2}"}"#);
        let pattern = Regex::new(r#"^/path_[12]_(foo|bar):\{"body": "(foo|bar) [12]"\}$"#).unwrap();
        assert!(pattern.is_match(&output), "unexpected {output}");
    }

    #[test]
    fn unknown_and_malformed_tokens_are_left_verbatim() {
        for input in [
            "{$unknown}",
            "{$currentDate|weeks+1}",
            "{$currentTimestamp|format=x}",
            "{$range|min=a,max=2}",
            "{$range|min=1}",
            "{$random}",
            "{notatoken}",
        ] {
            assert_eq!(render(input), input);
        }
    }

    #[test]
    fn chrono_format_escapes_percent() {
        assert_eq!(to_chrono_format("yyyy%MM"), "%Y%%%m");
        assert_eq!(to_chrono_format("MMM d"), "%b %-d");
    }
}
