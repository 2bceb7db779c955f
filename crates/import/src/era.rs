use std::borrow::Cow;
use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_era_letter, r"^([MTSHRmtshr])(\d+)[./](\d{1,2})[./](\d{1,2})");
re!(re_era_kanji, r"^(明治|大正|昭和|平成|令和)(元|\d+)年(\d{1,2})月(\d{1,2})日");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Era {
    pub letter: char,
    pub name: &'static str,
    /// First day of the era (Gregorian).
    pub start: (i32, u32, u32),
    /// Gregorian year of era year 1.
    pub base_year: i32,
}

/// Most recent first.
pub const ERAS: [Era; 5] = [
    Era { letter: 'R', name: "令和", start: (2019, 5, 1), base_year: 2019 },
    Era { letter: 'H', name: "平成", start: (1989, 1, 8), base_year: 1989 },
    Era { letter: 'S', name: "昭和", start: (1926, 12, 25), base_year: 1926 },
    Era { letter: 'T', name: "大正", start: (1912, 7, 30), base_year: 1912 },
    Era { letter: 'M', name: "明治", start: (1868, 1, 25), base_year: 1868 },
];

fn era_by_letter(letter: char) -> Option<&'static Era> {
    let letter = letter.to_ascii_uppercase();
    ERAS.iter().find(|e| e.letter == letter)
}

fn era_by_name(name: &str) -> Option<&'static Era> {
    ERAS.iter().find(|e| e.name == name)
}

/// Rewrites a Japanese-era date (`H28.6.3`, `R5/4/1`, `平成28年6月3日`) as ISO
/// `YYYY-MM-DD`. Anything else, including an era date whose month or day is out
/// of range, comes back unchanged so the Gregorian parser can reject it.
pub fn resolve_era(text: &str) -> Cow<'_, str> {
    let trimmed = text.trim();

    let parts = if let Some(caps) = re_era_letter().captures(trimmed) {
        caps[1]
            .chars()
            .next()
            .and_then(era_by_letter)
            .map(|era| (era, caps[2].to_string(), caps[3].to_string(), caps[4].to_string()))
    } else if let Some(caps) = re_era_kanji().captures(trimmed) {
        let year = if &caps[2] == "元" { "1".to_string() } else { caps[2].to_string() };
        era_by_name(&caps[1]).map(|era| (era, year, caps[3].to_string(), caps[4].to_string()))
    } else {
        None
    };

    let Some((era, year, month, day)) = parts else {
        return Cow::Borrowed(text);
    };

    let (Ok(year), Ok(month), Ok(day)) = (year.parse::<i32>(), month.parse::<u32>(), day.parse::<u32>())
    else {
        return Cow::Borrowed(text);
    };

    let Some(gregorian_year) = era.base_year.checked_add(year - 1) else {
        return Cow::Borrowed(text);
    };
    match NaiveDate::from_ymd_opt(gregorian_year, month, day) {
        Some(date) => {
            let (sy, sm, sd) = era.start;
            if NaiveDate::from_ymd_opt(sy, sm, sd).is_some_and(|start| date < start) {
                tracing::debug!("{text} resolves to {date}, before the start of {}", era.name);
            }
            Cow::Owned(date.format("%Y-%m-%d").to_string())
        }
        None => Cow::Borrowed(text),
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y年%m月%d日", "%Y%m%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S", "%Y/%m/%d %H:%M"];

/// Parses an already-Gregorian date cell.
pub fn parse_gregorian(text: &str) -> Option<NaiveDate> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Era substitution followed by Gregorian parsing.
pub fn parse_statement_date(text: &str) -> Option<NaiveDate> {
    parse_gregorian(&resolve_era(text))
}
