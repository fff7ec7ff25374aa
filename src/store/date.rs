// src/store/date.rs
use chrono::NaiveDate;

/// Date of the first NSE bhav copy.
pub const FIRST_BHAV_DATE: NaiveDate = match NaiveDate::from_ymd_opt(1994, 11, 3) {
    Some(date) => date,
    None => panic!("1994-11-03 is a calendar date"),
};

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("bad timestamp year: {raw:?} ({reason})")]
pub struct TimestampError {
    pub raw: String,
    pub reason: &'static str,
}

impl TimestampError {
    pub(crate) fn new(raw: &str, reason: &'static str) -> Self {
        Self {
            raw: raw.to_string(),
            reason,
        }
    }
}

/// Case-insensitive `Jan` → 1 … `Dec` → 12.
pub fn month_number(token: &str) -> Option<u32> {
    MONTH_ABBREVIATIONS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(token.trim()))
        .map(|i| i as u32 + 1)
}

/// The four trailing digits of a `DD-MON-YYYY` timestamp.
pub fn year_of(raw: &str) -> Result<i32, TimestampError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .len()
        .checked_sub(4)
        .and_then(|start| trimmed.get(start..))
        .filter(|y| y.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| TimestampError::new(raw, "no four-digit year"))?;
    digits
        .parse()
        .map_err(|_| TimestampError::new(raw, "no four-digit year"))
}

/// `"03-NOV-1994"` → 1994-11-03.
pub fn normalize_timestamp(raw: &str) -> Result<NaiveDate, TimestampError> {
    let mut parts = raw.trim().split('-');
    let (Some(day), Some(month), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TimestampError::new(raw, "expected DD-MON-YYYY"));
    };

    let year = year_of(raw)?;
    let month = month_number(month).ok_or_else(|| TimestampError::new(raw, "unknown month"))?;
    let day: u32 = day
        .trim()
        .parse()
        .map_err(|_| TimestampError::new(raw, "bad day"))?;

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| TimestampError::new(raw, "no such calendar day"))
}
