//
// format.rs
// Dicom-Worklist-rs
//
// UID generation and the DA / TM / PN formatters applied to caller input before encoding.
//
// Thales Matheus Mendonça Santos - November 2025

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MAX_UID_LEN: usize = 64;

/// Build `<root>.<unix-millis>.<random>` with a 64-bit random component.
///
/// Two calls in the same millisecond collide only if the random draws collide.
pub fn generate_uid(root: &str) -> String {
    uid_from_parts(root, Utc::now().timestamp_millis(), None, rand::random::<u64>())
}

/// Study, series and SOP instance UIDs sharing one timestamp and one random draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceUids {
    #[serde(rename = "studyInstanceUID")]
    pub study_instance_uid: String,
    #[serde(rename = "seriesInstanceUID")]
    pub series_instance_uid: String,
    #[serde(rename = "sopInstanceUID")]
    pub sop_instance_uid: String,
}

pub fn generate_instance_uids(root: &str) -> InstanceUids {
    let millis = Utc::now().timestamp_millis();
    let random = rand::random::<u64>();
    InstanceUids {
        study_instance_uid: uid_from_parts(root, millis, Some(1), random),
        series_instance_uid: uid_from_parts(root, millis, Some(2), random),
        sop_instance_uid: uid_from_parts(root, millis, Some(3), random),
    }
}

fn uid_from_parts(root: &str, millis: i64, discriminator: Option<u8>, random: u64) -> String {
    let mut uid = match discriminator {
        Some(d) => format!("{root}.{millis}.{d}."),
        None => format!("{root}.{millis}."),
    };
    let budget = MAX_UID_LEN.saturating_sub(uid.len()).max(1);
    let mut digits = random.to_string();
    digits.truncate(budget);
    uid.push_str(&digits);
    uid
}

/// A UID is 1..=64 chars of dot-separated numeric components without leading zeros.
pub fn is_valid_uid(uid: &str) -> bool {
    !uid.is_empty()
        && uid.len() <= MAX_UID_LEN
        && uid.split('.').all(|part| {
            !part.is_empty()
                && part.bytes().all(|b| b.is_ascii_digit())
                && (part == "0" || !part.starts_with('0'))
        })
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d", "%Y.%m.%d", "%d-%m-%Y", "%B %d, %Y", "%b %d, %Y", "%d %B %Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Parse any reasonable calendar date representation.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    let input = input.trim();
    let invalid = || Error::InvalidDate {
        value: input.to_string(),
    };
    if input.is_empty() {
        return Err(invalid());
    }

    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
    {
        return Ok(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .map(|dt| dt.date())
        .ok_or_else(invalid)
}

/// Normalize a calendar date to DA (`YYYYMMDD`).
pub fn format_date(input: &str) -> Result<String> {
    parse_date(input).map(|d| to_da(&d))
}

pub fn to_da(date: &NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Parse `HH:MM`, `HH:MM:SS`, or the colon-less `HHMM` / `HHMMSS` forms.
pub fn parse_time(input: &str) -> Result<NaiveTime> {
    let trimmed = input.trim();
    let invalid = || Error::InvalidTime {
        value: input.to_string(),
    };

    let parts: Vec<&str> = trimmed.split(':').collect();
    let (h, m, s) = match parts.as_slice() {
        [h, m] => (*h, *m, "00"),
        [h, m, s] => (*h, *m, *s),
        [compact] if compact.is_ascii() && compact.len() == 4 => (&compact[..2], &compact[2..], "00"),
        [compact] if compact.is_ascii() && compact.len() == 6 => {
            (&compact[..2], &compact[2..4], &compact[4..])
        }
        _ => return Err(invalid()),
    };

    let field = |v: &str| -> Result<u32> {
        if v.len() == 2 && v.bytes().all(|b| b.is_ascii_digit()) {
            v.parse().map_err(|_| invalid())
        } else {
            Err(invalid())
        }
    };
    NaiveTime::from_hms_opt(field(h)?, field(m)?, field(s)?).ok_or_else(invalid)
}

/// Normalize a clock time to TM (`HHMMSS`), defaulting missing seconds to `00`.
pub fn format_time(input: &str) -> Result<String> {
    parse_time(input).map(|t| to_tm(&t))
}

pub fn to_tm(time: &NaiveTime) -> String {
    time.format("%H%M%S").to_string()
}

/// Parse a DA value (`YYYYMMDD`) read back from a file.
pub fn parse_da(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y%m%d").map_err(|_| Error::InvalidDate {
        value: value.to_string(),
    })
}

/// Parse a TM value read back from a file; fractional seconds are ignored.
pub fn parse_tm(value: &str) -> Result<NaiveTime> {
    let whole = value.split('.').next().unwrap_or_default();
    let invalid = || Error::InvalidTime {
        value: value.to_string(),
    };
    match whole.len() {
        2 | 4 | 6 if whole.bytes().all(|b| b.is_ascii_digit()) => {
            let padded = format!("{whole:0<6}");
            NaiveTime::parse_from_str(&padded, "%H%M%S").map_err(|_| invalid())
        }
        _ => Err(invalid()),
    }
}

/// Patient name as supplied by callers: a DICOM-formatted string or its components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PersonNameInput {
    Formatted(String),
    #[serde(rename_all = "camelCase")]
    Structured {
        #[serde(default)]
        first_name: String,
        #[serde(default)]
        last_name: String,
        #[serde(default)]
        middle_name: String,
    },
}

impl From<&str> for PersonNameInput {
    fn from(value: &str) -> Self {
        PersonNameInput::Formatted(value.to_string())
    }
}

/// Produce a PN value `Last^First^Middle` with trailing empty components removed.
///
/// A plain `"First Last"` string is rewritten as `Last^First`.
pub fn format_person_name(name: &PersonNameInput) -> Result<String> {
    let invalid = |reason: &str| Error::InvalidName {
        reason: reason.to_string(),
    };

    let components: Vec<String> = match name {
        PersonNameInput::Formatted(raw) => {
            let raw = raw.trim();
            if raw.contains('^') {
                raw.split('^').map(|c| c.trim().to_string()).collect()
            } else {
                let mut words: Vec<&str> = raw.split_whitespace().collect();
                match words.pop() {
                    Some(last) if !words.is_empty() => vec![last.to_string(), words.join(" ")],
                    Some(only) => vec![only.to_string()],
                    None => Vec::new(),
                }
            }
        }
        PersonNameInput::Structured {
            first_name,
            last_name,
            middle_name,
        } => vec![
            last_name.trim().to_string(),
            first_name.trim().to_string(),
            middle_name.trim().to_string(),
        ],
    };

    if components.len() > 5 {
        return Err(invalid("more than five name components"));
    }
    if components.iter().any(|c| c.contains('\\') || c.contains('=')) {
        return Err(invalid("name components may not contain '\\' or '='"));
    }

    let mut components = components;
    while components.last().is_some_and(|c| c.is_empty()) {
        components.pop();
    }
    if components.is_empty() {
        return Err(invalid("name is empty"));
    }
    Ok(components.join("^"))
}
