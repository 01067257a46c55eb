use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str = "wayline-time.toml";
const TIMEZONE_ENV_VAR: &str = "WAYLINE_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str = "WAYLINE_TIME_CONFIG";

pub const COMPACT_DATE_FORMAT: &str = "%Y%m%d";
pub const CLOCK_TIME_FORMAT: &str = "%H:%M";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
    timezone: Option<String>,
    time: Option<TimezoneSection>,
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
    timezone: Option<String>,
}

/// Configured zone for calendar-date evaluation. `None` means the system
/// local zone.
pub fn configured_timezone() -> Option<&'static Tz> {
    static CONFIGURED_TZ: OnceLock<Option<Tz>> = OnceLock::new();
    CONFIGURED_TZ.get_or_init(resolve_timezone).as_ref()
}

/// Calendar date of `now` as the user sees it. Filters and time buckets
/// compare against this, never against the UTC date.
#[must_use]
pub fn local_date(now: DateTime<Utc>) -> NaiveDate {
    match configured_timezone() {
        Some(tz) => now.with_timezone(tz).date_naive(),
        None => now.with_timezone(&Local).date_naive(),
    }
}

#[must_use]
pub fn today() -> NaiveDate {
    local_date(Utc::now())
}

fn resolve_timezone() -> Option<Tz> {
    if let Ok(raw) = std::env::var(TIMEZONE_ENV_VAR)
        && let Some(tz) = parse_timezone(&raw, TIMEZONE_ENV_VAR)
    {
        return Some(tz);
    }

    if let Some(path) = timezone_config_path()
        && let Some(tz) = load_timezone_from_file(&path)
    {
        return Some(tz);
    }

    tracing::debug!("no timezone configured; using system local zone");
    None
}

fn timezone_config_path() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var(TIMEZONE_CONFIG_ENV_VAR) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    std::env::current_dir()
        .ok()
        .map(|dir| dir.join(TIMEZONE_CONFIG_FILE))
}

fn load_timezone_from_file(path: &PathBuf) -> Option<Tz> {
    if !path.exists() {
        return None;
    }

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::error!(
                file = %path.display(),
                error = %err,
                "failed reading timezone config file"
            );
            return None;
        }
    };

    let parsed = match toml::from_str::<TimezoneConfig>(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::error!(
                file = %path.display(),
                error = %err,
                "failed parsing timezone config file"
            );
            return None;
        }
    };

    let timezone = parsed
        .timezone
        .or_else(|| parsed.time.and_then(|section| section.timezone));
    let Some(timezone) = timezone else {
        tracing::warn!(file = %path.display(), "timezone config had no timezone field");
        return None;
    };

    parse_timezone(&timezone, &format!("file:{}", path.display()))
}

fn parse_timezone(raw: &str, source: &str) -> Option<Tz> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        tracing::warn!(source, "timezone source was empty");
        return None;
    }

    match trimmed.parse::<Tz>() {
        Ok(tz) => {
            tracing::info!(source, timezone = %trimmed, "configured timezone");
            Some(tz)
        }
        Err(err) => {
            tracing::error!(
                source,
                timezone = %trimmed,
                error = %err,
                "failed to parse timezone id"
            );
            None
        }
    }
}

/// Parses a due-date expression relative to `today`: `today`, `tomorrow`,
/// `+Nd`, `YYYYMMDD` or `YYYY-MM-DD`.
#[tracing::instrument(skip(today))]
pub fn parse_due_date(input: &str, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    let token = input.trim().to_ascii_lowercase();

    match token.as_str() {
        "today" | "tod" => return Ok(today),
        "tomorrow" | "tom" => {
            return today
                .checked_add_days(Days::new(1))
                .ok_or_else(|| anyhow!("date out of range: {input}"));
        }
        _ => {}
    }

    let relative = Regex::new(r"^\+(\d{1,4})d$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;
    if let Some(caps) = relative.captures(&token) {
        let days: u64 = caps[1].parse()?;
        return today
            .checked_add_days(Days::new(days))
            .ok_or_else(|| anyhow!("date out of range: {input}"));
    }

    let calendar = Regex::new(r"^(\d{4})-?(\d{2})-?(\d{2})$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;
    if let Some(caps) = calendar.captures(&token) {
        let year: i32 = caps[1].parse()?;
        let month: u32 = caps[2].parse()?;
        let day: u32 = caps[3].parse()?;
        return NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| anyhow!("invalid calendar date: {input}"));
    }

    Err(anyhow!("unrecognised date expression: {input}"))
}

pub fn parse_due_time(input: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(input.trim(), CLOCK_TIME_FORMAT)
        .map_err(|err| anyhow!("invalid time of day '{input}': {err}"))
}

#[must_use]
pub fn format_compact_date(date: NaiveDate) -> String {
    date.format(COMPACT_DATE_FORMAT).to_string()
}

pub fn parse_compact_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), COMPACT_DATE_FORMAT).ok()
}

/// `YYYYMMDD` calendar dates.
pub mod compact_date_serde {
    pub mod option {
        use chrono::NaiveDate;
        use serde::{Deserialize, Deserializer, Serializer};

        use crate::datetime::COMPACT_DATE_FORMAT;

        pub fn serialize<S>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match date {
                Some(value) => {
                    serializer.serialize_str(&value.format(COMPACT_DATE_FORMAT).to_string())
                }
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) if raw.trim().is_empty() => Ok(None),
                Some(raw) => NaiveDate::parse_from_str(raw.trim(), COMPACT_DATE_FORMAT)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}

/// `HH:MM` times of day.
pub mod clock_time_serde {
    pub mod option {
        use chrono::NaiveTime;
        use serde::{Deserialize, Deserializer, Serializer};

        use crate::datetime::CLOCK_TIME_FORMAT;

        pub fn serialize<S>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match time {
                Some(value) => {
                    serializer.serialize_str(&value.format(CLOCK_TIME_FORMAT).to_string())
                }
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) if raw.trim().is_empty() => Ok(None),
                Some(raw) => NaiveTime::parse_from_str(raw.trim(), CLOCK_TIME_FORMAT)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}

/// `YYYYMMDDTHHMMSSZ` UTC timestamps.
pub mod timestamp_serde {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::datetime::TIMESTAMP_FORMAT;

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&dt.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
            .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, NaiveDateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        use crate::datetime::TIMESTAMP_FORMAT;

        pub fn serialize<S>(dt: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match dt {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
                    .map(|ndt| Some(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc)))
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}
