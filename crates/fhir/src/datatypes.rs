//! FHIR datatypes shared by the resource structs.
//!
//! Every struct here is strict: unknown members are rejected so that schema problems are
//! reported with a path instead of silently dropped.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Envelope
// ============================================================================

/// Resource metadata. `version_id` and `last_updated` are owned by the server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    /// Canonical URLs of profiles this resource claims to conform to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profile: Vec<String>,
}

impl Meta {
    /// True when nothing would be serialised.
    pub fn is_empty(&self) -> bool {
        self.version_id.is_none() && self.last_updated.is_none() && self.profile.is_empty()
    }
}

// ============================================================================
// Names and identifiers
// ============================================================================

/// Purpose of a human name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameUse {
    Usual,
    Official,
    Temp,
    Nickname,
    Anonymous,
    Old,
    Maiden,
}

/// A human name. At least one of `family` / `given` is required by the structural rules.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HumanName {
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_type: Option<NameUse>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub given: Vec<String>,
}

/// Administrative gender value set (required binding).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdministrativeGender {
    Male,
    Female,
    Other,
    Unknown,
}

impl AdministrativeGender {
    pub const ALL: [AdministrativeGender; 4] = [
        AdministrativeGender::Male,
        AdministrativeGender::Female,
        AdministrativeGender::Other,
        AdministrativeGender::Unknown,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            AdministrativeGender::Male => "male",
            AdministrativeGender::Female => "female",
            AdministrativeGender::Other => "other",
            AdministrativeGender::Unknown => "unknown",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Identifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

// ============================================================================
// Codes, references, quantities
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Coding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A literal reference such as `Patient/p1`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Reference {
    /// Splits `Type/id` into its parts. Returns `None` for any other shape.
    pub fn type_and_id(&self) -> Option<(&str, &str)> {
        let reference = self.reference.as_deref()?;
        let (kind, id) = reference.split_once('/')?;
        if kind.is_empty() || id.is_empty() || id.contains('/') {
            return None;
        }
        Some((kind, id))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Quantity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

// ============================================================================
// Dates
// ============================================================================

/// Errors raised when parsing FHIR date and dateTime values.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DateError {
    #[error("malformed date '{0}' (expected YYYY, YYYY-MM or YYYY-MM-DD)")]
    Malformed(String),
    #[error("malformed dateTime '{0}' (expected a date or an RFC 3339 timestamp with offset)")]
    MalformedDateTime(String),
}

/// Half-open interval `[start, end)` in UTC covered by a date value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &DateRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// A FHIR `date`: year, year-month or full date, without time zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FhirDate {
    year: i32,
    month: Option<u32>,
    day: Option<u32>,
}

impl FhirDate {
    pub fn parse(input: &str) -> Result<Self, DateError> {
        let malformed = || DateError::Malformed(input.to_owned());
        let digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());

        let mut parts = input.split('-');
        let year_text = parts.next().ok_or_else(malformed)?;
        if !digits(year_text, 4) {
            return Err(malformed());
        }
        let year: i32 = year_text.parse().map_err(|_| malformed())?;
        if year == 0 {
            return Err(malformed());
        }

        let month = match parts.next() {
            Some(m) if digits(m, 2) => {
                let m: u32 = m.parse().map_err(|_| malformed())?;
                if !(1..=12).contains(&m) {
                    return Err(malformed());
                }
                Some(m)
            }
            Some(_) => return Err(malformed()),
            None => None,
        };

        let day = match parts.next() {
            Some(d) if digits(d, 2) && month.is_some() => {
                let d: u32 = d.parse().map_err(|_| malformed())?;
                Some(d)
            }
            Some(_) => return Err(malformed()),
            None => None,
        };

        if parts.next().is_some() {
            return Err(malformed());
        }

        let date = Self { year, month, day };
        // Calendar check (rejects 2023-02-30 and friends).
        date.first_day().ok_or_else(malformed)?;
        Ok(date)
    }

    fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month.unwrap_or(1), self.day.unwrap_or(1))
    }

    /// The interval covered at this date's precision.
    pub fn range(&self) -> DateRange {
        // parse() guarantees a valid first day; ranges past year 9999 saturate.
        let start = self.first_day().unwrap_or(NaiveDate::MIN);
        let end = match (self.month, self.day) {
            (Some(_), Some(_)) => start.succ_opt(),
            (Some(12), None) => NaiveDate::from_ymd_opt(self.year + 1, 1, 1),
            (Some(m), None) => NaiveDate::from_ymd_opt(self.year, m + 1, 1),
            _ => NaiveDate::from_ymd_opt(self.year + 1, 1, 1),
        }
        .unwrap_or(NaiveDate::MAX);

        DateRange {
            start: start.and_time(chrono::NaiveTime::MIN).and_utc(),
            end: end.and_time(chrono::NaiveTime::MIN).and_utc(),
        }
    }
}

impl fmt::Display for FhirDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.year)?;
        if let Some(m) = self.month {
            write!(f, "-{m:02}")?;
        }
        if let Some(d) = self.day {
            write!(f, "-{d:02}")?;
        }
        Ok(())
    }
}

impl FromStr for FhirDate {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for FhirDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FhirDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FhirDate::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A FHIR `dateTime`: either a (partial) date or a full timestamp with offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FhirDateTime {
    Date(FhirDate),
    Instant(DateTime<FixedOffset>),
}

impl FhirDateTime {
    pub fn parse(input: &str) -> Result<Self, DateError> {
        if input.contains('T') {
            DateTime::parse_from_rfc3339(input)
                .map(FhirDateTime::Instant)
                .map_err(|_| DateError::MalformedDateTime(input.to_owned()))
        } else {
            FhirDate::parse(input)
                .map(FhirDateTime::Date)
                .map_err(|_| DateError::MalformedDateTime(input.to_owned()))
        }
    }

    /// Timestamps are treated as covering one second.
    pub fn range(&self) -> DateRange {
        match self {
            FhirDateTime::Date(date) => date.range(),
            FhirDateTime::Instant(instant) => {
                let start = instant.with_timezone(&Utc);
                DateRange {
                    start,
                    end: start + Duration::seconds(1),
                }
            }
        }
    }
}

impl fmt::Display for FhirDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FhirDateTime::Date(date) => date.fmt(f),
            FhirDateTime::Instant(instant) => {
                f.write_str(&instant.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

impl FromStr for FhirDateTime {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for FhirDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FhirDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FhirDateTime::parse(&s).map_err(serde::de::Error::custom)
    }
}
