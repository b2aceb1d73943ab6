//! Partitioning of expenses into one remote file per calendar day.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::Expense;
use crate::{Error, Result};

/// Prefix shared by every day shard file.
pub const SHARD_PREFIX: &str = "expenses-";
/// Extension of day shard files.
pub const SHARD_EXTENSION: &str = "csv";
/// Remote file holding the synced settings payload.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

static SHARD_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^expenses-(\d{4}-\d{2}-\d{2})\.csv$").expect("Invalid regex")
});

/// A local calendar day in `YYYY-MM-DD` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayKey(NaiveDate);

impl DayKey {
    #[must_use]
    pub const fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    #[must_use]
    pub const fn date(self) -> NaiveDate {
        self.0
    }

    /// Canonical shard filename for this day.
    #[must_use]
    pub fn filename(self) -> String {
        format!("{SHARD_PREFIX}{self}.{SHARD_EXTENSION}")
    }

    /// Inverse of [`DayKey::filename`]; `None` for anything that isn't a shard.
    #[must_use]
    pub fn from_filename(name: &str) -> Option<Self> {
        let captures = SHARD_NAME.captures(name)?;
        captures[1].parse().ok()
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DayKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|error| Error::InvalidInput(format!("invalid day '{s}': {error}")))
    }
}

impl TryFrom<String> for DayKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DayKey> for String {
    fn from(value: DayKey) -> Self {
        value.to_string()
    }
}

/// Time zone whose calendar decides which shard a record lands in.
///
/// Sharding follows the user's wall calendar, never UTC, so an expense at
/// 00:30 local time belongs to that local day even when UTC still says
/// yesterday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShardZone {
    /// The machine's local time zone, DST included.
    #[default]
    Local,
    /// A fixed UTC offset.
    Fixed(FixedOffset),
}

impl ShardZone {
    /// Local calendar day of a Unix-millisecond instant.
    pub fn day_of(self, millis: i64) -> Result<DayKey> {
        let instant = DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or_else(|| Error::InvalidInput(format!("timestamp out of range: {millis}")))?;
        let date = match self {
            Self::Local => instant.with_timezone(&Local).date_naive(),
            Self::Fixed(offset) => instant.with_timezone(&offset).date_naive(),
        };
        Ok(DayKey(date))
    }

    /// Group records by the local calendar day of their `date`.
    pub fn shard(self, records: &[Expense]) -> Result<BTreeMap<DayKey, Vec<Expense>>> {
        let mut shards: BTreeMap<DayKey, Vec<Expense>> = BTreeMap::new();
        for record in records {
            shards
                .entry(self.day_of(record.date)?)
                .or_default()
                .push(record.clone());
        }
        Ok(shards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Amount, ExpenseId};

    fn expense_at(id: &str, date: i64) -> Expense {
        Expense {
            id: id.parse::<ExpenseId>().unwrap(),
            amount: Amount::from_minor_units(100),
            category: "Food".to_string(),
            date,
            note: None,
            payment_method: None,
            created_at: date,
            updated_at: date,
        }
    }

    fn plus_hours(hours: i32) -> ShardZone {
        ShardZone::Fixed(FixedOffset::east_opt(hours * 3600).unwrap())
    }

    #[test]
    fn filename_and_parse_are_inverse() {
        let day: DayKey = "2024-02-29".parse().unwrap();
        assert_eq!(day.filename(), "expenses-2024-02-29.csv");
        assert_eq!(DayKey::from_filename(&day.filename()), Some(day));
    }

    #[test]
    fn from_filename_ignores_foreign_names() {
        assert_eq!(DayKey::from_filename("settings.json"), None);
        assert_eq!(DayKey::from_filename("README.md"), None);
        assert_eq!(DayKey::from_filename("expenses-2024-13-01.csv"), None);
        assert_eq!(DayKey::from_filename("expenses-2024-01-01.csv.bak"), None);
        assert_eq!(DayKey::from_filename("old-expenses-2024-01-01.csv"), None);
    }

    #[test]
    fn day_follows_local_offset_not_utc() {
        // 2024-03-01T23:30:00Z is already March 2nd at UTC+5.
        let millis = 1_709_335_800_000;
        assert_eq!(
            ShardZone::Fixed(FixedOffset::east_opt(0).unwrap())
                .day_of(millis)
                .unwrap()
                .to_string(),
            "2024-03-01"
        );
        assert_eq!(plus_hours(5).day_of(millis).unwrap().to_string(), "2024-03-02");
        assert_eq!(plus_hours(-5).day_of(millis).unwrap().to_string(), "2024-03-01");
    }

    #[test]
    fn same_local_day_shares_a_shard_regardless_of_order() {
        let zone = plus_hours(5);
        // Both are 2024-03-02 at UTC+5 but straddle the UTC midnight.
        let late_utc = expense_at("a", 1_709_335_800_000);
        let early_utc = expense_at("b", 1_709_339_400_000);
        let other_day = expense_at("c", 1_709_500_000_000);

        let forward = zone
            .shard(&[late_utc.clone(), early_utc.clone(), other_day.clone()])
            .unwrap();
        let backward = zone.shard(&[other_day, early_utc, late_utc]).unwrap();

        let day: DayKey = "2024-03-02".parse().unwrap();
        assert_eq!(forward.len(), 2);
        assert_eq!(forward[&day].len(), 2);
        assert_eq!(
            forward.keys().collect::<Vec<_>>(),
            backward.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn every_record_roundtrips_through_its_filename() {
        let zone = plus_hours(-8);
        for millis in [0, 1_709_335_800_000, 1_893_456_000_000] {
            let day = zone.day_of(millis).unwrap();
            assert_eq!(DayKey::from_filename(&day.filename()), Some(day));
        }
    }

    #[test]
    fn day_key_serializes_as_text() {
        let day: DayKey = "2024-07-04".parse().unwrap();
        assert_eq!(serde_json::to_string(&day).unwrap(), "\"2024-07-04\"");
        assert!(serde_json::from_str::<DayKey>("\"July 4th\"").is_err());
    }
}
