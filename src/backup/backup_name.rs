//! Backup folder naming.
//!
//! A backup folder is named after the local wall-clock time it was started at,
//! in the fixed-width format `YYYY-MM-DD_HH-MM-SS`, so that the lexicographic
//! order of names equals their chronological order.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use chrono::{NaiveDateTime, Timelike};
use derive_more::{Display, Into};
use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;

pub static BACKUP_NAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Suffix of the folder a backup is written to while the transfer runs.
pub static STAGING_SUFFIX: &str = "_progress";

/// Suffix given to a staging folder whose transfer failed.
pub static ERROR_SUFFIX: &str = "_error";

static BACKUP_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})_(\d{2})-(\d{2})-(\d{2})$")
        .expect("backup name pattern is a valid regex")
});

/// A point in time at second precision, named the way backup folders are.
#[derive(Clone, Copy, Debug, Display, Into, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("{}", _0.format(BACKUP_NAME_FORMAT))]
pub struct BackupName(NaiveDateTime);

impl BackupName {
    pub fn date_time(&self) -> NaiveDateTime {
        self.0
    }

    pub fn staging_name(&self) -> String {
        format!("{self}{STAGING_SUFFIX}")
    }

    pub fn error_name(&self) -> String {
        format!("{self}{ERROR_SUFFIX}")
    }
}

/// Truncates `instant` to whole seconds.
pub fn format_name(instant: NaiveDateTime) -> BackupName {
    BackupName(instant.with_nanosecond(0).unwrap_or(instant))
}

pub fn parse_name(name: &str) -> Result<BackupName> {
    if !is_backup_name(name) {
        return Err(Error::parse(
            name,
            format!("does not match {BACKUP_NAME_FORMAT}"),
        ));
    }

    let date_time = NaiveDateTime::parse_from_str(name, BACKUP_NAME_FORMAT)
        .map_err(|e| Error::parse(name, e.to_string()))?;
    // chrono reads second 60 as a leap second.
    if date_time.nanosecond() >= 1_000_000_000 {
        return Err(Error::parse(name, "second out of range"));
    }

    Ok(BackupName(date_time))
}

/// True if `name` has the exact shape of a backup folder name. Does not check
/// that the digits form a valid calendar date.
pub fn is_backup_name(name: &str) -> bool {
    BACKUP_NAME_PATTERN.is_match(name)
}

impl FromStr for BackupName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_name(s)
    }
}

impl From<NaiveDateTime> for BackupName {
    fn from(value: NaiveDateTime) -> Self {
        format_name(value)
    }
}
