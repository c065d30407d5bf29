//! Retention policy.
//!
//! Decides which backups of a tier stay, move on to the next tier or get
//! deleted. Nothing in here touches the filesystem: decisions are computed
//! from a listing and handed to the [materializer](crate::backup::materializer).

use crate::backup::listing::BackupEntry;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::tier::Tier;
use chrono::{Datelike, NaiveDateTime};
use derive_more::Display;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use validator::Validate;

/// Maximum number of backups kept per tier.
#[derive(Clone, Debug, Validate, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    #[serde(default = "default_max_main")]
    #[validate(range(min = 1))]
    pub max_main: usize,
    #[serde(default = "default_max_daily")]
    #[validate(range(min = 1))]
    pub max_daily: usize,
    #[serde(default = "default_max_weekly")]
    #[validate(range(min = 1))]
    pub max_weekly: usize,
    #[serde(default = "default_max_monthly")]
    #[validate(range(min = 1))]
    pub max_monthly: usize,
}

fn default_max_main() -> usize {
    1
}

fn default_max_daily() -> usize {
    7
}

fn default_max_weekly() -> usize {
    52
}

fn default_max_monthly() -> usize {
    12
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_main: default_max_main(),
            max_daily: default_max_daily(),
            max_weekly: default_max_weekly(),
            max_monthly: default_max_monthly(),
        }
    }
}

/// Calendar period used to collapse a tier to one backup per period.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Granularity {
    Day,
    IsoWeek,
    Month,
}

impl Granularity {
    /// Integer key of the period `t` falls in. Keys of later periods compare
    /// greater.
    ///
    /// The ISO week key combines the ISO year with the ISO week, so the first
    /// days of January may share a key with the end of the previous December.
    pub fn period_key(self, t: &NaiveDateTime) -> i32 {
        match self {
            Granularity::Day => t.year() * 10000 + t.month() as i32 * 100 + t.day() as i32,
            Granularity::IsoWeek => {
                let week = t.iso_week();
                week.year() * 10000 + week.week() as i32 * 100
            }
            Granularity::Month => t.year() * 10000 + t.month() as i32 * 100,
        }
    }
}

/// Split of a set of entries: `keep` stays where it is, `rest` is handed on
/// (moved or deleted depending on the operation).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Partition {
    pub keep: Vec<BackupEntry>,
    pub rest: Vec<BackupEntry>,
}

/// Keeps the `capacity` most recent entries. The overflow (`rest`) is the
/// oldest `count - capacity` entries, oldest first.
pub fn excess<I: IntoIterator<Item = BackupEntry>>(entries: I, capacity: usize) -> Partition {
    let mut sorted = entries
        .into_iter()
        .sorted_by_key(|e| e.name)
        .collect_vec();

    let overflow_len = sorted.len().saturating_sub(capacity);
    let keep = sorted.split_off(overflow_len);
    Partition { keep, rest: sorted }
}

/// Keeps the newest entry of every period and discards (`rest`) the others.
///
/// Entries are walked newest first. A period key newer than the one before it
/// means the walk is not descending and is reported as an invariant violation.
pub fn dedupe<I: IntoIterator<Item = BackupEntry>>(
    entries: I,
    granularity: Granularity,
) -> Result<Partition> {
    let sorted = entries
        .into_iter()
        .sorted_by_key(|e| Reverse(e.name))
        .collect_vec();

    dedupe_descending(sorted, granularity)
}

fn dedupe_descending(sorted: Vec<BackupEntry>, granularity: Granularity) -> Result<Partition> {
    let mut partition = Partition::default();
    let mut current_key: Option<i32> = None;
    for entry in sorted {
        let key = granularity.period_key(&entry.name.date_time());
        tracing::debug!("{} falls in {} period {}", entry.name, granularity, key);

        match current_key {
            Some(current) if key == current => {
                tracing::debug!("Period {} already kept, discarding {}", key, entry.name);
                partition.rest.push(entry);
            }
            Some(current) if key > current => {
                return Err(Error::invariant(format!(
                    "period {key} of {} is newer than period {current} seen before it",
                    entry.name
                )));
            }
            _ => {
                current_key = Some(key);
                partition.keep.push(entry);
            }
        }
    }

    Ok(partition)
}

/// What one policy step does with a tier's current contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetentionDecision {
    pub tier: Tier,
    pub keep: Vec<BackupEntry>,
    /// Moved to `tier.next()`.
    pub moves: Vec<BackupEntry>,
    pub deletes: Vec<BackupEntry>,
}

impl RetentionDecision {
    pub fn destination(&self) -> Option<Tier> {
        self.tier.next()
    }

    pub fn is_noop(&self) -> bool {
        self.moves.is_empty() && self.deletes.is_empty()
    }
}

/// Capacity enforcement: overflow moves to the next tier, or is deleted when
/// `tier` is the last one.
pub fn decide_capacity<I: IntoIterator<Item = BackupEntry>>(
    tier: Tier,
    entries: I,
    capacity: usize,
) -> RetentionDecision {
    let Partition { keep, rest } = excess(entries, capacity);
    let (moves, deletes) = match tier.next() {
        Some(_) => (rest, Vec::new()),
        None => (Vec::new(), rest),
    };

    RetentionDecision {
        tier,
        keep,
        moves,
        deletes,
    }
}

/// Period deduplication with the tier's own granularity. Never moves.
pub fn decide_dedupe<I: IntoIterator<Item = BackupEntry>>(
    tier: Tier,
    entries: I,
) -> Result<RetentionDecision> {
    let granularity = tier
        .granularity()
        .ok_or_else(|| Error::invariant(format!("{tier} tier has no grouping granularity")))?;
    let Partition { keep, rest } = dedupe(entries, granularity)?;

    Ok(RetentionDecision {
        tier,
        keep,
        moves: Vec::new(),
        deletes: rest,
    })
}
