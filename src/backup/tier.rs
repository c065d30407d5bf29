use crate::backup::retention::{Granularity, RetentionConfig};
use derive_more::Display;
use getset::Getters;
use std::path::{Path, PathBuf};

pub static DAILY_FOLDER_NAME: &str = "_daily";
pub static WEEKLY_FOLDER_NAME: &str = "_weekly";
pub static MONTHLY_FOLDER_NAME: &str = "_monthly";

/// Reserved name of the per-tier pointer to the newest backup.
pub static LATEST_POINTER_NAME: &str = "__latest";

/// Retention stage a backup folder lives in. Ordered from most recent to
/// oldest stage.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Main,
    Daily,
    Weekly,
    Monthly,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Main, Tier::Daily, Tier::Weekly, Tier::Monthly];

    /// Folder name under the target root, `None` for the root itself.
    pub fn folder_name(self) -> Option<&'static str> {
        match self {
            Tier::Main => None,
            Tier::Daily => Some(DAILY_FOLDER_NAME),
            Tier::Weekly => Some(WEEKLY_FOLDER_NAME),
            Tier::Monthly => Some(MONTHLY_FOLDER_NAME),
        }
    }

    /// Tier receiving this tier's overflow. Overflow of the last tier is
    /// deleted.
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Main => Some(Tier::Daily),
            Tier::Daily => Some(Tier::Weekly),
            Tier::Weekly => Some(Tier::Monthly),
            Tier::Monthly => None,
        }
    }

    pub fn granularity(self) -> Option<Granularity> {
        match self {
            Tier::Main => None,
            Tier::Daily => Some(Granularity::Day),
            Tier::Weekly => Some(Granularity::IsoWeek),
            Tier::Monthly => Some(Granularity::Month),
        }
    }

    pub fn capacity(self, retention: &RetentionConfig) -> usize {
        match self {
            Tier::Main => retention.max_main,
            Tier::Daily => retention.max_daily,
            Tier::Weekly => retention.max_weekly,
            Tier::Monthly => retention.max_monthly,
        }
    }
}

/// Where each tier lives below one target root. The root may be local or on
/// a remote host; the layout only computes paths.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct TargetLayout {
    root: PathBuf,
}

impl TargetLayout {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn tier_dir(&self, tier: Tier) -> PathBuf {
        match tier.folder_name() {
            None => self.root.clone(),
            Some(name) => self.root.join(name),
        }
    }

    pub fn latest_pointer(&self, tier: Tier) -> PathBuf {
        self.tier_dir(tier).join(LATEST_POINTER_NAME)
    }

    /// `path` relative to the target root, for log lines and `--link-dest`.
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}
