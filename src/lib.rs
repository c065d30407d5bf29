//! # rotating_backup
//!
//! Incremental backups with `rsync --link-dest` and a rotation of the results
//! through daily, weekly and monthly tiers.
//!
//! ## Features
//!
//! - **Hardlinked snapshots**: every backup is a full tree; unchanged files are
//!   hardlinks into the previous backup
//! - **Rotation**: main → `_daily` → `_weekly` → `_monthly`, one backup per
//!   day / ISO week / month, with a `__latest` link per tier
//! - **Local or ssh targets**: the same rotation runs through `ssh` commands
//! - **Reports**: the log of each run can be mailed over SMTP
//! - **Scheduling**: optional cron expression
//!
//! ## Quick Start
//!
//! ```no_run
//! use rotating_backup::backup::backup_config::BackupConfig;
//!
//! let config: BackupConfig = serde_yml::from_reader(std::fs::File::open("config.yml")?)?;
//! config.check()?;
//! config.start_loop()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
