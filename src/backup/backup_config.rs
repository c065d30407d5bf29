use crate::backup::backup_name::{format_name, BackupName};
use crate::backup::dir_ops::local::LocalDirOps;
use crate::backup::dir_ops::remote::{RemoteDirOps, SshTarget};
use crate::backup::dir_ops::DirOps;
use crate::backup::listing::determine_last_backup;
use crate::backup::materializer::Materializer;
use crate::backup::notifications::{report_subject, Notification, NotificationConfig};
use crate::backup::producer::{RsyncConfig, RsyncProducer, TransferOutcome};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use crate::backup::retention::RetentionConfig;
use crate::backup::rotation::{rotate, RotationReport};
use crate::backup::run_log::RunLog;
use crate::backup::tier::TargetLayout;
use crate::backup::validate::{
    validate_absolute_path, validate_absolute_paths, validate_cron_str,
    validate_dir_exist_or_created,
};
use bon::Builder;
use chrono::{Local, NaiveDateTime};
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info};
use validator::{Validate, ValidationErrors};

/// One backup profile: what to copy, where to, and how long to keep it.
#[derive(Clone, Serialize, Deserialize, Debug, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct BackupConfig {
    #[validate(length(min = 1))]
    #[builder(into)]
    profile_name: String,
    #[validate(length(min = 1), custom(function = validate_absolute_paths))]
    #[builder(into)]
    sources: Vec<PathBuf>,
    #[validate(custom(function = validate_absolute_path))]
    #[builder(into)]
    target: PathBuf,
    /// Absent for a target on this machine.
    #[serde(default)]
    remote: Option<SshTarget>,
    #[serde(default)]
    #[builder(default)]
    rsync: RsyncConfig,
    #[serde(default)]
    #[builder(default)]
    retention: RetentionConfig,
    /// Cron expression. Without one, [`BackupConfig::start_loop`] runs once.
    #[serde(default)]
    #[validate(custom(function = validate_cron_str))]
    #[builder(into)]
    schedule: Option<String>,
    #[serde(default)]
    #[builder(default)]
    verbose: bool,
    #[serde(default)]
    notification: Option<NotificationConfig>,
}

/// What a successful run did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub name: BackupName,
    pub outcome: TransferOutcome,
    pub rotation: RotationReport,
}

impl BackupConfig {
    /// Validates this config and every nested section. A local target folder
    /// is created when missing.
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        self.rsync.validate()?;
        self.retention.validate()?;
        if let Some(remote) = &self.remote {
            remote.validate()?;
        }
        if let Some(notification) = &self.notification {
            notification.validate()?;
        }
        if self.remote.is_none() {
            validate_dir_exist_or_created(&self.target).map_err(|e| {
                let mut errors = ValidationErrors::new();
                errors.add("target", e);
                errors
            })?;
        }

        Ok(())
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn layout(&self) -> TargetLayout {
        TargetLayout::new(&self.target)
    }

    pub fn dir_ops(&self) -> Box<dyn DirOps> {
        match &self.remote {
            Some(remote) => Box::new(RemoteDirOps::new(remote.clone())),
            None => Box::new(LocalDirOps),
        }
    }

    /// Creates the backup for `now` and rotates the target.
    pub fn run_once(&self, now: NaiveDateTime) -> Result<RunSummary> {
        let ops = self.dir_ops();
        let layout = self.layout();
        let name = format_name(now);
        info!(
            "Starting backup {} of profile {:?} into {:?}",
            name, self.profile_name, self.target
        );

        Materializer::new(ops.as_ref(), &layout).prepare_target()?;
        let last_backup = determine_last_backup(ops.as_ref(), &layout)?;
        let outcome = RsyncProducer::new(&self.rsync, &self.sources, self.remote.as_ref()).produce(
            ops.as_ref(),
            &layout,
            name,
            last_backup.as_ref(),
        )?;
        let rotation = rotate(ops.as_ref(), &layout, &self.retention)?;

        Ok(RunSummary {
            name,
            outcome,
            rotation,
        })
    }

    /// [`Self::run_once`] with its log collected and mailed as a report.
    pub fn run(&self, now: NaiveDateTime) -> Result<RunSummary> {
        let run_log = RunLog::new();
        let result = run_log.in_scope(self.verbose, || {
            let result = self.run_once(now);
            match &result {
                Ok(summary) => info!("Backup {} finished", summary.name),
                Err(e) => error!("Backup failed:\n{e}"),
            }
            result
        });

        self.send_report(&run_log, result.is_err());
        result
    }

    fn send_report(&self, run_log: &RunLog, failed: bool) {
        let Some(notification) = &self.notification else {
            return;
        };
        let subject = report_subject(run_log.report_level(failed), &self.profile_name);
        if let Err(e) = notification
            .send(&subject, run_log.finalize())
            .add_msg(format!("Sending report {subject:?} failed"))
        {
            error!("{e}");
        }
    }

    /// Runs once without a schedule, else runs at every cron occurrence until
    /// the schedule cannot be evaluated. A failed run does not stop the loop.
    pub fn start_loop(&self) -> Result<()> {
        let Some(cron) = &self.schedule else {
            return self.run(Local::now().naive_local()).map(|_| ());
        };

        loop {
            let now = Local::now();
            let next = cron_parser::parse(cron, &now)
                .map_err(|e| Error::schedule(cron.clone(), format!("{e:?}")))?;
            info!("Sleeping until {next}");
            if let Ok(wait) = (next - now).to_std() {
                std::thread::sleep(wait);
            }
            if let Err(e) = self.run(Local::now().naive_local()) {
                error!("Waiting for the next scheduled run after failure: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::result_error::error::ErrorKind;
    use crate::backup::tier::Tier;
    use std::path::Path;
    use tempfile::TempDir;

    const FULL_CONFIG: &str = r#"
profile_name: home
sources: [/home/alice, /etc]
target: /mnt/backup/home
remote:
  host: backup.example.com
  user: alice
  port: 2222
rsync:
  options: [--exclude, .cache]
retention:
  max_daily: 14
schedule: "0 3 * * *"
verbose: true
notification:
  type: smtp
  host: smtp.example.com
  port: 465
  smtp_mode: Ssl
  from: backup@example.com
  to: [alice@example.com]
  username: alice
  password: secret
"#;

    #[test]
    fn test_parse_full_config() {
        let config: BackupConfig = serde_yml::from_str(FULL_CONFIG).unwrap();
        config.check().unwrap();
        assert_eq!(config.profile_name(), "home");
        assert_eq!(config.sources().len(), 2);
        assert_eq!(config.remote().as_ref().unwrap().port(), &2222);
        assert_eq!(config.rsync().binary(), "rsync");
        assert_eq!(config.retention().max_main, 1);
        assert_eq!(config.retention().max_daily, 14);
        assert_eq!(config.retention().max_monthly, 12);
        assert!(*config.verbose());
        assert!(config.notification().is_some());
    }

    #[test]
    fn test_parse_minimal_config() {
        let target = TempDir::new().unwrap();
        let yaml = format!(
            "profile_name: p\nsources: [/srv]\ntarget: {}\n",
            target.path().join("new").display()
        );
        let config: BackupConfig = serde_yml::from_str(&yaml).unwrap();
        config.check().unwrap();
        assert!(target.path().join("new").is_dir());
        assert_eq!(config.retention(), &RetentionConfig::default());
        assert_eq!(config.schedule(), &None);
        assert!(!*config.verbose());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let yaml = "profile_name: p\nsources: [/srv]\ntarget: /t\nretain: 3\n";
        assert!(serde_yml::from_str::<BackupConfig>(yaml).is_err());
    }

    #[test]
    fn test_check_rejects_invalid_values() {
        let config = |sources: Vec<PathBuf>, target: &str| {
            BackupConfig::builder()
                .profile_name("p")
                .sources(sources)
                .target(target)
                .remote(SshTarget::builder().host("h").build())
        };
        let srv = || vec![PathBuf::from("/srv")];
        assert!(config(srv(), "/mnt/backup").build().check().is_ok());

        let relative_source = config(vec![PathBuf::from("srv")], "/mnt/backup").build();
        assert_eq!(relative_source.check().unwrap_err().kind(), ErrorKind::Config);

        let no_source = config(Vec::new(), "/mnt/backup").build();
        assert!(no_source.check().is_err());

        let relative_target = config(srv(), "backup").build();
        assert!(relative_target.check().is_err());

        let bad_cron = config(srv(), "/mnt/backup").schedule("every day").build();
        assert!(bad_cron.check().is_err());

        let zero_capacity = config(srv(), "/mnt/backup")
            .retention(RetentionConfig {
                max_weekly: 0,
                ..RetentionConfig::default()
            })
            .build();
        assert!(zero_capacity.check().is_err());
    }

    fn fake_rsync(dir: &Path) -> RsyncConfig {
        let path = dir.join("fake-rsync");
        let calls = dir.join("calls");
        std::fs::write(
            &path,
            format!(
                "#!/bin/sh\necho \"$@\" >> '{}'\nfor last; do :; done\nmkdir -p \"$last\"\n",
                calls.display()
            ),
        )
        .unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        RsyncConfig::builder().binary(path.display().to_string()).build()
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_runs_produce_and_rotate() {
        let dir = TempDir::new().unwrap();
        let config = BackupConfig::builder()
            .profile_name("p")
            .sources(vec![PathBuf::from("/srv")])
            .target(dir.path().join("target"))
            .rsync(fake_rsync(dir.path()))
            .build();
        config.check().unwrap();
        let layout = config.layout();

        let first = config.run(at("2024-01-01 03:00:00")).unwrap();
        assert_eq!(first.outcome, TransferOutcome::Complete);
        assert_eq!(first.rotation.moved, 0);

        let second = config.run(at("2024-01-02 03:00:00")).unwrap();
        assert_eq!(second.rotation.moved, 1);
        config.run(at("2024-01-02 15:00:00")).unwrap();

        assert!(layout.root().join("2024-01-02_15-00-00").is_dir());
        assert!(layout.tier_dir(Tier::Daily).join("2024-01-01_03-00-00").is_dir());
        assert!(layout.tier_dir(Tier::Daily).join("2024-01-02_03-00-00").is_dir());
        assert_eq!(
            std::fs::read_link(layout.latest_pointer(Tier::Main)).unwrap(),
            Path::new("2024-01-02_15-00-00")
        );
        assert_eq!(
            std::fs::read_link(layout.latest_pointer(Tier::Daily)).unwrap(),
            Path::new("2024-01-02_03-00-00")
        );

        let calls = std::fs::read_to_string(dir.path().join("calls")).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(calls.len(), 3);
        assert!(!calls[0].contains("--link-dest"));
        assert!(calls[1].contains("--link-dest ../2024-01-01_03-00-00"));
        assert!(calls[2].contains("--link-dest ../2024-01-02_03-00-00"));
    }

    #[test]
    fn test_failed_transfer_skips_rotation() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target");
        std::fs::create_dir_all(target.join("2024-01-01_03-00-00")).unwrap();
        let config = BackupConfig::builder()
            .profile_name("p")
            .sources(vec![PathBuf::from("/srv")])
            .target(&target)
            .rsync(RsyncConfig::builder().binary("false").build())
            .build();

        let error = config.run(at("2024-01-02 03:00:00")).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Transfer);
        // Rotation never ran, so nothing moved to the daily tier.
        assert!(target.join("2024-01-01_03-00-00").is_dir());
        assert!(!target.join("__latest").exists());
    }
}
