use clap::Parser;
use rotating_backup::backup::backup_config::BackupConfig;
use rotating_backup::backup::result_error::error::Error;
use rotating_backup::backup::result_error::AddMsg;
use std::fs::File;
use std::path::PathBuf;
use std::process::exit;
use tracing::error;

/// Hardlinked incremental backups with daily, weekly and monthly rotation
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,
    /// Run a single backup now, ignoring the configured schedule
    #[arg(long)]
    once: bool,
    /// Log debug output, including everything rsync and ssh print
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let res = File::open(&args.config)
        .map_err(Error::from)
        .and_then(|f| {
            serde_yml::from_reader::<_, BackupConfig>(f)
                .map_err(Error::from)
                .add_msg(format!("Parse YAML config failed: {:?}", &args.config))
        })
        .and_then(|bc| {
            bc.check()
                .map(|_| bc)
                .add_msg(format!("Config validation failed: {:?}", &args.config))
        })
        .map(|bc| if args.verbose { bc.with_verbose(true) } else { bc })
        .and_then(|bc| {
            if args.once {
                bc.run(chrono::Local::now().naive_local()).map(|_| ())
            } else {
                bc.start_loop()
            }
        });

    // A scheduled loop only returns on error.
    if let Err(e) = res {
        error!("{e}");
        exit(1);
    }
}
