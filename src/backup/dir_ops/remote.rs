//! [`DirOps`] on a target only reachable through a shell, normally over ssh.
//!
//! Every operation is one shell command; arguments are quoted with `shlex`.

use crate::backup::dir_ops::{DirOps, PathKind};
use crate::backup::function_path;
use crate::backup::process::{call, CallOutput};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddFunctionName;
use bon::Builder;
use function_name::named;
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Runs a single shell command on the target.
pub trait RemoteShell {
    fn run(&self, command: &str) -> Result<CallOutput>;
}

/// Remote target reached with `ssh`.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, PartialEq, Eq, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct SshTarget {
    #[validate(length(min = 1))]
    #[builder(into)]
    host: String,
    #[serde(default)]
    #[builder(into)]
    user: Option<String>,
    #[serde(default = "default_ssh_port")]
    #[builder(default = DEFAULT_SSH_PORT)]
    port: u16,
    /// Extra arguments for every `ssh` call, also passed to rsync's `-e`.
    #[serde(default)]
    #[builder(default, into)]
    ssh_options: Vec<String>,
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl SshTarget {
    /// Options for `ssh`, without the host.
    pub fn ssh_args(&self) -> Vec<String> {
        let mut args = self.ssh_options.clone();
        if let Some(user) = self.user.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            args.push("-l".to_owned());
            args.push(user.to_owned());
        }
        if self.port != DEFAULT_SSH_PORT {
            args.push("-p".to_owned());
            args.push(self.port.to_string());
        }
        args
    }
}

impl RemoteShell for SshTarget {
    fn run(&self, command: &str) -> Result<CallOutput> {
        let mut args = self.ssh_args();
        args.push(self.host.clone());
        args.push(command.to_owned());
        call("ssh", &args, "ssh")
    }
}

/// Runs commands with the local `sh`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalShell;

impl RemoteShell for LocalShell {
    fn run(&self, command: &str) -> Result<CallOutput> {
        call("sh", &["-c".to_owned(), command.to_owned()], "sh")
    }
}

#[derive(Clone, Debug)]
pub struct RemoteDirOps<S: RemoteShell> {
    shell: S,
}

impl<S: RemoteShell> RemoteDirOps<S> {
    pub fn new(shell: S) -> Self {
        Self { shell }
    }

    fn run_checked(&self, command: &str) -> Result<CallOutput> {
        self.shell.run(command)?.check(command)
    }
}

pub fn quote(path: &Path) -> Result<String> {
    Ok(shlex::try_quote(&path.to_string_lossy())?.into_owned())
}

impl<S: RemoteShell> DirOps for RemoteDirOps<S> {
    #[named]
    fn list_child_dirs(&self, path: &Path) -> Result<Vec<String>> {
        // The trailing `/.` makes find enter a symlinked directory.
        let command = format!(
            "find {} -mindepth 1 -maxdepth 1 -type d",
            quote(&path.join("."))?
        );
        let output = self.run_checked(&command).add_fn_name(function_path!())?;
        Ok(output
            .stdout
            .iter()
            .filter_map(|line| Path::new(line).file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    #[named]
    fn move_dir(&self, from: &Path, to: &Path) -> Result<()> {
        let command = format!("mv {} {}", quote(from)?, quote(to)?);
        self.run_checked(&command).add_fn_name(function_path!())?;
        Ok(())
    }

    #[named]
    fn remove_all(&self, path: &Path) -> Result<()> {
        let command = format!("rm -rf {}", quote(path)?);
        self.run_checked(&command).add_fn_name(function_path!())?;
        Ok(())
    }

    #[named]
    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        let command = format!("ln -s {} {}", quote(target)?, quote(link)?);
        self.run_checked(&command).add_fn_name(function_path!())?;
        Ok(())
    }

    #[named]
    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let command = format!("mkdir -p -m 0700 {}", quote(path)?);
        self.run_checked(&command).add_fn_name(function_path!())?;
        Ok(())
    }

    #[named]
    fn path_kind(&self, path: &Path) -> Result<Option<PathKind>> {
        // The marker tells our answer apart from anything a login script prints.
        let marker = Uuid::new_v4().to_string();
        let quoted = quote(path)?;
        let command = format!(
            "if [ -L {quoted} ]; then echo {marker} symlink; \
             elif [ -d {quoted} ]; then echo {marker} dir; \
             elif [ -e {quoted} ]; then echo {marker} other; \
             else echo {marker} none; fi"
        );
        let output = self.run_checked(&command).add_fn_name(function_path!())?;
        let answer = output
            .stdout
            .iter()
            .find_map(|line| line.strip_prefix(marker.as_str()))
            .map(str::trim);

        match answer {
            Some("symlink") => Ok(Some(PathKind::Symlink)),
            Some("dir") => Ok(Some(PathKind::Directory)),
            Some("other") => Ok(Some(PathKind::Other)),
            Some("none") => Ok(None),
            _ => Err(Error::command_failed(
                command,
                output.exit_code,
                format!("unexpected output {:?}", output.stdout),
            )
            .add_fn_name(function_path!())),
        }
    }
}
