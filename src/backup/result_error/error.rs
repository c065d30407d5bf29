use crate::backup::result_error::{AddFunctionName, AddMsg};
use derive_more::Display;
use std::path::PathBuf;
use thiserror::Error;
use thiserror_ext::Construct;

/// Coarse classification of an [`Error`], looking through context wrappers.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Listing,
    Materialization,
    Transfer,
    Invariant,
    Config,
    Notification,
    Io,
}

#[derive(Error, Debug, Construct)]
pub enum Error {
    #[error("Cannot parse backup name {name:?}: {reason}")]
    Parse { name: String, reason: String },
    #[construct(skip)]
    #[error("Listing {path:?} failed:\n{}", indent::indent_all_with("  ", .error.to_string()))]
    Listing {
        path: PathBuf,
        #[source]
        error: Box<Error>,
    },
    #[construct(skip)]
    #[error("{operation} failed:\n{}", indent::indent_all_with("  ", .error.to_string()))]
    Materialization {
        operation: String,
        #[source]
        error: Box<Error>,
    },
    #[error("Transfer failed (exit code {exit_code:?}): {msg}")]
    Transfer { msg: String, exit_code: Option<i32> },
    #[error("Invariant violated: {0}")]
    Invariant(String),
    #[error("Command `{command}` exited with {exit_code:?}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("{0}")]
    ThreadPanic(String),
    #[error("Invalid schedule {cron:?}: {reason}")]
    Schedule { cron: String, reason: String },
    #[construct(skip)]
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[construct(skip)]
    #[error(transparent)]
    Quote(#[from] shlex::QuoteError),
    #[construct(skip)]
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[construct(skip)]
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[construct(skip)]
    #[error(transparent)]
    Lettre(#[from] lettre::error::Error),
    #[construct(skip)]
    #[error(transparent)]
    LettreSmtp(#[from] lettre::transport::smtp::Error),
    #[error("Smtp server rejected message: {0}")]
    SmtpSendError(String),
    #[construct(skip)]
    #[error("{}:\n{}", .msg, indent::indent_all_with("  ", .error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[construct(skip)]
    #[error("{} failed:\n{}", .fn_name, indent::indent_all_with("  ", .error.to_string()))]
    WithFnName { fn_name: String, error: Box<Error> },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>> AddFunctionName<S> for Error {
    fn add_fn_name(self, fn_name: S) -> Self {
        Error::WithFnName {
            fn_name: fn_name.into(),
            error: Box::new(self),
        }
    }
}

impl<S: Into<String>> AddMsg<S> for Error {
    fn add_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl Error {
    pub fn listing<P: Into<PathBuf>, E: Into<Box<Error>>>(path: P, error: E) -> Self {
        Error::Listing {
            path: path.into(),
            error: error.into(),
        }
    }

    pub fn materialization<S: Into<String>, E: Into<Box<Error>>>(operation: S, error: E) -> Self {
        Error::Materialization {
            operation: operation.into(),
            error: error.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Parse { .. } => ErrorKind::Parse,
            Error::Listing { .. } => ErrorKind::Listing,
            Error::Materialization { .. } => ErrorKind::Materialization,
            Error::Transfer { .. } => ErrorKind::Transfer,
            Error::Invariant(_) => ErrorKind::Invariant,
            Error::SerdeYml(_) | Error::ValidationError(_) | Error::Schedule { .. } => {
                ErrorKind::Config
            }
            Error::Lettre(_) | Error::LettreSmtp(_) | Error::SmtpSendError(_) => {
                ErrorKind::Notification
            }
            Error::CommandFailed { .. }
            | Error::ThreadPanic(_)
            | Error::Io(_)
            | Error::Quote(_) => ErrorKind::Io,
            Error::WithMsg { error, .. } | Error::WithFnName { error, .. } => error.kind(),
            Error::LotsOfError(errors) => errors.first().map_or(ErrorKind::Io, Error::kind),
        }
    }

    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(|e| e.into_iter())),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect())
    }
}
