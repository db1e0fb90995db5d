// SPDX-License-Identifier: MIT

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::exit::ExitStatus;

pub type CoreResult<T = ()> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(
        "Either all or none of the filesystem types passed to -t must be prefixed\nwith 'no' or '!'."
    )]
    AmbiguousTypeFilter,

    #[error("option '{0}' may be specified only once")]
    RepeatedOption(&'static str),

    #[error("invalid argument of {option}: {value}")]
    InvalidArgument { option: &'static str, value: String },

    #[error("too many devices")]
    TooManyDevices,

    #[error("failed to read config {path}: {source}")]
    Config {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("cannot create directory {path}: {source}")]
    LockDir { path: PathBuf, source: io::Error },

    #[error("cannot lock {path}: {source}")]
    Lock { path: PathBuf, source: io::Error },

    #[error("error 2 (No such file or directory) while executing {program} for {device}")]
    CheckerNotFound { program: String, device: String },

    #[error("{program}: execute failed for {device}: {source}")]
    Spawn {
        program: String,
        device: String,
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CoreError {
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CoreError::AmbiguousTypeFilter
                | CoreError::RepeatedOption(_)
                | CoreError::InvalidArgument { .. }
                | CoreError::Config { .. }
        )
    }

    /// Status a front-end should exit with when this error stops the run.
    pub fn exit_status(&self) -> ExitStatus {
        if self.is_config_error() {
            ExitStatus::USAGE
        } else {
            ExitStatus::ERROR
        }
    }
}
