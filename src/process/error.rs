use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("process not started")]
    NotStarted,
    #[error("failed to spawn `{command}`: `{source}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to resolve credentials: `{0}`")]
    Credentials(#[from] crate::credentials::CredentialsError),
    #[error("failed to signal process `{pid}`: `{source}`")]
    Signal {
        pid: i32,
        #[source]
        source: nix::Error,
    },
    #[error("failed to set up output pipeline for `{path}`: `{source}`")]
    Output {
        path: PathBuf,
        #[source]
        source: crate::output::OutputError,
    },
    #[error("lost contact with the reaper for pid `{0}`")]
    ReaperDisconnected(i32),
}
