use std::{io, path::PathBuf};

use thiserror::Error;

use crate::client::ClientError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} does not exist or is not a directory")]
    InvalidSourcePath(PathBuf),
    #[error("Authentication failed: the access token was rejected")]
    AuthenticationFailed,
    #[error("Client error: {0}")]
    Client(#[from] ClientError),
    #[error("Unexpected error: {0:#}")]
    Unexpected(#[from] anyhow::Error),
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Unexpected(anyhow::anyhow!("io error: {}", error))
    }
}
