use std::fmt;
use std::fs;
use std::path::PathBuf;

use crate::client::{ClientError, Dropbox};
use crate::error::Error;

/// Run configuration, built once at startup. The remote client is
/// constructed from it and passed explicitly to the syncer.
#[derive(Clone)]
pub struct Context {
    pub folder_path: PathBuf,
    pub remote_path: String,
    pub access_token: String,
}

impl Context {
    pub fn new(
        folder_path: PathBuf,
        remote_path: String,
        access_token: String,
    ) -> Result<Self, Error> {
        let folder_path = fs::canonicalize(&folder_path)
            .map_err(|_| Error::InvalidSourcePath(folder_path.clone()))?;
        if !folder_path.is_dir() {
            return Err(Error::InvalidSourcePath(folder_path));
        }
        Ok(Self {
            folder_path,
            remote_path,
            access_token,
        })
    }

    pub fn client(&self) -> Result<Dropbox, ClientError> {
        Dropbox::new(self.access_token.clone())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("folder_path", &self.folder_path)
            .field("remote_path", &self.remote_path)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rejects_missing_directory() {
        let result = Context::new(
            PathBuf::from("/does/not/exist"),
            "backup".to_string(),
            "token".to_string(),
        );

        assert!(matches!(result, Err(Error::InvalidSourcePath(_))));
    }

    #[test]
    fn test_rejects_regular_file_as_source() {
        let tmpdir = tempfile::tempdir().unwrap();
        let file_path = tmpdir.path().join("a.txt");
        fs::write(&file_path, b"hello").unwrap();

        let result = Context::new(file_path, "backup".to_string(), "token".to_string());

        assert!(matches!(result, Err(Error::InvalidSourcePath(_))));
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let tmpdir = tempfile::tempdir().unwrap();
        let context = Context::new(
            tmpdir.path().to_path_buf(),
            "backup".to_string(),
            "secret-token".to_string(),
        )
        .unwrap();

        assert!(!format!("{:?}", context).contains("secret-token"));
    }
}
