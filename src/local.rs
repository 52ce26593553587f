use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use walkdir::{DirEntry, WalkDir};

/// A regular file found under the sync root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub modified: DateTime<Utc>,
    pub size: u64,
}

/// Local mtime is compared at second precision: the remote store truncates
/// `client_modified` to whole seconds.
pub fn truncate_to_seconds(value: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(value.timestamp(), 0).single().unwrap_or(value)
}

pub struct LocalWalk {
    root: PathBuf,
}

impl LocalWalk {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Lazily enumerate every regular file under the root. Symbolic links are
    /// not followed. Directory entries that fail to read are yielded as
    /// errors so the caller can isolate them per file.
    pub fn files(&self) -> impl Iterator<Item = Result<LocalFile>> {
        let root = self.root.clone();
        let filter_root = self.root.clone();
        WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(move |entry| !ignore_entry(&filter_root, entry))
            .filter_map(move |entry| match entry {
                Ok(entry) => {
                    if !entry.file_type().is_file() {
                        return None;
                    }
                    Some(local_file(&root, &entry))
                }
                Err(error) => Some(Err(anyhow::anyhow!("Read disk entry: {}", error))),
            })
    }
}

fn local_file(root: &Path, entry: &DirEntry) -> Result<LocalFile> {
    let absolute_path = entry.path().to_path_buf();
    let relative_path = absolute_path
        .strip_prefix(root)
        .context(format!(
            "Path {} expected under root {}",
            absolute_path.display(),
            root.display()
        ))?
        .to_path_buf();
    let metadata = entry
        .metadata()
        .context(format!("Read metadata of {}", absolute_path.display()))?;
    let modified = metadata
        .modified()
        .context(format!("Read mtime of {}", absolute_path.display()))?;
    Ok(LocalFile {
        relative_path,
        absolute_path,
        modified: truncate_to_seconds(DateTime::<Utc>::from(modified)),
        size: metadata.len(),
    })
}

fn ignore_entry(root: &Path, entry: &DirEntry) -> bool {
    if root == entry.path() {
        return false;
    }

    if let Some(file_name) = entry.path().file_name() {
        if let Some(file_name) = file_name.to_str() {
            if file_name.starts_with('.')
                || file_name.starts_with('~')
                || file_name.starts_with('@')
                || file_name.starts_with('#')
                || file_name.ends_with('~')
            {
                log::debug!("Ignore {}", entry.path().display());
                return true;
            }
        }
    }

    false
}

#[cfg(test)]
mod test {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;

    fn relative_paths(walk: &LocalWalk) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = walk
            .files()
            .map(|file| file.unwrap().relative_path)
            .collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_empty_root() {
        let tmpdir = tempfile::tempdir().unwrap();
        let walk = LocalWalk::new(tmpdir.path());

        assert_eq!(relative_paths(&walk), Vec::<PathBuf>::new());
    }

    #[test]
    fn test_recursive_enumeration() {
        let tmpdir = tempfile::tempdir().unwrap();
        fs::write(tmpdir.path().join("a.txt"), b"a").unwrap();
        fs::create_dir_all(tmpdir.path().join("sub/dir")).unwrap();
        fs::write(tmpdir.path().join("sub/dir/b.txt"), b"b").unwrap();
        let walk = LocalWalk::new(tmpdir.path());

        assert_eq!(
            relative_paths(&walk),
            vec![PathBuf::from("a.txt"), PathBuf::from("sub/dir/b.txt")]
        );
    }

    #[test]
    fn test_ignore_temporary_and_hidden_files() {
        let tmpdir = tempfile::tempdir().unwrap();
        fs::write(tmpdir.path().join("a.txt"), b"a").unwrap();
        fs::write(tmpdir.path().join(".hidden"), b"x").unwrap();
        fs::write(tmpdir.path().join("draft~"), b"x").unwrap();
        fs::write(tmpdir.path().join("#lock"), b"x").unwrap();
        fs::create_dir(tmpdir.path().join(".git")).unwrap();
        fs::write(tmpdir.path().join(".git/config"), b"x").unwrap();
        let walk = LocalWalk::new(tmpdir.path());

        assert_eq!(relative_paths(&walk), vec![PathBuf::from("a.txt")]);
    }

    #[test]
    fn test_hidden_root_is_walked() {
        let tmpdir = tempfile::tempdir().unwrap();
        let root = tmpdir.path().join(".config");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("a.txt"), b"a").unwrap();
        let walk = LocalWalk::new(&root);

        assert_eq!(relative_paths(&walk), vec![PathBuf::from("a.txt")]);
    }

    #[test]
    fn test_modified_is_second_precision() {
        let tmpdir = tempfile::tempdir().unwrap();
        fs::write(tmpdir.path().join("a.txt"), b"a").unwrap();
        let walk = LocalWalk::new(tmpdir.path());

        let file = walk.files().next().unwrap().unwrap();

        assert_eq!(file.modified.timestamp_subsec_nanos(), 0);
        assert_eq!(file.size, 1);
    }
}
