use std::path::{Component, Path};

/// Map a local relative path under the remote destination root into the
/// remote store path form: `/` separated, no doubled or trailing slash.
pub fn remote_path(remote_root: &str, relative_path: &Path) -> String {
    let mut segments: Vec<&str> = remote_root.split('/').filter(|s| !s.is_empty()).collect();
    for component in relative_path.components() {
        if let Component::Normal(part) = component {
            if let Some(part) = part.to_str() {
                segments.push(part);
            }
        }
    }
    format!("/{}", segments.join("/"))
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("backup", "a.txt", "/backup/a.txt")]
    #[case("/backup/", "a.txt", "/backup/a.txt")]
    #[case("backup", "sub/dir/a.txt", "/backup/sub/dir/a.txt")]
    #[case("backup/photos", "a.jpg", "/backup/photos/a.jpg")]
    #[case("", "a.txt", "/a.txt")]
    #[case("/", "a.txt", "/a.txt")]
    fn test_remote_path(#[case] root: &str, #[case] relative: &str, #[case] expected: &str) {
        assert_eq!(remote_path(root, &PathBuf::from(relative)), expected);
    }
}
