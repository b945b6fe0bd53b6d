pub mod memory;
pub mod spill;

use std::path::{Component, Path, PathBuf};

/// Map a logical path onto a path relative to an output root.
///
/// Leading separators are stripped; `None` for paths that would escape the
/// root or name nothing (`..`, drive prefixes, empty).
pub fn relative_path(logical: &str) -> Option<PathBuf> {
    let trimmed = logical.trim_start_matches(['/', '\\']);
    let mut out = PathBuf::new();
    for comp in Path::new(trimmed).components() {
        match comp {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_separators() {
        assert_eq!(
            relative_path("/project_root/src/a.rs"),
            Some(PathBuf::from("project_root/src/a.rs"))
        );
        assert_eq!(relative_path("//x/./y"), Some(PathBuf::from("x/y")));
    }

    #[test]
    fn rejects_escapes_and_empty_paths() {
        assert_eq!(relative_path("/project_root/../../etc/passwd"), None);
        assert_eq!(relative_path("/"), None);
        assert_eq!(relative_path(""), None);
        assert_eq!(relative_path("/./"), None);
    }
}
