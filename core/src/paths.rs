use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

/// Collapses `.` and `..` components without touching the filesystem.
pub fn lexical_normal(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

/// Rewrites a search-result path to an absolute, lexically normal form by
/// joining relative paths onto `base`.
pub fn absolutize(base: &str, path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let path = Path::new(path);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        Path::new(base).join(path)
    };
    lexical_normal(&joined).to_string_lossy().into_owned()
}

/// Absolute, lexically normal form of a CLI-supplied path, resolved against
/// the process working directory.
pub fn normalize_cli_path(path: &Path) -> PathBuf {
    match std::path::absolute(path) {
        Ok(abs) => lexical_normal(&abs),
        Err(_) => path.to_path_buf(),
    }
}
