use std::path::{Path, PathBuf};

use crate::consts::APP_NAME;
use crate::paths::{default_runtime_dir, safe_for_filename};

/// Well-known local socket every instance of the application tries first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    name: String,
    path: PathBuf,
}

impl Endpoint {
    /// Socket in the per-user runtime dir. Without `XDG_RUNTIME_DIR` the
    /// file goes to `/tmp` and carries the effective uid, so users never
    /// share an endpoint.
    pub fn for_name(name: &str) -> Self {
        let file = safe_for_filename(name);
        let path = if std::env::var_os("XDG_RUNTIME_DIR").is_some() {
            default_runtime_dir().join(file)
        } else {
            let uid = unsafe { libc::geteuid() };
            default_runtime_dir().join(format!("{}-{}", file, uid))
        };
        Self {
            name: name.to_string(),
            path,
        }
    }

    pub fn at_path(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::for_name(APP_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_file_is_derived_from_name() {
        let e = Endpoint::for_name("Otter");
        let file = e.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(file.starts_with("Otter"), "unexpected endpoint file {file:?}");
        assert_eq!(e.name(), "Otter");
    }

    #[test]
    fn same_name_gives_same_endpoint() {
        assert_eq!(Endpoint::for_name("Otter"), Endpoint::for_name("Otter"));
        assert_eq!(Endpoint::default(), Endpoint::for_name(APP_NAME));
    }
}
