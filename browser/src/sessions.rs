use anyhow::Context;
use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

use crate::paths::safe_for_filename;

/// Saved contents of one window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Named sessions stored as `<dir>/<name>.toml`.
#[derive(Debug, Clone)]
pub struct SessionsManager {
    dir: PathBuf,
}

impl SessionsManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.toml", safe_for_filename(name)))
    }

    /// `Ok(None)` when no session of that name was saved.
    pub fn load(&self, name: &str) -> anyhow::Result<Option<SessionEntry>> {
        let path = self.path_for(name);
        let s = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("read session {}", path.display()))
            }
        };
        let entry: SessionEntry =
            toml::from_str(&s).with_context(|| format!("parse session {}", path.display()))?;
        Ok(Some(entry))
    }

    pub fn save(&self, name: &str, entry: &SessionEntry) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create sessions dir {}", self.dir.display()))?;
        let path = self.path_for(name);
        let s = toml::to_string_pretty(entry).context("serialize session")?;
        std::fs::write(&path, s).with_context(|| format!("write session {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_session_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionsManager::new(dir.path());
        assert_eq!(sessions.load("work").unwrap(), None);
    }

    #[test]
    fn saved_session_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionsManager::new(dir.path().join("sessions"));
        let entry = SessionEntry {
            urls: vec!["https://example.org".to_string(), "about:blank".to_string()],
        };
        sessions.save("work", &entry).unwrap();
        assert_eq!(sessions.load("work").unwrap(), Some(entry));
    }

    #[test]
    fn session_names_cannot_escape_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionsManager::new(dir.path());
        let p = sessions.path_for("../../etc/passwd");
        assert_eq!(p.parent(), Some(dir.path()));
    }

    #[test]
    fn broken_session_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionsManager::new(dir.path());
        std::fs::write(sessions.path_for("bad"), "urls = [").unwrap();
        assert!(sessions.load("bad").is_err());
    }
}
