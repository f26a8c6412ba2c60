use anyhow::Context;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::actions::{settings_key, DEFAULT_SHORTCUTS};
use crate::consts::OPEN_LINKS_IN_NEW_WINDOW;

/// Settings keyed by `Group/Key` names.
///
/// User values live in a TOML file where every group is a table, so
/// `Browser/OpenLinksInNewWindow` is `[Browser] OpenLinksInNewWindow = ..`.
/// Defaults are registered at startup and never written back.
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    values: toml::Table,
    defaults: BTreeMap<String, toml::Value>,
}

impl SettingsStore {
    /// Load settings from `path`. A missing file is an empty store.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let values = match std::fs::read_to_string(path) {
            Ok(s) => toml::from_str::<toml::Table>(&s)
                .with_context(|| format!("parse settings {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => toml::Table::new(),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("read settings {}", path.display()))
            }
        };
        log::debug!(
            "settings: loaded path={} groups={}",
            path.display(),
            values.len()
        );
        Ok(Self {
            path: Some(path.to_path_buf()),
            values,
            defaults: BTreeMap::new(),
        })
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// User value, falling back to the registered default.
    pub fn get_value(&self, key: &str) -> Option<toml::Value> {
        lookup(&self.values, key)
            .or_else(|| self.defaults.get(key))
            .cloned()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get_value(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get_value(key)? {
            toml::Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn set_default_value(&mut self, key: &str, value: impl Into<toml::Value>) {
        self.defaults.insert(key.to_string(), value.into());
    }

    pub fn set_value(&mut self, key: &str, value: impl Into<toml::Value>) {
        insert(&mut self.values, key, value.into());
    }

    /// Write user values back. In-memory stores have nothing to write.
    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create settings dir {}", parent.display()))?;
        }
        let s = toml::to_string_pretty(&self.values).context("serialize settings")?;
        std::fs::write(path, s).with_context(|| format!("write settings {}", path.display()))?;
        Ok(())
    }
}

pub fn register_defaults(settings: &mut SettingsStore) {
    settings.set_default_value(OPEN_LINKS_IN_NEW_WINDOW, false);
    settings.set_default_value("Browser/EnablePlugins", true);
    settings.set_default_value("Browser/EnableJava", true);
    settings.set_default_value("Browser/EnableJavaScript", true);
    for (action, shortcut) in DEFAULT_SHORTCUTS {
        settings.set_default_value(&settings_key(action), *shortcut);
    }
}

fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.rsplit_once('/') {
        Some((groups, leaf)) => (Some(groups), leaf),
        None => (None, key),
    }
}

fn lookup<'a>(table: &'a toml::Table, key: &str) -> Option<&'a toml::Value> {
    let (groups, leaf) = split_key(key);
    let mut cur = table;
    if let Some(groups) = groups {
        for part in groups.split('/') {
            cur = cur.get(part)?.as_table()?;
        }
    }
    cur.get(leaf)
}

fn insert(table: &mut toml::Table, key: &str, value: toml::Value) {
    let (groups, leaf) = split_key(key);
    let mut cur = table;
    if let Some(groups) = groups {
        for part in groups.split('/') {
            let entry = cur
                .entry(part.to_string())
                .or_insert(toml::Value::Table(toml::Table::new()));
            // A scalar in the way of a group is replaced.
            if !entry.is_table() {
                *entry = toml::Value::Table(toml::Table::new());
            }
            let Some(next) = entry.as_table_mut() else {
                return;
            };
            cur = next;
        }
    }
    cur.insert(leaf.to_string(), value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_applies_until_overridden() {
        let mut s = SettingsStore::in_memory();
        register_defaults(&mut s);
        assert!(!s.get_bool(OPEN_LINKS_IN_NEW_WINDOW));
        assert!(s.get_bool("Browser/EnableJavaScript"));

        s.set_value(OPEN_LINKS_IN_NEW_WINDOW, true);
        assert!(s.get_bool(OPEN_LINKS_IN_NEW_WINDOW));
    }

    #[test]
    fn unknown_key_is_none() {
        let s = SettingsStore::in_memory();
        assert_eq!(s.get_value("Browser/Nope"), None);
        assert!(!s.get_bool("Browser/Nope"));
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let s = SettingsStore::open(&dir.path().join("otter.toml")).unwrap();
        assert_eq!(s.get_value(OPEN_LINKS_IN_NEW_WINDOW), None);
    }

    #[test]
    fn reads_grouped_toml() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("otter.toml");
        std::fs::write(
            &p,
            "[Browser]\nOpenLinksInNewWindow = true\n\n[Actions]\nReload = \"Ctrl+R\"\n",
        )
        .unwrap();
        let s = SettingsStore::open(&p).unwrap();
        assert!(s.get_bool(OPEN_LINKS_IN_NEW_WINDOW));
        assert_eq!(s.get_string("Actions/Reload").as_deref(), Some("Ctrl+R"));
    }

    #[test]
    fn save_writes_only_user_values() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("nested").join("otter.toml");
        let mut s = SettingsStore::open(&p).unwrap();
        register_defaults(&mut s);
        s.set_value(OPEN_LINKS_IN_NEW_WINDOW, true);
        s.save().unwrap();

        let text = std::fs::read_to_string(&p).unwrap();
        assert!(text.contains("OpenLinksInNewWindow = true"), "{text}");
        assert!(!text.contains("EnableJava"), "{text}");

        let reopened = SettingsStore::open(&p).unwrap();
        assert!(reopened.get_bool(OPEN_LINKS_IN_NEW_WINDOW));
    }

    #[test]
    fn broken_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("otter.toml");
        std::fs::write(&p, "[Browser\n").unwrap();
        assert!(SettingsStore::open(&p).is_err());
    }
}
