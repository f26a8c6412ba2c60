use std::path::PathBuf;

use crate::consts::{APP_DIR_NAME, JOURNAL_FILE_NAME, SESSIONS_DIR_NAME, SETTINGS_FILE_NAME};

/// Per-user directory for runtime artifacts such as the endpoint socket.
pub fn default_runtime_dir() -> PathBuf {
    if let Some(d) = std::env::var_os("XDG_RUNTIME_DIR") {
        return PathBuf::from(d);
    }
    PathBuf::from("/tmp")
}

pub fn default_config_dir() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
    base.join(APP_DIR_NAME)
}

pub fn default_data_dir() -> PathBuf {
    if let Some(d) = dirs::data_dir() {
        return d.join(APP_DIR_NAME);
    }
    PathBuf::from("/tmp").join(APP_DIR_NAME)
}

pub fn settings_path() -> PathBuf {
    default_config_dir().join(SETTINGS_FILE_NAME)
}

pub fn sessions_dir() -> PathBuf {
    default_config_dir().join(SESSIONS_DIR_NAME)
}

pub fn journal_path() -> PathBuf {
    default_data_dir().join(JOURNAL_FILE_NAME)
}

pub fn safe_for_filename(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}
