use std::time::Duration;

/// Application name; also the endpoint name every instance coordinates on.
pub const APP_NAME: &str = "Otter";
pub const APP_DIR_NAME: &str = "otter";

pub const SETTINGS_FILE_NAME: &str = "otter.toml";
pub const SESSIONS_DIR_NAME: &str = "sessions";
pub const JOURNAL_FILE_NAME: &str = "windows.jsonl";

pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
pub const READ_TIMEOUT: Duration = Duration::from_millis(1000);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

// Back-off after a failed accept so a persistent error (e.g. EMFILE) doesn't spin.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

pub const OPEN_LINKS_IN_NEW_WINDOW: &str = "Browser/OpenLinksInNewWindow";
