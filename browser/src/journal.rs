use serde::Serialize;
use url::Url;

use std::io::Write;
use std::path::PathBuf;

use crate::windows::{Window, WindowFactory, WindowId};

#[derive(Debug, Clone, Serialize)]
pub struct WindowEvent {
    pub ts_ms: u64,
    pub window: u64,
    pub kind: String,
    pub private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn append_event(path: &PathBuf, event: &WindowEvent) {
    // Best-effort; a read-only data dir must not take windows down.
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let line = match serde_json::to_string(event) {
        Ok(s) => s,
        Err(_) => return,
    };

    let mut f = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        Ok(v) => v,
        Err(_) => return,
    };

    let _ = f.write_all(line.as_bytes());
    let _ = f.write_all(b"\n");
}

/// Headless window: every action is logged and, if a journal path is set,
/// appended to it as a JSON line.
#[derive(Debug)]
pub struct JournalWindow {
    id: WindowId,
    private: bool,
    path: Option<PathBuf>,
    urls: Vec<Url>,
}

impl JournalWindow {
    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    /// Everything opened on this window so far, in order.
    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    fn record(&self, kind: &str, url: Option<&Url>) {
        log::info!(
            "window: id={} kind={} private={} url={}",
            self.id,
            kind,
            self.private,
            url.map(|u| u.as_str()).unwrap_or("-")
        );
        if let Some(path) = &self.path {
            append_event(
                path,
                &WindowEvent {
                    ts_ms: now_ms(),
                    window: self.id.get(),
                    kind: kind.to_string(),
                    private: self.private,
                    url: url.map(|u| u.to_string()),
                },
            );
        }
    }
}

impl Window for JournalWindow {
    fn open_url(&mut self, url: &Url) {
        self.record("open_url", Some(url));
        self.urls.push(url.clone());
    }

    fn raise(&mut self) {
        self.record("raise", None);
    }

    fn activate(&mut self) {
        self.record("activate", None);
    }
}

#[derive(Debug, Clone, Default)]
pub struct JournalFactory {
    path: Option<PathBuf>,
}

impl JournalFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn log_only() -> Self {
        Self::default()
    }
}

impl WindowFactory for JournalFactory {
    type Window = JournalWindow;

    fn create(&mut self, id: WindowId, private: bool) -> JournalWindow {
        let window = JournalWindow {
            id,
            private,
            path: self.path.clone(),
            urls: Vec::new(),
        };
        window.record("created", None);
        window
    }
}
