use std::fmt;
use std::path::Path;

use url::Url;

use crate::sessions::SessionEntry;

/// Opaque handle of a top-level window, unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(u64);

impl WindowId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub trait Window {
    fn open_url(&mut self, url: &Url);
    fn raise(&mut self);
    fn activate(&mut self);
}

/// Creates the concrete windows the registry owns.
pub trait WindowFactory {
    type Window: Window;

    fn create(&mut self, id: WindowId, private: bool) -> Self::Window;
}

/// Owns every window of the primary instance, most recently created first.
pub struct WindowRegistry<F: WindowFactory> {
    factory: F,
    windows: Vec<(WindowId, F::Window)>,
    next_id: u64,
}

impl<F: WindowFactory> WindowRegistry<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            windows: Vec::new(),
            next_id: 1,
        }
    }

    /// Create a window and make it the current one. Session URLs are opened
    /// on it in order.
    pub fn create_window(&mut self, private: bool, session: Option<&SessionEntry>) -> WindowId {
        let id = WindowId(self.next_id);
        self.next_id += 1;

        let mut window = self.factory.create(id, private);
        if let Some(session) = session {
            for arg in &session.urls {
                match resolve_url(arg) {
                    Some(url) => window.open_url(&url),
                    None => log::warn!("windows: skipping session entry {:?}", arg),
                }
            }
        }
        log::debug!("windows: created id={} private={}", id, private);

        self.windows.insert(0, (id, window));
        id
    }

    pub fn current(&self) -> Option<WindowId> {
        self.windows.first().map(|(id, _)| *id)
    }

    /// Current window, or a fresh non-private one if there is none.
    pub fn get_or_create(&mut self) -> WindowId {
        match self.current() {
            Some(id) => id,
            None => self.create_window(false, None),
        }
    }

    /// Most recent first.
    pub fn list_windows(&self) -> Vec<WindowId> {
        self.windows.iter().map(|(id, _)| *id).collect()
    }

    pub fn window(&self, id: WindowId) -> Option<&F::Window> {
        self.windows.iter().find(|(w, _)| *w == id).map(|(_, w)| w)
    }

    pub fn window_mut(&mut self, id: WindowId) -> Option<&mut F::Window> {
        self.windows
            .iter_mut()
            .find(|(w, _)| *w == id)
            .map(|(_, w)| w)
    }

    pub fn remove_window(&mut self, id: WindowId) -> Option<F::Window> {
        let pos = self.windows.iter().position(|(w, _)| *w == id)?;
        Some(self.windows.remove(pos).1)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }
}

/// `arg` when it already is an absolute URL.
pub fn parse_absolute_url(arg: &str) -> Option<Url> {
    let url = Url::parse(arg).ok()?;
    // "localhost:8080" parses with "localhost" as the scheme.
    if !url.cannot_be_a_base() || matches!(url.scheme(), "about" | "data" | "mailto" | "javascript")
    {
        return Some(url);
    }
    None
}

/// Interpret a command-line argument as something a window can open.
///
/// Absolute URLs are kept and absolute or existing local paths become
/// `file://` URLs. Relative paths resolve against this process's directory,
/// so forwarded launches absolutize them before sending (see
/// [`crate::cli::absolutize_paths`]). Anything else that can be a host gets
/// `http://` in front; what can't (e.g. text with spaces) is taken as a file
/// name.
pub fn resolve_url(arg: &str) -> Option<Url> {
    let arg = arg.trim();
    if arg.is_empty() {
        return None;
    }

    if let Some(url) = parse_absolute_url(arg) {
        return Some(url);
    }

    let path = Path::new(arg);
    if path.is_absolute() {
        return Url::from_file_path(path).ok();
    }
    if path.exists() {
        if let Ok(abs) = path.canonicalize() {
            if let Ok(url) = Url::from_file_path(abs) {
                return Some(url);
            }
        }
    }

    if !arg.chars().any(char::is_whitespace) {
        if let Ok(url) = Url::parse(&format!("http://{arg}")) {
            return Some(url);
        }
    }
    let cwd = std::env::current_dir().ok()?;
    Url::from_file_path(cwd.join(path)).ok()
}
