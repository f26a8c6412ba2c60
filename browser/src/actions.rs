use crate::settings::SettingsStore;

/// Default keyboard shortcuts, stored under `Actions/<name>`.
pub const DEFAULT_SHORTCUTS: &[(&str, &str)] = &[
    ("NewTab", "Ctrl+T"),
    ("Open", "Ctrl+O"),
    ("Save", "Ctrl+S"),
    ("Exit", "Ctrl+Q"),
    ("Undo", "Ctrl+Z"),
    ("Redo", "Ctrl+Shift+Z"),
    ("Cut", "Ctrl+X"),
    ("Copy", "Ctrl+C"),
    ("Paste", "Ctrl+V"),
    ("Delete", "Del"),
    ("SelectAll", "Ctrl+A"),
    ("Reload", "F5"),
    ("ZoomIn", "Ctrl++"),
    ("ZoomOut", "Ctrl+-"),
    ("Back", "Alt+Left"),
    ("Forward", "Alt+Right"),
    ("Help", "F1"),
    ("ApplicationConfiguration", ""),
    ("Fullscreen", "F11"),
];

pub fn settings_key(action: &str) -> String {
    format!("Actions/{action}")
}

/// Action name -> shortcut table, read once from settings.
#[derive(Debug, Clone, Default)]
pub struct ActionsManager {
    actions: Vec<(String, Option<String>)>,
}

impl ActionsManager {
    pub fn from_settings(settings: &SettingsStore) -> Self {
        let actions = DEFAULT_SHORTCUTS
            .iter()
            .map(|(name, _)| {
                let shortcut = settings
                    .get_string(&settings_key(name))
                    .filter(|s| !s.trim().is_empty());
                (name.to_string(), shortcut)
            })
            .collect();
        Self { actions }
    }

    /// `None` for unknown or unbound actions.
    pub fn shortcut(&self, action: &str) -> Option<&str> {
        self.actions
            .iter()
            .find(|(name, _)| name == action)
            .and_then(|(_, s)| s.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.actions
            .iter()
            .map(|(name, s)| (name.as_str(), s.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
