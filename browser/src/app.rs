use std::future::Future;
use std::io;

use tokio::net::UnixStream;
use tokio::sync::mpsc;
use wire::ArgumentBatch;

use crate::actions::ActionsManager;
use crate::cli::LaunchArgs;
use crate::consts::{ACCEPT_RETRY_DELAY, OPEN_LINKS_IN_NEW_WINDOW};
use crate::instance::{read_forwarded, PrimaryInstance, Timeouts};
use crate::sessions::SessionsManager;
use crate::settings::SettingsStore;
use crate::windows::{resolve_url, Window, WindowFactory, WindowId, WindowRegistry};

/// Something a window asks the application to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRequest {
    NewWindow { private: bool },
    Close(WindowId),
}

/// Handle windows use to send [`WindowRequest`]s to the accept loop.
#[derive(Debug, Clone)]
pub struct WindowRequester(mpsc::UnboundedSender<WindowRequest>);

impl WindowRequester {
    pub fn new_window(&self, private: bool) {
        let _ = self.0.send(WindowRequest::NewWindow { private });
    }

    pub fn close(&self, id: WindowId) {
        let _ = self.0.send(WindowRequest::Close(id));
    }
}

/// Process-wide state of the primary instance.
pub struct AppContext<F: WindowFactory> {
    pub settings: SettingsStore,
    pub actions: ActionsManager,
    pub sessions: SessionsManager,
    pub windows: WindowRegistry<F>,
    requests_tx: mpsc::UnboundedSender<WindowRequest>,
    requests_rx: mpsc::UnboundedReceiver<WindowRequest>,
}

/// What a forwarded launch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub window: WindowId,
    pub created: bool,
    pub opened: usize,
}

impl<F: WindowFactory> AppContext<F> {
    pub fn new(settings: SettingsStore, sessions: SessionsManager, factory: F) -> Self {
        let actions = ActionsManager::from_settings(&settings);
        log::debug!(
            "app: registered actions={} bound={}",
            actions.len(),
            actions.iter().filter(|(_, s)| s.is_some()).count()
        );
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        Self {
            settings,
            actions,
            sessions,
            windows: WindowRegistry::new(factory),
            requests_tx,
            requests_rx,
        }
    }

    pub fn requester(&self) -> WindowRequester {
        WindowRequester(self.requests_tx.clone())
    }

    /// New empty window on request of an existing one.
    pub fn new_window(&mut self, private: bool) -> WindowId {
        self.windows.create_window(private, None)
    }

    /// Drop a closed window. Returns `true` when it was the last one, which
    /// ends the primary instance.
    pub fn close_window(&mut self, id: WindowId) -> bool {
        if self.windows.remove_window(id).is_none() {
            log::debug!("app: close of unknown window id={}", id);
            return false;
        }
        log::debug!("app: closed window id={} left={}", id, self.windows.len());
        self.windows.is_empty()
    }

    /// Apply one window request; `true` means the last window is gone.
    pub fn handle_request(&mut self, request: WindowRequest) -> bool {
        match request {
            WindowRequest::NewWindow { private } => {
                let id = self.new_window(private);
                if let Some(w) = self.windows.window_mut(id) {
                    w.raise();
                    w.activate();
                }
                false
            }
            WindowRequest::Close(id) => self.close_window(id),
        }
    }

    /// Open the first window of the primary instance.
    pub fn start(&mut self, args: &LaunchArgs) -> WindowId {
        let session = match args.session.as_deref() {
            Some(name) => match self.sessions.load(name) {
                Ok(Some(entry)) => Some(entry),
                Ok(None) => {
                    log::info!("app: no saved session name={}", name);
                    None
                }
                Err(e) => {
                    log::warn!("app: session {} unusable: {e:?}", name);
                    None
                }
            },
            None => None,
        };

        let id = self
            .windows
            .create_window(args.private_session, session.as_ref());
        self.open_urls(id, &args.urls);
        id
    }

    /// Route a batch forwarded by a secondary launch to a window.
    ///
    /// An empty batch only comes from a payload that did not decode; it just
    /// brings the current window forward.
    pub fn on_incoming_connection(&mut self, batch: &ArgumentBatch) -> DispatchReport {
        let args = if batch.is_empty() {
            None
        } else {
            Some(LaunchArgs::from_batch(batch))
        };

        let new_window = match &args {
            Some(a) => self.settings.get_bool(OPEN_LINKS_IN_NEW_WINDOW) && !a.private_session,
            None => false,
        };

        let (window, created) = if new_window {
            (self.windows.create_window(false, None), true)
        } else {
            let before = self.windows.len();
            let id = self.windows.get_or_create();
            (id, self.windows.len() != before)
        };

        let opened = match &args {
            Some(a) => self.open_urls(window, &a.urls),
            None => 0,
        };

        if let Some(w) = self.windows.window_mut(window) {
            w.raise();
            w.activate();
        }

        DispatchReport {
            window,
            created,
            opened,
        }
    }

    fn open_urls(&mut self, id: WindowId, urls: &[String]) -> usize {
        let Some(window) = self.windows.window_mut(id) else {
            return 0;
        };
        let mut opened = 0;
        for arg in urls {
            match resolve_url(arg) {
                Some(url) => {
                    window.open_url(&url);
                    opened += 1;
                }
                None => log::warn!("app: not a url {:?}", arg),
            }
        }
        opened
    }
}

enum Event {
    Shutdown,
    Accepted(io::Result<UnixStream>),
    Request(Option<WindowRequest>),
}

/// Accept loop of the primary instance.
///
/// Connections and window requests are handled one at a time in arrival
/// order. A failed connection only loses that launch. The loop runs until
/// `shutdown` resolves or the last window is closed.
pub async fn serve<F, S>(
    ctx: &mut AppContext<F>,
    primary: &PrimaryInstance,
    timeouts: &Timeouts,
    shutdown: S,
) where
    F: WindowFactory,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    log::info!(
        "serve: accepting endpoint={}",
        primary.endpoint().path().display()
    );

    loop {
        let event = tokio::select! {
            _ = &mut shutdown => Event::Shutdown,
            accepted = primary.accept() => Event::Accepted(accepted),
            request = ctx.requests_rx.recv() => Event::Request(request),
        };

        match event {
            Event::Shutdown => {
                log::info!("serve: shutdown");
                return;
            }
            Event::Request(Some(request)) => {
                if ctx.handle_request(request) {
                    log::info!("serve: last window closed");
                    return;
                }
            }
            // The context keeps a sender alive, so this can't happen.
            Event::Request(None) => {}
            Event::Accepted(Err(e)) => {
                log::warn!("serve: accept failed: {e:?}");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
            Event::Accepted(Ok(stream)) => match read_forwarded(stream, timeouts).await {
                Ok(batch) => {
                    let report = ctx.on_incoming_connection(&batch);
                    log::info!(
                        "serve: dispatched window={} created={} opened={}",
                        report.window,
                        report.created,
                        report.opened
                    );
                }
                Err(e) => log::warn!("serve: dropped forwarded launch: {e}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::SessionEntry;
    use crate::settings::register_defaults;
    use crate::windows::testing::RecordingFactory;

    fn batch(args: &[&str]) -> ArgumentBatch {
        ArgumentBatch::new(args.iter().map(|s| s.to_string()).collect())
    }

    fn ctx(open_in_new_window: bool) -> (AppContext<RecordingFactory>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = SettingsStore::in_memory();
        register_defaults(&mut settings);
        settings.set_value(OPEN_LINKS_IN_NEW_WINDOW, open_in_new_window);
        let ctx = AppContext::new(settings, SessionsManager::new(dir.path()), RecordingFactory);
        (ctx, dir)
    }

    #[test]
    fn urls_open_in_order_on_a_new_window_when_none_exist() {
        let (mut ctx, _dir) = ctx(false);
        let report =
            ctx.on_incoming_connection(&batch(&["otter", "https://u1.example/", "https://u2.example/"]));
        assert!(report.created);
        assert_eq!(report.opened, 2);

        let w = ctx.windows.window(report.window).unwrap();
        assert_eq!(w.urls, vec!["https://u1.example/", "https://u2.example/"]);
        assert_eq!((w.raised, w.activated), (1, 1));
    }

    #[test]
    fn private_session_reuses_existing_window() {
        let (mut ctx, _dir) = ctx(true);
        let existing = ctx.windows.create_window(false, None);
        let report = ctx.on_incoming_connection(&batch(&[
            "otter",
            "--privatesession",
            "https://u1.example/",
        ]));
        assert_eq!(report.window, existing);
        assert!(!report.created);
        assert_eq!(ctx.windows.len(), 1);
        assert_eq!(ctx.windows.window(existing).unwrap().urls, vec!["https://u1.example/"]);
    }

    #[test]
    fn open_links_in_new_window_creates_one_per_launch() {
        let (mut ctx, _dir) = ctx(true);
        let first = ctx.windows.create_window(false, None);
        let report = ctx.on_incoming_connection(&batch(&["otter", "https://u1.example/"]));
        assert_ne!(report.window, first);
        assert!(report.created);
        assert_eq!(ctx.windows.current(), Some(report.window));
        assert!(!ctx.windows.window(report.window).unwrap().private);
    }

    #[test]
    fn most_recent_window_is_reused_by_default() {
        let (mut ctx, _dir) = ctx(false);
        ctx.windows.create_window(false, None);
        let newest = ctx.windows.create_window(false, None);
        let report = ctx.on_incoming_connection(&batch(&["otter", "https://u1.example/"]));
        assert_eq!(report.window, newest);
        assert!(!report.created);
    }

    #[test]
    fn undecodable_batch_only_raises_current_window() {
        let (mut ctx, _dir) = ctx(true);
        let existing = ctx.windows.create_window(false, None);
        let damaged = ArgumentBatch::from_line_lossy("garbage!!\n");
        let report = ctx.on_incoming_connection(&damaged);
        assert_eq!(
            report,
            DispatchReport {
                window: existing,
                created: false,
                opened: 0
            }
        );
        let w = ctx.windows.window(existing).unwrap();
        assert!(w.urls.is_empty());
        assert_eq!(w.raised, 1);
    }

    #[test]
    fn start_restores_named_session_and_opens_urls() {
        let (mut ctx, _dir) = ctx(false);
        ctx.sessions
            .save(
                "work",
                &SessionEntry {
                    urls: vec!["https://s.example/".to_string()],
                },
            )
            .unwrap();
        let args = LaunchArgs {
            urls: vec!["https://u1.example/".to_string()],
            session: Some("work".to_string()),
            private_session: true,
            config: None,
        };
        let id = ctx.start(&args);
        let w = ctx.windows.window(id).unwrap();
        assert!(w.private);
        assert_eq!(w.urls, vec!["https://s.example/", "https://u1.example/"]);
    }

    #[test]
    fn window_can_request_new_windows() {
        let (mut ctx, _dir) = ctx(false);
        let first = ctx.windows.create_window(false, None);
        assert!(!ctx.handle_request(WindowRequest::NewWindow { private: true }));

        let newest = ctx.windows.current().unwrap();
        assert_ne!(newest, first);
        let w = ctx.windows.window(newest).unwrap();
        assert!(w.private);
        assert_eq!(w.raised, 1);
    }

    #[test]
    fn closing_last_window_quits() {
        let (mut ctx, _dir) = ctx(false);
        let a = ctx.windows.create_window(false, None);
        let b = ctx.new_window(false);
        assert!(!ctx.close_window(b));
        assert!(!ctx.close_window(b), "unknown window must not quit");
        assert_eq!(ctx.windows.current(), Some(a));
        assert!(ctx.close_window(a));
    }

    #[tokio::test]
    async fn serve_returns_after_last_window_closes() {
        let (mut ctx, dir) = ctx(false);
        let ep = crate::endpoint::Endpoint::at_path("Otter", dir.path().join("Otter"));
        let primary = PrimaryInstance::bind(&ep).unwrap();
        let first = ctx.start(&LaunchArgs::default());

        let requester = ctx.requester();
        requester.new_window(true);
        requester.close(first);
        let grace = tokio::time::sleep(std::time::Duration::from_millis(200));
        serve(&mut ctx, &primary, &Timeouts::default(), grace).await;

        // Still one window open, so only the grace period ended the loop.
        assert_eq!(ctx.windows.len(), 1);
        let second = ctx.windows.current().unwrap();
        assert!(ctx.windows.window(second).unwrap().private);

        requester.close(second);
        serve(&mut ctx, &primary, &Timeouts::default(), std::future::pending()).await;
        assert!(ctx.windows.is_empty());

        drop(primary);
        assert!(!ep.path().exists());
    }

    #[test]
    fn start_without_session_file_opens_plain_window() {
        let (mut ctx, _dir) = ctx(false);
        let args = LaunchArgs {
            session: Some("missing".to_string()),
            ..Default::default()
        };
        let id = ctx.start(&args);
        assert!(ctx.windows.window(id).unwrap().urls.is_empty());
        assert_eq!(ctx.windows.len(), 1);
    }
}
