/// Dictionary file watching
///
/// Translators iterate on the dictionary while the host is running, so
/// the session can watch the file and reload on change. Editors rarely
/// write in place (most write a temp file and rename it over), so the
/// watch covers the parent directory and filters events down to the
/// dictionary path. A short quiet period absorbs the multi-event bursts
/// a single save produces; the reload callback fires once per burst.
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::error::{UilexError, UilexResult};

const QUIET_MS: u64 = 150;
const POLL_MS: u64 = 250;

/// Watches one dictionary file and invokes a callback after each burst
/// of changes. Dropping the watcher stops the worker thread.
pub struct DictWatcher {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DictWatcher {
    /// Start watching `path`
    ///
    /// # Arguments
    /// * `path` - the dictionary file; its parent directory must exist
    /// * `on_change` - invoked on the watch thread once per change burst
    pub fn start(path: &Path, on_change: Arc<dyn Fn() + Send + Sync>) -> UilexResult<Self> {
        let path = path.to_path_buf();
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();

        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(tx, NotifyConfig::default())
            .map_err(|err| UilexError::WatchError(err.to_string()))?;
        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .map_err(|err| UilexError::WatchError(format!("{}: {err}", parent.display())))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("uilex-watch".to_string())
            .spawn(move || {
                // the native watcher stops when this binding drops
                let _watcher = watcher;
                watch_loop(rx, path, flag, on_change);
            })
            .map_err(|err| UilexError::Other(format!("failed to spawn watch thread: {err}")))?;

        Ok(DictWatcher {
            shutdown,
            handle: Some(handle),
        })
    }
}

impl Drop for DictWatcher {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn touches(event: &Event, path: &Path) -> bool {
    // an event with no paths is a rescan notice, reload to be safe
    event.paths.is_empty()
        || event
            .paths
            .iter()
            .any(|p| p == path || (p.file_name().is_some() && p.file_name() == path.file_name()))
}

fn watch_loop(
    rx: Receiver<notify::Result<Event>>,
    path: PathBuf,
    shutdown: Arc<AtomicBool>,
    on_change: Arc<dyn Fn() + Send + Sync>,
) {
    let mut pending_since: Option<Instant> = None;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        match rx.recv_timeout(Duration::from_millis(POLL_MS)) {
            Ok(Ok(event)) => {
                if touches(&event, &path) {
                    debug!(path = %path.display(), "dictionary change observed");
                    pending_since = Some(Instant::now());
                }
            }
            Ok(Err(err)) => {
                warn!(error = %err, "dictionary watch error");
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
        if let Some(since) = pending_since {
            if since.elapsed() >= Duration::from_millis(QUIET_MS) {
                pending_since = None;
                on_change();
            }
        }
    }
}
