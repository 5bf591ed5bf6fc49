/// Latest-wins write coalescing
///
/// Collection produces bursts of tiny writes (one enrolled string can
/// touch three files). The [`Debouncer`] turns a burst into a single
/// deferred action: every [`arm`](Debouncer::arm) pushes the pending
/// deadline back to now plus the fixed delay, and the action runs once
/// when the burst goes quiet.
///
/// The timer lives on a dedicated worker thread fed by a channel. Arming
/// is a non-blocking send; the worker sleeps until the deadline and fires
/// the callback, or keeps postponing while arms arrive. Dropping the
/// debouncer flushes any pending action before the thread exits, so
/// buffered work survives an orderly shutdown.
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{UilexError, UilexResult};

enum Msg {
    Arm,
    Shutdown,
}

/// Deferred single-action timer with latest-wins semantics
pub struct Debouncer {
    delay: Duration,
    callback: Arc<dyn Fn() + Send + Sync>,
    tx: mpsc::Sender<Msg>,
    handle: Option<JoinHandle<()>>,
}

impl Debouncer {
    /// Spawn the worker thread for a new debouncer
    ///
    /// # Arguments
    /// * `name` - suffix for the worker thread name
    /// * `delay` - quiet period before the callback fires
    /// * `callback` - action to run; must tolerate being called when
    ///   there is nothing to do
    ///
    /// # Example
    /// ```ignore
    /// let flushed = Arc::new(AtomicUsize::new(0));
    /// let count = Arc::clone(&flushed);
    /// let debouncer = Debouncer::new(
    ///     "aggregate",
    ///     Duration::from_millis(250),
    ///     Arc::new(move || {
    ///         count.fetch_add(1, Ordering::SeqCst);
    ///     }),
    /// )?;
    /// debouncer.arm();
    /// ```
    pub fn new(
        name: &str,
        delay: Duration,
        callback: Arc<dyn Fn() + Send + Sync>,
    ) -> UilexResult<Self> {
        let (tx, rx) = mpsc::channel();
        let worker_cb = Arc::clone(&callback);
        let handle = thread::Builder::new()
            .name(format!("uilex-{name}"))
            .spawn(move || worker(rx, delay, worker_cb))
            .map_err(|err| UilexError::Other(format!("failed to spawn debounce thread: {err}")))?;
        Ok(Debouncer {
            delay,
            callback,
            tx,
            handle: Some(handle),
        })
    }

    /// Schedule the callback after the configured delay, postponing any
    /// already pending run. A zero delay skips the worker and runs the
    /// callback on the calling thread.
    pub fn arm(&self) {
        if self.delay.is_zero() {
            (self.callback)();
            return;
        }
        let _ = self.tx.send(Msg::Arm);
    }

    /// Run the callback synchronously on the calling thread. A pending
    /// deferred run is not cancelled; the callback sees an empty buffer
    /// then and does nothing.
    pub fn flush_now(&self) {
        (self.callback)();
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        let _ = self.tx.send(Msg::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker(rx: mpsc::Receiver<Msg>, delay: Duration, callback: Arc<dyn Fn() + Send + Sync>) {
    let mut deadline: Option<Instant> = None;
    loop {
        let msg = match deadline {
            None => rx.recv().ok(),
            Some(at) => {
                let remaining = at.saturating_duration_since(Instant::now());
                match rx.recv_timeout(remaining) {
                    Ok(msg) => Some(msg),
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        deadline = None;
                        callback();
                        continue;
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => None,
                }
            }
        };
        match msg {
            Some(Msg::Arm) => deadline = Some(Instant::now() + delay),
            Some(Msg::Shutdown) | None => {
                // flush pending work before exiting
                if deadline.is_some() {
                    callback();
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_debouncer(delay_ms: u64) -> (Debouncer, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&fired);
        let debouncer = Debouncer::new(
            "test",
            Duration::from_millis(delay_ms),
            Arc::new(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        (debouncer, fired)
    }

    #[test]
    fn test_arm_fires_once_after_delay() {
        let (debouncer, fired) = counting_debouncer(30);
        debouncer.arm();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        thread::sleep(Duration::from_millis(150));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rearming_coalesces_a_burst() {
        let (debouncer, fired) = counting_debouncer(60);
        debouncer.arm();
        thread::sleep(Duration::from_millis(20));
        debouncer.arm();
        thread::sleep(Duration::from_millis(20));
        debouncer.arm();
        thread::sleep(Duration::from_millis(250));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_delay_runs_inline() {
        let (debouncer, fired) = counting_debouncer(0);
        debouncer.arm();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_flush_now_is_synchronous() {
        let (debouncer, fired) = counting_debouncer(10_000);
        debouncer.arm();
        debouncer.flush_now();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // the armed run is still pending and flushes on drop
        drop(debouncer);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_drop_flushes_pending_work() {
        let (debouncer, fired) = counting_debouncer(10_000);
        debouncer.arm();
        drop(debouncer);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_without_pending_work_is_silent() {
        let (debouncer, fired) = counting_debouncer(30);
        drop(debouncer);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
