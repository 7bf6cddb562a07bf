//! Dual-condition run termination.
//!
//! Every run ends either when its optional timeout elapses or when the
//! operator writes a non-zero value into the control file, whichever is
//! detected first. A spawned watcher task races the deadline against a
//! fixed-interval poll of the file; the winning [`StopReason`] latches once
//! and never changes. The file is polled (not watched via notification)
//! because the signal is operator-authored and must work on filesystems
//! without change notification support. Engines consume the latch
//! cooperatively at their cycle boundaries.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::debug;

/// Cadence at which the control file is re-read.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Why a run terminated. Produced exactly once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured run duration elapsed.
    Timeout,
    /// The operator signaled a stop through the control file.
    ExternalSignal,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timeout"),
            Self::ExternalSignal => f.write_str("external signal"),
        }
    }
}

#[derive(Debug, Default)]
struct StopState {
    reason: OnceLock<StopReason>,
    notify: Notify,
}

impl StopState {
    fn latch(&self, reason: StopReason) {
        if self.reason.set(reason).is_ok() {
            self.notify.notify_waiters();
        }
    }
}

/// Shared cancellation token for one run.
///
/// Cheap to query from the engine loop; the blocking [`wait`](Self::wait)
/// suspends without busy-looping. Dropping the controller aborts the
/// watcher task.
#[derive(Debug)]
pub struct StopController {
    state: Arc<StopState>,
    watcher: JoinHandle<()>,
}

impl StopController {
    /// Start watching with the default poll interval.
    #[must_use]
    pub fn start(timeout: Option<Duration>, control_file: impl Into<PathBuf>) -> Self {
        Self::start_with_poll(timeout, control_file, DEFAULT_POLL_INTERVAL)
    }

    /// Start watching with an explicit poll interval.
    #[must_use]
    pub fn start_with_poll(
        timeout: Option<Duration>,
        control_file: impl Into<PathBuf>,
        poll: Duration,
    ) -> Self {
        let state = Arc::new(StopState::default());
        let watcher = tokio::spawn(watch(Arc::clone(&state), timeout, control_file.into(), poll));
        Self { state, watcher }
    }

    /// Non-blocking poll of the latch.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.state.reason.get().is_some()
    }

    /// The latched reason, or `None` while the run may continue.
    #[must_use]
    pub fn reason(&self) -> Option<StopReason> {
        self.state.reason.get().copied()
    }

    /// Suspend until a reason latches. Returns immediately (with the same
    /// reason, every time) once it has.
    pub async fn wait(&self) -> StopReason {
        loop {
            let notified = self.state.notify.notified();
            if let Some(reason) = self.state.reason.get() {
                return *reason;
            }
            notified.await;
        }
    }

    /// Between-cycle sleep that returns early once a reason latches.
    pub async fn sleep(&self, duration: Duration) {
        tokio::select! {
            () = sleep(duration) => {}
            _ = self.wait() => {}
        }
    }
}

impl Drop for StopController {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

async fn watch(state: Arc<StopState>, timeout: Option<Duration>, control_file: PathBuf, poll: Duration) {
    let signal = poll_control_file(&control_file, poll);
    let reason = match timeout {
        Some(limit) => tokio::select! {
            () = sleep(limit) => StopReason::Timeout,
            () = signal => StopReason::ExternalSignal,
        },
        None => {
            signal.await;
            StopReason::ExternalSignal
        }
    };
    debug!(%reason, "stop condition latched");
    state.latch(reason);
}

async fn poll_control_file(path: &Path, poll: Duration) {
    let mut ticker = interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if stop_flag_set(path).await {
            return;
        }
    }
}

/// `0`, unreadable, or unparsable content keeps the run alive; any other
/// integer is an operator stop.
async fn stop_flag_set(path: &Path) -> bool {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents
            .trim()
            .parse::<i64>()
            .map(|flag| flag != 0)
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// Reset the control file to the "keep running" state, creating it when
/// missing. On unix the file is left world-writable so an unprivileged
/// operator can signal a privileged run.
///
/// # Errors
///
/// Returns the underlying I/O error when the file cannot be written.
pub fn reset_control_file(path: &Path) -> std::io::Result<()> {
    std::fs::write(path, "0")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut permissions = std::fs::metadata(path)?.permissions();
        permissions.set_mode(0o666);
        std::fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const FAST_POLL: Duration = Duration::from_millis(10);

    #[tokio::test(start_paused = true)]
    async fn test_timeout_latches_and_is_idempotent() {
        let stop = StopController::start_with_poll(
            Some(Duration::from_millis(200)),
            "/nonexistent/control",
            FAST_POLL,
        );
        assert!(!stop.should_stop());

        assert_eq!(stop.wait().await, StopReason::Timeout);
        for _ in 0..3 {
            assert!(stop.should_stop());
            assert_eq!(stop.reason(), Some(StopReason::Timeout));
            assert_eq!(stop.wait().await, StopReason::Timeout);
        }
    }

    #[tokio::test]
    async fn test_signal_file_stops_without_timeout() {
        let dir = tempdir().unwrap();
        let control = dir.path().join("control");
        std::fs::write(&control, "1").unwrap();

        let stop = StopController::start_with_poll(None, &control, FAST_POLL);
        assert_eq!(stop.wait().await, StopReason::ExternalSignal);
    }

    #[tokio::test]
    async fn test_signal_beats_generous_timeout() {
        let dir = tempdir().unwrap();
        let control = dir.path().join("control");
        reset_control_file(&control).unwrap();

        let stop =
            StopController::start_with_poll(Some(Duration::from_secs(600)), &control, FAST_POLL);
        let writer = control.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(40)).await;
            std::fs::write(&writer, "1").unwrap();
        });
        assert_eq!(stop.wait().await, StopReason::ExternalSignal);
    }

    #[tokio::test]
    async fn test_negative_flag_value_stops() {
        let dir = tempdir().unwrap();
        let control = dir.path().join("control");
        std::fs::write(&control, "-1\n").unwrap();

        let stop = StopController::start_with_poll(None, &control, FAST_POLL);
        assert_eq!(stop.wait().await, StopReason::ExternalSignal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_and_garbage_content_keep_running() {
        let dir = tempdir().unwrap();
        for contents in ["0", "0\n", "stop now", ""] {
            let control = dir.path().join("control");
            std::fs::write(&control, contents).unwrap();
            let stop = StopController::start_with_poll(
                Some(Duration::from_millis(100)),
                &control,
                FAST_POLL,
            );
            assert_eq!(
                stop.wait().await,
                StopReason::Timeout,
                "content {contents:?} must not stop the run"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_returns_early_after_latch() {
        let stop = StopController::start_with_poll(
            Some(Duration::from_millis(50)),
            "/nonexistent/control",
            FAST_POLL,
        );
        // Far longer than the timeout; must wake at the latch instead.
        stop.sleep(Duration::from_secs(3600)).await;
        assert_eq!(stop.reason(), Some(StopReason::Timeout));
    }

    #[test]
    fn test_reset_control_file_writes_zero() {
        let dir = tempdir().unwrap();
        let control = dir.path().join("nested_control");
        reset_control_file(&control).unwrap();
        assert_eq!(std::fs::read_to_string(&control).unwrap(), "0");

        std::fs::write(&control, "1").unwrap();
        reset_control_file(&control).unwrap();
        assert_eq!(std::fs::read_to_string(&control).unwrap(), "0");
    }
}
