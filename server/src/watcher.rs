//! Background refresh of a token source.
//!
//! The watcher has two phases:
//!
//! 1. **Priming** ([`Watcher::prime`]): load and parse the source once, in the
//!    caller's task. Any failure here is a startup error and no background task
//!    is created.
//! 2. **Polling** ([`Watcher::spawn`]): a background task sleeps for the
//!    interval, reloads, and publishes a rebuilt snapshot when the payload's
//!    fingerprint changed. Failures are logged and the previous snapshot stays
//!    authoritative.
//!
//! The task stops when its `CancellationToken` is cancelled. Cancellation is
//! observed between iterations; an in-flight load is never aborted.
//!
//! # Invariants
//! - Publishes for one source happen in fetch order.
//! - The stored fingerprint only advances after a successful build and publish,
//!   so a source that keeps serving a broken payload is re-parsed every tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::source::{LoadError, SourceLoader};
use crate::tokens::{Fingerprint, ParseError, TokenSnapshot};

/// Smallest polling interval the watcher will use.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Receives every snapshot the watcher rebuilds.
///
/// Implementations must make the new snapshot visible before returning.
pub trait SnapshotPublisher: Send + Sync {
    /// Make `snapshot` the current one.
    fn publish(&self, snapshot: Arc<TokenSnapshot>);
}

impl<F> SnapshotPublisher for F
where
    F: Fn(Arc<TokenSnapshot>) + Send + Sync,
{
    fn publish(&self, snapshot: Arc<TokenSnapshot>) {
        self(snapshot);
    }
}

/// Error returned when a watch cannot be started.
#[derive(Debug)]
pub enum WatchError {
    /// The initial load failed.
    Load(LoadError),
    /// The initial payload could not be parsed.
    Parse(ParseError),
}

impl std::fmt::Display for WatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load(e) => write!(f, "initial token load failed: {e}"),
            Self::Parse(e) => write!(f, "initial token payload is invalid: {e}"),
        }
    }
}

impl std::error::Error for WatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Load(e) => Some(e),
            Self::Parse(e) => Some(e),
        }
    }
}

impl From<LoadError> for WatchError {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}

impl From<ParseError> for WatchError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

/// What a single poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The payload matched the last published fingerprint.
    Unchanged,
    /// A new snapshot was built and published.
    Published,
    /// The source could not be read.
    LoadFailed,
    /// The payload changed but could not be parsed.
    ParseFailed,
}

/// Refresh state for one token source.
pub struct Watcher<L, P> {
    descriptor: String,
    loader: L,
    publisher: P,
    interval: Duration,
    last_fingerprint: Fingerprint,
}

impl<L, P> Watcher<L, P>
where
    L: SourceLoader,
    P: SnapshotPublisher,
{
    /// Load `descriptor` once and build the initial snapshot.
    ///
    /// The initial snapshot is returned to the caller, not published.
    ///
    /// # Errors
    /// Returns `WatchError::Load` if the source is unreadable and
    /// `WatchError::Parse` if its payload is malformed.
    pub async fn prime(
        descriptor: impl Into<String>,
        loader: L,
        publisher: P,
        interval: Duration,
    ) -> Result<(Self, Arc<TokenSnapshot>), WatchError> {
        let descriptor = descriptor.into();
        let payload = loader.load(&descriptor).await?;
        let fingerprint = Fingerprint::of(&payload);
        let snapshot = TokenSnapshot::from_json(&payload)?;
        log_conflicts(&descriptor, &snapshot);

        tracing::info!(
            source = %descriptor,
            tokens = snapshot.len(),
            fingerprint = %fingerprint,
            "loaded initial tokens"
        );

        let watcher = Self {
            descriptor,
            loader,
            publisher,
            interval: interval.max(MIN_INTERVAL),
            last_fingerprint: fingerprint,
        };
        Ok((watcher, Arc::new(snapshot)))
    }

    /// Reload the source once, publishing a new snapshot if it changed.
    pub async fn poll_once(&mut self) -> ReloadOutcome {
        let payload = match self.loader.load(&self.descriptor).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(source = %self.descriptor, error = %e, "error reloading tokens");
                return ReloadOutcome::LoadFailed;
            }
        };

        let fingerprint = Fingerprint::of(&payload);
        if !Fingerprint::changed(&self.last_fingerprint, &fingerprint) {
            tracing::debug!(source = %self.descriptor, "tokens unchanged");
            return ReloadOutcome::Unchanged;
        }

        let snapshot = match TokenSnapshot::from_json(&payload) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(
                    source = %self.descriptor,
                    error = %e,
                    "error parsing reloaded tokens"
                );
                return ReloadOutcome::ParseFailed;
            }
        };
        log_conflicts(&self.descriptor, &snapshot);

        let tokens = snapshot.len();
        self.publisher.publish(Arc::new(snapshot));
        self.last_fingerprint = fingerprint;

        tracing::info!(
            source = %self.descriptor,
            tokens,
            fingerprint = %fingerprint,
            "new tokens were loaded"
        );
        ReloadOutcome::Published
    }

    /// The fingerprint of the last published payload.
    #[must_use]
    pub const fn last_fingerprint(&self) -> &Fingerprint {
        &self.last_fingerprint
    }

    /// The polling interval in use.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(mut self, cancel: CancellationToken) {
        tracing::debug!(
            source = %self.descriptor,
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "token watcher started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
            if cancel.is_cancelled() {
                break;
            }
            self.poll_once().await;
        }

        tracing::info!(source = %self.descriptor, "token watcher stopped");
    }
}

impl<L, P> Watcher<L, P>
where
    L: SourceLoader + 'static,
    P: SnapshotPublisher + 'static,
{
    /// Move the watcher into a background polling task.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

/// A running watch: the initial snapshot and the polling task.
#[derive(Debug)]
pub struct WatchHandle {
    snapshot: Arc<TokenSnapshot>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub(crate) const fn new(snapshot: Arc<TokenSnapshot>, task: JoinHandle<()>) -> Self {
        Self { snapshot, task }
    }

    /// The snapshot built during priming.
    #[must_use]
    pub const fn snapshot(&self) -> &Arc<TokenSnapshot> {
        &self.snapshot
    }

    /// Whether the polling task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the polling task to exit. Cancel its token first.
    ///
    /// # Errors
    /// Returns the join error if the task panicked.
    pub async fn stopped(self) -> Result<(), tokio::task::JoinError> {
        self.task.await
    }
}

/// Prime a watch on `descriptor` and start polling it.
///
/// The initial snapshot is handed to `publisher` before the polling task is
/// spawned, so a reload can never be overwritten by it. It is also available
/// from [`WatchHandle::snapshot`].
///
/// # Errors
/// Returns `WatchError` if the initial load or parse fails. Nothing is
/// published and no task is spawned in that case.
pub async fn start_watch<L, P>(
    descriptor: impl Into<String>,
    loader: L,
    publisher: P,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<WatchHandle, WatchError>
where
    L: SourceLoader + 'static,
    P: SnapshotPublisher + 'static,
{
    let (watcher, snapshot) = Watcher::prime(descriptor, loader, publisher, interval).await?;
    watcher.publisher.publish(Arc::clone(&snapshot));
    let task = watcher.spawn(cancel);
    Ok(WatchHandle::new(snapshot, task))
}

fn log_conflicts(descriptor: &str, snapshot: &TokenSnapshot) {
    for conflict in snapshot.conflicts() {
        tracing::warn!(
            source = %descriptor,
            kind = %conflict.kind,
            replaced_id = %conflict.replaced_id,
            kept_id = %conflict.kept_id,
            "secret is shared by several tokens, keeping the last one"
        );
    }
}
