//! Test doubles for the watcher: a loader whose answer can be changed between
//! polls and a publisher that records what it receives.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::source::{LoadError, SourceLoader};
use crate::tokens::TokenSnapshot;
use crate::watcher::SnapshotPublisher;

/// A loader that returns whatever the test last told it to.
#[derive(Debug)]
pub struct ScriptedLoader {
    response: Mutex<Result<Vec<u8>, String>>,
    calls: AtomicUsize,
}

impl ScriptedLoader {
    /// Create a loader that succeeds with `payload`.
    #[must_use]
    pub fn with_payload(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            response: Mutex::new(Ok(payload.into())),
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a loader that fails with `message`.
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            response: Mutex::new(Err(message.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    /// Succeed with `payload` from now on.
    pub fn set_payload(&self, payload: impl Into<Vec<u8>>) {
        *self.response.lock().expect("loader lock") = Ok(payload.into());
    }

    /// Fail with `message` from now on.
    pub fn set_failure(&self, message: &str) {
        *self.response.lock().expect("loader lock") = Err(message.to_string());
    }

    /// Number of loads performed so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SourceLoader for ScriptedLoader {
    async fn load(&self, descriptor: &str) -> Result<Vec<u8>, LoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.response.lock().expect("loader lock").clone();
        response.map_err(|message| LoadError::Http {
            descriptor: descriptor.to_string(),
            message,
        })
    }
}

/// A publisher that keeps every snapshot it is handed.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<Arc<TokenSnapshot>>>>,
}

impl RecordingPublisher {
    /// Number of snapshots published so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.published.lock().expect("publisher lock").len()
    }

    /// The most recently published snapshot.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<TokenSnapshot>> {
        self.published.lock().expect("publisher lock").last().cloned()
    }
}

impl SnapshotPublisher for RecordingPublisher {
    fn publish(&self, snapshot: Arc<TokenSnapshot>) {
        self.published.lock().expect("publisher lock").push(snapshot);
    }
}

/// Poll `condition` until it holds, sleeping between checks.
///
/// Meant for paused-clock tests, where each sleep advances virtual time
/// instantly. Returns `false` if the condition never held.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..1_000 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    condition()
}
