//! Read handle over the currently published token snapshot.
//!
//! # Thread Safety
//!
//! The current snapshot lives behind an `ArcSwap`. Readers load the pointer
//! without locking; the watcher replaces it wholesale. A reader therefore sees
//! either the old or the new snapshot, never a mix.
//!
//! # Invariants
//! - A published snapshot is never mutated.
//! - Reads never fail; before any publish the registry is empty.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;

use super::{Token, TokenSnapshot};
use crate::source::SourceLoader;
use crate::watcher::{SnapshotPublisher, WatchError, WatchHandle, start_watch};

/// Shared, hot-swappable token registry.
///
/// Cloning is cheap; all clones observe the same published snapshot.
#[derive(Clone, Default)]
pub struct TokenRegistry {
    current: Arc<ArcSwap<TokenSnapshot>>,
}

impl TokenRegistry {
    /// Create a registry serving the given snapshot.
    #[must_use]
    pub fn new(snapshot: TokenSnapshot) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(snapshot)),
        }
    }

    /// Create a registry with no tokens.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Prime a registry from `descriptor` and keep it fresh in the background.
    ///
    /// The initial snapshot is installed before the polling task is spawned, so
    /// a reload can never be overwritten by the initial load.
    ///
    /// # Errors
    /// Returns `WatchError` if the initial load or parse fails. No task is
    /// spawned in that case.
    pub async fn watch<L>(
        descriptor: impl Into<String>,
        loader: L,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<(Self, WatchHandle), WatchError>
    where
        L: SourceLoader + 'static,
    {
        let registry = Self::empty();
        let handle = start_watch(descriptor, loader, registry.clone(), interval, cancel).await?;
        Ok((registry, handle))
    }

    /// The snapshot currently published.
    ///
    /// Hold on to the returned `Arc` when several reads must agree with each other.
    #[must_use]
    pub fn snapshot(&self) -> Arc<TokenSnapshot> {
        self.current.load_full()
    }

    /// Replace the published snapshot.
    ///
    /// # Post-conditions
    /// - Every read started after this returns observes `snapshot`.
    pub fn publish(&self, snapshot: Arc<TokenSnapshot>) {
        self.current.store(snapshot);
    }

    /// Look up a token by secret or by id.
    #[must_use]
    pub fn lookup_by_secret(&self, secret: &str) -> Option<Arc<Token>> {
        self.current.load().lookup(secret).cloned()
    }

    /// Look up a token by id.
    #[must_use]
    pub fn lookup_by_id(&self, id: &str) -> Option<Arc<Token>> {
        self.current.load().lookup_by_id(id).cloned()
    }

    /// Origins allowed for a client secret.
    #[must_use]
    pub fn origins_for_client_secret(&self, secret: &str) -> Option<Vec<String>> {
        self.current
            .load()
            .origins_for_client_secret(secret)
            .map(<[String]>::to_vec)
    }

    /// Origins allowed for a server secret.
    #[must_use]
    pub fn origins_for_server_secret(&self, secret: &str) -> Option<Vec<String>> {
        self.current
            .load()
            .origins_for_server_secret(secret)
            .map(<[String]>::to_vec)
    }

    /// Whether the published snapshot holds no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }
}

impl SnapshotPublisher for TokenRegistry {
    fn publish(&self, snapshot: Arc<TokenSnapshot>) {
        Self::publish(self, snapshot);
    }
}

impl std::fmt::Debug for TokenRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRegistry")
            .field("tokens", &self.current.load().len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLoader;

    #[test]
    fn test_empty_registry() {
        let registry = TokenRegistry::empty();
        assert!(registry.is_empty());
        assert!(registry.lookup_by_secret("anything").is_none());
        assert!(registry.lookup_by_id("anything").is_none());
    }

    #[test]
    fn test_publish_replaces_snapshot_for_all_clones() {
        let registry = TokenRegistry::new(TokenSnapshot::from_json(
            br#"{"tokens":[{"client_secret":"ck1","origins":["example.com"]}]}"#,
        )
        .expect("valid payload"));
        let reader = registry.clone();

        let token = reader.lookup_by_secret("ck1").expect("token present");
        assert_eq!(token.origins, ["example.com"]);
        assert_eq!(
            reader.origins_for_client_secret("ck1"),
            Some(vec!["example.com".to_string()])
        );

        registry.publish(Arc::new(
            TokenSnapshot::from_json(br#"{"tokens":[]}"#).expect("valid payload"),
        ));

        assert!(reader.lookup_by_secret("ck1").is_none());
        assert!(reader.is_empty());
    }

    #[test]
    fn test_held_snapshot_survives_publish() {
        let registry = TokenRegistry::new(TokenSnapshot::from_secrets(["c1"], ["s1"]));
        let held = registry.snapshot();

        registry.publish(Arc::new(TokenSnapshot::default()));

        assert!(registry.is_empty());
        assert_eq!(held.len(), 2);
        assert!(held.client_token("c1").is_some());
    }

    #[test]
    fn test_origins_for_server_secret() {
        let registry = TokenRegistry::new(TokenSnapshot::from_secrets(
            Vec::<String>::new(),
            ["s1"],
        ));
        assert_eq!(registry.origins_for_server_secret(" s1 "), Some(Vec::new()));
        assert!(registry.origins_for_client_secret("s1").is_none());
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let registry = TokenRegistry::new(TokenSnapshot::from_secrets(["a"], ["b"]));

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let reader = registry.clone();
                scope.spawn(move || {
                    for _ in 0..1_000 {
                        let snapshot = reader.snapshot();
                        // Either both secrets are present or neither is.
                        assert_eq!(
                            snapshot.client_token("a").is_some(),
                            snapshot.server_token("b").is_some()
                        );
                    }
                });
            }

            for i in 0..1_000 {
                let next = if i % 2 == 0 {
                    TokenSnapshot::default()
                } else {
                    TokenSnapshot::from_secrets(["a"], ["b"])
                };
                registry.publish(Arc::new(next));
            }
        });
    }

    #[tokio::test]
    async fn test_watch_installs_initial_snapshot() {
        let loader = ScriptedLoader::with_payload(br#"{"tokens":[{"server_secret":"sk"}]}"#);
        let cancel = CancellationToken::new();

        let (registry, handle) = TokenRegistry::watch(
            "tokens.json",
            loader,
            Duration::from_secs(60),
            cancel.clone(),
        )
        .await
        .expect("priming succeeds");

        assert!(!registry.is_empty());
        assert!(registry.lookup_by_secret("sk").is_some());
        assert_eq!(handle.snapshot().len(), 1);

        cancel.cancel();
        handle.stopped().await.expect("watch task exits cleanly");
    }

    #[tokio::test]
    async fn test_watch_fails_fast_on_unreadable_source() {
        let loader = ScriptedLoader::failing("connection refused");
        let result = TokenRegistry::watch(
            "https://tokens.invalid/tokens.json",
            loader,
            Duration::from_secs(60),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(WatchError::Load(_))));
    }
}
