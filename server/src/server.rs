//! HTTP surface of the token service.
//!
//! - `GET /health`: unauthenticated liveness probe reporting the token count.
//! - `GET /v1/whoami`: authenticated; echoes the token the request presented.

use axum::{
    Extension, Json, Router,
    extract::State,
    middleware,
    routing::get,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthenticatedToken, require_token};
use crate::tokens::TokenRegistry;

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    tokens: usize,
}

/// Build the service router around a registry.
#[must_use]
pub fn router(registry: TokenRegistry) -> Router {
    let protected = Router::new()
        .route("/v1/whoami", get(whoami))
        .route_layer(middleware::from_fn_with_state(
            registry.clone(),
            require_token,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(registry)
}

/// Serve the router on `listener` until `cancel` fires.
///
/// # Errors
/// Returns an error if the server fails while accepting connections.
pub async fn serve(
    listener: TcpListener,
    registry: TokenRegistry,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

async fn health(State(registry): State<TokenRegistry>) -> Json<Health> {
    Json(Health {
        status: "ok",
        tokens: registry.snapshot().len(),
    })
}

async fn whoami(Extension(token): Extension<AuthenticatedToken>) -> Json<AuthenticatedToken> {
    Json(token)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use super::*;
    use crate::tokens::{Token, TokenSnapshot};

    struct TestServer {
        addr: SocketAddr,
        registry: TokenRegistry,
        cancel: CancellationToken,
        task: tokio::task::JoinHandle<std::io::Result<()>>,
    }

    impl TestServer {
        async fn start(snapshot: TokenSnapshot) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            let addr = listener.local_addr().expect("local addr");
            let registry = TokenRegistry::new(snapshot);
            let cancel = CancellationToken::new();
            let task = tokio::spawn(serve(listener, registry.clone(), cancel.clone()));
            Self {
                addr,
                registry,
                cancel,
                task,
            }
        }

        fn url(&self, path: &str) -> String {
            format!("http://{}{path}", self.addr)
        }

        async fn stop(self) {
            self.cancel.cancel();
            self.task
                .await
                .expect("server task joins")
                .expect("server exits cleanly");
        }
    }

    fn tokens() -> TokenSnapshot {
        TokenSnapshot::build(vec![
            Token::client("ck").with_id("web").with_origins(["example.com"]),
            Token::server("sk").with_id("backend"),
        ])
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let server = TestServer::start(tokens()).await;

        let response = reqwest::get(server.url("/health")).await.expect("request");
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value =
            serde_json::from_str(&response.text().await.expect("body")).expect("json body");
        assert_eq!(body["tokens"], 2);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_whoami_requires_token() {
        let server = TestServer::start(tokens()).await;
        let client = reqwest::Client::new();

        let missing = client.get(server.url("/v1/whoami")).send().await.expect("request");
        assert_eq!(missing.status(), reqwest::StatusCode::UNAUTHORIZED);

        let unknown = client
            .get(server.url("/v1/whoami"))
            .header("X-Auth-Token", "nope")
            .send()
            .await
            .expect("request");
        assert_eq!(unknown.status(), reqwest::StatusCode::UNAUTHORIZED);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_whoami_checks_client_origin() {
        let server = TestServer::start(tokens()).await;
        let client = reqwest::Client::new();

        let forbidden = client
            .get(server.url("/v1/whoami?token=ck"))
            .header("Origin", "https://evil.com")
            .send()
            .await
            .expect("request");
        assert_eq!(forbidden.status(), reqwest::StatusCode::FORBIDDEN);

        let allowed = client
            .get(server.url("/v1/whoami?token=ck"))
            .header("Origin", "https://example.com")
            .send()
            .await
            .expect("request");
        assert_eq!(allowed.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value =
            serde_json::from_str(&allowed.text().await.expect("body")).expect("json body");
        assert_eq!(body["id"], "web");
        assert_eq!(body["kind"], "client");

        server.stop().await;
    }

    #[tokio::test]
    async fn test_reload_is_visible_to_next_request() {
        let server = TestServer::start(tokens()).await;
        let client = reqwest::Client::new();

        let before = client
            .get(server.url("/v1/whoami"))
            .bearer_auth("sk")
            .send()
            .await
            .expect("request");
        assert_eq!(before.status(), reqwest::StatusCode::OK);

        server.registry.publish(Arc::new(TokenSnapshot::default()));

        let after = client
            .get(server.url("/v1/whoami"))
            .bearer_auth("sk")
            .send()
            .await
            .expect("request");
        assert_eq!(after.status(), reqwest::StatusCode::UNAUTHORIZED);

        server.stop().await;
    }
}
