//! Shared utilities for integration and load testing.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use gatekeeper::auth::InMemoryDirectory;
use gatekeeper::downstream::InMemoryContactStore;
use gatekeeper::{AppState, Gatekeeper, GatekeeperConfig, HttpServer, Shutdown};

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const USERNAME: &str = "testuser";
pub const PASSWORD: &str = "password123";

/// A gatekeeper bound to an ephemeral local port.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub state: AppState,
    pub directory: Arc<InMemoryDirectory>,
    pub store: Arc<InMemoryContactStore>,
    handle: JoinHandle<()>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server task to finish.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = self.handle.await;
    }
}

/// Start a server seeded with one user and two contacts.
pub async fn spawn_server(mut config: GatekeeperConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.server.bind_address = addr.to_string();

    let directory = Arc::new(InMemoryDirectory::new().with_user(USERNAME, PASSWORD));
    let store = Arc::new(InMemoryContactStore::new());
    store.add(USERNAME, "Awa", "Ouedraogo", "+226 70 00 00 01", Some("awa@example.com"));
    store.add(USERNAME, "Jean", "Kabore", "+226 70 00 00 02", None);

    let gatekeeper = Gatekeeper::from_config(&config, TEST_SECRET);
    let state = AppState::new(gatekeeper, directory.clone(), store.clone());
    let server = HttpServer::new(config, state.clone());

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move {
        let _ = server.run(listener, &server_shutdown).await;
    });

    TestServer {
        addr,
        shutdown,
        state,
        directory,
        store,
        handle,
    }
}
