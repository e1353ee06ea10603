#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;

use axum::Router;
use genmedia_relay::config::Timeouts;
use genmedia_relay::credentials::{IntegrationConfig, ProviderId, StaticCredentialResolver};
use genmedia_relay::{GenerationService, LocalProjectStorage, RedbGraphStore};

pub const RELAY_TOKEN: &str = "sk-relay-0123456789";
pub const GEMINI_KEY: &str = "AIza-test-key-123456";

/// Bind an ephemeral port first so handlers can be built knowing their own URL.
pub fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    (listener, base)
}

pub fn serve(listener: TcpListener, app: Router) {
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(app.into_make_service());
    tokio::spawn(server);
}

pub fn relay_credential(base: &str) -> IntegrationConfig {
    IntegrationConfig {
        integration_id: "test:relay".into(),
        provider: ProviderId::Midjourney,
        base_url: base.to_string(),
        auth_token: RELAY_TOKEN.into(),
        mode: "photo".into(),
        secret_header: "mj-api-secret".into(),
        model: None,
    }
}

pub fn gemini_credential(base: &str) -> IntegrationConfig {
    IntegrationConfig {
        integration_id: "test:gemini".into(),
        provider: ProviderId::Gemini,
        base_url: base.to_string(),
        auth_token: GEMINI_KEY.into(),
        mode: "photo".into(),
        secret_header: "x-goog-api-key".into(),
        model: Some("gemini-test".into()),
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub store: Arc<RedbGraphStore>,
    pub storage: Arc<LocalProjectStorage>,
    pub service: GenerationService,
}

pub fn harness(base: &str) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RedbGraphStore::open(dir.path().join("graph.redb")).unwrap());
    let timeouts = Timeouts::default();
    let storage = Arc::new(LocalProjectStorage::new(dir.path(), timeouts.download));
    let credentials = StaticCredentialResolver::new()
        .with(relay_credential(base))
        .with(gemini_credential(base));
    let service = GenerationService::new(store.clone(), storage.clone(), Arc::new(credentials), timeouts);
    Harness {
        dir,
        store,
        storage,
        service,
    }
}
