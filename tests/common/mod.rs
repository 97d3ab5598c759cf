use offsync::{
    LoginPayload, NetworkStatus, OffsyncConfig, QueueChangeBus, QueueStore, SessionStore,
    TokenType,
};
use offsync_client::ApiClient;
use std::sync::Arc;
use tempfile::TempDir;

/// Nothing listens on port 9 locally, so every request fails at the transport.
#[allow(dead_code)]
pub const UNREACHABLE: &str = "http://127.0.0.1:9";

/// Page-side wiring over one temp data dir.
#[allow(dead_code)]
pub struct Page {
    pub config: OffsyncConfig,
    pub session: Arc<SessionStore>,
    pub store: QueueStore,
    pub bus: Arc<QueueChangeBus>,
    pub status: NetworkStatus,
    pub client: ApiClient,
}

#[allow(dead_code)]
pub fn page(base_url: &str, tmp: &TempDir, online: bool) -> Page {
    let config = OffsyncConfig::new(base_url, tmp.path()).unwrap();
    let session = Arc::new(SessionStore::load_or_default(tmp.path()));
    let store = QueueStore::open(tmp.path()).unwrap();
    let bus = QueueChangeBus::new();
    let status = NetworkStatus::new(online);
    let client = ApiClient::new(
        &config,
        Arc::clone(&session),
        store.clone(),
        Arc::clone(&bus),
        Arc::new(status.clone()),
    );
    Page {
        config,
        session,
        store,
        bus,
        status,
        client,
    }
}

#[allow(dead_code)]
pub fn sign_in(session: &SessionStore, token: &str, refresh_token: Option<&str>) {
    session.login(LoginPayload {
        token_type: TokenType::Bearer,
        token: token.to_string(),
        refresh_token: refresh_token.map(str::to_string),
        expires_in: Some(3600),
        user: None,
    });
}

/// A loopback address nothing is listening on yet.
#[allow(dead_code)]
pub fn vacant_addr() -> std::net::SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Bring the API up on an address requests previously failed against.
#[allow(dead_code)]
pub async fn api_up_on(addr: std::net::SocketAddr) -> wiremock::MockServer {
    let listener = std::net::TcpListener::bind(addr).unwrap();
    wiremock::MockServer::builder()
        .listener(listener)
        .start()
        .await
}
