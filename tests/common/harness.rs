use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ragserve::app::{Adapters, build_state};
use ragserve::config::Config;
use ragserve::gateway::create_router;
use ragserve::llm::{MockChatModel, MockEmbedder, MockReranker};

pub const TEST_DIM: usize = 64;

/// Knobs a test can turn before the server spawns.
pub struct TestServerConfig {
    pub rate_limit_tiers: HashMap<String, u32>,
    pub rate_limit_window: Duration,
    pub min_interval_per_user: Duration,
    pub trusted_proxy_ips: Vec<String>,
    pub canned_answer: Option<String>,
}

impl Default for TestServerConfig {
    fn default() -> Self {
        let mut tiers = HashMap::new();
        // Generous defaults so setup traffic never trips the gate.
        tiers.insert("default".to_string(), 100_000);
        tiers.insert("free".to_string(), 100_000);
        tiers.insert("pro".to_string(), 100_000);
        Self {
            rate_limit_tiers: tiers,
            rate_limit_window: Duration::from_secs(60),
            min_interval_per_user: Duration::ZERO,
            // The test client always connects from loopback.
            trusted_proxy_ips: vec!["127.0.0.1/32".to_string()],
            canned_answer: None,
        }
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    pub llm: Arc<MockChatModel>,
    pub embedder: Arc<MockEmbedder>,
    _tmp: tempfile::TempDir,
    _task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}/api/v1{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("request sends")
    }

    pub async fn post_json(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("request sends")
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("request sends")
    }
}

pub async fn body_json(response: reqwest::Response) -> serde_json::Value {
    response.json().await.expect("body is JSON")
}

/// Spawns a full server with mock adapters on an ephemeral port.
pub async fn spawn_test_server(test_config: TestServerConfig) -> TestServer {
    let tmp = tempfile::tempdir().expect("tempdir");

    let mut config = Config::default();
    config.working_dir = tmp.path().join("kbs");
    config.qa_storage_dir = tmp.path().join("qa");
    config.log_dir = tmp.path().join("logs");
    config.upload_dir = tmp.path().join("uploads");
    config.embedding_dim = TEST_DIM;
    config.rate_limit_tiers = test_config.rate_limit_tiers;
    config.rate_limit_window = test_config.rate_limit_window;
    config.min_interval_per_user = test_config.min_interval_per_user;
    config.trusted_proxy_ips = test_config
        .trusted_proxy_ips
        .iter()
        .map(|s| s.parse().expect("valid CIDR"))
        .collect();

    let llm = Arc::new(match &test_config.canned_answer {
        Some(answer) => MockChatModel::with_response(answer.clone()),
        None => MockChatModel::new(),
    });
    let embedder = Arc::new(MockEmbedder::new(TEST_DIM));

    let adapters = Adapters {
        llm: llm.clone(),
        embedder: embedder.clone(),
        reranker: Some(Arc::new(MockReranker::new())),
    };

    let state = build_state(config, adapters).expect("state builds");
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ephemeral port binds");
    let addr = listener.local_addr().expect("local addr");

    let task = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("server runs");
    });

    TestServer {
        addr,
        client: reqwest::Client::new(),
        llm,
        embedder,
        _tmp: tmp,
        _task: task,
    }
}
