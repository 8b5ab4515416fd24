//! Environment-backed configuration.
//!
//! Every recognized option has a `RAGSERVE_*` environment variable, a default,
//! and (where relevant) validation. Unknown `RAGSERVE_*` variables are logged
//! at startup and ignored rather than silently accepted.

pub mod error;


pub use error::ConfigError;

use std::collections::HashMap;
use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use ipnet::IpNet;

/// Runtime configuration for the whole service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address.
    pub host: IpAddr,
    /// Listen port.
    pub port: u16,
    /// Worker threads for the tokio runtime (0 = runtime default).
    pub workers: usize,
    /// Debug mode (verbose logging, permissive CORS).
    pub debug: bool,

    /// Root directory for knowledge-base working directories.
    pub working_dir: PathBuf,
    /// Root directory for the fixed-QA store.
    pub qa_storage_dir: PathBuf,
    /// Directory for structured log files.
    pub log_dir: PathBuf,
    /// Directory where uploaded files are persisted.
    pub upload_dir: PathBuf,

    /// Base URL of the LLM service (OpenAI-compatible).
    pub llm_api_base: String,
    /// API key for the LLM service.
    pub llm_api_key: Option<String>,
    /// Model name sent to the LLM service.
    pub llm_model: String,
    /// Per-call budget for LLM requests.
    pub llm_timeout: Duration,

    /// Base URL of the embedding service.
    pub embedding_api_base: String,
    /// API key for the embedding service.
    pub embedding_api_key: Option<String>,
    /// Model name sent to the embedding service.
    pub embedding_model: String,
    /// Expected embedding dimension; mismatches fail loudly at ingest.
    pub embedding_dim: usize,
    /// Per-call budget for embedding requests.
    pub embedding_timeout: Duration,

    /// Whether reranking is enabled at all.
    pub rerank_enabled: bool,
    /// Model name sent to the reranker.
    pub rerank_model: String,
    /// Per-call budget for rerank requests.
    pub rerank_timeout: Duration,

    /// Master switch for the cache coordinator.
    pub enable_cache: bool,
    /// Default TTL for cache entries.
    pub cache_ttl: Duration,
    /// Per-cache size limits in MB, keyed by cache name.
    pub per_cache_size_limits: HashMap<String, u64>,

    /// Whether forwarded headers are honored at all.
    pub enable_proxy_headers: bool,
    /// CIDR set of peers whose forwarded/identity headers are trusted.
    pub trusted_proxy_ips: Vec<IpNet>,
    /// Header carrying the end-user id.
    pub user_id_header: String,
    /// Header carrying the client id.
    pub client_id_header: String,
    /// Header carrying the rate tier.
    pub user_tier_header: String,

    /// Capacity of the `default` tier per window.
    pub rate_limit_requests: u32,
    /// Fixed rate-limit window length.
    pub rate_limit_window: Duration,
    /// Per-tier capacity overrides.
    pub rate_limit_tiers: HashMap<String, u32>,
    /// Minimum interval between accepted requests from one identity.
    pub min_interval_per_user: Duration,

    /// Maximum accepted upload size in bytes.
    pub max_file_size: u64,
    /// Allowed upload extensions (lowercase, no dot).
    pub allowed_file_types: Vec<String>,

    /// Confidence below which rule-based intent results are treated as weak.
    pub intent_confidence_threshold: f32,
    /// Whether the LLM path of the intent engine is enabled.
    pub intent_enable_llm: bool,
    /// Optional path to the category-tagged sensitive vocabulary file.
    pub intent_sensitive_vocabulary_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let mut tiers = HashMap::new();
        tiers.insert("default".to_string(), 60);
        tiers.insert("free".to_string(), 20);
        tiers.insert("pro".to_string(), 240);
        tiers.insert("enterprise".to_string(), 1200);

        Self {
            host: IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
            port: 8188,
            workers: 0,
            debug: false,

            working_dir: PathBuf::from("./data/knowledge_bases"),
            qa_storage_dir: PathBuf::from("./data/qa_storage"),
            log_dir: PathBuf::from("./logs"),
            upload_dir: PathBuf::from("./data/uploads"),

            llm_api_base: "http://localhost:8100/v1".to_string(),
            llm_api_key: None,
            llm_model: "qwen2.5-14b-instruct".to_string(),
            llm_timeout: Duration::from_secs(crate::constants::DEFAULT_UPSTREAM_TIMEOUT_SECS),

            embedding_api_base: "http://localhost:8200/v1".to_string(),
            embedding_api_key: None,
            embedding_model: "bge-large-en-v1.5".to_string(),
            embedding_dim: crate::constants::DEFAULT_EMBEDDING_DIM,
            embedding_timeout: Duration::from_secs(
                crate::constants::DEFAULT_UPSTREAM_TIMEOUT_SECS,
            ),

            rerank_enabled: false,
            rerank_model: "bge-reranker-v2-m3".to_string(),
            rerank_timeout: Duration::from_secs(crate::constants::DEFAULT_UPSTREAM_TIMEOUT_SECS),

            enable_cache: true,
            cache_ttl: Duration::from_secs(3600),
            per_cache_size_limits: HashMap::new(),

            enable_proxy_headers: true,
            trusted_proxy_ips: Vec::new(),
            user_id_header: "X-User-Id".to_string(),
            client_id_header: "X-Client-Id".to_string(),
            user_tier_header: "X-User-Tier".to_string(),

            rate_limit_requests: 60,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_tiers: tiers,
            min_interval_per_user: Duration::ZERO,

            max_file_size: 50 * 1024 * 1024,
            allowed_file_types: ["txt", "md", "pdf", "docx", "json", "csv"]
                .iter()
                .map(|s| s.to_string())
                .collect(),

            intent_confidence_threshold: 0.6,
            intent_enable_llm: false,
            intent_sensitive_vocabulary_path: None,
        }
    }
}

impl Config {
    const ENV_HOST: &'static str = "RAGSERVE_HOST";
    const ENV_PORT: &'static str = "RAGSERVE_PORT";
    const ENV_WORKERS: &'static str = "RAGSERVE_WORKERS";
    const ENV_DEBUG: &'static str = "RAGSERVE_DEBUG";
    const ENV_WORKING_DIR: &'static str = "RAGSERVE_WORKING_DIR";
    const ENV_QA_STORAGE_DIR: &'static str = "RAGSERVE_QA_STORAGE_DIR";
    const ENV_LOG_DIR: &'static str = "RAGSERVE_LOG_DIR";
    const ENV_UPLOAD_DIR: &'static str = "RAGSERVE_UPLOAD_DIR";
    const ENV_LLM_API_BASE: &'static str = "RAGSERVE_LLM_API_BASE";
    const ENV_LLM_API_KEY: &'static str = "RAGSERVE_LLM_API_KEY";
    const ENV_LLM_MODEL: &'static str = "RAGSERVE_LLM_MODEL";
    const ENV_LLM_TIMEOUT: &'static str = "RAGSERVE_LLM_TIMEOUT";
    const ENV_EMBEDDING_API_BASE: &'static str = "RAGSERVE_EMBEDDING_API_BASE";
    const ENV_EMBEDDING_API_KEY: &'static str = "RAGSERVE_EMBEDDING_API_KEY";
    const ENV_EMBEDDING_MODEL: &'static str = "RAGSERVE_EMBEDDING_MODEL";
    const ENV_EMBEDDING_DIM: &'static str = "RAGSERVE_EMBEDDING_DIM";
    const ENV_EMBEDDING_TIMEOUT: &'static str = "RAGSERVE_EMBEDDING_TIMEOUT";
    const ENV_RERANK_ENABLED: &'static str = "RAGSERVE_RERANK_ENABLED";
    const ENV_RERANK_MODEL: &'static str = "RAGSERVE_RERANK_MODEL";
    const ENV_RERANK_TIMEOUT: &'static str = "RAGSERVE_RERANK_TIMEOUT";
    const ENV_ENABLE_CACHE: &'static str = "RAGSERVE_ENABLE_CACHE";
    const ENV_CACHE_TTL: &'static str = "RAGSERVE_CACHE_TTL";
    const ENV_PER_CACHE_SIZE_LIMITS: &'static str = "RAGSERVE_PER_CACHE_SIZE_LIMITS";
    const ENV_ENABLE_PROXY_HEADERS: &'static str = "RAGSERVE_ENABLE_PROXY_HEADERS";
    const ENV_TRUSTED_PROXY_IPS: &'static str = "RAGSERVE_TRUSTED_PROXY_IPS";
    const ENV_USER_ID_HEADER: &'static str = "RAGSERVE_USER_ID_HEADER";
    const ENV_CLIENT_ID_HEADER: &'static str = "RAGSERVE_CLIENT_ID_HEADER";
    const ENV_USER_TIER_HEADER: &'static str = "RAGSERVE_USER_TIER_HEADER";
    const ENV_RATE_LIMIT_REQUESTS: &'static str = "RAGSERVE_RATE_LIMIT_REQUESTS";
    const ENV_RATE_LIMIT_WINDOW: &'static str = "RAGSERVE_RATE_LIMIT_WINDOW";
    const ENV_RATE_LIMIT_TIERS: &'static str = "RAGSERVE_RATE_LIMIT_TIERS";
    const ENV_MIN_INTERVAL_PER_USER: &'static str = "RAGSERVE_MIN_INTERVAL_PER_USER";
    const ENV_MAX_FILE_SIZE: &'static str = "RAGSERVE_MAX_FILE_SIZE";
    const ENV_ALLOWED_FILE_TYPES: &'static str = "RAGSERVE_ALLOWED_FILE_TYPES";
    const ENV_INTENT_CONFIDENCE_THRESHOLD: &'static str = "RAGSERVE_INTENT_CONFIDENCE_THRESHOLD";
    const ENV_INTENT_ENABLE_LLM: &'static str = "RAGSERVE_INTENT_ENABLE_LLM";
    const ENV_INTENT_SENSITIVE_VOCABULARY_PATH: &'static str =
        "RAGSERVE_INTENT_SENSITIVE_VOCABULARY_PATH";

    const KNOWN_VARS: &'static [&'static str] = &[
        Self::ENV_HOST,
        Self::ENV_PORT,
        Self::ENV_WORKERS,
        Self::ENV_DEBUG,
        Self::ENV_WORKING_DIR,
        Self::ENV_QA_STORAGE_DIR,
        Self::ENV_LOG_DIR,
        Self::ENV_UPLOAD_DIR,
        Self::ENV_LLM_API_BASE,
        Self::ENV_LLM_API_KEY,
        Self::ENV_LLM_MODEL,
        Self::ENV_LLM_TIMEOUT,
        Self::ENV_EMBEDDING_API_BASE,
        Self::ENV_EMBEDDING_API_KEY,
        Self::ENV_EMBEDDING_MODEL,
        Self::ENV_EMBEDDING_DIM,
        Self::ENV_EMBEDDING_TIMEOUT,
        Self::ENV_RERANK_ENABLED,
        Self::ENV_RERANK_MODEL,
        Self::ENV_RERANK_TIMEOUT,
        Self::ENV_ENABLE_CACHE,
        Self::ENV_CACHE_TTL,
        Self::ENV_PER_CACHE_SIZE_LIMITS,
        Self::ENV_ENABLE_PROXY_HEADERS,
        Self::ENV_TRUSTED_PROXY_IPS,
        Self::ENV_USER_ID_HEADER,
        Self::ENV_CLIENT_ID_HEADER,
        Self::ENV_USER_TIER_HEADER,
        Self::ENV_RATE_LIMIT_REQUESTS,
        Self::ENV_RATE_LIMIT_WINDOW,
        Self::ENV_RATE_LIMIT_TIERS,
        Self::ENV_MIN_INTERVAL_PER_USER,
        Self::ENV_MAX_FILE_SIZE,
        Self::ENV_ALLOWED_FILE_TYPES,
        Self::ENV_INTENT_CONFIDENCE_THRESHOLD,
        Self::ENV_INTENT_ENABLE_LLM,
        Self::ENV_INTENT_SENSITIVE_VOCABULARY_PATH,
    ];

    /// Loads configuration from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = Self::parse_addr_from_env(Self::ENV_HOST, defaults.host)?;
        let port = Self::parse_port_from_env(defaults.port)?;

        let rate_limit_requests = Self::parse_u64_from_env(
            Self::ENV_RATE_LIMIT_REQUESTS,
            defaults.rate_limit_requests as u64,
        )? as u32;

        let mut rate_limit_tiers =
            Self::parse_u32_map_from_env(Self::ENV_RATE_LIMIT_TIERS, defaults.rate_limit_tiers)?;
        // The `default` tier always reflects rate_limit_requests unless the
        // tier map explicitly overrides it.
        if env::var(Self::ENV_RATE_LIMIT_REQUESTS).is_ok()
            && env::var(Self::ENV_RATE_LIMIT_TIERS).is_err()
        {
            rate_limit_tiers.insert("default".to_string(), rate_limit_requests);
        }

        let intent_confidence_threshold = Self::parse_f64_from_env(
            Self::ENV_INTENT_CONFIDENCE_THRESHOLD,
            defaults.intent_confidence_threshold as f64,
        )?;
        if !(0.0..=1.0).contains(&intent_confidence_threshold) {
            return Err(ConfigError::OutOfRange {
                name: Self::ENV_INTENT_CONFIDENCE_THRESHOLD,
                value: intent_confidence_threshold,
            });
        }

        Ok(Self {
            host,
            port,
            workers: Self::parse_u64_from_env(Self::ENV_WORKERS, defaults.workers as u64)?
                as usize,
            debug: Self::parse_bool_from_env(Self::ENV_DEBUG, defaults.debug),

            working_dir: Self::parse_path_from_env(Self::ENV_WORKING_DIR, defaults.working_dir),
            qa_storage_dir: Self::parse_path_from_env(
                Self::ENV_QA_STORAGE_DIR,
                defaults.qa_storage_dir,
            ),
            log_dir: Self::parse_path_from_env(Self::ENV_LOG_DIR, defaults.log_dir),
            upload_dir: Self::parse_path_from_env(Self::ENV_UPLOAD_DIR, defaults.upload_dir),

            llm_api_base: Self::parse_string_from_env(
                Self::ENV_LLM_API_BASE,
                defaults.llm_api_base,
            ),
            llm_api_key: Self::parse_optional_string_from_env(Self::ENV_LLM_API_KEY),
            llm_model: Self::parse_string_from_env(Self::ENV_LLM_MODEL, defaults.llm_model),
            llm_timeout: Self::parse_secs_from_env(Self::ENV_LLM_TIMEOUT, defaults.llm_timeout)?,

            embedding_api_base: Self::parse_string_from_env(
                Self::ENV_EMBEDDING_API_BASE,
                defaults.embedding_api_base,
            ),
            embedding_api_key: Self::parse_optional_string_from_env(Self::ENV_EMBEDDING_API_KEY),
            embedding_model: Self::parse_string_from_env(
                Self::ENV_EMBEDDING_MODEL,
                defaults.embedding_model,
            ),
            embedding_dim: Self::parse_u64_from_env(
                Self::ENV_EMBEDDING_DIM,
                defaults.embedding_dim as u64,
            )? as usize,
            embedding_timeout: Self::parse_secs_from_env(
                Self::ENV_EMBEDDING_TIMEOUT,
                defaults.embedding_timeout,
            )?,

            rerank_enabled: Self::parse_bool_from_env(
                Self::ENV_RERANK_ENABLED,
                defaults.rerank_enabled,
            ),
            rerank_model: Self::parse_string_from_env(
                Self::ENV_RERANK_MODEL,
                defaults.rerank_model,
            ),
            rerank_timeout: Self::parse_secs_from_env(
                Self::ENV_RERANK_TIMEOUT,
                defaults.rerank_timeout,
            )?,

            enable_cache: Self::parse_bool_from_env(Self::ENV_ENABLE_CACHE, defaults.enable_cache),
            cache_ttl: Self::parse_secs_from_env(Self::ENV_CACHE_TTL, defaults.cache_ttl)?,
            per_cache_size_limits: Self::parse_u64_map_from_env(
                Self::ENV_PER_CACHE_SIZE_LIMITS,
                defaults.per_cache_size_limits,
            )?,

            enable_proxy_headers: Self::parse_bool_from_env(
                Self::ENV_ENABLE_PROXY_HEADERS,
                defaults.enable_proxy_headers,
            ),
            trusted_proxy_ips: Self::parse_cidrs_from_env(Self::ENV_TRUSTED_PROXY_IPS),
            user_id_header: Self::parse_string_from_env(
                Self::ENV_USER_ID_HEADER,
                defaults.user_id_header,
            ),
            client_id_header: Self::parse_string_from_env(
                Self::ENV_CLIENT_ID_HEADER,
                defaults.client_id_header,
            ),
            user_tier_header: Self::parse_string_from_env(
                Self::ENV_USER_TIER_HEADER,
                defaults.user_tier_header,
            ),

            rate_limit_requests,
            rate_limit_window: Self::parse_secs_from_env(
                Self::ENV_RATE_LIMIT_WINDOW,
                defaults.rate_limit_window,
            )?,
            rate_limit_tiers,
            min_interval_per_user: Self::parse_secs_f64_from_env(
                Self::ENV_MIN_INTERVAL_PER_USER,
                defaults.min_interval_per_user,
            )?,

            max_file_size: Self::parse_u64_from_env(
                Self::ENV_MAX_FILE_SIZE,
                defaults.max_file_size,
            )?,
            allowed_file_types: Self::parse_list_from_env(
                Self::ENV_ALLOWED_FILE_TYPES,
                defaults.allowed_file_types,
            ),

            intent_confidence_threshold: intent_confidence_threshold as f32,
            intent_enable_llm: Self::parse_bool_from_env(
                Self::ENV_INTENT_ENABLE_LLM,
                defaults.intent_enable_llm,
            ),
            intent_sensitive_vocabulary_path: Self::parse_optional_string_from_env(
                Self::ENV_INTENT_SENSITIVE_VOCABULARY_PATH,
            )
            .map(PathBuf::from),
        })
    }

    /// Validates paths and ranges. Called once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for path in [
            &self.working_dir,
            &self.qa_storage_dir,
            &self.log_dir,
            &self.upload_dir,
        ] {
            if path.exists() && !path.is_dir() {
                return Err(ConfigError::NotADirectory { path: path.clone() });
            }
        }

        if self.embedding_dim == 0 {
            return Err(ConfigError::InvalidNumber {
                name: Self::ENV_EMBEDDING_DIM,
                value: "0".to_string(),
            });
        }

        if let Some(ref path) = self.intent_sensitive_vocabulary_path {
            if !path.exists() {
                return Err(ConfigError::PathNotFound { path: path.clone() });
            }
        }

        Ok(())
    }

    /// Logs any `RAGSERVE_*` environment variables that are not recognized options.
    pub fn warn_unknown_vars(&self) {
        for (key, _) in env::vars() {
            if key.starts_with("RAGSERVE_") && !Self::KNOWN_VARS.contains(&key.as_str()) {
                tracing::warn!(var = %key, "unrecognized configuration variable, ignoring");
            }
        }
    }

    /// Returns the `host:port` string for binding.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Capacity for a tier, falling back to the `default` tier.
    pub fn tier_capacity(&self, tier: &str) -> u32 {
        self.rate_limit_tiers
            .get(tier)
            .or_else(|| self.rate_limit_tiers.get("default"))
            .copied()
            .unwrap_or(self.rate_limit_requests)
    }

    fn parse_port_from_env(default: u16) -> Result<u16, ConfigError> {
        match env::var(Self::ENV_PORT) {
            Ok(value) => {
                let port: u16 = value.parse().map_err(|e| ConfigError::PortParseError {
                    value: value.clone(),
                    source: e,
                })?;
                if port == 0 {
                    return Err(ConfigError::InvalidPort { value });
                }
                Ok(port)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_addr_from_env(var_name: &'static str, default: IpAddr) -> Result<IpAddr, ConfigError> {
        match env::var(var_name) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::InvalidBindAddr { value, source: e }),
            Err(_) => Ok(default),
        }
    }

    fn parse_string_from_env(var_name: &str, default: String) -> String {
        env::var(var_name).unwrap_or(default)
    }

    fn parse_optional_string_from_env(var_name: &str) -> Option<String> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_path_from_env(var_name: &str, default: PathBuf) -> PathBuf {
        env::var(var_name).map(PathBuf::from).unwrap_or(default)
    }

    fn parse_bool_from_env(var_name: &str, default: bool) -> bool {
        match env::var(var_name) {
            Ok(value) => matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ),
            Err(_) => default,
        }
    }

    fn parse_u64_from_env(var_name: &'static str, default: u64) -> Result<u64, ConfigError> {
        match env::var(var_name) {
            Ok(value) => value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
                name: var_name,
                value,
            }),
            Err(_) => Ok(default),
        }
    }

    fn parse_f64_from_env(var_name: &'static str, default: f64) -> Result<f64, ConfigError> {
        match env::var(var_name) {
            Ok(value) => value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
                name: var_name,
                value,
            }),
            Err(_) => Ok(default),
        }
    }

    fn parse_secs_from_env(
        var_name: &'static str,
        default: Duration,
    ) -> Result<Duration, ConfigError> {
        Ok(Duration::from_secs(Self::parse_u64_from_env(
            var_name,
            default.as_secs(),
        )?))
    }

    fn parse_secs_f64_from_env(
        var_name: &'static str,
        default: Duration,
    ) -> Result<Duration, ConfigError> {
        let secs = Self::parse_f64_from_env(var_name, default.as_secs_f64())?;
        if secs < 0.0 {
            return Err(ConfigError::InvalidNumber {
                name: var_name,
                value: secs.to_string(),
            });
        }
        Ok(Duration::from_secs_f64(secs))
    }

    fn parse_list_from_env(var_name: &str, default: Vec<String>) -> Vec<String> {
        match env::var(var_name) {
            Ok(value) => value
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => default,
        }
    }

    /// Parses `name=value,name=value` map options.
    fn parse_u32_map_from_env(
        var_name: &'static str,
        default: HashMap<String, u32>,
    ) -> Result<HashMap<String, u32>, ConfigError> {
        let raw = Self::parse_u64_map_entries(var_name)?;
        match raw {
            Some(entries) => Ok(entries
                .into_iter()
                .map(|(k, v)| (k, v as u32))
                .collect()),
            None => Ok(default),
        }
    }

    fn parse_u64_map_from_env(
        var_name: &'static str,
        default: HashMap<String, u64>,
    ) -> Result<HashMap<String, u64>, ConfigError> {
        match Self::parse_u64_map_entries(var_name)? {
            Some(entries) => Ok(entries.into_iter().collect()),
            None => Ok(default),
        }
    }

    fn parse_u64_map_entries(
        var_name: &'static str,
    ) -> Result<Option<Vec<(String, u64)>>, ConfigError> {
        let Ok(value) = env::var(var_name) else {
            return Ok(None);
        };

        let mut entries = Vec::new();
        for entry in value.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (key, val) = entry.split_once('=').ok_or(ConfigError::InvalidMapEntry {
                name: var_name,
                entry: entry.to_string(),
            })?;
            let parsed: u64 = val.trim().parse().map_err(|_| ConfigError::InvalidMapEntry {
                name: var_name,
                entry: entry.to_string(),
            })?;
            entries.push((key.trim().to_string(), parsed));
        }
        Ok(Some(entries))
    }

    /// Parses the trusted-proxy CIDR list. Bad entries are logged and skipped
    /// rather than failing startup; misconfiguration here must not take the
    /// service down, it only widens or narrows header trust.
    fn parse_cidrs_from_env(var_name: &str) -> Vec<IpNet> {
        let Ok(value) = env::var(var_name) else {
            return Vec::new();
        };

        let mut nets = Vec::new();
        for entry in value.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            // Bare addresses are accepted as /32 (or /128) networks.
            match entry.parse::<IpNet>() {
                Ok(net) => nets.push(net),
                Err(_) => match entry.parse::<IpAddr>() {
                    Ok(addr) => nets.push(IpNet::from(addr)),
                    Err(_) => {
                        tracing::warn!(entry = %entry, "skipping unparseable trusted proxy CIDR");
                    }
                },
            }
        }
        nets
    }
}
