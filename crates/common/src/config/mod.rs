//! Configuration management for RoboDigest services
//!
//! Supports loading configuration from:
//! - Configuration files (`config/default`, `config/{APP_ENV}`, `config/local`)
//! - Environment variables (prefixed with APP__)
//! - Default values
//!
//! Provider credentials are never read from files; see [`Credentials`].

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::errors::AppError;
use crate::kind::SourceKind;
use crate::taxonomy::{self, UNCATEGORIZED};

pub const ENV_BILIBILI_SESSDATA: &str = "BILIBILI_SESSDATA";
pub const ENV_NEWSAPI_KEY: &str = "NEWSAPI_KEY";
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_S2_API_KEY: &str = "S2_API_KEY";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Options for one fetch pass
    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub rate_limits: RateLimitsConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub filters: FiltersConfig,

    #[serde(default)]
    pub supplement: SupplementConfig,

    /// Filled from the process environment, never from files
    #[serde(skip)]
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL; `memory://` selects the in-process store
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Log every SQL statement
    #[serde(default)]
    pub sqlx_logging: bool,

    /// Create missing tables and indexes at startup
    #[serde(default = "default_true")]
    pub bootstrap: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_true")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name attached to logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

/// Options for one fetch pass, passed by value to every run
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Upper bound on records requested per work unit
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Lookback window for papers
    #[serde(default = "default_days_back")]
    pub days_back: u32,

    /// Run the fuzzy-title check before inserting papers
    #[serde(default = "default_true")]
    pub enable_dedup: bool,

    /// Start the papers window at the newest stored paper of each category
    #[serde(default)]
    pub enable_incremental: bool,

    /// Enrich recent papers after a papers pass
    #[serde(default)]
    pub fetch_supplement: bool,

    /// Overwrite stored PDF and code links on identity hits
    #[serde(default = "default_true")]
    pub update_paper_links: bool,

    /// Presentation offset for local timestamps
    #[serde(default = "default_local_offset")]
    pub local_offset_hours: i32,

    /// Per-request timeout for upstream calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    /// Register cron triggers at startup
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Kind to 5-field cron expression
    #[serde(default = "default_crons")]
    pub crons: BTreeMap<SourceKind, String>,

    /// Time given to in-flight runs after cancellation
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DedupConfig {
    /// Title similarity at or above which two papers are the same
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

/// Request pacing for one upstream provider
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct RateLimitPolicy {
    /// Minimum delay between request starts
    pub min_interval_ms: u64,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// Random extra delay added to every wait
    #[serde(default)]
    pub jitter_ms: u64,

    /// Requests allowed in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Ceiling for a single backoff sleep
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: u64,
}

impl RateLimitPolicy {
    pub const fn new(min_interval_ms: u64, max_retries: u32, jitter_ms: u64, concurrency: usize) -> Self {
        Self {
            min_interval_ms,
            max_retries,
            jitter_ms,
            concurrency,
            backoff_cap_secs: 60,
        }
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitsConfig {
    #[serde(default = "default_arxiv_policy")]
    pub arxiv: RateLimitPolicy,

    #[serde(default = "default_rss_policy")]
    pub rss: RateLimitPolicy,

    #[serde(default = "default_newsapi_policy")]
    pub newsapi: RateLimitPolicy,

    #[serde(default = "default_orz_policy")]
    pub orz: RateLimitPolicy,

    #[serde(default = "default_video_policy")]
    pub video: RateLimitPolicy,

    #[serde(default = "default_github_policy")]
    pub github: RateLimitPolicy,

    #[serde(default = "default_supplement_policy")]
    pub supplement: RateLimitPolicy,
}

/// A paper search: taxonomy label and the provider query that feeds it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeywordQuery {
    pub label: String,
    pub query: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArxivSourceConfig {
    #[serde(default = "default_arxiv_url")]
    pub base_url: String,

    /// Ordered searches; empty means one per taxonomy label
    #[serde(default)]
    pub keywords: Vec<KeywordQuery>,

    #[serde(default = "default_arxiv_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FeedConfig {
    pub name: String,

    pub url: String,

    /// Tech-media feeds need a broad keyword; academic feeds do not
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RssSourceConfig {
    #[serde(default = "default_feeds")]
    pub feeds: Vec<FeedConfig>,

    #[serde(default = "default_rss_workers")]
    pub workers: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewsApiSourceConfig {
    #[serde(default = "default_newsapi_url")]
    pub base_url: String,

    #[serde(default = "default_news_queries")]
    pub queries: Vec<String>,

    #[serde(default = "default_news_lookback")]
    pub lookback_days: u32,

    #[serde(default = "default_news_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrzSourceConfig {
    #[serde(default = "default_orz_url")]
    pub base_url: String,

    #[serde(default = "default_orz_platforms")]
    pub platforms: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoSourceConfig {
    #[serde(default = "default_bilibili_url")]
    pub base_url: String,

    /// Channel UIDs, fetched in this order
    #[serde(default)]
    pub uids: Vec<i64>,

    /// Most recent uploads kept per channel
    #[serde(default = "default_videos_per_channel")]
    pub videos_per_channel: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GithubRepoConfig {
    pub owner: String,

    pub repo: String,

    /// Regex for the README heading that opens the job list
    #[serde(default = "default_job_heading")]
    pub heading_pattern: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GithubSourceConfig {
    #[serde(default = "default_github_url")]
    pub base_url: String,

    #[serde(default)]
    pub repos: Vec<GithubRepoConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub arxiv: ArxivSourceConfig,

    #[serde(default)]
    pub rss: RssSourceConfig,

    #[serde(default)]
    pub newsapi: NewsApiSourceConfig,

    #[serde(default)]
    pub orz: OrzSourceConfig,

    #[serde(default)]
    pub video: VideoSourceConfig,

    #[serde(default)]
    pub github: GithubSourceConfig,
}

/// Keyword lists of the two-stage news filter
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FiltersConfig {
    /// Always keep
    #[serde(default = "default_core_keywords")]
    pub core: Vec<String>,

    /// Reject unless a core keyword is present
    #[serde(default = "default_negative_keywords")]
    pub negative: Vec<String>,

    /// Required by strict feeds when no core keyword is present
    #[serde(default = "default_broad_keywords")]
    pub broad: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupplementConfig {
    #[serde(default = "default_s2_url")]
    pub base_url: String,

    /// Papers enriched within this many days are skipped
    #[serde(default = "default_freshness_days")]
    pub freshness_days: u32,

    /// Cap on papers enriched per run
    #[serde(default = "default_supplement_limit")]
    pub batch_limit: u64,
}

/// Provider secrets taken from the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub bilibili_sessdata: Option<String>,
    pub newsapi_key: Option<String>,
    pub github_token: Option<String>,
    pub s2_api_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            bilibili_sessdata: read(ENV_BILIBILI_SESSDATA),
            newsapi_key: read(ENV_NEWSAPI_KEY),
            github_token: read(ENV_GITHUB_TOKEN),
            s2_api_key: read(ENV_S2_API_KEY),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_concurrent() -> usize { 100 }
fn default_database_url() -> String { "memory://".to_string() }
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "robodigest".to_string() }
fn default_max_results() -> u32 { 50 }
fn default_days_back() -> u32 { 7 }
fn default_local_offset() -> i32 { 8 }
fn default_user_agent() -> String { format!("robodigest/{}", env!("CARGO_PKG_VERSION")) }
fn default_shutdown_grace() -> u64 { 30 }
fn default_similarity_threshold() -> f64 { 0.85 }
fn default_concurrency() -> usize { 1 }
fn default_backoff_cap() -> u64 { 60 }
fn default_arxiv_policy() -> RateLimitPolicy { RateLimitPolicy::new(3_000, 3, 0, 1) }
fn default_rss_policy() -> RateLimitPolicy { RateLimitPolicy::new(0, 2, 0, 5) }
fn default_newsapi_policy() -> RateLimitPolicy { RateLimitPolicy::new(1_000, 3, 0, 1) }
fn default_orz_policy() -> RateLimitPolicy { RateLimitPolicy::new(1_000, 2, 500, 1) }
fn default_video_policy() -> RateLimitPolicy { RateLimitPolicy::new(2_000, 3, 1_500, 1) }
fn default_github_policy() -> RateLimitPolicy { RateLimitPolicy::new(1_000, 3, 0, 1) }
fn default_supplement_policy() -> RateLimitPolicy { RateLimitPolicy::new(150, 3, 0, 1) }
fn default_arxiv_url() -> String { "https://export.arxiv.org/api/query".to_string() }
fn default_arxiv_page_size() -> u32 { 100 }
fn default_rss_workers() -> usize { 5 }
fn default_newsapi_url() -> String { "https://newsapi.org".to_string() }
fn default_news_lookback() -> u32 { 7 }
fn default_news_page_size() -> u32 { 100 }
fn default_orz_url() -> String { "https://orz.ai".to_string() }
fn default_bilibili_url() -> String { "https://api.bilibili.com".to_string() }
fn default_videos_per_channel() -> u32 { 30 }
fn default_github_url() -> String { "https://api.github.com".to_string() }
fn default_job_heading() -> String { r"(?i)^#{1,6}\s*(jobs?|positions|hiring|招聘|职位)".to_string() }
fn default_s2_url() -> String { "https://api.semanticscholar.org".to_string() }
fn default_freshness_days() -> u32 { 7 }
fn default_supplement_limit() -> u64 { 200 }

fn default_crons() -> BTreeMap<SourceKind, String> {
    BTreeMap::from([
        (SourceKind::Papers, "0 2 * * *".to_string()),
        (SourceKind::News, "0 */2 * * *".to_string()),
        (SourceKind::Jobs, "30 3 * * *".to_string()),
        (SourceKind::Videos, "0 4 * * *".to_string()),
        (SourceKind::Supplement, "0 5 * * *".to_string()),
    ])
}

fn default_feeds() -> Vec<FeedConfig> {
    let feed = |name: &str, url: &str, strict: bool| FeedConfig {
        name: name.to_string(),
        url: url.to_string(),
        strict,
    };
    vec![
        feed("arXiv cs.RO", "https://rss.arxiv.org/rss/cs.RO", false),
        feed("The Robot Report", "https://www.therobotreport.com/feed/", false),
        feed("MIT News Robotics", "https://news.mit.edu/rss/topic/robotics", false),
        feed("IEEE Spectrum Robotics", "https://spectrum.ieee.org/feeds/topic/robotics.rss", true),
        feed("TechCrunch Robotics", "https://techcrunch.com/category/robotics/feed/", true),
    ]
}

fn default_news_queries() -> Vec<String> {
    ["embodied AI", "humanoid robot", "robot learning", "robot foundation model", "具身智能"]
        .map(String::from)
        .to_vec()
}

fn default_orz_platforms() -> Vec<String> {
    ["36kr", "ithome", "juejin", "sspai", "zhihu"].map(String::from).to_vec()
}

fn default_core_keywords() -> Vec<String> {
    [
        "robot", "robotic", "robotics", "embodied", "humanoid", "manipulation", "grasp",
        "quadruped", "legged", "机器人", "具身", "人形",
    ]
    .map(String::from)
    .to_vec()
}

fn default_negative_keywords() -> Vec<String> {
    [
        "quantum", "cryptocurrency", "bitcoin", "stock", "finance", "earnings", "smartphone",
        "game review", "股票", "手机", "游戏",
    ]
    .map(String::from)
    .to_vec()
}

fn default_broad_keywords() -> Vec<String> {
    [
        "ai", "artificial intelligence", "machine learning", "autonomous", "drone",
        "foundation model", "multimodal", "vision-language", "人工智能", "大模型", "自动驾驶",
    ]
    .map(String::from)
    .to_vec()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            sqlx_logging: false,
            bootstrap: true,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: true,
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            days_back: default_days_back(),
            enable_dedup: true,
            enable_incremental: false,
            fetch_supplement: false,
            update_paper_links: true,
            local_offset_hours: default_local_offset(),
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            crons: default_crons(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            arxiv: default_arxiv_policy(),
            rss: default_rss_policy(),
            newsapi: default_newsapi_policy(),
            orz: default_orz_policy(),
            video: default_video_policy(),
            github: default_github_policy(),
            supplement: default_supplement_policy(),
        }
    }
}

impl Default for ArxivSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_arxiv_url(),
            keywords: Vec::new(),
            page_size: default_arxiv_page_size(),
        }
    }
}

impl Default for RssSourceConfig {
    fn default() -> Self {
        Self {
            feeds: default_feeds(),
            workers: default_rss_workers(),
        }
    }
}

impl Default for NewsApiSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_newsapi_url(),
            queries: default_news_queries(),
            lookback_days: default_news_lookback(),
            page_size: default_news_page_size(),
        }
    }
}

impl Default for OrzSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_orz_url(),
            platforms: default_orz_platforms(),
        }
    }
}

impl Default for VideoSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_bilibili_url(),
            uids: Vec::new(),
            videos_per_channel: default_videos_per_channel(),
        }
    }
}

impl Default for GithubSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_github_url(),
            repos: Vec::new(),
        }
    }
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            core: default_core_keywords(),
            negative: default_negative_keywords(),
            broad: default_broad_keywords(),
        }
    }
}

impl Default for SupplementConfig {
    fn default() -> Self {
        Self {
            base_url: default_s2_url(),
            freshness_days: default_freshness_days(),
            batch_limit: default_supplement_limit(),
        }
    }
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Check a classic 5-field cron and return the 6-field (seconds-first)
/// form the scheduler runtime expects
pub fn cron_with_seconds(spec: &str) -> Result<String, AppError> {
    let fields: Vec<&str> = spec.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(AppError::config(format!(
            "cron '{spec}' must have 5 fields, found {}",
            fields.len()
        )));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '*' | '/' | ',' | '-' | '?');
    if let Some(bad) = fields.iter().find(|f| !f.chars().all(allowed)) {
        return Err(AppError::config(format!("cron '{spec}' has invalid field '{bad}'")));
    }
    Ok(format!("0 {}", fields.join(" ")))
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env is the normal case in production
        let _ = dotenvy::dotenv();

        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__FETCH__DAYS_BACK=3
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app: AppConfig = config.try_deserialize()?;
        app.credentials = Credentials::from_env();
        Ok(app)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app: AppConfig = config.try_deserialize()?;
        app.credentials = Credentials::from_env();
        Ok(app)
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Grace period for in-flight runs at shutdown
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.schedule.shutdown_grace_secs)
    }

    /// Paper searches in run order, with labels resolved to canonical keys
    pub fn keyword_queries(&self) -> Result<Vec<KeywordQuery>, AppError> {
        if self.sources.arxiv.keywords.is_empty() {
            return Ok(taxonomy::default_queries()
                .into_iter()
                .map(|(label, query)| KeywordQuery { label, query })
                .collect());
        }
        self.sources
            .arxiv
            .keywords
            .iter()
            .map(|k| {
                let label = taxonomy::normalize(&k.label);
                if label == UNCATEGORIZED {
                    return Err(AppError::config(format!("unknown keyword label '{}'", k.label)));
                }
                if k.query.trim().is_empty() {
                    return Err(AppError::config(format!("empty query for '{}'", k.label)));
                }
                Ok(KeywordQuery {
                    label: label.to_string(),
                    query: k.query.trim().to_string(),
                })
            })
            .collect()
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        for (kind, spec) in &self.schedule.crons {
            cron_with_seconds(spec)
                .map_err(|e| AppError::config(format!("schedule.crons.{kind}: {e}")))?;
        }

        let threshold = self.dedup.similarity_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(AppError::config(format!(
                "dedup.similarity_threshold must be in (0, 1], got {threshold}"
            )));
        }
        if self.fetch.max_results == 0 {
            return Err(AppError::config("fetch.max_results must be positive"));
        }
        if self.fetch.days_back == 0 {
            return Err(AppError::config("fetch.days_back must be positive"));
        }
        if !(-12..=14).contains(&self.fetch.local_offset_hours) {
            return Err(AppError::config("fetch.local_offset_hours out of range"));
        }
        if self.sources.rss.workers == 0 {
            return Err(AppError::config("sources.rss.workers must be positive"));
        }

        let policies = [
            ("arxiv", &self.rate_limits.arxiv),
            ("rss", &self.rate_limits.rss),
            ("newsapi", &self.rate_limits.newsapi),
            ("orz", &self.rate_limits.orz),
            ("video", &self.rate_limits.video),
            ("github", &self.rate_limits.github),
            ("supplement", &self.rate_limits.supplement),
        ];
        for (name, policy) in policies {
            if policy.concurrency == 0 {
                return Err(AppError::config(format!("rate_limits.{name}.concurrency must be positive")));
            }
        }

        for repo in &self.sources.github.repos {
            regex_lite::Regex::new(&repo.heading_pattern).map_err(|e| {
                AppError::config(format!("heading_pattern for {}/{}: {e}", repo.owner, repo.repo))
            })?;
        }

        self.keyword_queries()?;
        Ok(())
    }
}
