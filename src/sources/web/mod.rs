//! Depth-bounded, scope-restricted asynchronous web crawl.
//!
//! A bounded-concurrency BFS: workers pop `(url, depth)` entries from a shared queue,
//! fetch under a semaphore, emit items for HTML pages and allowed binary resources, and
//! enqueue in-scope links while `depth < max_depth`. The visited/seen sets plus the
//! depth bound close crawl cycles. Per-URL errors are logged and never abort the crawl.

mod robots;

use crate::html;
use crate::pipeline::{Item, RunContext, SourceError, SourceType};
use crate::sources::{Source, SourceBatch};
use async_trait::async_trait;
use reqwest::Client;
use robots::RobotsTxt;
use serde_json::{Map, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use url::Url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Substrings identifying ad and tracker URLs, always skipped.
const AD_TRACKING_PATTERNS: [&str; 15] = [
    "doubleclick",
    "googlesyndication",
    "google-analytics",
    "googletagmanager",
    "adservice",
    "adsystem",
    "adclick",
    "facebook.com",
    "facebook.net",
    "baidu.com",
    "analytics",
    "tracker",
    "tracking",
    "ads.",
    "ad.",
];

/// Extensions treated as HTML pages; the empty string covers extensionless paths.
const COMMON_PAGE_EXTENSIONS: [&str; 5] = [".html", ".htm", ".php", ".aspx", ""];

const DEFAULT_ALLOWED_EXTENSIONS: [&str; 10] = [
    ".html", ".htm", ".pdf", ".txt", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx",
];

/// Crawl parameters.
pub struct WebCrawlerConfig {
    /// Seed URL; the crawl scope derives from its host and path.
    pub start_url: String,
    /// Maximum link depth from the seed (seed is depth 0).
    pub max_depth: u32,
    /// Binary resource extensions worth downloading.
    pub allowed_extensions: Vec<String>,
    /// Bound on concurrent fetches.
    pub concurrency: usize,
    /// Admit hosts under the seed's registrable domain.
    pub allow_subdomains: bool,
    /// Require paths under the seed's directory.
    pub restrict_to_path: bool,
    /// Honor `robots.txt` for user-agent `*`.
    pub respect_robots: bool,
}

impl WebCrawlerConfig {
    /// Defaults per the reference crawl: depth 2, six workers, subdomains admitted.
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            max_depth: 2,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            concurrency: 6,
            allow_subdomains: true,
            restrict_to_path: false,
            respect_robots: true,
        }
    }
}

/// Web crawl source emitting one item per fetched page or allowed binary resource.
pub struct WebCrawlerSource {
    config: WebCrawlerConfig,
    user_metadata: Map<String, Value>,
}

/// Host/path admission policy derived from the seed URL.
struct CrawlScope {
    host: String,
    base_domain: String,
    path_prefix: String,
    allow_subdomains: bool,
    restrict_to_path: bool,
}

impl CrawlScope {
    fn from_start_url(url: &Url, allow_subdomains: bool, restrict_to_path: bool) -> Self {
        let host = url.host_str().unwrap_or_default().to_lowercase();
        let path = url.path();
        let path_prefix = if path.ends_with('/') {
            path.to_string()
        } else {
            match path.rfind('/') {
                Some(index) => path[..=index].to_string(),
                None => "/".to_string(),
            }
        };
        Self {
            host: host.clone(),
            base_domain: registrable_domain(&host),
            path_prefix,
            allow_subdomains,
            restrict_to_path,
        }
    }

    fn admits(&self, url: &Url) -> bool {
        let host = url.host_str().unwrap_or_default().to_lowercase();
        let host_ok = host == self.host
            || (self.allow_subdomains && host.ends_with(&format!(".{}", self.base_domain)));
        if !host_ok {
            return false;
        }
        !self.restrict_to_path || url.path().starts_with(&self.path_prefix)
    }
}

/// Last two labels of a host name.
fn registrable_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() >= 2 {
        labels[labels.len() - 2..].join(".")
    } else {
        host.to_string()
    }
}

/// Strip the fragment and any trailing slash (the root keeps none either).
fn normalize_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string().trim_end_matches('/').to_string()
}

fn is_ad_link(url: &str) -> bool {
    let lower = url.to_lowercase();
    AD_TRACKING_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

/// Shared crawl bookkeeping: the work queue, dedup sets, and results.
struct CrawlState {
    queue: std::sync::Mutex<VecDeque<(String, u32)>>,
    visited: std::sync::Mutex<HashSet<String>>,
    seen: std::sync::Mutex<HashSet<String>>,
    results: std::sync::Mutex<Vec<Item>>,
    in_flight: AtomicUsize,
    notify: Notify,
}

impl CrawlState {
    fn new() -> Self {
        Self {
            queue: std::sync::Mutex::new(VecDeque::new()),
            visited: std::sync::Mutex::new(HashSet::new()),
            seen: std::sync::Mutex::new(HashSet::new()),
            results: std::sync::Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    fn push(&self, url: String, depth: u32) {
        self.queue
            .lock()
            .expect("crawl queue lock poisoned")
            .push_back((url, depth));
        self.notify.notify_waiters();
    }

    fn pop(&self) -> Option<(String, u32)> {
        self.queue
            .lock()
            .expect("crawl queue lock poisoned")
            .pop_front()
    }

    /// First visit wins; later attempts see `false`.
    fn mark_visited(&self, url: &str) -> bool {
        self.visited
            .lock()
            .expect("visited lock poisoned")
            .insert(url.to_string())
    }

    fn mark_seen(&self, url: &str) -> bool {
        self.seen
            .lock()
            .expect("seen lock poisoned")
            .insert(url.to_string())
    }
}

impl WebCrawlerSource {
    /// Build the source from its configuration.
    pub fn new(config: WebCrawlerConfig) -> Self {
        Self {
            config,
            user_metadata: Map::new(),
        }
    }

    /// Attach caller-supplied business metadata, merged into every produced item.
    pub fn with_user_metadata(mut self, user_metadata: Map<String, Value>) -> Self {
        self.user_metadata = user_metadata;
        self
    }

    async fn crawl(&self, ctx: &RunContext) -> Result<Vec<Item>, SourceError> {
        let start = Url::parse(self.config.start_url.trim())
            .map_err(|err| SourceError::InvalidInput(format!("invalid start_url: {err}")))?;
        let scope = Arc::new(CrawlScope::from_start_url(
            &start,
            self.config.allow_subdomains,
            self.config.restrict_to_path,
        ));

        let client = Client::builder()
            .user_agent("ingestd-crawler/0.3")
            .build()
            .map_err(SourceError::Http)?;

        let robots = if self.config.respect_robots {
            let origin = format!(
                "{}://{}",
                start.scheme(),
                start.host_str().unwrap_or_default()
            );
            let origin = match start.port() {
                Some(port) => format!("{origin}:{port}"),
                None => origin,
            };
            RobotsTxt::fetch(&client, &origin).await.map(Arc::new)
        } else {
            None
        };

        let state = Arc::new(CrawlState::new());
        let start_normalized = normalize_url(&start);
        state.mark_seen(&start_normalized);
        state.push(start_normalized, 0);

        let concurrency = self.config.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let settings = Arc::new(CrawlSettings {
            max_depth: self.config.max_depth,
            allowed_extensions: self
                .config
                .allowed_extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
            user_metadata: self.user_metadata.clone(),
        });

        tracing::info!(
            run_id = %ctx.run_id,
            start_url = %self.config.start_url,
            max_depth = self.config.max_depth,
            concurrency,
            "Crawl starting"
        );

        let mut workers = JoinSet::new();
        for _ in 0..concurrency {
            let state = state.clone();
            let client = client.clone();
            let scope = scope.clone();
            let robots = robots.clone();
            let semaphore = semaphore.clone();
            let settings = settings.clone();
            workers.spawn(async move {
                crawl_worker(state, client, scope, robots, semaphore, settings).await;
            });
        }
        while workers.join_next().await.is_some() {}

        let items = std::mem::take(
            &mut *state.results.lock().expect("results lock poisoned"),
        );
        tracing::info!(run_id = %ctx.run_id, items = items.len(), "Crawl finished");
        Ok(items)
    }
}

struct CrawlSettings {
    max_depth: u32,
    allowed_extensions: Vec<String>,
    user_metadata: Map<String, Value>,
}

async fn crawl_worker(
    state: Arc<CrawlState>,
    client: Client,
    scope: Arc<CrawlScope>,
    robots: Option<Arc<RobotsTxt>>,
    semaphore: Arc<Semaphore>,
    settings: Arc<CrawlSettings>,
) {
    loop {
        let Some((url, depth)) = state.pop() else {
            if state.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            // Another worker may still enqueue; wait briefly for a wakeup.
            let _ = tokio::time::timeout(Duration::from_millis(50), state.notify.notified()).await;
            continue;
        };

        state.in_flight.fetch_add(1, Ordering::SeqCst);
        if state.mark_visited(&url) {
            if let Err(err) = visit_url(&state, &client, &scope, robots.as_deref(), &semaphore, &settings, &url, depth).await
            {
                tracing::warn!(url = %url, error = %err, "Fetch failed");
            }
        }
        state.in_flight.fetch_sub(1, Ordering::SeqCst);
        state.notify.notify_waiters();
    }
}

#[allow(clippy::too_many_arguments)]
async fn visit_url(
    state: &CrawlState,
    client: &Client,
    scope: &CrawlScope,
    robots: Option<&RobotsTxt>,
    semaphore: &Semaphore,
    settings: &CrawlSettings,
    url: &str,
    depth: u32,
) -> Result<(), SourceError> {
    let Ok(parsed) = Url::parse(url) else {
        return Ok(());
    };
    if let Some(robots) = robots {
        if !robots.allows(parsed.path()) {
            tracing::debug!(url, "Disallowed by robots.txt");
            return Ok(());
        }
    }
    if is_ad_link(url) {
        tracing::debug!(url, "Skipping ad/tracker link");
        return Ok(());
    }
    if !scope.admits(&parsed) {
        tracing::debug!(url, "Out of crawl scope");
        return Ok(());
    }

    let _permit = semaphore.acquire().await.expect("fetch semaphore closed");
    tracing::info!(url, depth, "Fetching");
    let response = client.get(url).timeout(FETCH_TIMEOUT).send().await?;
    if response.status() != reqwest::StatusCode::OK {
        tracing::debug!(url, status = %response.status(), "Skipping non-200 response");
        return Ok(());
    }
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_lowercase();
    let body = response.bytes().await?;

    let file_name = parsed
        .path_segments()
        .and_then(|segments| segments.last().map(str::to_string))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "index.html".to_string());
    let extension = match file_name.rfind('.') {
        Some(index) => file_name[index..].to_lowercase(),
        None => String::new(),
    };

    if content_type.contains("text/html") || COMMON_PAGE_EXTENSIONS.contains(&extension.as_str())
    {
        let markup = String::from_utf8_lossy(&body);
        let text = html::extract_article_text(&markup);
        let score = content_score(&text, &body);

        state
            .results
            .lock()
            .expect("results lock poisoned")
            .push(Item {
                file_name,
                binary: Some(body.to_vec()),
                raw_text: Some(text),
                source_path: Some(url.to_string()),
                source_type: Some(SourceType::Web),
                score: Some(score),
                user_metadata: settings.user_metadata.clone(),
                ..Item::default()
            });

        if depth < settings.max_depth {
            for href in html::extract_links(&markup) {
                let Ok(absolute) = parsed.join(&href) else {
                    continue;
                };
                if !matches!(absolute.scheme(), "http" | "https") {
                    continue;
                }
                let normalized = normalize_url(&absolute);
                if is_ad_link(&normalized) || !scope.admits(&absolute) {
                    continue;
                }
                if state.mark_seen(&normalized) {
                    state.push(normalized, depth + 1);
                }
            }
        }
    } else if settings.allowed_extensions.contains(&extension)
        || content_type.contains("application/pdf")
        || content_type.contains("application/octet-stream")
    {
        state
            .results
            .lock()
            .expect("results lock poisoned")
            .push(Item {
                file_name,
                binary: Some(body.to_vec()),
                source_path: Some(url.to_string()),
                source_type: Some(SourceType::Web),
                score: Some(0.0),
                user_metadata: settings.user_metadata.clone(),
                ..Item::default()
            });
    } else {
        tracing::debug!(url, content_type = %content_type, "Skipping unhandled content type");
    }

    Ok(())
}

/// Text-to-page-size ratio, scaled and clamped to `[0, 1]`, rounded to 4 decimals.
fn content_score(text: &str, raw: &[u8]) -> f64 {
    let ratio = text.len() as f64 / raw.len().max(1) as f64;
    let score = (ratio * 10.0).min(1.0);
    (score * 10_000.0).round() / 10_000.0
}

#[async_trait]
impl Source for WebCrawlerSource {
    fn name(&self) -> &'static str {
        "web"
    }

    async fn read(&self, ctx: &RunContext) -> Result<SourceBatch, SourceError> {
        Ok(SourceBatch::Many(self.crawl(ctx).await?))
    }
}
