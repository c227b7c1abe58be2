//! HTTP access to the upstream directory-listing site.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context as _;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{
    ACCEPT, CONTENT_TYPE, ETAG, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
    USER_AGENT,
};
use url::Url;

use crate::config::HttpConfig;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("build url for slug {slug:?}: {source}")]
    Url {
        slug: String,
        #[source]
        source: url::ParseError,
    },
    #[error("GET {url}: {source}")]
    Transport {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("GET {url}: unexpected status {status}")]
    Status { url: Url, status: StatusCode },
}

impl UpstreamError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

/// A fetched upstream page.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Url,
    pub content_type: Option<String>,
    pub last_modified: Option<String>,
    pub body: Bytes,
}

impl Page {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The parsed `Last-Modified` header, if present and well formed.
    pub fn last_modified_time(&self) -> Option<DateTime<Utc>> {
        let value = self.last_modified.as_deref()?;
        match DateTime::parse_from_rfc2822(value) {
            Ok(time) => Some(time.with_timezone(&Utc)),
            Err(err) => {
                tracing::warn!(url = %self.url, value, %err, "unparseable Last-Modified header");
                None
            }
        }
    }
}

pub struct Upstream {
    base: Url,
    client: reqwest::Client,
    user_agent: String,
    cache: Mutex<PageCache>,
}

impl Upstream {
    pub fn new(base: &Url, config: &HttpConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(config.max_idle_connections)
            .pool_idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build upstream http client")?;

        Ok(Self {
            base: with_trailing_slash(base),
            client,
            user_agent: config.user_agent.clone(),
            cache: Mutex::new(PageCache::new(config.cache_max_bytes)),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Fetches the page at `slug`, relative to the base URL.
    pub async fn fetch_slug(&self, slug: &str) -> Result<Page, UpstreamError> {
        let url = self.base.join(slug).map_err(|source| UpstreamError::Url {
            slug: slug.to_owned(),
            source,
        })?;
        self.fetch(&url).await
    }

    /// Fetches `url`, revalidating a cached copy with `If-None-Match` and
    /// `If-Modified-Since` when one exists.
    pub async fn fetch(&self, url: &Url) -> Result<Page, UpstreamError> {
        let cached = self.cache().get(url.as_str());

        let mut request = self
            .client
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8");
        if let Some(cached) = &cached {
            if let Some(etag) = &cached.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &cached.page.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|source| UpstreamError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            if let Some(cached) = cached {
                tracing::debug!(%url, "upstream page not modified");
                return Ok(cached.page);
            }
        }
        if !status.is_success() {
            return Err(UpstreamError::Status {
                url: url.clone(),
                status,
            });
        }

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        };
        let etag = header(ETAG);
        let content_type = header(CONTENT_TYPE);
        let last_modified = header(LAST_MODIFIED);
        let final_url = response.url().clone();

        let body = response
            .bytes()
            .await
            .map_err(|source| UpstreamError::Transport {
                url: url.clone(),
                source,
            })?;

        let page = Page {
            url: final_url,
            content_type,
            last_modified,
            body,
        };
        if etag.is_some() || page.last_modified.is_some() {
            self.cache().insert(
                url.as_str().to_owned(),
                CachedPage {
                    etag,
                    page: page.clone(),
                },
            );
        }
        tracing::debug!(%url, bytes = page.body.len(), "fetched upstream page");
        Ok(page)
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, PageCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn with_trailing_slash(url: &Url) -> Url {
    let mut out = url.clone();
    if !out.path().ends_with('/') {
        let path = format!("{}/", out.path());
        out.set_path(&path);
    }
    out
}

#[derive(Debug, Clone)]
struct CachedPage {
    etag: Option<String>,
    page: Page,
}

/// Least-recently-used page cache bounded by total body size.
///
/// Every insert or hit stamps the page with a fresh sequence number; `order`
/// maps stamps back to keys, so its first entry is the least recently used.
#[derive(Debug)]
struct PageCache {
    max_bytes: usize,
    used_bytes: usize,
    clock: u64,
    pages: HashMap<String, (u64, CachedPage)>,
    order: BTreeMap<u64, String>,
}

impl PageCache {
    fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            used_bytes: 0,
            clock: 0,
            pages: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn get(&mut self, key: &str) -> Option<CachedPage> {
        let stamp = self.tick();
        let (old, page) = self.pages.get_mut(key)?;
        let previous = std::mem::replace(old, stamp);
        let page = page.clone();
        if let Some(key) = self.order.remove(&previous) {
            self.order.insert(stamp, key);
        }
        Some(page)
    }

    fn insert(&mut self, key: String, page: CachedPage) {
        let size = page.page.body.len();
        if size > self.max_bytes {
            return;
        }
        self.remove(&key);
        while self.used_bytes + size > self.max_bytes {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            if let Some((_, evicted)) = self.pages.remove(&oldest) {
                self.used_bytes -= evicted.page.body.len();
            }
        }
        let stamp = self.tick();
        self.used_bytes += size;
        self.order.insert(stamp, key.clone());
        self.pages.insert(key, (stamp, page));
    }

    fn remove(&mut self, key: &str) {
        if let Some((stamp, old)) = self.pages.remove(key) {
            self.used_bytes -= old.page.body.len();
            self.order.remove(&stamp);
        }
    }
}
