//! HTTP fetch seam shared by the prefetch controller and the cache worker.
//!
//! Both components issue requests through the [`Fetcher`] trait so the cache
//! policies and the prefetch queue can be exercised without a live network.
//! Production uses [`HttpFetcher`], a reqwest client that resolves relative
//! URLs against the upstream game server.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// What kind of resource a request targets, mirroring the browser's
/// `Request.destination`. Drives static-asset classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Top-level page markup.
    Document,
    /// Stylesheet.
    Style,
    /// Script.
    Script,
    /// Image.
    Image,
    /// Programmatic fetch (XHR/fetch, empty destination in the browser).
    Empty,
}

impl Destination {
    /// Parse a `Sec-Fetch-Dest` header value.
    pub fn from_sec_fetch_dest(value: &str) -> Option<Destination> {
        match value {
            "document" => Some(Destination::Document),
            "style" => Some(Destination::Style),
            "script" => Some(Destination::Script),
            "image" => Some(Destination::Image),
            "empty" => Some(Destination::Empty),
            _ => None,
        }
    }

    /// Best-effort inference from a path when no destination header is
    /// available (e.g. precache fetches).
    pub fn infer_from_path(path: &str) -> Destination {
        let ext = path.rsplit('/').next().and_then(|f| f.rsplit_once('.')).map(|(_, e)| e);
        match ext {
            Some("css") => Destination::Style,
            Some("js") | Some("mjs") => Destination::Script,
            Some("png") | Some("jpg") | Some("jpeg") | Some("gif") | Some("webp")
            | Some("svg") | Some("ico") => Destination::Image,
            Some("html") | Some("htm") => Destination::Document,
            _ if path.ends_with('/') => Destination::Document,
            _ => Destination::Empty,
        }
    }
}

/// A request as seen by the cache worker: GET-only, URL plus the headers and
/// destination needed for classification and upstream forwarding.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Absolute URL or a path relative to the upstream base.
    pub url: String,

    /// Resource kind for classification.
    pub destination: Destination,

    /// Headers forwarded upstream.
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    /// A plain GET with the destination inferred from the path.
    pub fn get(url: impl Into<String>) -> Self {
        let url = url.into();
        let destination = Destination::infer_from_path(path_of(&url));
        Self {
            url,
            destination,
            headers: Vec::new(),
        }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// The path component of the URL, without query or fragment.
    pub fn path(&self) -> &str {
        path_of(&self.url)
    }
}

fn path_of(url: &str) -> &str {
    let rest = match url.find("://") {
        Some(i) => {
            let after = &url[i + 3..];
            match after.find('/') {
                Some(j) => &after[j..],
                None => "/",
            }
        }
        None => url,
    };
    match rest.find(['?', '#']) {
        Some(k) => &rest[..k],
        None => rest,
    }
}

/// A response flowing back through the worker. Bodies are owned bytes so a
/// response can be both cached and returned without a second fetch.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl FetchResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// The fetch seam. One implementation talks to the real upstream; tests
/// script their own.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// reqwest-backed fetcher resolving relative URLs against the upstream base.
pub struct HttpFetcher {
    client: reqwest::Client,
    base: Url,
}

impl HttpFetcher {
    pub fn new(upstream: &str, timeout: Duration) -> Result<Self, FetchError> {
        let base =
            Url::parse(upstream).map_err(|e| FetchError::InvalidUrl(format!("{upstream}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client, base })
    }

    fn resolve(&self, url: &str) -> Result<Url, FetchError> {
        let parsed = if url.starts_with("http://") || url.starts_with("https://") {
            Url::parse(url)
        } else {
            self.base.join(url)
        };
        parsed.map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = self.resolve(&request.url)?;
        let mut req = self.client.get(url);
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.to_string(), v.to_string()))
            })
            .collect();
        let body = resp.bytes().await?;

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}
