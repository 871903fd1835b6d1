//! Fetch API
//!
//! The promise-based transport as the page sees it: request shapes, the
//! header object, the response, and the replaceable `FetchApi` entry point.

use std::cell::RefCell;
use std::collections::HashMap;

use smol::future::BoxedLocal;

use crate::body::RequestBody;

/// Canonical header mapping used throughout capture
pub type HeaderMap = HashMap<String, String>;

/// Header object (`Headers`). Names are stored lower-cased.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, combining with an existing header of the same name
    pub fn append(&mut self, name: &str, value: &str) {
        let name = name.to_lowercase();
        if let Some((_, existing)) = self.entries.iter_mut().find(|(k, _)| *k == name) {
            existing.push_str(", ");
            existing.push_str(value);
        } else {
            self.entries.push((name, value.to_string()));
        }
    }

    /// Replace a header value
    pub fn set(&mut self, name: &str, value: &str) {
        let name = name.to_lowercase();
        self.entries.retain(|(k, _)| *k != name);
        self.entries.push((name, value.to_string()));
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.set(name, value);
        self
    }

    /// Case-insensitive lookup
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.entries.iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_map(&self) -> HeaderMap {
        self.entries.iter().cloned().collect()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.append(k.as_ref(), v.as_ref());
        }
        headers
    }
}

/// The three header shapes `fetch()` accepts
#[derive(Debug, Clone, PartialEq)]
pub enum HeadersInit {
    /// A `Headers` object
    Headers(Headers),
    /// `[["name", "value"], ...]`; entries shorter than two are skipped
    Pairs(Vec<Vec<String>>),
    /// A plain record
    Map(HeaderMap),
}

impl HeadersInit {
    /// Resolve into the canonical mapping
    pub fn to_map(&self) -> HeaderMap {
        match self {
            Self::Headers(headers) => headers.to_map(),
            Self::Pairs(pairs) => pairs.iter()
                .filter(|pair| pair.len() >= 2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect(),
            Self::Map(map) => map.clone(),
        }
    }
}

/// Structured request object (`Request`)
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub url: String,
    pub method: String,
    pub headers: Headers,
    pub body: Option<RequestBody>,
}

impl Request {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            url: url.to_string(),
            method: method.to_uppercase(),
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.append(key, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// First argument of `fetch()`
#[derive(Debug, Clone, PartialEq)]
pub enum RequestInfo {
    Url(String),
    Request(Request),
}

impl From<&str> for RequestInfo {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

impl From<String> for RequestInfo {
    fn from(url: String) -> Self {
        Self::Url(url)
    }
}

impl From<Request> for RequestInfo {
    fn from(req: Request) -> Self {
        Self::Request(req)
    }
}

impl RequestInfo {
    /// Normalized `(url, method)` target of the call
    pub fn target(&self, init: &RequestInit) -> (String, String) {
        match self {
            Self::Request(req) => (req.url.clone(), req.method.clone()),
            Self::Url(url) => {
                let method = init.method.clone().unwrap_or_else(|| "GET".to_string());
                (url.clone(), method)
            }
        }
    }
}

/// Second argument of `fetch()`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInit {
    pub method: Option<String>,
    pub headers: Option<HeadersInit>,
    pub body: Option<RequestBody>,
}

impl RequestInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }

    pub fn headers(mut self, headers: HeadersInit) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Fetch errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Body has already been consumed")]
    BodyUsed,

    #[error("Decode error: {0}")]
    Decode(String),
}

/// Fetch response. The body can be consumed once; `try_clone` tees it.
#[derive(Debug)]
pub struct Response {
    status: u16,
    status_text: String,
    headers: Headers,
    body: RefCell<Option<Vec<u8>>>,
}

impl Response {
    pub fn new(status: u16, headers: Headers, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: canonical_reason(status).to_string(),
            headers,
            body: RefCell::new(Some(body.into())),
        }
    }

    /// HTTP status code
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Check if response is OK (2xx)
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body_used(&self) -> bool {
        self.body.borrow().is_none()
    }

    /// Duplicate the response, leaving this one fully consumable
    pub fn try_clone(&self) -> Result<Response, FetchError> {
        let body = self.body.borrow().clone().ok_or(FetchError::BodyUsed)?;
        Ok(Self {
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: RefCell::new(Some(body)),
        })
    }

    /// Consume the body as bytes
    pub async fn bytes(&self) -> Result<Vec<u8>, FetchError> {
        self.body.borrow_mut().take().ok_or(FetchError::BodyUsed)
    }

    /// Consume the body as text
    pub async fn text(&self) -> Result<String, FetchError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Consume the body as JSON
    pub async fn json(&self) -> Result<serde_json::Value, FetchError> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

fn canonical_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}

/// Pending fetch result
pub type FetchFuture = BoxedLocal<Result<Response, FetchError>>;

/// The promise-based transport entry point
pub trait FetchApi {
    fn fetch(&self, input: RequestInfo, init: RequestInit) -> FetchFuture;
}

impl<F> FetchApi for F
where
    F: Fn(RequestInfo, RequestInit) -> FetchFuture,
{
    fn fetch(&self, input: RequestInfo, init: RequestInit) -> FetchFuture {
        self(input, init)
    }
}

/// Transport used when the embedder supplies none: every request fails.
#[derive(Debug, Default)]
pub struct OfflineFetch;

impl FetchApi for OfflineFetch {
    fn fetch(&self, input: RequestInfo, init: RequestInit) -> FetchFuture {
        let (url, _) = input.target(&init);
        Box::pin(async move { Err(FetchError::Network(format!("offline: {}", url))) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive() {
        let headers = Headers::new().with("Content-Type", "application/json");
        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn test_headers_init_shapes() {
        let object = HeadersInit::Headers(Headers::new().with("X-A", "1"));
        assert_eq!(object.to_map().get("x-a").map(String::as_str), Some("1"));

        let pairs = HeadersInit::Pairs(vec![
            vec!["X-B".into(), "2".into()],
            vec!["broken".into()],
        ]);
        let map = pairs.to_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map["X-B"], "2");

        let record = HeadersInit::Map(HeaderMap::from([("X-C".to_string(), "3".to_string())]));
        assert_eq!(record.to_map()["X-C"], "3");
    }

    #[test]
    fn test_target_normalization() {
        let init = RequestInit::new().method("POST");
        assert_eq!(
            RequestInfo::from("/a").target(&init),
            ("/a".to_string(), "POST".to_string())
        );
        assert_eq!(
            RequestInfo::from("/a").target(&RequestInit::new()),
            ("/a".to_string(), "GET".to_string())
        );

        let req = Request::new("delete", "/b");
        assert_eq!(
            RequestInfo::from(req).target(&init),
            ("/b".to_string(), "DELETE".to_string())
        );
    }

    #[test]
    fn test_response_clone_keeps_original() {
        let res = Response::new(200, Headers::new(), "hello");
        let copy = res.try_clone().unwrap();

        smol::block_on(async {
            assert_eq!(copy.text().await.unwrap(), "hello");
            assert_eq!(res.text().await.unwrap(), "hello");
            assert_eq!(res.text().await, Err(FetchError::BodyUsed));
        });
        assert!(res.try_clone().is_err());
    }
}
