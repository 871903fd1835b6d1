//! Network hook
//!
//! Instruments both transports. Every call is registered as a pending
//! [`NetworkRequest`] before anything can suspend, then consults the mock
//! rules, and finally settles the record exactly once: from the synthetic
//! response, the real response, or the real failure.
//!
//! Per-instance XHR metadata lives in a side table keyed by [`XhrId`], so
//! concurrent instances never share scratch state. Each `send` is an
//! [`XhrAttempt`] with its own settle-once flag; reusing an instance cannot
//! strand an earlier attempt.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use smol::{LocalExecutor, Timer};
use url::Url;

use crate::body::{RequestBody, parse_body};
use crate::config::ConsoleConfig;
use crate::host::fetch::{FetchApi, FetchFuture, HeaderMap, RequestInfo, RequestInit, Response};
use crate::host::xhr::{XhrEvent, XhrId, XhrTransport, XmlHttpRequest};
use crate::host::{Clock, Host};
use crate::mock::MockRule;
use crate::store::{NetworkRequest, RequestStatus, RequestUpdate, Store, Transport};

fn next_request_id() -> String {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    format!("req-{:x}", NEXT.fetch_add(1, Ordering::Relaxed))
}

/// One registered `send` of an XHR instance
#[derive(Debug)]
struct XhrAttempt {
    request_id: String,
    start: f64,
    settled: Cell<bool>,
}

impl XhrAttempt {
    /// Claim the terminal update. Only the first caller wins.
    fn settle(&self) -> bool {
        !self.settled.replace(true)
    }
}

/// Metadata collected between `open` and `send`
#[derive(Debug, Clone)]
struct PendingXhr {
    request_id: String,
    method: String,
    url: String,
    headers: HeaderMap,
    /// Set once `send` has registered the request
    attempt: Option<Rc<XhrAttempt>>,
}

/// State shared by the installed wrappers
struct Capture {
    store: Rc<Store>,
    clock: Rc<dyn Clock>,
    executor: Rc<LocalExecutor<'static>>,
    origin: Option<String>,
    mock_delay_ms: u64,
    preview_len: usize,
    pending_xhr: RefCell<HashMap<XhrId, PendingXhr>>,
}

impl Capture {
    /// Record a new pending request and return its start time
    fn register(
        &self,
        id: &str,
        method: &str,
        url: &str,
        transport: Transport,
        request_headers: HeaderMap,
        request_body: Value,
    ) -> f64 {
        let (full_url, path, query_params) = describe_url(url, self.origin.as_deref());
        let start = self.clock.now_ms();

        let mut req = NetworkRequest::pending(id, method, transport, &full_url);
        req.path = path;
        req.query_params = query_params;
        req.request_headers = request_headers;
        req.request_body = request_body;
        req.start_time = start;

        tracing::trace!("{:?} {} {} registered as {}", transport, method, full_url, id);
        self.store.add_request(req);
        start
    }

    fn elapsed(&self, start: f64) -> f64 {
        (self.clock.now_ms() - start).max(0.0)
    }

    fn preview(&self, text: &str) -> String {
        text.chars().take(self.preview_len).collect()
    }

    /// JSON if the text parses, otherwise a truncated preview
    fn decode_text(&self, text: &str) -> Value {
        serde_json::from_str(text).unwrap_or_else(|_| Value::String(self.preview(text)))
    }

    fn settle_mock(&self, id: &str, rule: &MockRule, start: f64) {
        tracing::trace!("{} settled by mock {} with {}", id, rule.id, rule.status);
        self.store.update_request(id, RequestUpdate {
            status: Some(RequestStatus::Completed(rule.status)),
            duration_ms: Some(self.elapsed(start)),
            response_headers: Some(rule.recorded_headers()),
            response_body: Some(rule.recorded_body()),
        });
    }

    fn settle_error(&self, id: &str, start: f64, message: Option<String>) {
        tracing::trace!("{} failed", id);
        self.store.update_request(id, RequestUpdate {
            status: Some(RequestStatus::Error),
            duration_ms: Some(self.elapsed(start)),
            response_body: message.map(Value::String),
            ..Default::default()
        });
    }

    /// Record status and headers now; the body is captured from a copy
    /// once it has been read.
    fn record_response(self: &Rc<Self>, id: &str, start: f64, response: &Response) {
        let content_type = response.headers().get("content-type").unwrap_or("").to_string();
        match response.try_clone() {
            Ok(copy) => {
                let capture = self.clone();
                let id = id.to_string();
                self.executor.spawn(async move {
                    let Ok(text) = copy.text().await else {
                        return;
                    };
                    let body = if content_type.contains("json") {
                        capture.decode_text(&text)
                    } else {
                        Value::String(capture.preview(&text))
                    };
                    capture.store.update_request(&id, RequestUpdate {
                        response_body: Some(body),
                        ..Default::default()
                    });
                }).detach();
            }
            Err(e) => tracing::debug!("response body of {} not captured: {}", id, e),
        }

        tracing::trace!("{} completed with {}", id, response.status());
        self.store.update_request(id, RequestUpdate {
            status: Some(RequestStatus::Completed(response.status())),
            duration_ms: Some(self.elapsed(start)),
            response_headers: Some(response.headers().to_map()),
            ..Default::default()
        });
    }

    /// Drop the side-table entry of a settled attempt, unless the instance
    /// has been re-opened since.
    fn forget_xhr(&self, xhr: XhrId, attempt: &Rc<XhrAttempt>) {
        let mut pending = self.pending_xhr.borrow_mut();
        let current = pending.get(&xhr)
            .and_then(|meta| meta.attempt.as_ref())
            .is_some_and(|a| Rc::ptr_eq(a, attempt));
        if current {
            pending.remove(&xhr);
        }
    }

    /// Mirror the real completion of an XHR into the store.
    ///
    /// The listeners go ahead of the page's own, so the record is terminal
    /// by the time page code observes `load` or `error`.
    fn watch_xhr(self: &Rc<Self>, xhr: &XmlHttpRequest, attempt: &Rc<XhrAttempt>) {
        let capture = self.clone();
        let current = attempt.clone();
        xhr.prepend_event_listener(XhrEvent::Load, move |xhr| {
            if !current.settle() {
                return;
            }
            capture.forget_xhr(xhr.id(), &current);
            capture.store.update_request(&current.request_id, RequestUpdate {
                status: Some(RequestStatus::Completed(xhr.status())),
                duration_ms: Some(capture.elapsed(current.start)),
                response_headers: Some(parse_raw_headers(&xhr.get_all_response_headers())),
                response_body: Some(capture.decode_text(&xhr.response_text())),
            });
        });

        let capture = self.clone();
        let current = attempt.clone();
        xhr.prepend_event_listener(XhrEvent::Error, move |xhr| {
            if current.settle() {
                capture.forget_xhr(xhr.id(), &current);
                capture.settle_error(&current.request_id, current.start, None);
            }
        });
    }

    /// Settle a mocked XHR from a timer; the real `send` never runs
    fn schedule_mock_xhr(self: &Rc<Self>, xhr: Rc<XmlHttpRequest>, attempt: Rc<XhrAttempt>, rule: MockRule) {
        let capture = self.clone();
        let delay = rule.delay_ms.unwrap_or(self.mock_delay_ms);
        self.executor.spawn(async move {
            Timer::after(Duration::from_millis(delay)).await;
            if !attempt.settle() {
                return;
            }
            capture.forget_xhr(xhr.id(), &attempt);
            capture.settle_mock(&attempt.request_id, &rule, attempt.start);

            let response = rule.to_response();
            let headers: Vec<(&str, &str)> = response.headers().iter().collect();
            xhr.respond(rule.status, response.status_text(), &headers, &rule.response_body);
        }).detach();
    }
}

/// Absolutize against the page origin and split into `(full, path, query)`.
///
/// Unparseable input falls back to `http://unknown/<input>`.
fn describe_url(raw: &str, origin: Option<&str>) -> (String, String, HashMap<String, String>) {
    let full_url = match origin {
        Some(origin) if !raw.starts_with("http") => format!("{}{}", origin, raw),
        _ => raw.to_string(),
    };
    let parsed = Url::parse(&full_url)
        .or_else(|_| Url::parse(&format!("http://unknown/{}", full_url)));
    match parsed {
        Ok(url) => {
            let params = url.query_pairs().into_owned().collect();
            (full_url, url.path().to_string(), params)
        }
        Err(_) => (full_url.clone(), full_url, HashMap::new()),
    }
}

/// Parse a raw `getAllResponseHeaders()` block. Values may contain `": "`.
pub fn parse_raw_headers(raw: &str) -> HeaderMap {
    raw.trim()
        .split(['\r', '\n'])
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let mut parts = line.split(": ");
            let name = parts.next()?;
            let rest: Vec<&str> = parts.collect();
            if rest.is_empty() {
                return None;
            }
            Some((name.to_string(), rest.join(": ")))
        })
        .collect()
}

/// Instrumented promise-based transport
struct InterceptedFetch {
    inner: Rc<dyn FetchApi>,
    capture: Rc<Capture>,
}

impl FetchApi for InterceptedFetch {
    fn fetch(&self, input: RequestInfo, init: RequestInit) -> FetchFuture {
        let capture = self.capture.clone();
        let (url, method) = input.target(&init);

        let headers = match (&init.headers, &input) {
            (Some(headers), _) => headers.to_map(),
            (None, RequestInfo::Request(req)) => req.headers.to_map(),
            (None, RequestInfo::Url(_)) => HeaderMap::new(),
        };
        let body: Option<&RequestBody> = match (&init.body, &input) {
            (Some(body), _) => Some(body),
            (None, RequestInfo::Request(req)) => req.body.as_ref(),
            (None, RequestInfo::Url(_)) => None,
        };
        let request_body = parse_body(body);

        let id = next_request_id();
        let start = capture.register(&id, &method, &url, Transport::Fetch, headers, request_body);

        if let Some(rule) = capture.store.find_mock(&method, &url) {
            tracing::debug!("fetch {} {} mocked by rule {}", method, url, rule.id);
            return Box::pin(async move {
                if let Some(delay) = rule.delay_ms.filter(|d| *d > 0) {
                    Timer::after(Duration::from_millis(delay)).await;
                }
                capture.settle_mock(&id, &rule, start);
                Ok(rule.to_response())
            });
        }

        let pending = self.inner.fetch(input, init);
        Box::pin(async move {
            match pending.await {
                Ok(response) => {
                    capture.record_response(&id, start, &response);
                    Ok(response)
                }
                Err(err) => {
                    capture.settle_error(&id, start, Some(err.to_string()));
                    Err(err)
                }
            }
        })
    }
}

/// Instrumented event-based transport
struct InterceptedXhr {
    inner: Rc<dyn XhrTransport>,
    capture: Rc<Capture>,
}

impl XhrTransport for InterceptedXhr {
    fn open(&self, xhr: &Rc<XmlHttpRequest>, method: &str, url: &str) {
        let previous = self.capture.pending_xhr.borrow_mut().insert(xhr.id(), PendingXhr {
            request_id: next_request_id(),
            method: method.to_string(),
            url: url.to_string(),
            headers: HeaderMap::new(),
            attempt: None,
        });
        // Re-opening aborts an attempt that is still in flight
        if let Some(attempt) = previous.and_then(|meta| meta.attempt) {
            if attempt.settle() {
                let reason = format!("aborted by open({}, {})", method, url);
                self.capture.settle_error(&attempt.request_id, attempt.start, Some(reason));
            }
        }
        self.inner.open(xhr, method, url);
    }

    fn set_request_header(&self, xhr: &Rc<XmlHttpRequest>, name: &str, value: &str) {
        if let Some(meta) = self.capture.pending_xhr.borrow_mut().get_mut(&xhr.id()) {
            meta.headers
                .entry(name.to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
        self.inner.set_request_header(xhr, name, value);
    }

    fn send(&self, xhr: &Rc<XmlHttpRequest>, body: Option<RequestBody>) {
        let meta = self.capture.pending_xhr.borrow().get(&xhr.id()).cloned();
        // Opened before the hook was installed, or already sent since `open`
        let Some(meta) = meta.filter(|meta| meta.attempt.is_none()) else {
            self.inner.send(xhr, body);
            return;
        };

        let start = self.capture.register(
            &meta.request_id,
            &meta.method,
            &meta.url,
            Transport::Xhr,
            meta.headers.clone(),
            parse_body(body.as_ref()),
        );
        let attempt = Rc::new(XhrAttempt {
            request_id: meta.request_id.clone(),
            start,
            settled: Cell::new(false),
        });
        if let Some(entry) = self.capture.pending_xhr.borrow_mut().get_mut(&xhr.id()) {
            if entry.request_id == meta.request_id {
                entry.attempt = Some(attempt.clone());
            }
        }

        if let Some(rule) = self.capture.store.find_mock(&meta.method, &meta.url) {
            tracing::debug!("xhr {} {} mocked by rule {}", meta.method, meta.url, rule.id);
            self.capture.schedule_mock_xhr(xhr.clone(), attempt, rule);
            return;
        }

        self.capture.watch_xhr(xhr, &attempt);
        self.inner.send(xhr, body);
    }
}

/// Network interceptor
pub struct NetworkHook {
    host: Rc<Host>,
    capture: Rc<Capture>,
    saved: RefCell<Option<(Rc<dyn FetchApi>, Rc<dyn XhrTransport>)>>,
}

impl NetworkHook {
    pub fn new(host: Rc<Host>, store: Rc<Store>, config: &ConsoleConfig) -> Self {
        let capture = Rc::new(Capture {
            store,
            clock: host.clock(),
            executor: host.executor(),
            origin: host.origin().map(str::to_string),
            mock_delay_ms: config.mock_delay_ms,
            preview_len: config.preview_len,
            pending_xhr: RefCell::new(HashMap::new()),
        });
        Self { host, capture, saved: RefCell::new(None) }
    }

    pub fn is_enabled(&self) -> bool {
        self.saved.borrow().is_some()
    }

    /// Wrap both transports. Calling twice is a no-op.
    pub fn enable(&self) {
        if self.is_enabled() {
            return;
        }
        let fetch = self.host.fetch_api();
        let xhr = self.host.xhr_transport();

        self.host.set_fetch_api(Rc::new(InterceptedFetch {
            inner: fetch.clone(),
            capture: self.capture.clone(),
        }));
        self.host.set_xhr_transport(Rc::new(InterceptedXhr {
            inner: xhr.clone(),
            capture: self.capture.clone(),
        }));
        *self.saved.borrow_mut() = Some((fetch, xhr));
        tracing::debug!("network hook enabled");
    }

    /// Reinstall the transports saved by `enable()`
    pub fn disable(&self) {
        let Some((fetch, xhr)) = self.saved.borrow_mut().take() else {
            return;
        };
        self.host.set_fetch_api(fetch);
        self.host.set_xhr_transport(xhr);
        tracing::debug!("network hook disabled");
    }
}
