//! XMLHttpRequest (Legacy API)
//!
//! The event-based transport. Each instance carries a unique [`XhrId`]
//! stamped at construction; the prototype methods (`open`,
//! `setRequestHeader`, `send`) dispatch through the host's replaceable
//! [`XhrTransport`] slot so they can be wrapped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use smol::LocalExecutor;

use super::Host;
use super::fetch::{FetchApi, Headers, Request, RequestInfo, RequestInit};
use crate::body::RequestBody;

/// XMLHttpRequest ready states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ReadyState {
    /// Client has been created, open() not called yet
    #[default]
    Unsent = 0,
    /// open() has been called
    Opened = 1,
    /// Operation complete
    Done = 4,
}

/// Identity of an XHR instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XhrId(u64);

impl XhrId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Events an XHR dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XhrEvent {
    Load,
    Error,
}

type Listener = Rc<dyn Fn(&XmlHttpRequest)>;

#[derive(Debug, Default)]
struct XhrState {
    ready_state: ReadyState,
    status: u16,
    status_text: String,
    response_text: String,
    response_headers: Vec<(String, String)>,
    method: String,
    url: String,
    request_headers: HashMap<String, String>,
}

/// XMLHttpRequest object
pub struct XmlHttpRequest {
    id: XhrId,
    host: Rc<Host>,
    state: RefCell<XhrState>,
    listeners: RefCell<Vec<(XhrEvent, Listener)>>,
}

impl std::fmt::Debug for XmlHttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlHttpRequest")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl XmlHttpRequest {
    /// Create a new XMLHttpRequest bound to a host
    pub fn new(host: &Rc<Host>) -> Rc<Self> {
        Rc::new(Self {
            id: XhrId::next(),
            host: host.clone(),
            state: RefCell::new(XhrState::default()),
            listeners: RefCell::new(Vec::new()),
        })
    }

    pub fn id(&self) -> XhrId {
        self.id
    }

    /// `xhr.open(method, url)`
    pub fn open(self: &Rc<Self>, method: &str, url: &str) {
        self.host.xhr_transport().open(self, method, url);
    }

    /// `xhr.setRequestHeader(name, value)`
    pub fn set_request_header(self: &Rc<Self>, name: &str, value: &str) {
        self.host.xhr_transport().set_request_header(self, name, value);
    }

    /// `xhr.send(body)`
    pub fn send(self: &Rc<Self>, body: Option<RequestBody>) {
        self.host.xhr_transport().send(self, body);
    }

    pub fn add_event_listener(&self, event: XhrEvent, listener: impl Fn(&XmlHttpRequest) + 'static) {
        self.listeners.borrow_mut().push((event, Rc::new(listener)));
    }

    /// Register a listener that runs ahead of every listener added so far
    pub fn prepend_event_listener(&self, event: XhrEvent, listener: impl Fn(&XmlHttpRequest) + 'static) {
        self.listeners.borrow_mut().insert(0, (event, Rc::new(listener)));
    }

    /// Fire every listener registered for `event`
    pub fn dispatch(&self, event: XhrEvent) {
        let listeners: Vec<Listener> = self.listeners.borrow()
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(self);
        }
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state.borrow().ready_state
    }

    pub fn status(&self) -> u16 {
        self.state.borrow().status
    }

    pub fn status_text(&self) -> String {
        self.state.borrow().status_text.clone()
    }

    pub fn response_text(&self) -> String {
        self.state.borrow().response_text.clone()
    }

    pub fn method(&self) -> String {
        self.state.borrow().method.clone()
    }

    pub fn url(&self) -> String {
        self.state.borrow().url.clone()
    }

    pub fn request_headers(&self) -> HashMap<String, String> {
        self.state.borrow().request_headers.clone()
    }

    /// Get response header (case-insensitive)
    pub fn get_response_header(&self, name: &str) -> Option<String> {
        self.state.borrow().response_headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    /// Get all response headers as string
    pub fn get_all_response_headers(&self) -> String {
        let mut result = String::new();
        for (name, value) in &self.state.borrow().response_headers {
            result.push_str(name);
            result.push_str(": ");
            result.push_str(value);
            result.push_str("\r\n");
        }
        result
    }

    /// Native `open` behavior
    pub fn record_open(&self, method: &str, url: &str) {
        let mut state = self.state.borrow_mut();
        state.method = method.to_uppercase();
        state.url = url.to_string();
        state.ready_state = ReadyState::Opened;
        state.request_headers.clear();
    }

    /// Native `setRequestHeader` behavior: repeated names are combined
    pub fn record_header(&self, name: &str, value: &str) {
        let mut state = self.state.borrow_mut();
        if let Some(existing) = state.request_headers.get_mut(name) {
            existing.push_str(", ");
            existing.push_str(value);
        } else {
            state.request_headers.insert(name.to_string(), value.to_string());
        }
    }

    /// Settle the request with a response and fire `load`
    pub fn respond(&self, status: u16, status_text: &str, headers: &[(&str, &str)], body: &str) {
        {
            let mut state = self.state.borrow_mut();
            state.ready_state = ReadyState::Done;
            state.status = status;
            state.status_text = status_text.to_string();
            state.response_headers = headers.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            state.response_text = body.to_string();
        }
        self.dispatch(XhrEvent::Load);
    }

    /// Settle the request as a network failure and fire `error`
    pub fn fail(&self) {
        {
            let mut state = self.state.borrow_mut();
            state.ready_state = ReadyState::Done;
            state.status = 0;
            state.status_text.clear();
            state.response_text.clear();
            state.response_headers.clear();
        }
        self.dispatch(XhrEvent::Error);
    }
}

/// The prototype methods of the event-based transport
pub trait XhrTransport {
    fn open(&self, xhr: &Rc<XmlHttpRequest>, method: &str, url: &str);
    fn set_request_header(&self, xhr: &Rc<XmlHttpRequest>, name: &str, value: &str);
    fn send(&self, xhr: &Rc<XmlHttpRequest>, body: Option<RequestBody>);
}

/// Default transport: performs the request over a fetch transport and
/// settles the instance from a spawned task.
pub struct NativeXhr {
    fetch: Rc<dyn FetchApi>,
    executor: Rc<LocalExecutor<'static>>,
}

impl NativeXhr {
    pub fn new(fetch: Rc<dyn FetchApi>, executor: Rc<LocalExecutor<'static>>) -> Self {
        Self { fetch, executor }
    }
}

impl XhrTransport for NativeXhr {
    fn open(&self, xhr: &Rc<XmlHttpRequest>, method: &str, url: &str) {
        xhr.record_open(method, url);
    }

    fn set_request_header(&self, xhr: &Rc<XmlHttpRequest>, name: &str, value: &str) {
        xhr.record_header(name, value);
    }

    fn send(&self, xhr: &Rc<XmlHttpRequest>, body: Option<RequestBody>) {
        let mut request = Request::new(&xhr.method(), &xhr.url());
        request.headers = xhr.request_headers().iter().collect::<Headers>();
        request.body = body;

        let pending = self.fetch.fetch(RequestInfo::Request(request), RequestInit::default());
        let xhr = xhr.clone();
        self.executor.spawn(async move {
            let response = match pending.await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!("XHR {} failed: {}", xhr.url(), e);
                    xhr.fail();
                    return;
                }
            };
            let text = response.text().await.unwrap_or_default();
            let headers: Vec<(&str, &str)> = response.headers().iter().collect();
            xhr.respond(response.status(), response.status_text(), &headers, &text);
        }).detach();
    }
}
