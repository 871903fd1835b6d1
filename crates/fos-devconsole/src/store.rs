//! Store
//!
//! Single source of truth for the console: captured logs, network requests,
//! mock rules and panel state, plus a listener registry. All mutation goes
//! through `Store` methods; each one finishes its write before any listener
//! runs, so listeners never observe a half-applied update.

use std::cell::{Cell, Ref, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::host::Severity;
use crate::host::fetch::HeaderMap;
use crate::mock::{self, MockRule, MockUpdate};
use crate::value::ConsoleValue;

/// Default log buffer capacity
pub const DEFAULT_MAX_LOGS: usize = 300;

/// Captured console entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub severity: Severity,
    pub args: Vec<ConsoleValue>,
    /// Wall-clock milliseconds of the latest occurrence
    pub timestamp: u64,
    pub repeat_count: u32,
}

impl LogEntry {
    pub fn new(severity: Severity, args: Vec<ConsoleValue>) -> Self {
        Self {
            severity,
            args,
            timestamp: current_time_ms(),
            repeat_count: 1,
        }
    }

    /// Same severity and structurally equal arguments.
    ///
    /// Arguments are compared by their JSON form; anything that fails to
    /// serialize (cycles) never counts as a repeat.
    fn is_repeat_of(&self, other: &LogEntry) -> bool {
        if self.severity != other.severity || self.args.len() != other.args.len() {
            return false;
        }
        match (args_json(&self.args), args_json(&other.args)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Lower-cased text used by the search filter
    pub fn search_text(&self) -> String {
        self.args.iter()
            .map(|arg| {
                if arg.is_object() {
                    arg.to_json_string().unwrap_or_else(|_| "[Circular]".to_string())
                } else {
                    arg.to_plain_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

fn args_json(args: &[ConsoleValue]) -> Option<String> {
    ConsoleValue::array(args.iter().cloned()).to_json_string().ok()
}

/// Which transport issued a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Fetch,
    Xhr,
}

/// Request lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Completed(u16),
    Error,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Completed(code) => write!(f, "{}", code),
            RequestStatus::Error => write!(f, "error"),
        }
    }
}

/// Captured network request
#[derive(Debug, Clone, Serialize)]
pub struct NetworkRequest {
    pub id: String,
    pub method: String,
    pub transport: Transport,
    /// URL path, shown in the request list
    pub path: String,
    pub full_url: String,
    pub query_params: HashMap<String, String>,
    pub request_headers: HeaderMap,
    pub response_headers: HeaderMap,
    pub status: RequestStatus,
    /// Host clock reading at dispatch
    pub start_time: f64,
    pub duration_ms: f64,
    pub request_body: Value,
    pub response_body: Value,
}

impl NetworkRequest {
    /// A pending request with nothing but its identity filled in
    pub fn pending(id: &str, method: &str, transport: Transport, full_url: &str) -> Self {
        Self {
            id: id.to_string(),
            method: method.to_string(),
            transport,
            path: full_url.to_string(),
            full_url: full_url.to_string(),
            query_params: HashMap::new(),
            request_headers: HeaderMap::new(),
            response_headers: HeaderMap::new(),
            status: RequestStatus::Pending,
            start_time: 0.0,
            duration_ms: 0.0,
            request_body: Value::Null,
            response_body: Value::Null,
        }
    }

    fn matches(&self, query: &str) -> bool {
        self.path.to_lowercase().contains(query)
            || self.method.to_lowercase().contains(query)
            || self.status.to_string().contains(query)
    }
}

/// Partial update merged into a request in one step
#[derive(Debug, Clone, Default)]
pub struct RequestUpdate {
    pub status: Option<RequestStatus>,
    pub duration_ms: Option<f64>,
    pub response_headers: Option<HeaderMap>,
    pub response_body: Option<Value>,
}

impl RequestUpdate {
    fn apply(self, req: &mut NetworkRequest) {
        if let Some(status) = self.status {
            req.status = status;
        }
        if let Some(duration) = self.duration_ms {
            req.duration_ms = duration;
        }
        if let Some(headers) = self.response_headers {
            req.response_headers = headers;
        }
        if let Some(body) = self.response_body {
            req.response_body = body;
        }
    }
}

/// Panel tabs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Console,
    Network,
    Mocks,
    Storage,
    System,
}

/// Store state
#[derive(Debug, Default)]
pub struct StoreState {
    pub logs: VecDeque<LogEntry>,
    /// Insertion-ordered, unique by id
    pub requests: Vec<NetworkRequest>,
    pub mocks: Vec<MockRule>,
    pub fps: u32,
    pub is_panel_open: bool,
    pub active_tab: Tab,
    /// Always lower-case
    pub search_query: String,
    /// Position of each request id in `requests`
    request_index: HashMap<String, usize>,
}

impl StoreState {
    pub fn request(&self, id: &str) -> Option<&NetworkRequest> {
        self.request_index.get(id).and_then(|&i| self.requests.get(i))
    }

    fn request_mut(&mut self, id: &str) -> Option<&mut NetworkRequest> {
        let i = *self.request_index.get(id)?;
        self.requests.get_mut(i)
    }

    fn put_request(&mut self, req: NetworkRequest) {
        match self.request_index.get(&req.id) {
            Some(&i) => self.requests[i] = req,
            None => {
                self.request_index.insert(req.id.clone(), self.requests.len());
                self.requests.push(req);
            }
        }
    }

    fn showing(&self, tab: Tab) -> bool {
        self.is_panel_open && self.active_tab == tab
    }
}

type Listener = Rc<dyn Fn(&Store)>;
type Registry = RefCell<Vec<(u64, Listener)>>;

/// Handle returned by [`Store::subscribe`]
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Registry>,
    id: u64,
}

impl Subscription {
    /// Remove the listener. Safe to call after the store is gone.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().retain(|(id, _)| *id != self.id);
        }
    }
}

/// Console store
pub struct Store {
    state: RefCell<StoreState>,
    listeners: Rc<Registry>,
    next_listener: Cell<u64>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.state)
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(StoreState::default()),
            listeners: Rc::new(RefCell::new(Vec::new())),
            next_listener: Cell::new(0),
        }
    }

    /// Read access to the full state
    pub fn state(&self) -> Ref<'_, StoreState> {
        self.state.borrow()
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    pub fn subscribe(&self, listener: impl Fn(&Store) + 'static) -> Subscription {
        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        Subscription { registry: Rc::downgrade(&self.listeners), id }
    }

    /// Invoke every registered listener synchronously
    pub fn notify(&self) {
        let listeners: Vec<Listener> = self.listeners.borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(self);
        }
    }

    fn notify_if_showing(&self, tab: Tab) {
        let showing = self.state.borrow().showing(tab);
        if showing {
            self.notify();
        }
    }

    // ------------------------------------------------------------------
    // Logs
    // ------------------------------------------------------------------

    /// Append a log entry, collapsing it into the previous one when it repeats.
    ///
    /// Dropped with a warning if the state is currently borrowed; see
    /// [`Store::try_add_log`].
    pub fn add_log(&self, entry: LogEntry, capacity: usize) {
        if self.try_add_log(entry, capacity).is_err() {
            tracing::warn!("store busy, log entry dropped");
        }
    }

    /// Like [`Store::add_log`], but hands the entry back instead of
    /// recording it while a listener still holds a `state()` borrow.
    pub fn try_add_log(&self, mut entry: LogEntry, capacity: usize) -> Result<(), LogEntry> {
        {
            let Ok(mut state) = self.state.try_borrow_mut() else {
                return Err(entry);
            };
            let repeat = state.logs.back().is_some_and(|last| entry.is_repeat_of(last));
            if repeat {
                if let Some(last) = state.logs.back_mut() {
                    last.repeat_count += 1;
                    last.timestamp = entry.timestamp;
                }
            } else {
                entry.repeat_count = 1;
                state.logs.push_back(entry);
                while state.logs.len() > capacity {
                    state.logs.pop_front();
                }
            }
        }
        self.notify_if_showing(Tab::Console);
        Ok(())
    }

    pub fn clear_logs(&self) {
        self.state.borrow_mut().logs.clear();
        self.notify();
    }

    /// Logs matching the search query, oldest first
    pub fn filtered_logs(&self) -> Vec<LogEntry> {
        let state = self.state.borrow();
        if state.search_query.is_empty() {
            return state.logs.iter().cloned().collect();
        }
        state.logs.iter()
            .filter(|log| log.search_text().contains(&state.search_query))
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    /// Insert (or replace) a request by id
    pub fn add_request(&self, req: NetworkRequest) {
        {
            self.state.borrow_mut().put_request(req);
        }
        self.notify_if_showing(Tab::Network);
    }

    /// Merge fields into a request. Unknown ids are ignored and return false.
    pub fn update_request(&self, id: &str, update: RequestUpdate) -> bool {
        {
            let mut state = self.state.borrow_mut();
            let Some(req) = state.request_mut(id) else {
                return false;
            };
            update.apply(req);
        }
        self.notify_if_showing(Tab::Network);
        true
    }

    pub fn clear_requests(&self) {
        {
            let mut state = self.state.borrow_mut();
            state.requests.clear();
            state.request_index.clear();
        }
        self.notify();
    }

    /// Requests matching the search query, newest first
    pub fn filtered_requests(&self) -> Vec<NetworkRequest> {
        let state = self.state.borrow();
        state.requests.iter()
            .rev()
            .filter(|req| state.search_query.is_empty() || req.matches(&state.search_query))
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // Mocks
    // ------------------------------------------------------------------

    pub fn add_mock(&self, rule: MockRule) {
        self.state.borrow_mut().mocks.push(rule);
        self.notify();
    }

    pub fn remove_mock(&self, id: &str) {
        self.state.borrow_mut().mocks.retain(|m| m.id != id);
        self.notify();
    }

    pub fn toggle_mock(&self, id: &str) {
        if let Some(rule) = self.state.borrow_mut().mocks.iter_mut().find(|m| m.id == id) {
            rule.active = !rule.active;
        }
        self.notify();
    }

    pub fn update_mock(&self, id: &str, update: MockUpdate) {
        if let Some(rule) = self.state.borrow_mut().mocks.iter_mut().find(|m| m.id == id) {
            update.apply(rule);
        }
        self.notify();
    }

    pub fn clear_mocks(&self) {
        self.state.borrow_mut().mocks.clear();
        self.notify();
    }

    /// First active rule matching the request, read from the live list
    pub fn find_mock(&self, method: &str, url: &str) -> Option<MockRule> {
        let state = self.state.borrow();
        mock::find_match(&state.mocks, method, url).cloned()
    }

    // ------------------------------------------------------------------
    // Panel state
    // ------------------------------------------------------------------

    /// Store a lower-cased search query
    pub fn set_search_query(&self, query: &str) {
        self.state.borrow_mut().search_query = query.to_lowercase();
        self.notify();
    }

    pub fn open_panel(&self) {
        self.state.borrow_mut().is_panel_open = true;
        self.notify();
    }

    pub fn close_panel(&self) {
        self.state.borrow_mut().is_panel_open = false;
        self.notify();
    }

    pub fn toggle_panel(&self) {
        {
            let mut state = self.state.borrow_mut();
            state.is_panel_open = !state.is_panel_open;
        }
        self.notify();
    }

    pub fn set_active_tab(&self, tab: Tab) {
        self.state.borrow_mut().active_tab = tab;
        self.notify();
    }

    pub fn set_fps(&self, fps: u32) {
        self.state.borrow_mut().fps = fps;
        self.notify_if_showing(Tab::System);
    }
}

fn current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
