//! Host environment
//!
//! Everything the console captures from lives here: the four console entry
//! points, the two HTTP transports, the global error hooks, the clock and the
//! event loop. Each surface is a slot holding the current implementation, so
//! interceptors can swap it out and later put the exact previous one back.

pub mod fetch;
pub mod xhr;

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Instant;

use smol::{LocalExecutor, Task};

use crate::value::ConsoleValue;
use fetch::{FetchApi, FetchFuture, OfflineFetch, RequestInfo, RequestInit};
use xhr::{NativeXhr, XhrTransport};

/// Console severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::Debug, Severity::Info, Severity::Warn, Severity::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// A console entry point (`console.info` and friends)
pub type LogFn = Rc<dyn Fn(&[ConsoleValue])>;

/// Global synchronous error hook. Returning `true` suppresses default handling.
pub type ErrorHandler = Rc<dyn Fn(&ErrorEvent) -> bool>;

/// Global unhandled-rejection hook
pub type RejectionHandler = Rc<dyn Fn(&RejectionEvent)>;

/// Uncaught error report
#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub message: Option<String>,
    pub source: Option<String>,
    pub line: u32,
    pub column: u32,
    pub error: Option<ConsoleValue>,
}

impl ErrorEvent {
    pub fn new(message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
            source: None,
            line: 0,
            column: 0,
            error: None,
        }
    }

    pub fn with_error(mut self, error: ConsoleValue) -> Self {
        self.error = Some(error);
        self
    }
}

/// Unhandled promise rejection report
#[derive(Debug, Clone)]
pub struct RejectionEvent {
    pub reason: ConsoleValue,
}

/// Monotonic time source in milliseconds
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// Clock anchored at construction time
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Host environment
pub struct Host {
    console: [RefCell<LogFn>; 4],
    fetch: RefCell<Rc<dyn FetchApi>>,
    xhr: RefCell<Rc<dyn XhrTransport>>,
    on_error: RefCell<Option<ErrorHandler>>,
    on_unhandled_rejection: RefCell<Option<RejectionHandler>>,
    origin: Option<String>,
    clock: Rc<dyn Clock>,
    executor: Rc<LocalExecutor<'static>>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl Host {
    pub fn builder() -> HostBuilder {
        HostBuilder::default()
    }

    // ------------------------------------------------------------------
    // Console surface
    // ------------------------------------------------------------------

    /// Current implementation of one console entry point
    pub fn console_fn(&self, severity: Severity) -> LogFn {
        self.console[severity.index()].borrow().clone()
    }

    /// Install a console entry point, returning the one it replaces
    pub fn set_console_fn(&self, severity: Severity, f: LogFn) -> LogFn {
        self.console[severity.index()].replace(f)
    }

    /// Call a console entry point the way page code would
    pub fn console(&self, severity: Severity, args: &[ConsoleValue]) {
        let f = self.console_fn(severity);
        f(args);
    }

    pub fn console_debug(&self, args: &[ConsoleValue]) {
        self.console(Severity::Debug, args);
    }

    pub fn console_info(&self, args: &[ConsoleValue]) {
        self.console(Severity::Info, args);
    }

    pub fn console_warn(&self, args: &[ConsoleValue]) {
        self.console(Severity::Warn, args);
    }

    pub fn console_error(&self, args: &[ConsoleValue]) {
        self.console(Severity::Error, args);
    }

    // ------------------------------------------------------------------
    // Transports
    // ------------------------------------------------------------------

    pub fn fetch_api(&self) -> Rc<dyn FetchApi> {
        self.fetch.borrow().clone()
    }

    pub fn set_fetch_api(&self, api: Rc<dyn FetchApi>) -> Rc<dyn FetchApi> {
        self.fetch.replace(api)
    }

    /// `fetch(input, init)`
    pub fn fetch(&self, input: impl Into<RequestInfo>, init: RequestInit) -> FetchFuture {
        let api = self.fetch_api();
        api.fetch(input.into(), init)
    }

    pub fn xhr_transport(&self) -> Rc<dyn XhrTransport> {
        self.xhr.borrow().clone()
    }

    pub fn set_xhr_transport(&self, transport: Rc<dyn XhrTransport>) -> Rc<dyn XhrTransport> {
        self.xhr.replace(transport)
    }

    // ------------------------------------------------------------------
    // Error hooks
    // ------------------------------------------------------------------

    pub fn on_error(&self) -> Option<ErrorHandler> {
        self.on_error.borrow().clone()
    }

    pub fn set_on_error(&self, handler: Option<ErrorHandler>) -> Option<ErrorHandler> {
        self.on_error.replace(handler)
    }

    pub fn on_unhandled_rejection(&self) -> Option<RejectionHandler> {
        self.on_unhandled_rejection.borrow().clone()
    }

    pub fn set_on_unhandled_rejection(&self, handler: Option<RejectionHandler>) -> Option<RejectionHandler> {
        self.on_unhandled_rejection.replace(handler)
    }

    /// Report an uncaught error. Returns whether default handling was suppressed.
    pub fn report_error(&self, event: &ErrorEvent) -> bool {
        let handled = match self.on_error() {
            Some(handler) => handler(event),
            None => false,
        };
        if !handled {
            tracing::error!(
                "Uncaught {}",
                event.message.as_deref().unwrap_or("Unknown Error")
            );
        }
        handled
    }

    /// Report an unhandled promise rejection
    pub fn report_unhandled_rejection(&self, reason: ConsoleValue) {
        let event = RejectionEvent { reason };
        match self.on_unhandled_rejection() {
            Some(handler) => handler(&event),
            None => tracing::error!("Unhandled rejection: {}", event.reason),
        }
    }

    // ------------------------------------------------------------------
    // Environment
    // ------------------------------------------------------------------

    /// Page origin (`location.origin`)
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn clock(&self) -> Rc<dyn Clock> {
        self.clock.clone()
    }

    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    pub fn executor(&self) -> Rc<LocalExecutor<'static>> {
        self.executor.clone()
    }

    /// Spawn a task on the page's event loop
    pub fn spawn<T: 'static>(&self, future: impl Future<Output = T> + 'static) -> Task<T> {
        self.executor.spawn(future)
    }

    /// Drive the event loop until `future` completes
    pub fn block_on<T>(&self, future: impl Future<Output = T>) -> T {
        smol::block_on(self.executor.run(future))
    }

    /// Run every task that is ready without waiting on timers or I/O
    pub fn run_until_idle(&self) {
        while self.executor.try_tick() {}
    }
}

/// Host configuration
pub struct HostBuilder {
    fetch: Option<Rc<dyn FetchApi>>,
    xhr: Option<Rc<dyn XhrTransport>>,
    console: Option<Rc<dyn Fn(Severity, &[ConsoleValue])>>,
    origin: Option<String>,
    clock: Option<Rc<dyn Clock>>,
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self {
            fetch: None,
            xhr: None,
            console: None,
            origin: Some("http://localhost".to_string()),
            clock: None,
        }
    }
}

impl HostBuilder {
    /// Promise-based transport; also backs the default XHR transport
    pub fn fetch(mut self, fetch: impl FetchApi + 'static) -> Self {
        self.fetch = Some(Rc::new(fetch));
        self
    }

    pub fn xhr(mut self, xhr: impl XhrTransport + 'static) -> Self {
        self.xhr = Some(Rc::new(xhr));
        self
    }

    /// Replace the default console sink for all four severities
    pub fn console(mut self, sink: impl Fn(Severity, &[ConsoleValue]) + 'static) -> Self {
        self.console = Some(Rc::new(sink));
        self
    }

    pub fn origin(mut self, origin: Option<&str>) -> Self {
        self.origin = origin.map(str::to_string);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Rc::new(clock));
        self
    }

    pub fn build(self) -> Rc<Host> {
        let executor = Rc::new(LocalExecutor::new());
        let fetch = self.fetch.unwrap_or_else(|| Rc::new(OfflineFetch));
        let xhr = self.xhr
            .unwrap_or_else(|| Rc::new(NativeXhr::new(fetch.clone(), executor.clone())));

        let sink = self.console;
        let console = Severity::ALL.map(|severity| {
            let f: LogFn = match &sink {
                Some(sink) => {
                    let sink = sink.clone();
                    Rc::new(move |args: &[ConsoleValue]| sink(severity, args))
                }
                None => tracing_console(severity),
            };
            RefCell::new(f)
        });

        Rc::new(Host {
            console,
            fetch: RefCell::new(fetch),
            xhr: RefCell::new(xhr),
            on_error: RefCell::new(None),
            on_unhandled_rejection: RefCell::new(None),
            origin: self.origin,
            clock: self.clock.unwrap_or_else(|| Rc::new(MonotonicClock::new())),
            executor,
        })
    }
}

/// Default console entry point: writes through `tracing`
fn tracing_console(severity: Severity) -> LogFn {
    Rc::new(move |args: &[ConsoleValue]| {
        let output = args.iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        match severity {
            Severity::Error => tracing::error!("[JS] {}", output),
            Severity::Warn => tracing::warn!("[JS] {}", output),
            Severity::Debug => tracing::debug!("[JS] {}", output),
            Severity::Info => tracing::info!("[JS] {}", output),
        }
    })
}
