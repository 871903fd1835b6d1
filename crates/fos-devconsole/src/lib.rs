//! fOS Developer Console
//!
//! In-page diagnostic overlay core: console, error and network capture, a
//! reactive store, and a mock engine that answers matching requests with
//! synthetic responses.

pub mod body;
pub mod config;
pub mod hooks;
pub mod host;
pub mod mock;
pub mod monitor;
pub mod store;
pub mod value;

use std::cell::RefCell;
use std::rc::Rc;

pub use body::{Blob, FormData, FormDataValue, RequestBody, parse_body};
pub use config::{ConfigError, ConsoleConfig};
pub use hooks::{ConsoleHook, ErrorHook, NetworkHook};
pub use host::fetch::{FetchApi, FetchError, Headers, HeadersInit, Request, RequestInfo, RequestInit, Response};
pub use host::xhr::{XhrEvent, XhrTransport, XmlHttpRequest};
pub use host::{Clock, ErrorEvent, Host, HostBuilder, Severity};
pub use mock::{MockRule, MockUpdate};
pub use monitor::FrameMonitor;
pub use store::{LogEntry, NetworkRequest, RequestStatus, Store, Tab, Transport};
pub use value::{ConsoleValue, ValueError};

/// A running console attached to one host
pub struct DevConsole {
    host: Rc<Host>,
    store: Rc<Store>,
    config: ConsoleConfig,
    console: ConsoleHook,
    errors: ErrorHook,
    network: NetworkHook,
    monitor: RefCell<FrameMonitor>,
}

impl DevConsole {
    /// Create the store and install every interceptor.
    ///
    /// The console hook goes first so error reports are recorded through it.
    pub fn init(host: Rc<Host>, config: ConsoleConfig) -> Self {
        let store = Rc::new(Store::new());
        let console = ConsoleHook::new(host.clone(), store.clone(), config.max_logs);
        let errors = ErrorHook::new(host.clone());
        let network = NetworkHook::new(host.clone(), store.clone(), &config);

        console.enable();
        errors.enable();
        network.enable();
        tracing::info!("Developer console active (max {} logs)", config.max_logs);

        Self {
            host,
            store,
            config,
            console,
            errors,
            network,
            monitor: RefCell::new(FrameMonitor::new()),
        }
    }

    pub fn store(&self) -> &Rc<Store> {
        &self.store
    }

    pub fn host(&self) -> &Rc<Host> {
        &self.host
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    /// Drive the system monitor; call once per rendered frame
    pub fn frame(&self) -> Option<u32> {
        let now = self.host.now_ms();
        self.monitor.borrow_mut().tick(now, &self.store)
    }

    /// Uninstall every interceptor, restoring the host surfaces they replaced
    pub fn shutdown(&self) {
        self.network.disable();
        self.errors.disable();
        self.console.disable();
        tracing::info!("Developer console stopped");
    }
}
