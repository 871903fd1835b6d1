//! Console hook
//!
//! Wraps the four console entry points. The page's call always reaches the
//! wrapped implementation first; the entry is recorded afterwards.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use smol::LocalExecutor;

use crate::host::{Host, LogFn, Severity};
use crate::store::{LogEntry, Store};
use crate::value::ConsoleValue;

/// Console interceptor
pub struct ConsoleHook {
    host: Rc<Host>,
    store: Rc<Store>,
    capacity: usize,
    originals: RefCell<Option<[LogFn; 4]>>,
}

impl ConsoleHook {
    pub fn new(host: Rc<Host>, store: Rc<Store>, capacity: usize) -> Self {
        Self {
            host,
            store,
            capacity,
            originals: RefCell::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.originals.borrow().is_some()
    }

    /// Install the wrappers. Calling twice is a no-op.
    pub fn enable(&self) {
        if self.is_enabled() {
            return;
        }
        // Shared by all four wrappers: a log issued while recording (e.g.
        // from a store listener) is forwarded but not recorded again.
        let recording = Rc::new(Cell::new(false));

        let originals = Severity::ALL.map(|severity| {
            let original = self.host.console_fn(severity);
            let wrapper = record_then_forward(
                severity,
                original.clone(),
                Recorder {
                    store: self.store.clone(),
                    executor: self.host.executor(),
                    capacity: self.capacity,
                    recording: recording.clone(),
                },
            );
            self.host.set_console_fn(severity, wrapper);
            original
        });
        *self.originals.borrow_mut() = Some(originals);
        tracing::debug!("console hook enabled");
    }

    /// Put the saved entry points back
    pub fn disable(&self) {
        let Some(originals) = self.originals.borrow_mut().take() else {
            return;
        };
        for (severity, original) in Severity::ALL.into_iter().zip(originals) {
            self.host.set_console_fn(severity, original);
        }
        tracing::debug!("console hook disabled");
    }
}

/// Where a wrapper records to
struct Recorder {
    store: Rc<Store>,
    executor: Rc<LocalExecutor<'static>>,
    capacity: usize,
    recording: Rc<Cell<bool>>,
}

/// Clears the recording flag however the recording ends
struct RecordingGuard<'a>(&'a Cell<bool>);

impl Drop for RecordingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Recorder {
    fn record(&self, entry: LogEntry) {
        if self.recording.replace(true) {
            return;
        }
        let _guard = RecordingGuard(&self.recording);

        // A listener is holding the state; record once the loop is idle
        if let Err(entry) = self.store.try_add_log(entry, self.capacity) {
            let store = self.store.clone();
            let capacity = self.capacity;
            self.executor.spawn(async move {
                store.add_log(entry, capacity);
            }).detach();
        }
    }
}

fn record_then_forward(severity: Severity, original: LogFn, recorder: Recorder) -> LogFn {
    Rc::new(move |args: &[ConsoleValue]| {
        original(args);
        recorder.record(LogEntry::new(severity, args.to_vec()));
    })
}
