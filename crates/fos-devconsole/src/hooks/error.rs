//! Error hook
//!
//! Routes uncaught errors and unhandled rejections into the console's error
//! channel. Purely observational: default handling is never suppressed by
//! this hook, and previously installed handlers still run.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::host::{ErrorEvent, ErrorHandler, Host, RejectionEvent, RejectionHandler};
use crate::value::ConsoleValue;

type Saved = (Option<ErrorHandler>, Option<RejectionHandler>);

/// Error interceptor
pub struct ErrorHook {
    host: Rc<Host>,
    saved: RefCell<Option<Saved>>,
}

impl ErrorHook {
    pub fn new(host: Rc<Host>) -> Self {
        Self { host, saved: RefCell::new(None) }
    }

    pub fn is_enabled(&self) -> bool {
        self.saved.borrow().is_some()
    }

    pub fn enable(&self) {
        if self.is_enabled() {
            return;
        }
        // Handlers live on the host; holding it strongly would be a cycle
        let host = Rc::downgrade(&self.host);

        let previous_error = self.host.on_error();
        let chained = previous_error.clone();
        let on_error: ErrorHandler = {
            let host = host.clone();
            Rc::new(move |event: &ErrorEvent| {
                if let Some(host) = host.upgrade() {
                    let message = event.message.as_deref().unwrap_or("Unknown Error");
                    let error = event.error.clone().unwrap_or(ConsoleValue::Undefined);
                    host.console_error(&[format!("Uncaught: {}", message).into(), error]);
                }
                chained.as_ref().is_some_and(|previous| previous(event))
            })
        };

        let previous_rejection = self.host.on_unhandled_rejection();
        let chained = previous_rejection.clone();
        let on_rejection: RejectionHandler = Rc::new(move |event: &RejectionEvent| {
            if let Some(host) = Weak::upgrade(&host) {
                let reason = event.reason.to_plain_string();
                host.console_error(&[format!("Unhandled Rejection: {}", reason).into()]);
            }
            if let Some(previous) = &chained {
                previous(event);
            }
        });

        self.host.set_on_error(Some(on_error));
        self.host.set_on_unhandled_rejection(Some(on_rejection));
        *self.saved.borrow_mut() = Some((previous_error, previous_rejection));
        tracing::debug!("error hook enabled");
    }

    /// Reinstall whatever handlers were present at `enable()` time
    pub fn disable(&self) {
        let Some((on_error, on_rejection)) = self.saved.borrow_mut().take() else {
            return;
        };
        self.host.set_on_error(on_error);
        self.host.set_on_unhandled_rejection(on_rejection);
        tracing::debug!("error hook disabled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::ConsoleHook;
    use crate::host::Severity;
    use crate::store::Store;
    use std::cell::Cell;

    fn setup() -> (Rc<Host>, Rc<Store>, ConsoleHook, ErrorHook) {
        let host = Host::builder().console(|_, _| {}).build();
        let store = Rc::new(Store::new());
        let console = ConsoleHook::new(host.clone(), store.clone(), 300);
        let errors = ErrorHook::new(host.clone());
        console.enable();
        errors.enable();
        (host, store, console, errors)
    }

    #[test]
    fn test_uncaught_error_is_logged_and_not_handled() {
        let (host, store, _console, _errors) = setup();

        let event = ErrorEvent::new("Test Error").with_error(ConsoleValue::error("Error", "Test Error"));
        assert!(!host.report_error(&event));

        let state = store.state();
        assert_eq!(state.logs.len(), 1);
        assert_eq!(state.logs[0].severity, Severity::Error);
        assert_eq!(state.logs[0].args[0].to_string(), "Uncaught: Test Error");
    }

    #[test]
    fn test_missing_message() {
        let (host, store, _console, _errors) = setup();
        let mut event = ErrorEvent::new("");
        event.message = None;
        host.report_error(&event);
        assert_eq!(store.state().logs[0].args[0].to_string(), "Uncaught: Unknown Error");
    }

    #[test]
    fn test_unhandled_rejection() {
        let (host, store, _console, _errors) = setup();
        host.report_unhandled_rejection("Async Fail".into());

        let state = store.state();
        assert_eq!(state.logs[0].severity, Severity::Error);
        assert_eq!(state.logs[0].args[0].to_string(), "Unhandled Rejection: Async Fail");
    }

    #[test]
    fn test_repeated_errors_dedup() {
        let (host, store, _console, _errors) = setup();
        for _ in 0..3 {
            host.report_error(&ErrorEvent::new("same"));
        }
        let state = store.state();
        assert_eq!(state.logs.len(), 1);
        assert_eq!(state.logs[0].repeat_count, 3);
    }

    #[test]
    fn test_previous_handlers_still_run_and_are_restored() {
        let host = Host::builder().console(|_, _| {}).build();
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let original: ErrorHandler = Rc::new(move |_: &ErrorEvent| {
            c.set(c.get() + 1);
            true
        });
        host.set_on_error(Some(original.clone()));

        let hook = ErrorHook::new(host.clone());
        hook.enable();
        assert!(host.report_error(&ErrorEvent::new("x")));
        assert_eq!(calls.get(), 1);

        hook.disable();
        let restored = host.on_error().unwrap();
        assert!(Rc::ptr_eq(&restored, &original));
    }
}
