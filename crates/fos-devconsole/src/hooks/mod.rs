//! Interceptors
//!
//! Each hook installs a wrapper into one host surface, records what passes
//! through it into the [`Store`](crate::store::Store), and puts the exact
//! previous implementation back on `disable()`.

mod console;
mod error;
mod network;

pub use console::ConsoleHook;
pub use error::ErrorHook;
pub use network::{NetworkHook, parse_raw_headers};
