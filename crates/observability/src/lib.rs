//! Logging for Cairn.
//!
//! Binaries flatten [`LogArgs`] into their CLI and call [`init_logging`] once
//! at startup. Tests call [`init_test_tracing`], which is safe to call from
//! every test.

mod args;
mod logging;

pub use args::LogArgs;
pub use logging::{build_filter, init_logging, init_test_tracing};
