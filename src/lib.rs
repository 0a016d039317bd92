//! Interactive stepping debugger for a small Python-flavoured language.
//!
//! The [`debugger`] module is the bridge between the interpreter in
//! [`runtime`] and a controller: pauses, resume decisions, the interrupt
//! cell and error reports. [`terminal`] brokers guest input, [`dap`] and
//! [`executor`] are the two controllers shipped with the binary.

pub mod config;
pub mod dap;
pub mod debugger;
pub mod error;
pub mod executor;
pub mod logging;
pub mod parser;
pub mod runtime;
pub mod terminal;

pub use config::Config;
pub use debugger::{ResumeDecision, RunConfig, RunMode, RunOutcome, SessionController, SessionSettings};
pub use error::{ConfigError, DebugError, SessionError};
