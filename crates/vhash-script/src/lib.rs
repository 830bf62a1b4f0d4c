//! Server-side script execution for vhash.
//!
//! Scripts are invoked by digest so their bodies cross the wire once per
//! connection. The [`ScriptExecutor`] memoizes each body's digest; when the
//! server has forgotten a digest (restart, `SCRIPT FLUSH`) it reloads the body
//! and retries exactly once.
//!
//! # Modules
//!
//! - [`script`]: [`Script`], a named, static script body
//! - [`executor`]: [`ScriptExecutor`], digest cache and invocation
//! - [`error`]: [`ScriptError`], execution failures with script identity

pub mod error;
pub mod executor;
pub mod script;

pub use error::{ScriptError, ScriptResult};
pub use executor::ScriptExecutor;
pub use script::Script;
