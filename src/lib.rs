//! DAP session engine
//!
//! The protocol side of a debug adapter: message framing, request dispatch,
//! adapter-initiated requests, output and progress events, and the handle
//! tables that give the client stable identities for debugger state. The
//! debugger itself plugs in through [`engine::DebugEngine`].

pub mod breakpoints;
pub mod common;
pub mod console;
pub mod dap;
pub mod engine;
pub mod requests;
pub mod session;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use session::Session;
