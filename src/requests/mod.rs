//! Request handlers
//!
//! The session only stores and invokes handlers; this module defines the
//! handler interface and a baseline DAP request vocabulary built on the
//! session's operations.

mod breakpoints;
mod inspection;
mod lifecycle;

use async_trait::async_trait;

use crate::common::Result;
use crate::dap::Request;
use crate::engine::DebugEngine;
use crate::session::Session;

pub use breakpoints::{SetExceptionBreakpoints, SetInstructionBreakpoints};
pub use inspection::{Evaluate, Scopes, Threads, Variables};
pub use lifecycle::{Attach, ConfigurationDone, Disconnect, Initialize, Launch};

/// Handles one request command
///
/// The handler sends its own response, after any events that must come
/// first. An `Err` return is turned into a failure response by the
/// receive loop, unless it is a transport error.
#[async_trait]
pub trait RequestHandler<E: DebugEngine>: Send + Sync {
    async fn handle(&self, session: &mut Session<E>, request: &Request) -> Result<()>;
}

/// Register the baseline request vocabulary on a session
pub fn register_default_handlers<E: DebugEngine>(session: &mut Session<E>) {
    session.register_handler("initialize", Initialize);
    session.register_handler("launch", Launch);
    session.register_handler("attach", Attach);
    session.register_handler("configurationDone", ConfigurationDone);
    session.register_handler("disconnect", Disconnect);
    session.register_handler("setExceptionBreakpoints", SetExceptionBreakpoints);
    session.register_handler("setInstructionBreakpoints", SetInstructionBreakpoints);
    session.register_handler("threads", Threads);
    session.register_handler("scopes", Scopes);
    session.register_handler("variables", Variables);
    session.register_handler("evaluate", Evaluate);
}
