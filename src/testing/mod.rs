//! Test support
//!
//! Provides a scriptable in-memory debugging engine so the session can be
//! exercised end to end without a real debugger behind it. Used by the
//! crate's tests and by the `mock-adapter` binary.

mod engine;

pub use engine::{MockBreakpoint, MockEngine, MockValue};
