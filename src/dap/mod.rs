//! Debug Adapter Protocol (DAP) wire layer
//!
//! This module implements the adapter side of DAP framing and the
//! message shapes exchanged with the client.

pub mod codec;
pub mod types;

pub use codec::{Frame, FrameReader, FrameWriter};
pub use types::*;
