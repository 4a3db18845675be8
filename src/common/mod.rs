//! Common utilities shared by the session engine and the adapter binary

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result, ReverseRequestError};
