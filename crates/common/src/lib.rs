//! Shared error-context plumbing used across clipbot crates.

pub mod error;

pub use error::FromMessage;
