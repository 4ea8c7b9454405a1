//! Channel adapter interfaces and built-in channel implementations.

pub mod adapter;
pub mod cli;
pub mod web;

/// Trait implemented by all channel adapters.
pub use adapter::ChannelAdapter;
/// Local CLI adapter implementation.
pub use cli::CliAdapter;
/// HTTP endpoint adapter implementation.
pub use web::{InvokeRequest, InvokeResponse, WebAdapter};
