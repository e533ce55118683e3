pub mod config;
pub mod logging;

pub use tracing;

/// Lifecycle signal broadcast to long-running operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
