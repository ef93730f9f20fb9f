//! Command implementations for mjpeg-cli

pub mod save;
pub mod watch;

pub use save::save;
pub use watch::watch;
