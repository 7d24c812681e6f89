// PyRunner Core - Domain Logic & Ports
// NO infrastructure dependencies: processes, files and sockets live in adapter crates

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
