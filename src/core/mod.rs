pub mod cli;
pub mod config;
pub mod constants;
pub mod logging;
pub mod paths;
pub mod shutdown;

pub use cli::Cli;
pub use config::{AccountConfig, BridgeConfig};
pub use shutdown::ShutdownService;
