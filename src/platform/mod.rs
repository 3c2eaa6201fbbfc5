//! Platform Client (spec.md §4.1 C1).

pub mod client;
pub mod download;
pub mod error;
pub mod types;

pub use client::{PlatformClient, RestPlatformClient};
pub use download::DownloadedContent;
pub use error::PlatformError;
