//! RingCentral Team Messaging channel bridge: Subscription Manager, Inbound
//! Pipeline, Outbound Delivery, and Chat Cache, plus the ambient stack
//! (config, logging, CLI) that runs them as a process.

pub mod auth;
pub mod bridge;
pub mod cache;
pub mod chat_id;
pub mod core;
pub mod error;
pub mod grouplog;
pub mod model;
pub mod outbound;
pub mod pipeline;
pub mod platform;
pub mod policy;
pub mod runtime;
pub mod status;
pub mod subscription;

pub use bridge::Bridge;
pub use error::BridgeError;
