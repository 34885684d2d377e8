//! # vigil-platform
//!
//! HTTP clients for the outside world: the authoritative stream API and the
//! task queue that calls the keep-alive endpoint back.

pub mod helix;
pub mod retry;
pub mod tasks;
pub mod token;

pub use helix::HelixClient;
pub use retry::RetryPolicy;
pub use tasks::CloudTasksClient;
pub use token::{AccessTokenSource, TokenCache};
