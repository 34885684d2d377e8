//! # vigil-core
//!
//! Core types, traits, configuration, and error handling for the Vigil
//! liveness and keep-alive service.

pub mod config;
pub mod error;
pub mod notification;
pub mod traits;
