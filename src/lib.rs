//! Turnstile - Per-client HTTP admission control
//!
//! This crate counts how many requests each client made within a trailing
//! sliding window and rejects requests once the configured quota is
//! exceeded. All state is process-local.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
