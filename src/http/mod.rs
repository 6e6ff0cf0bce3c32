//! HTTP front end that applies per-client admission control.

mod identity;
mod server;
mod service;

pub use identity::client_key;
pub use server::HttpServer;
pub use service::{router, AppState};
