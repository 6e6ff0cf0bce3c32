//! Per-client sliding window rate accounting.

mod eviction;
mod registry;
mod window;

pub use eviction::spawn_eviction_task;
pub use registry::LimiterRegistry;
pub use window::{Admission, Quota, WindowCounter};
