//! Trailing-edge coalescing of controller events on a Tokio task.

pub mod debouncer;

pub use debouncer::Debouncer;
