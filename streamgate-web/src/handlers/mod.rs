//! HTTP request handlers.

pub mod range;
pub mod stream;

pub use stream::{health, stats, stream_content};
