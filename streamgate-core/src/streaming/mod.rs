//! Byte-range media delivery.
//!
//! Given a resolved storage locator and a planned byte window, opens the
//! underlying media file and produces the response framing plus a lazy,
//! finite chunk stream covering exactly the requested window.

pub mod byte_stream;

pub use byte_stream::{MediaStream, MediaStreamer, ResponseFraming, StreamError};
