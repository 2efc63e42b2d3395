//! Transport layer for hiremed.
//!
//! HTTP via axum; the console stream rides the same router as SSE.

pub mod http;

pub use http::serve;
