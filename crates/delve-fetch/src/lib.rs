//! Fetching web pages for analysis.
//!
//! Each URL goes through up to three tiers (direct GET, headless render,
//! stealth render) until one returns a 2xx status with non-blank text. The
//! extracted markdown, or a failure marker, lands in the [`DocumentCache`].

pub mod backend;
pub mod cache;
pub mod extract;
pub mod http;
pub mod pipeline;
pub mod render;

pub use backend::{FetchBackend, FetchResponse};
pub use cache::DocumentCache;
pub use extract::html_to_markdown;
pub use http::HttpBackend;
pub use pipeline::{FAILURE_MARKER, FetchPipeline};
pub use render::RenderBackend;
