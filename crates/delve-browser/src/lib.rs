//! Page rendering over CDP.
//!
//! Backs the render and stealth fetch tiers. Needs the `browser` feature and
//! a local Chrome/Chromium; without the feature every render fails fast.

pub mod pool;
pub mod stealth;

pub use pool::{BrowserPool, RenderOptions, RenderProfile, RenderedPage};
