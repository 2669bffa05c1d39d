//! Hotspot placement on panoramic and flat images.
//!
//! The engine keeps three coordinate spaces consistent: directions on the
//! panorama sphere, pixels on a flat or equirectangular image, and screen
//! points under live pan/zoom/orbit. The desktop editor in `main.rs` is a
//! thin host around these modules.

pub mod config;
pub mod drag;
pub mod error;
pub mod export;
pub mod geometry;
pub mod i18n;
pub mod loader;
pub mod panorama;
pub mod projection;
pub mod resource;
pub mod store;
pub mod viewport;
