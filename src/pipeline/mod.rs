//! Pipeline stages for page-to-PNG conversion.
//!
//! Each submodule implements one step; [`crate::convert`] strings them
//! together and turns any failure into a [`crate::output::ConversionResult`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ (loader) ──▶ render ──▶ encode ──▶ output
//! (checks)   (engine)    (surface)   (PNG)     (data URL + file)
//! ```
//!
//! 1. [`input`]  — presence, type and size checks; lazy byte read
//! 2. [`render`] — open, select page, size the surface, draw; runs in
//!    `spawn_blocking` because engine handles are not async-safe
//! 3. [`encode`] — PNG-encode the surface and build the `data:` URL

pub mod encode;
pub mod input;
pub mod render;
