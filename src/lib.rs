//! CPU software rasterizer: transform stack, programmable vertex/fragment shaders,
//! barycentric triangle rasterization with depth buffering, and multi-pass techniques
//! (shadow mapping, occlusion accumulation, horizon-based ambient occlusion) on top.

pub mod app;
pub mod error;
pub mod model;
pub mod render;

pub use error::{RenderError, RenderResult};
