//! Gesture Cloud - a hand-controlled particle cloud
//!
//! Particles morph between procedurally generated shapes (heart, flower,
//! Saturn, fireworks, Jarvis rings). Hand landmarks from the camera are
//! turned into smoothed gesture signals that scale, move, and agitate the
//! cloud every frame.

pub mod animation;
pub mod app;
pub mod camera;
pub mod color;
pub mod gesture;
pub mod math;
pub mod ml;
pub mod render;
pub mod settings;
pub mod template;

pub use app::App;
