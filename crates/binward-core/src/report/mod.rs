//! Report model and text rendering.

pub mod model;
pub mod render;

pub use model::{Report, Verdict, VerdictLevel};
pub use render::render_text;
