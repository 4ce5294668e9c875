//! Rendering adapter: a renderer-agnostic view of the resident slot table.
//!
//! # Invariants
//! - Renderers only read published geometry; they never touch cell contents.
//! - Draw positions are relative to the observer, so precision does not
//!   degrade far from the origin.
//!
//! A debug text renderer and a point counter stand in for a GPU backend. The
//! trait is stable; a GPU implementation can be swapped in without changing
//! consumers.

mod renderer;

pub use renderer::{DebugTextRenderer, FrameSummary, PointCounter, RenderView, Renderer, model_matrix, render_world};
