use glam::{DVec3, Mat4};
use voxworld_stream::{DrawItem, VoxelWorld};

/// View parameters for one frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderView {
    /// Eye position in world space.
    pub eye: DVec3,
    /// Cells whose origin lies further than this from the eye are skipped.
    pub max_distance: f64,
}

impl Default for RenderView {
    fn default() -> Self {
        Self {
            eye: DVec3::ZERO,
            max_distance: f64::INFINITY,
        }
    }
}

impl RenderView {
    pub fn at(eye: DVec3) -> Self {
        Self {
            eye,
            ..Self::default()
        }
    }

    fn sees(&self, item: &DrawItem) -> bool {
        item.offset.length() <= self.max_distance
    }
}

/// Renderer-agnostic interface.
///
/// Receives the per-slot draw list of a frame and produces output. Never
/// mutates the world.
pub trait Renderer {
    type Output;

    fn render(&self, items: &[DrawItem], view: &RenderView) -> Self::Output;
}

/// Render the current draw list of `world`.
pub fn render_world<R: Renderer>(renderer: &R, world: &VoxelWorld, view: &RenderView) -> R::Output {
    let _span = tracing::trace_span!("render_world").entered();
    renderer.render(&world.draw_list(), view)
}

/// Model transform placing a cell's geometry relative to the observer.
pub fn model_matrix(item: &DrawItem) -> Mat4 {
    Mat4::from_translation(item.offset.as_vec3())
}

/// Totals for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSummary {
    pub cells: usize,
    /// Cells skipped by the distance limit.
    pub culled: usize,
    /// Cells drawn but with empty geometry.
    pub empty: usize,
    pub points: usize,
    pub triangles: usize,
}

/// Counts what a GPU backend would be asked to draw.
#[derive(Debug, Default)]
pub struct PointCounter;

impl Renderer for PointCounter {
    type Output = FrameSummary;

    fn render(&self, items: &[DrawItem], view: &RenderView) -> FrameSummary {
        let mut summary = FrameSummary::default();
        for item in items {
            if !view.sees(item) {
                summary.culled += 1;
                continue;
            }
            let points = item.mesh.point_count();
            summary.cells += 1;
            summary.points += points;
            if points == 0 {
                summary.empty += 1;
            }
        }
        summary.triangles = summary.points / 3;
        summary
    }
}

/// Human-readable frame dump, for the CLI, logs and tests.
#[derive(Debug)]
pub struct DebugTextRenderer {
    /// Per-cell lines to print before eliding the rest.
    pub max_lines: usize,
}

impl DebugTextRenderer {
    pub fn new() -> Self {
        Self { max_lines: 16 }
    }
}

impl Default for DebugTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for DebugTextRenderer {
    type Output = String;

    fn render(&self, items: &[DrawItem], view: &RenderView) -> String {
        let summary = PointCounter.render(items, view);
        let mut out = format!(
            "=== Frame: {} cells, {} triangles ({} empty, {} culled) ===\n",
            summary.cells, summary.triangles, summary.empty, summary.culled
        );
        out.push_str(&format!(
            "Eye: ({:.1}, {:.1}, {:.1})\n",
            view.eye.x, view.eye.y, view.eye.z
        ));

        let mut drawn: Vec<&DrawItem> = items
            .iter()
            .filter(|item| view.sees(item) && item.mesh.point_count() > 0)
            .collect();
        drawn.sort_by_key(|item| item.coord);
        for item in drawn.iter().take(self.max_lines) {
            out.push_str(&format!(
                "  cell {} offset=({:.1}, {:.1}, {:.1}) points={}\n",
                item.coord,
                item.offset.x,
                item.offset.y,
                item.offset.z,
                item.mesh.point_count()
            ));
        }
        if drawn.len() > self.max_lines {
            out.push_str(&format!("  ... {} more\n", drawn.len() - self.max_lines));
        }
        out
    }
}
