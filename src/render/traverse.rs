//! Breadth-first pyramid traversal and the per-frame render pass.

use crate::coord::TilePos;
use crate::render::Painter;
use crate::survey::Survey;
use crate::tile::LoadFlags;
use thiserror::Error;
use tracing::debug;

/// Capacity of the traversal ring buffer.
const QUEUE_LEN: usize = 1024;

/// Hard ceiling on the render order, whatever the survey advertises.
const MAX_RENDER_ORDER: i32 = 9;

/// Visitor verdict for one tile of the traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Do not descend into this tile's children.
    Skip,
    /// Enqueue the four children.
    Descend,
    /// Abort the whole traversal.
    Stop,
}

/// Traversal failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TraverseError {
    /// The fixed-capacity queue cannot hold four more children.
    #[error("traversal queue overflow")]
    QueueOverflow,
}

/// Breadth-first walk of the sphere quad-tree.
///
/// Starts with the twelve base pixels at order 0; `visit` decides per tile
/// whether to descend into its children. The queue is a fixed ring of
/// [`QUEUE_LEN`] slots; overflowing it is an error.
pub fn traverse<F>(mut visit: F) -> Result<(), TraverseError>
where
    F: FnMut(i32, i32) -> Step,
{
    let mut queue = [TilePos { order: 0, pix: 0 }; QUEUE_LEN];
    let mut start = 0usize;
    let mut size = 12usize;
    for (pix, slot) in queue.iter_mut().take(12).enumerate() {
        slot.pix = pix as i32;
    }
    while size > 0 {
        let node = queue[start % QUEUE_LEN];
        start += 1;
        size -= 1;
        match visit(node.order, node.pix) {
            Step::Stop => return Ok(()),
            Step::Skip => {}
            Step::Descend => {
                if size + 4 >= QUEUE_LEN {
                    return Err(TraverseError::QueueOverflow);
                }
                for i in 0..4 {
                    queue[(start + size) % QUEUE_LEN] = node.child(i);
                    size += 1;
                }
            }
        }
    }
    Ok(())
}

/// Outcome counters of one render pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Tiles visited at the render order.
    pub total: u32,
    /// Visited tiles whose loading is complete.
    pub loaded: u32,
}

impl RenderStats {
    /// Whether every visited tile has reached its final state.
    pub fn is_complete(&self) -> bool {
        self.loaded == self.total
    }
}

impl Survey {
    /// Tile order needed so that on-screen tile texels roughly match
    /// framebuffer pixels, given the angular radius of the rendered
    /// region. Unclamped; may be far outside the survey's order range.
    pub fn render_order(&self, painter: &dyn Painter, angle: f64) -> i32 {
        let pix_per_rad = painter.fb_width() as f64 / painter.proj_scaling_x().atan() / 2.0;
        let px = pix_per_rad * angle;
        let order = (px / (4.0 * 2f64.sqrt() * self.tile_width() as f64))
            .log2()
            .round();
        if order.is_finite() {
            order as i32
        } else {
            i32::MIN
        }
    }

    /// Walk the tiles the current view needs at the render order, calling
    /// `callback(survey, painter, order, pix, split, flags)` for each
    /// visible one. `split` tells the painter how many sub-quads to
    /// tessellate the tile into.
    ///
    /// This is the controllable core of [`Survey::render`], for callers
    /// that need to draw the tiles themselves.
    pub fn render_traverse<F>(
        &mut self,
        painter: &mut dyn Painter,
        angle: f64,
        split_order: Option<i32>,
        callback: &mut F,
    ) -> Result<(), TraverseError>
    where
        F: FnMut(&mut Survey, &mut dyn Painter, i32, i32, u32, LoadFlags),
    {
        self.update();
        let mut render_order = self.render_order(painter, angle);
        let mut flags = LoadFlags::default();
        if angle < 2.0 * std::f64::consts::PI {
            flags.planet = true;
        }

        // At extreme low zoom, use the all-sky image rather than
        // downloading a full level of tiles.
        if render_order < -5 && self.allsky_image().is_some() {
            flags.force_allsky = true;
        }

        let order_min = self.order_min();
        let order_max = self.order_max().unwrap_or(MAX_RENDER_ORDER).max(order_min);
        render_order = render_order.clamp(order_min, order_max).min(MAX_RENDER_ORDER);

        let split_order = split_order
            .unwrap_or(if flags.force_allsky { 2 } else { 3 })
            .max(render_order);

        let outside = !flags.planet;
        let frame = self.frame();
        traverse(|order, pix| {
            if painter.is_tile_clipped(frame, order, pix, outside) {
                return Step::Skip;
            }
            if order < render_order {
                return Step::Descend;
            }
            let split = 1u32 << (split_order - render_order);
            callback(self, painter, order, pix, split, flags);
            Step::Skip
        })
    }

    /// Render one pass of the survey: resolve and draw every visible tile
    /// at the render order, with asynchronous decode. Returns progress
    /// counters for the pass.
    pub fn render(
        &mut self,
        painter: &mut dyn Painter,
        angle: f64,
        split_order: Option<i32>,
    ) -> Result<RenderStats, TraverseError> {
        let mut stats = RenderStats::default();
        if painter.alpha() == 0.0 {
            return Ok(stats);
        }
        if !self.is_ready() {
            return Ok(stats);
        }
        let mut visit = |survey: &mut Survey,
                         painter: &mut dyn Painter,
                         order: i32,
                         pix: i32,
                         split: u32,
                         mut flags: LoadFlags| {
            flags.load_in_thread = true;
            stats.total += 1;
            let resolved = survey.tile_texture(order, pix, flags);
            if resolved.loading_complete {
                stats.loaded += 1;
            }
            if let Some(tex) = &resolved.tex {
                painter.draw_quad(
                    survey.frame(),
                    tex,
                    &resolved.uv,
                    &resolved.proj,
                    split,
                    resolved.fade,
                );
            }
        };
        self.render_traverse(painter, angle, split_order, &mut visit)?;
        debug!(
            survey = %self.label(),
            loaded = stats.loaded,
            total = stats.total,
            "render pass"
        );
        Ok(stats)
    }
}
