//! Renderer-side painting interface.

use crate::coord::{Frame, HealpixProjector, UvQuad};
use crate::texture::TextureHandle;

/// View and drawing surface supplied by the renderer for one pass.
///
/// The engine uses it to size the render order, cull tiles against the
/// view, and emit textured quads. All calls happen on the foreground
/// thread.
pub trait Painter {
    /// Framebuffer width in pixels.
    fn fb_width(&self) -> u32;

    /// Horizontal scaling factor of the view projection.
    fn proj_scaling_x(&self) -> f64;

    /// Global alpha of the pass; 0 skips the pass entirely.
    fn alpha(&self) -> f64 {
        1.0
    }

    /// Whether the tile at `(order, pix)` lies fully outside the view.
    fn is_tile_clipped(&self, frame: Frame, order: i32, pix: i32, outside: bool) -> bool;

    /// Draw one tile quad. `split` is the tessellation factor: how many
    /// sub-quads per side the quad should be divided into to follow the
    /// projection curvature.
    fn draw_quad(
        &mut self,
        frame: Frame,
        tex: &TextureHandle,
        uv: &UvQuad,
        proj: &HealpixProjector,
        split: u32,
        fade: f64,
    );
}
