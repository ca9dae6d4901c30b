//! Best-tile resolution with ancestor and all-sky fallback.

use crate::coord::{child_uv_mat, HealpixProjector, Mat3, TilePos, UvQuad, UV_INSIDE, UV_OUTSIDE};
use crate::fetch::STATUS_RETRY_LATER;
use crate::survey::Survey;
use crate::texture::{SubRect, TextureHandle};
use crate::tile::{LoadFlags, TileEntry};
use std::sync::{Arc, Mutex};

/// Answer to a [`Survey::tile_texture`] query.
///
/// `uv` and `proj` are always valid, even when `tex` is absent, so the
/// renderer can still draw a placeholder with the correct footprint.
#[derive(Debug, Clone)]
pub struct TileTexture {
    /// Best texture available right now, if any.
    pub tex: Option<TextureHandle>,
    /// UV corners into `tex`; a sub-rectangle when an ancestor tile was
    /// substituted.
    pub uv: UvQuad,
    /// Projector set up for the tile that was actually resolved.
    pub proj: HealpixProjector,
    /// Recommended fade alpha.
    pub fade: f64,
    /// True once nothing better can be expected for this request: either
    /// the ideal tile is loaded, or its absence is definitive.
    pub loading_complete: bool,
}

impl Survey {
    /// Resolve the best texture available right now for the tile at
    /// `(order, pix)`.
    ///
    /// If the tile is loaded its texture is returned directly. Otherwise
    /// the nearest loaded ancestor stands in, with `uv` remapped onto the
    /// sub-rectangle the requested tile occupies in it. With
    /// [`LoadFlags::force_allsky`], base-order tiles with no imagery of
    /// their own are carved out of the survey's all-sky image instead.
    pub fn tile_texture(&mut self, order: i32, pix: i32, flags: LoadFlags) -> TileTexture {
        let outside = !flags.planet;
        let mut out = TileTexture {
            tex: None,
            uv: if outside { UV_OUTSIDE } else { UV_INSIDE },
            proj: HealpixProjector::new(order, pix, outside),
            fade: 1.0,
            loading_complete: false,
        };
        let mut rend_order = order;
        let mut rend_pix = pix;
        out.tex = self.resolve_texture(
            order,
            pix,
            flags,
            &mut out.uv,
            &mut out.loading_complete,
            &mut rend_order,
            &mut rend_pix,
        );
        out.proj = HealpixProjector::new(rend_order, rend_pix, outside);
        out
    }

    /// Look up a tile and keep it only when its payload has actually
    /// arrived; the status is still reported for definitive failures.
    fn loaded_tile(
        &mut self,
        order: i32,
        pix: i32,
        flags: LoadFlags,
    ) -> (Option<Arc<Mutex<TileEntry>>>, u16) {
        let lookup = self.get_tile(order, pix, flags);
        match lookup.tile {
            Some(tile) => {
                let has_payload = tile.lock().unwrap().payload.is_some();
                (has_payload.then_some(tile), lookup.status)
            }
            None => (None, lookup.status),
        }
    }

    fn resolve_texture(
        &mut self,
        order: i32,
        pix: i32,
        flags: LoadFlags,
        uv: &mut UvQuad,
        loading_complete: &mut bool,
        rend_order: &mut i32,
        rend_pix: &mut i32,
    ) -> Option<TextureHandle> {
        if !self.is_ready() {
            return None;
        }

        let mut tile = None;
        if self.order_max().map_or(true, |max| order <= max) {
            let (found, status) = self.loaded_tile(order, pix, flags);
            if found.is_none() && status != 0 && status != STATUS_RETRY_LATER {
                // The tile definitively doesn't exist; nothing better
                // will ever come.
                *loading_complete = true;
                return None;
            }
            tile = found;
        }

        // Walk up the tree looking for a loaded ancestor, accumulating
        // the UV transform as we go.
        let mut mat = Mat3::IDENTITY;
        let (mut o, mut p) = (order, pix);
        while tile.is_none() && o > self.order_min() {
            mat = child_uv_mat(p % 4, &mat);
            o -= 1;
            p /= 4;
            if self.order_max().map_or(true, |max| o <= max) {
                tile = self.loaded_tile(o, p, flags).0;
            }
        }
        // Not even an ancestor; leave the defaults for the requested
        // position and give up for this frame.
        let tile = tile?;
        *rend_order = o;
        *rend_pix = p;

        if o == order.min(self.order_max().unwrap_or(order)) {
            *loading_complete = true;
        }

        for corner in uv.iter_mut() {
            *corner = mat.apply(*corner);
        }

        let uploader = self.uploader.clone();
        let order_min = self.order_min();
        let mut entry = tile.lock().unwrap();
        let payload = entry.payload.as_mut()?;

        // Promote the decoded image to a texture on first use and drop
        // the CPU-side buffer.
        if payload.tex.is_none() {
            if let Some(image) = payload.image.take() {
                payload.tex = Some(uploader.upload(&image, SubRect::full(image.width, image.height)));
            }
        }

        // Carve the all-sky cell for base-order tiles that have no
        // imagery of their own.
        if flags.force_allsky
            && o == order_min
            && payload.tex.is_none()
            && payload.allsky_tex.is_none()
        {
            if let Some(allsky) = self.allsky_image() {
                let nbw = (TilePos::npix(order_min) as f64).sqrt() as i32;
                let w = allsky.width as i32;
                let cell = SubRect {
                    x: ((p % nbw) * w / nbw) as u32,
                    y: ((p / nbw) * w / nbw) as u32,
                    w: (w / nbw) as u32,
                    h: (w / nbw) as u32,
                };
                payload.allsky_tex = Some(uploader.upload(allsky, cell));
            }
        }

        payload.tex.clone().or_else(|| payload.allsky_tex.clone())
    }
}
