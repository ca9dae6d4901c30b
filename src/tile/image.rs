//! Default tile callbacks for image surveys.

use crate::cache::Eviction;
use crate::coord::ALLSKY_ORDER;
use crate::texture::DecodedImage;
use crate::tile::{CreatedTile, ImageTile, TileOps};
use tracing::warn;

/// Decode an encoded image (jpeg, png, webp) into a tightly packed
/// RGB or RGBA buffer. Returns `None` when the data cannot be parsed.
pub fn decode_image(bytes: &[u8]) -> Option<DecodedImage> {
    let img = match image::load_from_memory(bytes) {
        Ok(img) => img,
        Err(err) => {
            warn!(error = %err, "cannot parse image");
            return None;
        }
    };
    let (width, height) = (img.width(), img.height());
    if img.color().has_alpha() {
        Some(DecodedImage {
            data: img.to_rgba8().into_raw(),
            width,
            height,
            bpp: 4,
        })
    } else {
        Some(DecodedImage {
            data: img.to_rgb8().into_raw(),
            width,
            height,
            bpp: 3,
        })
    }
}

/// A quadrant is transparent iff the image has an alpha channel and every
/// pixel in the quadrant has alpha zero.
fn quadrant_is_transparent(img: &DecodedImage, x0: u32, y0: u32, w: u32, h: u32) -> bool {
    if img.bpp < 4 {
        return false;
    }
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            if img.alpha_at(x, y) != 0 {
                return false;
            }
        }
    }
    true
}

/// Default [`TileOps`] for image surveys.
///
/// Decodes tile bytes with the image codec, reports a per-quadrant
/// transparency mask (a fully transparent quadrant is definitionally
/// childless), and a cost of `w * h * bpp` bytes. Order -1 yields the
/// empty all-sky pseudo-tile payload.
pub struct ImageTileOps;

impl TileOps for ImageTileOps {
    fn create(&self, order: i32, _pix: i32, bytes: &[u8]) -> Option<CreatedTile> {
        if order == ALLSKY_ORDER {
            return Some(CreatedTile {
                payload: ImageTile::default(),
                cost: 0,
                transparency: 0,
            });
        }
        let img = decode_image(bytes)?;
        let (w2, h2) = (img.width / 2, img.height / 2);
        let mut transparency = 0u8;
        for i in 0..4u32 {
            let x = (i / 2) * w2;
            let y = (i % 2) * h2;
            if quadrant_is_transparent(&img, x, y, w2, h2) {
                transparency |= 1 << i;
            }
        }
        let cost = (img.width * img.height * img.bpp) as usize;
        Some(CreatedTile {
            payload: ImageTile {
                image: Some(img),
                tex: None,
                allsky_tex: None,
            },
            cost,
            transparency,
        })
    }

    fn release(&self, _payload: &mut ImageTile) -> Eviction {
        // Dropping the payload releases the texture handles; nothing pins
        // an image tile once its decode has finished.
        Eviction::Drop
    }
}
