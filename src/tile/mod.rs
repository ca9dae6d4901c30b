//! Tile entries, payloads, and the survey-supplied tile callbacks.
//!
//! A [`TileEntry`] is what the shared cache stores: the tile position, a
//! small flag set, the decoded payload (if any), and an optional handle to
//! an in-flight background decode. The payload itself is produced by the
//! owning survey's [`TileOps`] callbacks, which also decide whether a
//! payload may be freed during cache eviction.

mod image;

pub use image::{decode_image, ImageTileOps};

use crate::cache::Eviction;
use crate::coord::TilePos;
use crate::jobs::Worker;
use crate::texture::{DecodedImage, TextureHandle};
use std::sync::{Arc, Mutex};

/// Per-tile flag set.
///
/// The `NO_CHILD` bits memoize definitive knowledge that a child tile does
/// not exist (a 404 from the server, or a fully transparent quadrant), so
/// the loader never fetches it. The bits are monotonic for the lifetime of
/// the cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileFlags(u8);

impl TileFlags {
    pub const LOAD_ERROR: TileFlags = TileFlags(1 << 4);

    /// Flag marking child `i` (`0..4`) as known not to exist.
    pub fn no_child(i: i32) -> TileFlags {
        debug_assert!((0..4).contains(&i));
        TileFlags(1 << i)
    }

    /// Flags for a 4-bit transparency mask, one bit per child quadrant.
    pub fn from_transparency(mask: u8) -> TileFlags {
        TileFlags(mask & 0x0f)
    }

    pub fn contains(&self, other: TileFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: TileFlags) {
        self.0 |= other.0;
    }
}

/// Decoded payload of an image-survey tile.
///
/// The CPU-side image is dropped once it has been uploaded to a texture.
/// `allsky_tex` holds the sub-rectangle carved from the survey's all-sky
/// image when the tile itself has no imagery of its own.
#[derive(Debug, Default)]
pub struct ImageTile {
    pub image: Option<DecodedImage>,
    pub tex: Option<TextureHandle>,
    pub allsky_tex: Option<TextureHandle>,
}

/// Result of a [`TileOps::create`] call.
pub struct CreatedTile {
    pub payload: ImageTile,
    /// True payload size in bytes, used as the cache cost.
    pub cost: usize,
    /// 4-bit mask of fully transparent child quadrants.
    pub transparency: u8,
}

/// Survey-configurable tile lifecycle callbacks.
pub trait TileOps: Send + Sync {
    /// Decode `bytes` into a tile payload. Order -1 requests an empty
    /// all-sky pseudo-tile. Returns `None` when the data cannot be
    /// parsed.
    fn create(&self, order: i32, pix: i32, bytes: &[u8]) -> Option<CreatedTile>;

    /// Asked before the cache frees a payload. Answering
    /// [`Eviction::Keep`] vetoes the eviction.
    fn release(&self, payload: &mut ImageTile) -> Eviction {
        let _ = payload;
        Eviction::Drop
    }
}

/// Record produced by a background decode job, collected by the
/// foreground thread when the worker completes.
pub struct LoadedTile {
    pub(crate) payload: Option<ImageTile>,
    pub(crate) cost: usize,
    pub(crate) transparency: u8,
}

impl LoadedTile {
    pub(crate) fn empty() -> Self {
        Self {
            payload: None,
            cost: 0,
            transparency: 0,
        }
    }
}

/// A cached tile.
pub struct TileEntry {
    pub pos: TilePos,
    pub flags: TileFlags,
    /// Decoded payload; `None` while a decode is in flight or after a
    /// decode failure (`LOAD_ERROR`).
    pub payload: Option<ImageTile>,
    /// Present iff an asynchronous decode is in flight.
    pub(crate) loader: Option<Worker<LoadedTile>>,
    pub(crate) ops: Arc<dyn TileOps>,
}

impl TileEntry {
    pub fn new(pos: TilePos, ops: Arc<dyn TileOps>) -> Self {
        Self {
            pos,
            flags: TileFlags::default(),
            payload: None,
            loader: None,
            ops,
        }
    }

    /// Whether child `i` is known not to exist.
    pub fn no_child(&self, i: i32) -> bool {
        self.flags.contains(TileFlags::no_child(i))
    }

    /// Eviction verdict for this entry. A tile with an in-flight decode
    /// worker is always kept; otherwise the payload hook decides.
    pub(crate) fn on_evict(&mut self) -> Eviction {
        if self.loader.is_some() {
            return Eviction::Keep;
        }
        if let Some(payload) = &mut self.payload {
            let ops = self.ops.clone();
            if ops.release(payload) == Eviction::Keep {
                return Eviction::Keep;
            }
        }
        Eviction::Drop
    }
}

/// Behavior flags for tile lookups and rendering passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadFlags {
    /// Viewing the sphere from inside (planet rendering).
    pub planet: bool,
    /// Resolve against the all-sky pseudo-tiles at order -1.
    pub force_allsky: bool,
    /// Decode on the background pool instead of synchronously.
    pub load_in_thread: bool,
    /// Only answer from the cache; never start a fetch.
    pub cached_only: bool,
}

impl LoadFlags {
    pub fn in_thread() -> Self {
        Self {
            load_in_thread: true,
            ..Self::default()
        }
    }

    pub fn cached_only() -> Self {
        Self {
            cached_only: true,
            ..Self::default()
        }
    }
}

/// Outcome of a tile lookup.
///
/// `status` follows HTTP conventions: 0 means "not ready yet, retry next
/// frame", 200 delivers a cached entry, 404 is a definitive absence.
pub struct TileLookup {
    pub tile: Option<Arc<Mutex<TileEntry>>>,
    pub status: u16,
}

impl TileLookup {
    pub(crate) fn pending() -> Self {
        Self {
            tile: None,
            status: 0,
        }
    }

    pub(crate) fn missing(status: u16) -> Self {
        Self {
            tile: None,
            status,
        }
    }

    pub(crate) fn found(tile: Arc<Mutex<TileEntry>>) -> Self {
        Self {
            tile: Some(tile),
            status: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_no_child_bits() {
        let mut flags = TileFlags::default();
        flags.insert(TileFlags::no_child(2));
        assert!(flags.contains(TileFlags::no_child(2)));
        assert!(!flags.contains(TileFlags::no_child(0)));
        assert!(!flags.contains(TileFlags::LOAD_ERROR));
    }

    #[test]
    fn test_flags_from_transparency_masks_high_bits() {
        let flags = TileFlags::from_transparency(0xff);
        for i in 0..4 {
            assert!(flags.contains(TileFlags::no_child(i)));
        }
        assert!(!flags.contains(TileFlags::LOAD_ERROR));
    }

    #[test]
    fn test_entry_evicts_by_default() {
        let mut entry = TileEntry::new(TilePos::new(0, 0), Arc::new(ImageTileOps));
        assert_eq!(entry.on_evict(), Eviction::Drop);
        entry.payload = Some(ImageTile::default());
        assert_eq!(entry.on_evict(), Eviction::Drop);
    }
}
