//! Tile acquisition: cache lookup, fetch, decode dispatch.
//!
//! [`Survey::get_tile`] is the single entry point the resolver goes
//! through. It consults the shared cache first, then (on a miss) walks the
//! fetch/decode pipeline one non-blocking step per call. Status 0 means
//! "ask again next frame"; 404 is definitive and gets memoized in the
//! parent tile's `NO_CHILD` bits so the question is never fetched twice.

use crate::cache::{TileCache, TileKey};
use crate::coord::{TilePos, ALLSKY_ORDER};
use crate::fetch::{FetchFlags, STATUS_RETRY_LATER};
use crate::jobs::WorkerPoll;
use crate::survey::Survey;
use crate::tile::{LoadFlags, LoadedTile, TileEntry, TileFlags, TileLookup};
use std::mem;
use std::sync::{Arc, Mutex};
use tracing::warn;

impl Survey {
    /// Look up the tile at `(order, pix)`, fetching and decoding it on
    /// demand.
    ///
    /// The parent tile is always loaded before its children, both so the
    /// renderer has a fallback and so the parent's `NO_CHILD` memoization
    /// is populated top-down.
    pub fn get_tile(&mut self, order: i32, pix: i32, flags: LoadFlags) -> TileLookup {
        debug_assert!(order >= 0);
        let mut key = TileKey::new(self.hash(), order, pix);
        // All-sky rendering resolves against the virtual tiles at
        // order -1.
        if flags.force_allsky {
            key.order = ALLSKY_ORDER;
        }

        let cached = TileCache::global().lock().unwrap().get(&key);
        if let Some(tile) = cached {
            let mut settled_cost = None;
            {
                let mut entry = tile.lock().unwrap();
                if let Some(worker) = entry.loader.as_mut() {
                    if worker.poll() == WorkerPoll::Pending {
                        return TileLookup::pending();
                    }
                    let loaded = worker.take_result().unwrap_or_else(LoadedTile::empty);
                    entry.loader = None;
                    entry.flags
                        .insert(TileFlags::from_transparency(loaded.transparency));
                    if loaded.payload.is_none() {
                        warn!(survey = %self.label(), tile = %entry.pos, "tile decode failed");
                        entry.flags.insert(TileFlags::LOAD_ERROR);
                    }
                    entry.payload = loaded.payload;
                    settled_cost = Some(mem::size_of::<TileEntry>() + loaded.cost);
                }
            }
            if let Some(cost) = settled_cost {
                TileCache::global().lock().unwrap().set_cost(&key, cost);
            }
            return TileLookup::found(tile);
        }

        if flags.cached_only {
            return TileLookup::pending();
        }
        if !self.is_ready() {
            return TileLookup::pending();
        }

        // Don't bother looking for tiles outside the survey's order
        // range.
        if order < self.order_min() || self.order_max().is_some_and(|max| order > max) {
            return TileLookup::missing(404);
        }

        // Ask the parent first: it may already know this child does not
        // exist.
        if order > self.order_min() {
            let parent = self.get_tile(order - 1, pix / 4, LoadFlags::default());
            let Some(parent) = parent.tile else {
                return TileLookup::pending();
            };
            if parent.lock().unwrap().no_child(pix % 4) {
                return TileLookup::missing(404);
            }
        }

        let url = self.tile_url(order, pix);
        let mut fetch_flags = FetchFlags::accept_404();
        if order > 0 {
            fetch_flags = fetch_flags.delayed();
        }
        let response = self.fetcher.fetch(&url, fetch_flags);
        if response.is_pending() {
            return TileLookup::pending();
        }

        // Definitive absence: remember it in the parent so we never ask
        // the server again.
        if response.is_not_found() {
            if order > self.order_min() {
                let parent = self.get_tile(order - 1, pix / 4, LoadFlags::default());
                if let Some(parent) = parent.tile {
                    parent
                        .lock()
                        .unwrap()
                        .flags
                        .insert(TileFlags::no_child(pix % 4));
                }
            }
            return TileLookup::missing(response.status);
        }

        let Some(data) = response.data else {
            if response.status != STATUS_RETRY_LATER {
                warn!(url = %url, status = response.status, "cannot get tile");
            }
            return TileLookup::missing(response.status);
        };

        let mut entry = TileEntry::new(TilePos::new(order, pix), self.ops.clone());

        if flags.load_in_thread {
            let ops = self.ops.clone();
            entry.loader = Some(self.jobs.spawn(move || match ops.create(order, pix, &data) {
                Some(created) => LoadedTile {
                    payload: Some(created.payload),
                    cost: created.cost,
                    transparency: created.transparency,
                },
                None => LoadedTile::empty(),
            }));
            TileCache::global()
                .lock()
                .unwrap()
                .insert(key, entry, mem::size_of::<TileEntry>());
            self.fetcher.release(&url);
            return TileLookup::pending();
        }

        let mut cost = 0;
        match self.ops.create(order, pix, &data) {
            Some(created) => {
                entry
                    .flags
                    .insert(TileFlags::from_transparency(created.transparency));
                entry.payload = Some(created.payload);
                cost = created.cost;
            }
            None => {
                warn!(url = %url, "cannot parse tile");
                entry.flags.insert(TileFlags::LOAD_ERROR);
            }
        }
        self.fetcher.release(&url);
        let tile = TileCache::global()
            .lock()
            .unwrap()
            .insert(key, entry, mem::size_of::<TileEntry>() + cost);
        TileLookup::found(tile)
    }

    /// Install a pre-supplied tile directly into the cache, bypassing the
    /// fetch pipeline. Used to seed the virtual all-sky tiles.
    pub fn add_manual_tile(
        &mut self,
        order: i32,
        pix: i32,
        bytes: &[u8],
    ) -> Option<Arc<Mutex<TileEntry>>> {
        let key = TileKey::new(self.hash(), order, pix);
        let Some(created) = self.ops.create(order, pix, bytes) else {
            warn!(survey = %self.label(), order, pix, "cannot create manual tile");
            return None;
        };
        let mut entry = TileEntry::new(TilePos::new(order, pix), self.ops.clone());
        entry
            .flags
            .insert(TileFlags::from_transparency(created.transparency));
        entry.payload = Some(created.payload);
        let tile = TileCache::global().lock().unwrap().insert(
            key,
            entry,
            mem::size_of::<TileEntry>() + created.cost,
        );
        Some(tile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchResponse;
    use crate::jobs::JobPool;
    use crate::testutil::{null_uploader, plain_tile_png, properties_doc, ScriptedFetcher};
    use bytes::Bytes;
    use std::time::{Duration, Instant};

    /// Survey whose properties and (absent) allsky are already scripted,
    /// so the first `update` call makes it ready.
    fn ready_survey(url: &str, fetcher: &Arc<ScriptedFetcher>, order_max: i32) -> Survey {
        fetcher.script(
            &format!("{}/properties", url),
            vec![FetchResponse::ok(Bytes::from(properties_doc(order_max)))],
        );
        fetcher.script(
            &format!("{}/Norder3/Allsky.jpg?v=0", url),
            vec![FetchResponse::error(404)],
        );
        let mut survey = Survey::new(
            url,
            0.0,
            fetcher.clone(),
            Arc::new(JobPool::new().unwrap()),
            null_uploader(),
        );
        survey.update(); // properties + allsky settles
        assert!(survey.update());
        survey
    }

    #[test]
    fn test_order_range_is_definitive() {
        let fetcher = ScriptedFetcher::new();
        let mut survey = ready_survey("https://example.org/range", &fetcher, 4);
        assert_eq!(survey.get_tile(2, 0, LoadFlags::default()).status, 404);
        assert_eq!(survey.get_tile(5, 0, LoadFlags::default()).status, 404);
    }

    #[test]
    fn test_pending_fetch_returns_status_zero() {
        let url = "https://example.org/pending";
        let fetcher = ScriptedFetcher::new();
        fetcher.script(
            &format!("{}/Norder3/Dir0/Npix0.jpg", url),
            vec![FetchResponse::pending()],
        );
        let mut survey = ready_survey(url, &fetcher, 4);
        let lookup = survey.get_tile(3, 0, LoadFlags::default());
        assert!(lookup.tile.is_none());
        assert_eq!(lookup.status, 0);
    }

    #[test]
    fn test_sync_load_and_cache_hit() {
        let url = "https://example.org/sync";
        let fetcher = ScriptedFetcher::new();
        let tile_url = format!("{}/Norder3/Dir0/Npix0.jpg", url);
        fetcher.script(&tile_url, vec![FetchResponse::ok(Bytes::from(plain_tile_png()))]);
        let mut survey = ready_survey(url, &fetcher, 4);

        let lookup = survey.get_tile(3, 0, LoadFlags::default());
        assert_eq!(lookup.status, 200);
        let tile = lookup.tile.unwrap();
        assert!(tile.lock().unwrap().payload.is_some());

        // Second call answers from the cache without refetching.
        let again = survey.get_tile(3, 0, LoadFlags::default());
        assert_eq!(again.status, 200);
        assert_eq!(fetcher.calls(&tile_url), 1);
    }

    #[test]
    fn test_404_memoized_in_parent() {
        let url = "https://example.org/memo";
        let fetcher = ScriptedFetcher::new();
        fetcher.script(
            &format!("{}/Norder3/Dir0/Npix1.jpg", url),
            vec![FetchResponse::ok(Bytes::from(plain_tile_png()))],
        );
        let child_url = format!("{}/Norder4/Dir0/Npix7.jpg", url);
        fetcher.script(&child_url, vec![FetchResponse::error(404)]);
        let mut survey = ready_survey(url, &fetcher, 4);

        let lookup = survey.get_tile(4, 7, LoadFlags::default());
        assert_eq!(lookup.status, 404);

        // The parent (3, 1) now knows child 7 % 4 = 3 does not exist.
        let parent = survey.get_tile(3, 1, LoadFlags::default()).tile.unwrap();
        assert!(parent.lock().unwrap().no_child(3));

        // A second request is answered from the memo, without a fetch.
        let again = survey.get_tile(4, 7, LoadFlags::default());
        assert_eq!(again.status, 404);
        assert_eq!(fetcher.calls(&child_url), 1);
    }

    #[test]
    fn test_parent_loads_before_child() {
        let url = "https://example.org/topdown";
        let fetcher = ScriptedFetcher::new();
        let parent_url = format!("{}/Norder3/Dir0/Npix2.jpg", url);
        fetcher.script(&parent_url, vec![FetchResponse::pending()]);
        let mut survey = ready_survey(url, &fetcher, 4);

        // The child cannot resolve until the parent has loaded; no fetch
        // for the child itself is issued yet.
        let lookup = survey.get_tile(4, 8, LoadFlags::default());
        assert_eq!(lookup.status, 0);
        assert_eq!(fetcher.calls(&parent_url), 1);
        assert_eq!(fetcher.calls(&format!("{}/Norder4/Dir0/Npix8.jpg", url)), 0);
    }

    #[test]
    fn test_transparent_quadrant_marks_no_child() {
        let url = "https://example.org/transp";
        let fetcher = ScriptedFetcher::new();
        fetcher.script(
            &format!("{}/Norder3/Dir0/Npix0.jpg", url),
            vec![FetchResponse::ok(Bytes::from(
                crate::testutil::transparent_quadrant_png(1),
            ))],
        );
        let mut survey = ready_survey(url, &fetcher, 4);
        let tile = survey.get_tile(3, 0, LoadFlags::default()).tile.unwrap();
        assert!(tile.lock().unwrap().no_child(1));
        // And the memo short-circuits the corresponding child lookup.
        assert_eq!(survey.get_tile(4, 1, LoadFlags::default()).status, 404);
    }

    #[test]
    fn test_decode_failure_marks_load_error() {
        let url = "https://example.org/badimg";
        let fetcher = ScriptedFetcher::new();
        fetcher.script(
            &format!("{}/Norder3/Dir0/Npix0.jpg", url),
            vec![FetchResponse::ok(Bytes::from_static(b"not an image"))],
        );
        let mut survey = ready_survey(url, &fetcher, 4);
        let tile = survey.get_tile(3, 0, LoadFlags::default()).tile.unwrap();
        let entry = tile.lock().unwrap();
        assert!(entry.payload.is_none());
        assert!(entry.flags.contains(TileFlags::LOAD_ERROR));
    }

    #[test]
    fn test_threaded_load_completes_via_polling() {
        let url = "https://example.org/threaded";
        let fetcher = ScriptedFetcher::new();
        fetcher.script(
            &format!("{}/Norder3/Dir0/Npix0.jpg", url),
            vec![FetchResponse::ok(Bytes::from(plain_tile_png()))],
        );
        let mut survey = ready_survey(url, &fetcher, 4);

        let first = survey.get_tile(3, 0, LoadFlags::in_thread());
        assert_eq!(first.status, 0, "decode dispatched to the pool");

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let lookup = survey.get_tile(3, 0, LoadFlags::in_thread());
            if lookup.status == 200 {
                assert!(lookup.tile.unwrap().lock().unwrap().payload.is_some());
                break;
            }
            assert!(Instant::now() < deadline, "tile never finished decoding");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_cached_only_never_fetches() {
        let url = "https://example.org/cachedonly";
        let fetcher = ScriptedFetcher::new();
        let mut survey = ready_survey(url, &fetcher, 4);
        let tile_url = format!("{}/Norder3/Dir0/Npix0.jpg", url);
        let lookup = survey.get_tile(3, 0, LoadFlags::cached_only());
        assert_eq!(lookup.status, 0);
        assert_eq!(fetcher.calls(&tile_url), 0);
    }

    #[test]
    fn test_manual_tile_is_resident() {
        let url = "https://example.org/manual";
        let fetcher = ScriptedFetcher::new();
        let mut survey = ready_survey(url, &fetcher, 4);
        survey.add_manual_tile(ALLSKY_ORDER, 3, &[]).unwrap();
        let lookup = survey.get_tile(3, 3, LoadFlags {
            force_allsky: true,
            ..Default::default()
        });
        assert_eq!(lookup.status, 200);
        assert_eq!(lookup.tile.unwrap().lock().unwrap().pos.order, ALLSKY_ORDER);
    }
}
