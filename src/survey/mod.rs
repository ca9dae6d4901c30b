//! Survey descriptor and lifecycle.
//!
//! A [`Survey`] owns everything needed to locate and decode one HiPS
//! survey: the service URL, the metadata from the `properties` file, the
//! tile format and order range, and the low-resolution all-sky image used
//! as a last-resort fallback.
//!
//! Readiness is polled: [`Survey::update`] is called every frame (directly
//! or through [`Survey::is_ready`]) and advances a small state machine,
//! first acquiring the properties file and then the all-sky image, one
//! non-blocking step per frame. A survey whose properties cannot be
//! fetched or parsed becomes permanently not-ready.

mod date;
mod hipslist;
mod loader;
mod properties;

pub use date::parse_hips_date;
pub use hipslist::{parse_hipslist, SurveyListEntry};
pub use properties::{PropertiesError, TileFormat};

use crate::coord::{Frame, ALLSKY_ORDER, BASE_PIX_COUNT};
use crate::fetch::{AssetFetcher, FetchFlags};
use crate::jobs::{JobPool, Worker, WorkerPoll};
use crate::texture::{DecodedImage, TextureUploader};
use crate::tile::{decode_image, ImageTileOps, TileOps};
use properties::{parse_properties, ParsedProperties};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Stable CRC-32 (IEEE) used to derive the cache partition hash from a
/// survey URL.
fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xffff_ffffu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xedb8_8320 & mask);
        }
    }
    !crc
}

/// Acquisition state of the survey's all-sky image.
enum AllskyState {
    /// Nothing requested yet.
    Unknown,
    /// Byte fetch in flight.
    Fetching,
    /// Bytes received; decode running on the background pool.
    Decoding(Worker<Option<DecodedImage>>),
    /// Decoded and usable as a fallback.
    Ready(DecodedImage),
    /// The survey has no all-sky image (404, empty body, or decode
    /// failure).
    NotAvailable,
}

/// One HiPS survey.
pub struct Survey {
    url: String,
    service_url: String,
    format: TileFormat,
    /// Release date in MJD days; 0 means unknown (no cache-busting).
    release_date: f64,
    /// Set when properties acquisition failed; the survey is then
    /// permanently not-ready.
    error: bool,
    label: Option<String>,
    frame: Frame,
    hash: u32,
    properties: Option<HashMap<String, String>>,
    order_max: Option<i32>,
    order_min: i32,
    tile_width: Option<i32>,
    allsky: AllskyState,
    pub(crate) ops: Arc<dyn TileOps>,
    pub(crate) uploader: Arc<dyn TextureUploader>,
    pub(crate) fetcher: Arc<dyn AssetFetcher>,
    pub(crate) jobs: Arc<JobPool>,
}

impl Survey {
    /// Create a survey rooted at `url`.
    ///
    /// `release_date` (MJD days, 0 when unknown) seeds the cache-busting
    /// query until the properties file provides its own.
    pub fn new(
        url: impl Into<String>,
        release_date: f64,
        fetcher: Arc<dyn AssetFetcher>,
        jobs: Arc<JobPool>,
        uploader: Arc<dyn TextureUploader>,
    ) -> Self {
        let url = url.into();
        Self {
            hash: crc32(url.as_bytes()),
            service_url: url.clone(),
            url,
            format: TileFormat::default(),
            release_date,
            error: false,
            label: None,
            frame: Frame::default(),
            properties: None,
            order_max: None,
            order_min: 3,
            tile_width: None,
            allsky: AllskyState::Unknown,
            ops: Arc::new(ImageTileOps),
            uploader,
            fetcher,
            jobs,
        }
    }

    /// Replace the tile lifecycle callbacks.
    pub fn with_ops(mut self, ops: Arc<dyn TileOps>) -> Self {
        self.ops = ops;
        self
    }

    /// Set the reference frame the imagery is expressed in.
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frame = frame;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    /// Cache partition hash of this survey.
    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn set_frame(&mut self, frame: Frame) {
        self.frame = frame;
    }

    /// Short label for progress reporting: explicit, else derived from
    /// the properties, else the URL.
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.url)
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = Some(label.into());
    }

    /// Lowest order tiles exist at.
    pub fn order_min(&self) -> i32 {
        self.order_min
    }

    /// Deepest order the survey advertises, when known.
    pub fn order_max(&self) -> Option<i32> {
        self.order_max
    }

    /// Tile edge length in pixels (256 when the survey does not say).
    pub fn tile_width(&self) -> i32 {
        self.tile_width.unwrap_or(256)
    }

    pub fn release_date(&self) -> f64 {
        self.release_date
    }

    pub fn format(&self) -> TileFormat {
        self.format
    }

    /// The full properties bag, once acquired.
    pub fn properties(&self) -> Option<&HashMap<String, String>> {
        self.properties.as_ref()
    }

    /// The decoded all-sky image, once ready.
    pub(crate) fn allsky_image(&self) -> Option<&DecodedImage> {
        match &self.allsky {
            AllskyState::Ready(image) => Some(image),
            _ => None,
        }
    }

    /// True once the properties are in and the all-sky acquisition has
    /// settled. Equivalent to [`Survey::update`]; call once per frame.
    pub fn is_ready(&mut self) -> bool {
        self.update()
    }

    /// Advance the acquisition state machine by one non-blocking step.
    /// Returns true once the survey is usable.
    pub fn update(&mut self) -> bool {
        if self.error {
            return false;
        }
        if self.properties.is_none() {
            match self.acquire_properties() {
                Ok(true) => {}
                Ok(false) => return false,
                Err(err) => {
                    error!(survey = %self.url, error = %err, "cannot acquire hips properties");
                    self.error = true;
                    return false;
                }
            }
        }
        self.update_allsky()
    }

    /// URL of a file within the survey, with the release date appended as
    /// a cache-busting query for online surveys.
    pub fn url_for(&self, path: &str) -> String {
        let mut url = format!("{}/{}", self.service_url, path);
        if self.release_date != 0.0
            && (self.service_url.starts_with("http://") || self.service_url.starts_with("https://"))
        {
            url.push_str(&format!("?v={}", self.release_date as i64));
        }
        url
    }

    /// URL of the tile at `(order, pix)`.
    pub fn tile_url(&self, order: i32, pix: i32) -> String {
        self.url_for(&format!(
            "Norder{}/Dir{}/Npix{}.{}",
            order,
            (pix / 10_000) * 10_000,
            pix,
            self.format.ext()
        ))
    }

    fn allsky_url(&self) -> String {
        format!(
            "{}/Norder{}/Allsky.{}?v={}",
            self.service_url,
            self.order_min,
            self.format.ext(),
            self.release_date as i64
        )
    }

    /// Poll the properties fetch. `Ok(true)` once applied, `Ok(false)`
    /// while in flight.
    fn acquire_properties(&mut self) -> Result<bool, PropertiesError> {
        let url = self.url_for("properties");
        let response = self.fetcher.fetch(&url, FetchFlags::default());
        if response.is_pending() {
            return Ok(false);
        }
        let Some(data) = response.data else {
            return Err(PropertiesError::Fetch(response.status));
        };
        let text = String::from_utf8_lossy(&data).into_owned();
        self.fetcher.release(&url);
        let parsed = parse_properties(&text)?;
        self.apply_properties(parsed);
        Ok(true)
    }

    fn apply_properties(&mut self, parsed: ParsedProperties) {
        if let Some(order_max) = parsed.order_max {
            self.order_max = Some(order_max);
        }
        if let Some(order_min) = parsed.order_min {
            self.order_min = order_min;
        }
        if let Some(width) = parsed.tile_width {
            self.tile_width = Some(width);
        }
        if let Some(date) = parsed.release_date {
            self.release_date = date;
        }
        if let Some(format) = parsed.format {
            self.format = format;
            if format == TileFormat::Eph {
                self.allsky = AllskyState::NotAvailable;
            }
        }
        self.properties = Some(parsed.all);
        self.init_label();
    }

    fn init_label(&mut self) {
        if self.label.is_some() {
            return;
        }
        let props = self.properties.as_ref();
        let derived = props
            .and_then(|p| p.get("obs_collection"))
            .or_else(|| props.and_then(|p| p.get("obs_title")));
        self.label = Some(derived.cloned().unwrap_or_else(|| self.url.clone()));
    }

    /// Drive the all-sky acquisition. Returns true once it has settled
    /// (ready or not available).
    fn update_allsky(&mut self) -> bool {
        if matches!(self.allsky, AllskyState::Unknown | AllskyState::Fetching) {
            return self.poll_allsky_fetch();
        }
        if matches!(self.allsky, AllskyState::Decoding(_)) {
            return self.poll_allsky_decode();
        }
        true
    }

    fn poll_allsky_fetch(&mut self) -> bool {
        let url = self.allsky_url();
        let response = self.fetcher.fetch(&url, FetchFlags::default());
        if response.is_pending() {
            self.allsky = AllskyState::Fetching;
            return false;
        }
        match response.data {
            Some(data) => {
                let worker = self.jobs.spawn(move || decode_image(&data));
                self.allsky = AllskyState::Decoding(worker);
            }
            None => {
                debug!(survey = %self.url, status = response.status, "no allsky image");
                self.allsky = AllskyState::NotAvailable;
            }
        }
        self.fetcher.release(&url);
        false
    }

    fn poll_allsky_decode(&mut self) -> bool {
        let AllskyState::Decoding(worker) = &mut self.allsky else {
            return true;
        };
        if worker.poll() == WorkerPoll::Pending {
            return false;
        }
        match worker.take_result().flatten() {
            Some(image) => {
                self.add_allsky_tiles();
                self.allsky = AllskyState::Ready(image);
            }
            None => {
                warn!(survey = %self.url, "cannot decode allsky image");
                self.allsky = AllskyState::NotAvailable;
            }
        }
        true
    }

    /// Seed the twelve virtual all-sky tiles at order -1, with no image
    /// data of their own.
    fn add_allsky_tiles(&mut self) {
        for pix in 0..BASE_PIX_COUNT {
            self.add_manual_tile(ALLSKY_ORDER, pix, &[]);
        }
    }
}
