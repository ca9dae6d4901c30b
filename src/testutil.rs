//! Shared helpers for unit tests: a scripted fetcher, mock uploaders, and
//! in-memory image fixtures.

use crate::fetch::{AssetFetcher, FetchFlags, FetchResponse};
use crate::texture::{DecodedImage, SubRect, Texture, TextureHandle, TextureUploader};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

/// Fetcher that answers from pre-scripted response sequences.
///
/// Each fetch for a URL pops the next scripted response; the last one
/// repeats forever. URLs with no script answer 404. Call counts are
/// recorded so tests can assert that memoization suppressed a fetch.
pub(crate) struct ScriptedFetcher {
    responses: Mutex<HashMap<String, VecDeque<FetchResponse>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        })
    }

    pub fn script(&self, url: &str, responses: Vec<FetchResponse>) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), responses.into());
    }

    /// Number of fetch calls observed for `url`.
    pub fn calls(&self, url: &str) -> usize {
        *self.calls.lock().unwrap().get(url).unwrap_or(&0)
    }
}

impl AssetFetcher for ScriptedFetcher {
    fn fetch(&self, url: &str, _flags: FetchFlags) -> FetchResponse {
        *self.calls.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
        let mut responses = self.responses.lock().unwrap();
        match responses.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(FetchResponse::error(404)),
            None => FetchResponse::error(404),
        }
    }

    fn release(&self, _url: &str) {}
}

#[derive(Debug)]
struct MockTexture {
    w: u32,
    h: u32,
}

impl Texture for MockTexture {
    fn width(&self) -> u32 {
        self.w
    }

    fn height(&self) -> u32 {
        self.h
    }
}

/// Uploader that records the region of every upload.
#[derive(Default)]
pub(crate) struct RecordingUploader {
    pub uploads: Mutex<Vec<SubRect>>,
}

impl TextureUploader for RecordingUploader {
    fn upload(&self, _image: &DecodedImage, region: SubRect) -> TextureHandle {
        self.uploads.lock().unwrap().push(region);
        Arc::new(MockTexture {
            w: region.w,
            h: region.h,
        })
    }
}

/// Uploader for tests that don't care about uploads.
pub(crate) fn null_uploader() -> Arc<dyn TextureUploader> {
    Arc::new(RecordingUploader::default())
}

fn png_bytes(img: DynamicImage) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// A small opaque RGB tile.
pub(crate) fn plain_tile_png() -> Vec<u8> {
    png_bytes(DynamicImage::ImageRgb8(RgbImage::from_pixel(
        4,
        4,
        Rgb([128, 128, 128]),
    )))
}

/// A 4x4 RGBA tile whose quadrant `i` is fully transparent.
pub(crate) fn transparent_quadrant_png(i: u32) -> Vec<u8> {
    let mut img = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
    let x0 = (i / 2) * 2;
    let y0 = (i % 2) * 2;
    for y in y0..y0 + 2 {
        for x in x0..x0 + 2 {
            img.put_pixel(x, y, Rgba([0, 0, 0, 0]));
        }
    }
    png_bytes(DynamicImage::ImageRgba8(img))
}

/// An opaque RGB image of the given size, for allsky fixtures.
pub(crate) fn allsky_png(width: u32, height: u32) -> Vec<u8> {
    png_bytes(DynamicImage::ImageRgb8(RgbImage::from_pixel(
        width,
        height,
        Rgb([10, 20, 30]),
    )))
}

/// A minimal properties document advertising `order_max`.
pub(crate) fn properties_doc(order_max: i32) -> String {
    format!(
        "obs_collection = Test survey\nhips_order = {}\nhips_order_min = 3\nhips_tile_format = jpeg\n",
        order_max
    )
}
