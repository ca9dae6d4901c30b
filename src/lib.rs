//! HipsLayer - Progressive sky-survey tile streaming
//!
//! This library implements the tile caching and progressive-refinement
//! engine used to deliver on-demand imagery from a pyramidal sky-survey
//! (HiPS) source to a realtime renderer.
//!
//! A survey is a quad-tree of square image tiles addressed by
//! `(order, pix)` on the HEALPix sphere partition, optionally backed by a
//! low-resolution all-sky image covering the twelve base faces. The engine
//! keeps a bounded, cost-weighted in-memory cache of decoded tiles shared
//! by all surveys, orchestrates asynchronous fetch and decode, and answers
//! "best tile available right now" queries with ancestor or all-sky
//! fallbacks so the renderer always has something meaningful to draw.
//!
//! # High-Level API
//!
//! ```ignore
//! use hipslayer::fetch::HttpFetcher;
//! use hipslayer::jobs::JobPool;
//! use hipslayer::survey::Survey;
//! use std::sync::Arc;
//!
//! let jobs = Arc::new(JobPool::new()?);
//! let fetcher = Arc::new(HttpFetcher::new(jobs.clone())?);
//! let mut survey = Survey::new(
//!     "https://alasky.cds.unistra.fr/DSS/DSSColor",
//!     0.0,
//!     fetcher,
//!     jobs,
//!     uploader,
//! );
//!
//! // Each frame:
//! survey.render(&mut painter, angle, None)?;
//! ```
//!
//! The engine never blocks the render thread: every "not ready yet" is a
//! sentinel status the caller revisits next frame.

pub mod cache;
pub mod coord;
pub mod fetch;
pub mod jobs;
pub mod logging;
pub mod render;
pub mod survey;
pub mod texture;
pub mod tile;

#[cfg(test)]
pub(crate) mod testutil;

/// Version of the HipsLayer library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
