//! Gray-scale mean shift segmentation in Rust.
//!
//! This crate segments a single-channel image into regions of similar intensity.
//! Every pixel runs a weighted-mean ascent (mean shift) until the trajectory
//! stabilizes on a mode of the intensity surface, landings are deduplicated into a
//! peak table, and peaks with close intensities are then merged transitively into
//! final regions.
//!
//! The crate is the numerical core only: image decoding, color conversion and any
//! rendering of the result are the caller's job. The input is a plain `f32`
//! intensity grid, the output a peak table plus a per-pixel peak-id grid. Display
//! policies like suppressing peaks with few members belong downstream; exact
//! member counts are exposed so any threshold can be applied there.
//!
//! The following example segments a synthetic image and merges close regions:
//!
//! ```rust
//! use mean_shift_rust::arrays::GrayImage;
//! use mean_shift_rust::common::Config;
//! use mean_shift_rust::merge::merge_regions;
//! use mean_shift_rust::search::search;
//! use mean_shift_rust::weights::WeightModel;
//!
//! fn main() {
//!     // two intensity blocks, out of each other's bandwidth
//!     let data: Vec<f32> = (0..32)
//!         .map(|i| if i % 8 < 4 { 10.0 } else { 200.0 })
//!         .collect();
//!     let image = GrayImage::from_slice(&data, 8, 4).unwrap();
//!     // flat kernels: 5x5 window, 50 intensity levels of bandwidth
//!     let weights = WeightModel::uniform(2, 50.0).unwrap();
//!     let config = Config::default();
//!     let mut segmentation = search(&image, &config, &weights).unwrap();
//!     assert_eq!(segmentation.peaks.len(), 2);
//!     // a threshold spanning both block values collapses them into one region
//!     merge_regions(&mut segmentation, 200.0);
//!     assert_eq!(segmentation.peaks.len(), 1);
//! }
//! ```
//!
//! The ascent phase is embarrassingly parallel and runs on a rayon row-chunked
//! scope by default; the landing dedup is the only serialization point and always
//! runs single-threaded in a fixed order, so results are identical for any thread
//! count. The dominant cost is the windowed accumulation,
//! `O(width * height * max_iterations * (2 * radius + 1)^2)`; spatial weights are
//! precomputed into a LUT and the per-pixel iteration cap bounds the worst case.
//!
//! It's strongly recommended to use this in release build.

pub mod arrays;
pub mod common;
pub mod merge;
pub mod peak;
pub mod search;
pub mod weights;
