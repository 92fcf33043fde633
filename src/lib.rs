//! SEEDS superpixel segmentation in Rust.
//!
//! This crate implements the revised SEEDS algorithm. An initial grid of
//! superpixels is refined by exchanging blocks between neighboring superpixels
//! from coarse to fine and finally pixel by pixel, scored against per-region
//! color histograms (or running means in the mean-pixel variant). Every
//! exchange updates a constant number of histogram entries, so a full run
//! stays close to linear in the pixel count.
//!
//! The following example segments a synthetic RGB image into 16 superpixels:
//!
//! ```rust
//! use seeds_rust::arrays::SampleImage;
//! use seeds_rust::common::{Config, Geometry};
//! use seeds_rust::seeds::{count_superpixels, iterate, Segmentation};
//!
//! fn main() {
//!     // two-tone test image, left half dark and right half bright
//!     let width = 32;
//!     let height = 32;
//!     let mut rgb = vec![40u8; width * height * 3];
//!     for row in rgb.chunks_exact_mut(width * 3) {
//!         for pixel in row[width / 2 * 3..].chunks_exact_mut(3) {
//!             pixel.fill(200);
//!         }
//!     }
//!     // convert to CIELAB samples
//!     let image = SampleImage::from_srgb(&rgb, width, height);
//!     // resolve a block geometry close to the requested superpixel count
//!     let geometry = Geometry::for_superpixel_count(width, height, 16).unwrap();
//!     let config = Config::default();
//!     // lay the initial grid and run the full refinement schedule
//!     let mut segmentation = Segmentation::initialize(&image, &geometry, &config).unwrap();
//!     iterate(&image, &config, &mut segmentation);
//!     assert_eq!(segmentation.labels().width, width);
//!     assert_eq!(count_superpixels(segmentation.labels()), 16);
//! }
//! ```
//!
//! The sweeps are single threaded on purpose: the exchange converges because
//! every accepted move is already visible to the next cell of the same pass.
//! Only the sRGB to CIELAB conversion fans out over rayon. Use release builds,
//! the hot loops lean on `assume!` and function multiversioning to get rid of
//! bounds checks and to use wider instruction sets where available.

pub mod arrays;
pub mod block;
pub mod cielab;
pub mod common;
pub mod connectivity;
pub mod draw;
pub mod export;
pub mod pixel;
pub mod pyramid;
pub mod seeds;
