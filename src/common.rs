use std::ops::Range;
use thiserror::Error;

/// Errors reported while building images, resolving a block geometry or
/// initializing a segmentation.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// Images without pixels cannot be segmented.
    #[error("image dimensions {width}x{height} must be non-zero")]
    EmptyImage { width: usize, height: usize },
    /// Only grayscale and three-channel images are supported.
    #[error("expected 1 or 3 channels, got {0}")]
    UnsupportedChannelCount(usize),
    /// The sample buffer does not match the declared image shape.
    #[error("sample buffer holds {got} bytes, {want} needed for a {width}x{height} image with {channels} channels")]
    SampleCountMismatch {
        got: usize,
        want: usize,
        width: usize,
        height: usize,
        channels: usize,
    },
    /// The slice cannot fill an array of the requested shape.
    #[error("slice of {got} elements cannot fill a {width}x{height} array")]
    DimensionMismatch {
        got: usize,
        width: usize,
        height: usize,
    },
    /// The pyramid needs at least one block level below the superpixel level.
    #[error("{0} levels requested, at least 2 needed")]
    TooFewLevels(u32),
    /// Base blocks must contain at least one pixel.
    #[error("base blocks must be non-empty, got {width}x{height}")]
    EmptyBlock { width: usize, height: usize },
    /// Blocks at the top level must fit at least twice into each image dimension,
    /// otherwise there is nothing to exchange.
    #[error("{block_width}x{block_height} base blocks over {levels} levels do not fit twice into a {width}x{height} image")]
    BlockTooLarge {
        block_width: usize,
        block_height: usize,
        levels: u32,
        width: usize,
        height: usize,
    },
    /// A geometry resolved for one image shape cannot segment another.
    #[error("geometry was resolved for {geometry_width}x{geometry_height}, image is {image_width}x{image_height}")]
    GeometryMismatch {
        geometry_width: usize,
        geometry_height: usize,
        image_width: usize,
        image_height: usize,
    },
    /// Histograms need at least one bin per channel.
    #[error("number of histogram bins must be non-zero")]
    ZeroBins,
    /// The confidence margin for block moves cannot be negative.
    #[error("minimum confidence {0} must be non-negative")]
    NegativeConfidence(f32),
    /// The spatial term weight blends two scores and must stay in `0.0..=1.0`.
    #[error("spatial weight {0} outside 0.0..=1.0")]
    SpatialWeightOutOfRange(f32),
}

/// How sample values are mapped to histogram bins.
#[derive(Clone, PartialEq, Debug, Copy)]
pub enum Binning {
    /// Fixed-width bins, every bin covers `ceil(256 / bins)` consecutive sample values.
    ///
    /// Cheap to compute, but wastes bins on sample ranges the image never uses.
    Uniform,
    /// Equal-population bins derived from the cumulative sample distribution, which is
    /// estimated on a coarse subsample (every fifth row and column).
    ///
    /// This is the default since it spends bins where the image actually has mass,
    /// making the histogram scores more discriminative on low-contrast images.
    Equalized,
}

/// Scoring used by the pixel refinement passes.
///
/// Block passes always score by histogram intersection, this only selects how single
/// pixels are judged once the descent reaches pixel resolution.
#[derive(Clone, PartialEq, Debug, Copy)]
pub enum PixelUpdate {
    /// Probability that the pixel's bin belongs to the candidate superpixel,
    /// `histogram[bin] / pixels`. Fully discrete and fast.
    Histogram,
    /// Squared distance between the pixel and the candidate superpixel mean, optionally
    /// blended with a squared spatial distance (see `Config::spatial_weight`).
    ///
    /// Produces smoother boundaries at the cost of maintaining running mean sums.
    MeanPixel,
}

/// How an accepted move re-arms the spatial memory around the moved cell.
#[derive(Clone, PartialEq, Debug, Copy)]
pub enum MemoryPolicy {
    /// Re-examine the moved cell and all four neighbors on the next sweep.
    Eager,
    /// Re-examine the moved cell, but a neighbor only while it still carries a label
    /// different from the new one. Sweeps touch fewer cells and converge a bit earlier,
    /// at a small quality cost on noisy images.
    Boundary,
}

/// Main config for the segmentation.
///
/// The defaults match what the command line tool uses, except for `pixel_update`
/// where the library defaults to the cheaper histogram scoring.
#[derive(Clone)]
pub struct Config {
    /// Number of histogram bins per channel. The histograms hold `bins^channels`
    /// entries, so large values get expensive for color images quickly.
    ///
    /// Around 5 bins per channel is enough in practice.
    pub number_of_bins: usize,
    /// How sample values are mapped to bins, see [`Binning`].
    pub binning: Binning,
    /// Scoring for the pixel refinement passes, see [`PixelUpdate`].
    pub pixel_update: PixelUpdate,
    /// Re-arming scheme for the spatial memory, see [`MemoryPolicy`].
    pub memory_policy: MemoryPolicy,
    /// Half-width of the window used by the smoothing prior when scoring pixel moves.
    /// Zero disables the prior.
    ///
    /// The window spans both the current and the candidate pixel, so the prior always
    /// sees at least one cell of each label.
    pub neighborhood_size: usize,
    /// A block move is only accepted when the candidate score beats the current score
    /// by more than this margin. Larger values keep more of the initial grid.
    pub minimum_confidence: f32,
    /// Weight of the spatial term when `pixel_update` is `MeanPixel`, in `0.0..=1.0`.
    /// Zero scores by color alone, one by position alone.
    pub spatial_weight: f32,
    /// Sweeps per block level. The pixel refinement runs twice as many sweeps.
    pub iterations: u32,
    /// A superpixel is never shrunk to this many sublabels (blocks at block levels,
    /// pixels at pixel level) or fewer, which keeps superpixels from vanishing.
    pub minimum_sublabels: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            number_of_bins: 5,
            binning: Binning::Equalized,
            pixel_update: PixelUpdate::Histogram,
            memory_policy: MemoryPolicy::Eager,
            neighborhood_size: 1,
            minimum_confidence: 0.1,
            spatial_weight: 0.25,
            iterations: 2,
            minimum_sublabels: 1,
        }
    }
}

impl Config {
    /// Checks the numeric preconditions. [`crate::seeds::Segmentation::initialize`]
    /// calls this, so manual use is only needed when a config is built long before
    /// the segmentation runs.
    pub fn validate(&self) -> Result<(), Error> {
        if self.number_of_bins == 0 {
            return Err(Error::ZeroBins);
        }
        if self.minimum_confidence < 0.0 {
            return Err(Error::NegativeConfidence(self.minimum_confidence));
        }
        if !(0.0..=1.0).contains(&self.spatial_weight) {
            return Err(Error::SpatialWeightOutOfRange(self.spatial_weight));
        }
        Ok(())
    }
}

/// Block layout of the label pyramid.
///
/// Blocks at level _l_ are _block_width(1) * 2^(l - 1)_ pixels wide, the grid at
/// level _l_ has _floor(width / block width)_ columns and blocks in the last column
/// and row absorb the remainder pixels. The grid at the top level is the initial
/// superpixel grid.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Geometry {
    /// Image width in pixels.
    pub width: usize,
    /// Image height in pixels.
    pub height: usize,
    /// Number of pyramid levels including the superpixel level.
    pub levels: u32,
    /// Block width at level 1.
    pub min_block_width: usize,
    /// Block height at level 1.
    pub min_block_height: usize,
}

impl Geometry {
    /// Validates an explicit layout.
    ///
    /// At least two levels are needed (one block pass plus the pixel pass) and the
    /// top-level block has to fit at least twice into each image dimension.
    pub fn new(
        width: usize,
        height: usize,
        levels: u32,
        block_width: usize,
        block_height: usize,
    ) -> Result<Self, Error> {
        if width == 0 || height == 0 {
            return Err(Error::EmptyImage { width, height });
        }
        if levels < 2 {
            return Err(Error::TooFewLevels(levels));
        }
        if block_width == 0 || block_height == 0 {
            return Err(Error::EmptyBlock {
                width: block_width,
                height: block_height,
            });
        }
        let block_too_large = || Error::BlockTooLarge {
            block_width,
            block_height,
            levels,
            width,
            height,
        };
        let shift = levels - 1;
        if shift >= usize::BITS
            || (block_width << shift) >> shift != block_width
            || (block_height << shift) >> shift != block_height
        {
            return Err(block_too_large());
        }
        if (block_width << shift) > width / 2 || (block_height << shift) > height / 2 {
            return Err(block_too_large());
        }
        Ok(Self {
            width,
            height,
            levels,
            min_block_width: block_width,
            min_block_height: block_height,
        })
    }

    /// Searches for the layout whose superpixel grid comes closest to `superpixels`.
    ///
    /// Candidates are base blocks of 2 to 4 pixels per side (at most one pixel
    /// difference between the sides) over 2 to 12 levels. The first candidate in
    /// scan order wins ties, so equal requests resolve to the same layout.
    pub fn for_superpixel_count(
        width: usize,
        height: usize,
        superpixels: usize,
    ) -> Result<Self, Error> {
        if width == 0 || height == 0 {
            return Err(Error::EmptyImage { width, height });
        }
        let mut best = (2usize, 2usize, 2u32);
        let mut minimum_difference = usize::MAX;
        for block_width in 2..=4usize {
            for block_height in 2..=4usize {
                if block_width.abs_diff(block_height) > 1 {
                    continue;
                }
                for levels in 2..=12u32 {
                    let cols = width / (block_width << (levels - 1));
                    let rows = height / (block_height << (levels - 1));
                    let difference = superpixels.abs_diff(cols * rows);
                    if difference < minimum_difference {
                        minimum_difference = difference;
                        best = (block_width, block_height, levels);
                    }
                }
            }
        }
        Self::new(width, height, best.2, best.0, best.1)
    }

    /// Block width in pixels at `level`.
    #[inline(always)]
    pub fn block_width(&self, level: u32) -> usize {
        debug_assert!(level >= 1 && level <= self.levels, "level {level} out of range");
        self.min_block_width << (level - 1)
    }

    /// Block height in pixels at `level`.
    #[inline(always)]
    pub fn block_height(&self, level: u32) -> usize {
        debug_assert!(level >= 1 && level <= self.levels, "level {level} out of range");
        self.min_block_height << (level - 1)
    }

    /// Number of block columns at `level`.
    #[inline(always)]
    pub fn block_cols(&self, level: u32) -> usize {
        self.width / self.block_width(level)
    }

    /// Number of block rows at `level`.
    #[inline(always)]
    pub fn block_rows(&self, level: u32) -> usize {
        self.height / self.block_height(level)
    }

    /// Rows of the initial superpixel grid.
    #[inline(always)]
    pub fn superpixel_rows(&self) -> usize {
        self.block_rows(self.levels)
    }

    /// Columns of the initial superpixel grid.
    #[inline(always)]
    pub fn superpixel_cols(&self) -> usize {
        self.block_cols(self.levels)
    }

    /// Number of superpixels the segmentation starts from and keeps.
    #[inline(always)]
    pub fn superpixel_count(&self) -> usize {
        self.superpixel_rows() * self.superpixel_cols()
    }
}

pub(crate) fn split_length_to_ranges(length: usize, splits: usize) -> Vec<Range<usize>> {
    let chunk_size = length / splits;
    let rem = length % splits;
    (0..splits)
        .scan((rem, 0usize), |(r, acc), _split| {
            let mut size = chunk_size;
            if *r > 0 {
                *r -= 1;
                size += 1;
            }
            let out = (*acc, *acc + size);
            *acc += size;
            Some(out.0..out.1)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_exact_grid() {
        let geometry = Geometry::for_superpixel_count(480, 320, 400).unwrap();
        assert_eq!(geometry.min_block_width, 3);
        assert_eq!(geometry.min_block_height, 2);
        assert_eq!(geometry.levels, 4);
        assert_eq!(geometry.superpixel_count(), 400);
    }

    #[test]
    fn first_candidate_wins_ties() {
        // 2x2 blocks over 2 levels already hit 16 superpixels exactly, later
        // candidates with the same difference must not replace it.
        let geometry = Geometry::for_superpixel_count(16, 16, 16).unwrap();
        assert_eq!(
            (geometry.min_block_width, geometry.min_block_height, geometry.levels),
            (2, 2, 2)
        );
    }

    #[test]
    fn ragged_grid_counts() {
        let geometry = Geometry::new(11, 11, 2, 2, 2).unwrap();
        assert_eq!(geometry.block_cols(1), 5);
        assert_eq!(geometry.block_rows(1), 5);
        assert_eq!(geometry.block_cols(2), 2);
        assert_eq!(geometry.block_rows(2), 2);
        assert_eq!(geometry.superpixel_count(), 4);
    }

    #[test]
    fn rejects_bad_layouts() {
        assert_eq!(
            Geometry::new(0, 8, 2, 2, 2),
            Err(Error::EmptyImage { width: 0, height: 8 })
        );
        assert_eq!(Geometry::new(8, 8, 1, 2, 2), Err(Error::TooFewLevels(1)));
        assert_eq!(
            Geometry::new(8, 8, 2, 0, 2),
            Err(Error::EmptyBlock { width: 0, height: 2 })
        );
        // 3x3 base blocks doubled once are 6x6, which does not fit twice into 8.
        assert!(matches!(
            Geometry::new(8, 8, 2, 3, 3),
            Err(Error::BlockTooLarge { .. })
        ));
    }

    #[test]
    fn validates_config() {
        let mut config = Config::default();
        assert_eq!(config.validate(), Ok(()));
        config.number_of_bins = 0;
        assert_eq!(config.validate(), Err(Error::ZeroBins));
        config = Config {
            minimum_confidence: -0.5,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(Error::NegativeConfidence(-0.5)));
        config = Config {
            spatial_weight: 1.5,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(Error::SpatialWeightOutOfRange(1.5)));
    }
}
