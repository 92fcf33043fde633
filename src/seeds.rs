use crate::arrays::{Array2D, SampleImage};
use crate::block::block_sweep;
use crate::common::{Config, Error, Geometry, MemoryPolicy, PixelUpdate};
use crate::pixel::{pixel_sweep, MeanState, PixelScorer};
use crate::pyramid::{BinMap, Pyramid};
use tracing::debug;

/// Label of cells no superpixel has claimed yet. Only cells outside the active
/// grid carry it, finished segmentations never contain it.
pub const UNASSIGNED: u32 = u32::MAX;

/// Segmentation state: the label grid, the histogram pyramid and the spatial
/// memory driving the sweeps.
///
/// The label array always has image size. While the descent is above pixel
/// resolution only the top-left `grid_rows x grid_cols` cells are meaningful,
/// one per block of the current level; the rest holds [`UNASSIGNED`].
pub struct Segmentation {
    pub(crate) labels: Array2D<u32>,
    pub(crate) memory: Array2D<bool>,
    pub(crate) pyramid: Pyramid,
    pub(crate) bin_map: BinMap,
    pub(crate) geometry: Geometry,
    pub(crate) scorer: PixelScorer,
    pub(crate) level: u32,
    pub(crate) grid_rows: usize,
    pub(crate) grid_cols: usize,
    pub(crate) superpixel_rows: usize,
    pub(crate) superpixel_cols: usize,
}

impl Segmentation {
    /// Builds the histogram pyramid, lays the initial label grid over the
    /// image and descends to the first block level.
    pub fn initialize(
        image: &SampleImage,
        geometry: &Geometry,
        config: &Config,
    ) -> Result<Self, Error> {
        config.validate()?;
        if geometry.width != image.width || geometry.height != image.height {
            return Err(Error::GeometryMismatch {
                geometry_width: geometry.width,
                geometry_height: geometry.height,
                image_width: image.width,
                image_height: image.height,
            });
        }
        let superpixel_rows = geometry.superpixel_rows();
        let superpixel_cols = geometry.superpixel_cols();
        let mut labels = Array2D::from_fill(UNASSIGNED, image.width, image.height);
        let mut label = 0u32;
        for i in 0..superpixel_rows {
            for j in 0..superpixel_cols {
                labels[(i, j)] = label;
                label += 1;
            }
        }
        let memory = Array2D::from_fill(true, image.width, image.height);
        let bin_map = BinMap::build(image, config);
        let pyramid = Pyramid::build(&bin_map, geometry);
        debug!(
            levels = geometry.levels,
            rows = superpixel_rows,
            cols = superpixel_cols,
            histogram_size = bin_map.histogram_size,
            "initialized superpixel grid"
        );
        let mut segmentation = Self {
            labels,
            memory,
            pyramid,
            bin_map,
            geometry: *geometry,
            scorer: PixelScorer::Histogram,
            level: geometry.levels,
            grid_rows: superpixel_rows,
            grid_cols: superpixel_cols,
            superpixel_rows,
            superpixel_cols,
        };
        descend(&mut segmentation);
        Ok(segmentation)
    }

    /// Current label grid. Cells beyond the active grid hold [`UNASSIGNED`]
    /// until the descent reaches pixel resolution.
    pub fn labels(&self) -> &Array2D<u32> {
        &self.labels
    }

    /// Number of superpixels the segmentation was initialized with. Moves
    /// never drop a superpixel below `Config::minimum_sublabels` pixels, so
    /// this count also holds for the finished segmentation.
    pub fn superpixel_count(&self) -> usize {
        self.superpixel_rows * self.superpixel_cols
    }

    /// Current pyramid level, 0 once the descent has reached pixel resolution.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Switches the pixel passes to mean scoring, seeded from the current
    /// pixel labels. Only valid at pixel resolution; [`iterate`] calls this on
    /// its own when the config asks for mean pixel updates.
    pub fn initialize_means(&mut self, image: &SampleImage) {
        debug_assert_eq!(self.level, 0, "means are built from pixel labels");
        self.scorer = PixelScorer::Mean(MeanState::initialize(
            image,
            &self.labels,
            self.superpixel_rows,
            self.superpixel_cols,
        ));
    }

    /// Grid position of a superpixel in the top pyramid level.
    #[inline(always)]
    pub(crate) fn superpixel_position(&self, label: u32) -> (usize, usize) {
        debug_assert_ne!(label, UNASSIGNED);
        let row = label as usize / self.superpixel_cols;
        let col = label as usize % self.superpixel_cols;
        debug_assert!(row < self.superpixel_rows);
        (row, col)
    }

    /// Re-arms the spatial memory over the active grid.
    pub(crate) fn reset_memory(&mut self) {
        for row in 0..self.grid_rows {
            self.memory.get_row_mut(row)[..self.grid_cols].fill(true);
        }
    }

    /// Re-arms cells around an accepted move, per policy.
    pub(crate) fn mark_moved(
        &mut self,
        policy: MemoryPolicy,
        row: usize,
        col: usize,
        row_down: usize,
        row_up: usize,
        col_right: usize,
        col_left: usize,
    ) {
        self.memory[(row, col)] = true;
        match policy {
            MemoryPolicy::Eager => {
                self.memory[(row_down, col)] = true;
                self.memory[(row_up, col)] = true;
                self.memory[(row, col_right)] = true;
                self.memory[(row, col_left)] = true;
            }
            MemoryPolicy::Boundary => {
                // neighbors already inside the new superpixel stay asleep
                let label = self.labels[(row, col)];
                if self.labels[(row_down, col)] != label {
                    self.memory[(row_down, col)] = true;
                }
                if self.labels[(row_up, col)] != label {
                    self.memory[(row_up, col)] = true;
                }
                if self.labels[(row, col_right)] != label {
                    self.memory[(row, col_right)] = true;
                }
                if self.labels[(row, col_left)] != label {
                    self.memory[(row, col_left)] = true;
                }
            }
        }
    }
}

/// Moves the segmentation one level down: every parent block hands its label
/// to its children, with the last row and column extending over the ragged
/// remainder of the finer grid. The final step expands block labels to their
/// pixel spans.
pub fn descend(segmentation: &mut Segmentation) {
    debug_assert!(segmentation.level > 0, "already at pixel resolution");
    segmentation.level -= 1;
    let geometry = segmentation.geometry;
    if segmentation.level > 0 {
        let rows = segmentation.grid_rows;
        let cols = segmentation.grid_cols;
        let new_rows = geometry.block_rows(segmentation.level);
        let new_cols = geometry.block_cols(segmentation.level);
        // parents walk bottom-up right-to-left so no parent cell is
        // overwritten before it was read
        for i in (0..rows).rev() {
            for j in (0..cols).rev() {
                let parent = segmentation.labels[(i, j)];
                segmentation.labels[(2 * i, 2 * j)] = parent;
                segmentation.labels[(2 * i + 1, 2 * j)] = parent;
                segmentation.labels[(2 * i, 2 * j + 1)] = parent;
                segmentation.labels[(2 * i + 1, 2 * j + 1)] = parent;
                if i == rows - 1 && j == cols - 1 {
                    for k in 2 * i + 2..new_rows {
                        for l in 2 * j + 2..new_cols {
                            segmentation.labels[(k, l)] = parent;
                        }
                    }
                }
                if i == rows - 1 {
                    for k in 2 * i + 2..new_rows {
                        segmentation.labels[(k, 2 * j)] = parent;
                        segmentation.labels[(k, 2 * j + 1)] = parent;
                    }
                }
                if j == cols - 1 {
                    for l in 2 * j + 2..new_cols {
                        segmentation.labels[(2 * i, l)] = parent;
                        segmentation.labels[(2 * i + 1, l)] = parent;
                    }
                }
            }
        }
        segmentation.grid_rows = new_rows;
        segmentation.grid_cols = new_cols;
    } else {
        let rows = segmentation.grid_rows;
        let cols = segmentation.grid_cols;
        let height = geometry.height;
        let width = geometry.width;
        let mut block_labels = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            block_labels.extend_from_slice(&segmentation.labels.get_row(i)[..cols]);
        }
        for i in 0..rows {
            let row_end = if i == rows - 1 {
                height
            } else {
                (i + 1) * geometry.min_block_height
            };
            for j in 0..cols {
                let col_end = if j == cols - 1 {
                    width
                } else {
                    (j + 1) * geometry.min_block_width
                };
                let label = block_labels[i * cols + j];
                for k in i * geometry.min_block_height..row_end {
                    segmentation.labels.get_row_mut(k)[j * geometry.min_block_width..col_end]
                        .fill(label);
                }
            }
        }
        segmentation.grid_rows = height;
        segmentation.grid_cols = width;
    }
    debug!(
        level = segmentation.level,
        rows = segmentation.grid_rows,
        cols = segmentation.grid_cols,
        "descended one level"
    );
    #[cfg(debug_assertions)]
    for i in 0..segmentation.grid_rows {
        for &label in &segmentation.labels.get_row(i)[..segmentation.grid_cols] {
            debug_assert_ne!(label, UNASSIGNED, "active cell left unassigned");
        }
    }
}

/// Runs the whole refinement schedule: `Config::iterations` sweeps per block
/// level with one descent after each batch, then twice as many pixel sweeps
/// at full resolution.
///
/// Sweeps are single threaded on purpose: accepted moves feed the histograms
/// and labels the very next cell sees, which is what makes the exchange
/// converge quickly.
pub fn iterate(image: &SampleImage, config: &Config, segmentation: &mut Segmentation) {
    while segmentation.level > 0 {
        segmentation.reset_memory();
        for _ in 0..config.iterations {
            block_sweep(config, segmentation);
        }
        descend(segmentation);
    }
    if config.pixel_update == PixelUpdate::MeanPixel {
        segmentation.initialize_means(image);
    }
    segmentation.reset_memory();
    for _ in 0..2 * config.iterations {
        pixel_sweep(config, segmentation);
    }
}

/// Number of distinct labels in a finished label grid.
pub fn count_superpixels(labels: &Array2D<u32>) -> usize {
    let mut seen = vec![false; max_label(labels) + 1];
    let mut count = 0;
    for &label in labels.data.iter() {
        debug_assert_ne!(label, UNASSIGNED);
        if !seen[label as usize] {
            seen[label as usize] = true;
            count += 1;
        }
    }
    count
}

/// Renames labels to `0..count` in first-seen row-major order and returns the
/// count. Superpixel labels keep grid gaps otherwise, consumers indexing
/// per-superpixel tables densely want this.
pub fn relabel(labels: &mut Array2D<u32>) -> usize {
    let mut mapping = vec![UNASSIGNED; max_label(labels) + 1];
    let mut next = 0u32;
    for label in labels.data.iter_mut() {
        debug_assert_ne!(*label, UNASSIGNED);
        let slot = &mut mapping[*label as usize];
        if *slot == UNASSIGNED {
            *slot = next;
            next += 1;
        }
        *label = *slot;
    }
    next as usize
}

fn max_label(labels: &Array2D<u32>) -> usize {
    labels
        .data
        .iter()
        .map(|&label| label as usize)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::{count_superpixels, descend, iterate, relabel, Segmentation};
    use crate::arrays::{Array2D, SampleImage};
    use crate::block::block_sweep;
    use crate::common::{Binning, Config, Geometry, MemoryPolicy, PixelUpdate};
    use crate::pixel::pixel_sweep;

    fn uniform_config() -> Config {
        Config {
            binning: Binning::Uniform,
            ..Config::default()
        }
    }

    /// column 0 dark, the rest bright; the color edge sits inside the initial
    /// left superpixels
    fn misaligned_image() -> SampleImage {
        let mut samples = [200u8; 4 * 4];
        for i in 0..4 {
            samples[i * 4] = 40;
        }
        SampleImage::from_luma(&samples, 4, 4)
    }

    #[test]
    fn uniform_image_keeps_the_initial_partition() {
        let image = SampleImage::from_luma(&[77; 8 * 8], 8, 8);
        let geometry = Geometry::new(8, 8, 2, 2, 2).unwrap();
        let config = Config::default();
        let mut segmentation = Segmentation::initialize(&image, &geometry, &config).unwrap();
        iterate(&image, &config, &mut segmentation);

        assert_eq!(segmentation.superpixel_count(), 4);
        assert_eq!(count_superpixels(segmentation.labels()), 4);
        for i in 0..8 {
            for j in 0..8 {
                let expected = (i / 4) * 2 + (j / 4);
                assert_eq!(segmentation.labels()[(i, j)], expected as u32);
            }
        }
        let top = segmentation.pyramid.level(2);
        for row in 0..2 {
            for col in 0..2 {
                assert_eq!(top.count(row, col), 16);
                let nonzero = top
                    .histogram(row, col)
                    .iter()
                    .filter(|&&value| value > 0)
                    .count();
                assert_eq!(nonzero, 1, "one gray value, one bin");
            }
        }
    }

    #[test]
    fn descend_expands_parents_over_ragged_grids() {
        let image = SampleImage::from_luma(&[9; 5 * 5], 5, 5);
        let geometry = Geometry::new(5, 5, 2, 1, 1).unwrap();
        let config = uniform_config();
        let mut segmentation = Segmentation::initialize(&image, &geometry, &config).unwrap();

        // initialize descends once, the 2x2 superpixel grid spread over 5x5 blocks
        assert_eq!(segmentation.level(), 1);
        let expected = [
            [0, 0, 1, 1, 1],
            [0, 0, 1, 1, 1],
            [2, 2, 3, 3, 3],
            [2, 2, 3, 3, 3],
            [2, 2, 3, 3, 3],
        ];
        for (i, row) in expected.iter().enumerate() {
            assert_eq!(segmentation.labels().get_row(i), row, "row {i}");
        }

        descend(&mut segmentation);
        assert_eq!(segmentation.level(), 0);
        assert_eq!(segmentation.grid_rows, 5);
        assert_eq!(segmentation.grid_cols, 5);
        for (i, row) in expected.iter().enumerate() {
            assert_eq!(segmentation.labels().get_row(i), row, "row {i}");
        }
    }

    #[test]
    fn minimum_size_guard_freezes_small_superpixels() {
        let image = misaligned_image();
        let geometry = Geometry::new(4, 4, 2, 1, 1).unwrap();
        let config = Config {
            minimum_sublabels: 4,
            ..uniform_config()
        };
        let mut segmentation = Segmentation::initialize(&image, &geometry, &config).unwrap();
        iterate(&image, &config, &mut segmentation);
        // every superpixel starts with exactly 4 pixels, no move may shrink one
        for i in 0..4 {
            for j in 0..4 {
                let expected = (i / 2) * 2 + (j / 2);
                assert_eq!(segmentation.labels()[(i, j)], expected as u32);
            }
        }
    }

    #[test]
    fn iterate_is_deterministic() {
        let samples: Vec<u8> = (0..32u32 * 24)
            .map(|i| (i.wrapping_mul(2654435761) >> 23) as u8)
            .collect();
        let image = SampleImage::from_luma(&samples, 32, 24);
        let geometry = Geometry::new(32, 24, 3, 2, 2).unwrap();
        let config = Config::default();

        let mut first = Segmentation::initialize(&image, &geometry, &config).unwrap();
        iterate(&image, &config, &mut first);
        let mut second = Segmentation::initialize(&image, &geometry, &config).unwrap();
        iterate(&image, &config, &mut second);

        assert_eq!(
            first.labels().data.as_slice(),
            second.labels().data.as_slice()
        );
        assert_eq!(
            count_superpixels(first.labels()),
            count_superpixels(second.labels())
        );
    }

    #[test]
    fn eager_marks_more_cells_than_boundary() {
        // columns 0..6 dark, 6..8 bright, the level 1 sweep moves blocks
        let mut samples = [40u8; 8 * 8];
        for i in 0..8 {
            for j in 6..8 {
                samples[i * 8 + j] = 200;
            }
        }
        let image = SampleImage::from_luma(&samples, 8, 8);
        let geometry = Geometry::new(8, 8, 2, 2, 2).unwrap();

        let eager = uniform_config();
        let mut segmentation = Segmentation::initialize(&image, &geometry, &eager).unwrap();
        block_sweep(&eager, &mut segmentation);
        assert!(segmentation.memory[(0, 1)]);
        assert!(segmentation.memory[(1, 1)]);

        let boundary = Config {
            memory_policy: MemoryPolicy::Boundary,
            ..uniform_config()
        };
        let mut segmentation = Segmentation::initialize(&image, &geometry, &boundary).unwrap();
        block_sweep(&boundary, &mut segmentation);
        assert!(!segmentation.memory[(0, 1)]);
        assert!(!segmentation.memory[(1, 1)]);
    }

    #[test]
    fn cleared_memory_freezes_the_sweep() {
        let image = misaligned_image();
        let geometry = Geometry::new(4, 4, 2, 1, 1).unwrap();
        let config = uniform_config();
        let mut segmentation = Segmentation::initialize(&image, &geometry, &config).unwrap();
        descend(&mut segmentation);

        segmentation.memory.fill(false);
        let before = segmentation.labels().data.clone();
        pixel_sweep(&config, &mut segmentation);
        assert_eq!(segmentation.labels().data.as_slice(), before.as_slice());

        segmentation.reset_memory();
        pixel_sweep(&config, &mut segmentation);
        assert_ne!(segmentation.labels().data.as_slice(), before.as_slice());
    }

    #[test]
    fn mean_variant_aligns_to_the_color_edge() {
        let image = misaligned_image();
        let geometry = Geometry::new(4, 4, 2, 1, 1).unwrap();
        let config = Config {
            pixel_update: PixelUpdate::MeanPixel,
            ..uniform_config()
        };
        let mut segmentation = Segmentation::initialize(&image, &geometry, &config).unwrap();
        iterate(&image, &config, &mut segmentation);

        let mut dark_labels = Vec::new();
        let mut bright_labels = Vec::new();
        for i in 0..4 {
            for j in 0..4 {
                let label = segmentation.labels()[(i, j)];
                if j == 0 {
                    dark_labels.push(label);
                } else {
                    bright_labels.push(label);
                }
            }
        }
        for label in &dark_labels {
            assert!(!bright_labels.contains(label), "superpixel mixes both colors");
        }
    }

    #[test]
    fn relabels_in_first_seen_order() {
        let mut labels = Array2D::from_slice(&[7u32, 7, 3, 1], 2, 2).unwrap();
        assert_eq!(count_superpixels(&labels), 3);
        assert_eq!(relabel(&mut labels), 3);
        assert_eq!(labels.data.as_slice(), &[0, 0, 1, 2]);
        assert_eq!(count_superpixels(&labels), 3);
    }
}
