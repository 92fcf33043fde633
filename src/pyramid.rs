use crate::arrays::{avec_fill_zeros, Array2D, SampleImage, ALIGN};
use crate::common::{Binning, Config, Geometry};
use aligned_vec::{AVec, ConstAlign};

/// Per-pixel histogram bin tags, computed once per image.
pub struct BinMap {
    pub bins: Array2D<u32>,
    pub histogram_size: usize,
}

impl BinMap {
    pub fn build(image: &SampleImage, config: &Config) -> Self {
        let histogram_size = config.number_of_bins.pow(image.channels as u32);
        let mut bins = Array2D::from_fill(0u32, image.width, image.height);
        match config.binning {
            Binning::Uniform => {
                let denominator = 256usize.div_ceil(config.number_of_bins);
                for i in 0..image.height {
                    for j in 0..image.width {
                        let mut bin = 0usize;
                        let mut scale = 1usize;
                        for &sample in image.get_pixel(i, j) {
                            bin += (sample as usize / denominator) * scale;
                            scale *= config.number_of_bins;
                        }
                        debug_assert!(bin < histogram_size);
                        bins[(i, j)] = bin as u32;
                    }
                }
            }
            Binning::Equalized => {
                // cumulative sample distribution per channel, estimated on a
                // five-pixel subsample grid
                let mut cumulative = vec![[0u32; 256]; image.channels];
                let mut samples = 0u32;
                for i in (0..image.height).step_by(5) {
                    for j in (0..image.width).step_by(5) {
                        for (channel, &sample) in cumulative.iter_mut().zip(image.get_pixel(i, j))
                        {
                            channel[sample as usize] += 1;
                        }
                        samples += 1;
                    }
                }
                for channel in cumulative.iter_mut() {
                    for value in 1..256 {
                        channel[value] += channel[value - 1];
                    }
                }
                let equi_height = (samples as usize + 1).div_ceil(config.number_of_bins);
                for i in 0..image.height {
                    for j in 0..image.width {
                        let mut bin = 0usize;
                        let mut scale = 1usize;
                        for (channel, &sample) in cumulative.iter().zip(image.get_pixel(i, j)) {
                            bin += (channel[sample as usize] as usize / equi_height) * scale;
                            scale *= config.number_of_bins;
                        }
                        debug_assert!(bin < histogram_size);
                        bins[(i, j)] = bin as u32;
                    }
                }
            }
        }
        Self {
            bins,
            histogram_size,
        }
    }
}

/// One resolution of the pyramid: a histogram and a pixel count per grid cell,
/// both in flat row-major arenas.
pub struct PyramidLevel {
    pub rows: usize,
    pub cols: usize,
    pub histogram_size: usize,
    pub histograms: AVec<u32, ConstAlign<ALIGN>>,
    pub pixel_counts: AVec<u32, ConstAlign<ALIGN>>,
}

impl PyramidLevel {
    pub(crate) fn zeroed(rows: usize, cols: usize, histogram_size: usize) -> Self {
        Self {
            rows,
            cols,
            histogram_size,
            histograms: avec_fill_zeros(rows * cols * histogram_size),
            pixel_counts: avec_fill_zeros(rows * cols),
        }
    }

    #[inline(always)]
    fn cell_index(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.rows, "Out-of-bounds row {row} < {}", self.rows);
        debug_assert!(col < self.cols, "Out-of-bounds col {col} < {}", self.cols);
        self.cols * row + col
    }

    /// Histogram of the cell at `(row, col)`.
    #[inline(always)]
    pub fn histogram(&self, row: usize, col: usize) -> &[u32] {
        let idx = self.cell_index(row, col) * self.histogram_size;
        &self.histograms[idx..idx + self.histogram_size]
    }

    /// Number of pixels the cell at `(row, col)` covers.
    #[inline(always)]
    pub fn count(&self, row: usize, col: usize) -> u32 {
        self.pixel_counts[self.cell_index(row, col)]
    }

    /// Sum over the cell's histogram, equals `count` for a consistent pyramid.
    pub fn histogram_sum(&self, row: usize, col: usize) -> u64 {
        self.histogram(row, col).iter().map(|&v| v as u64).sum()
    }

    fn accumulate_child(
        &mut self,
        below: &PyramidLevel,
        row: usize,
        col: usize,
        child_row: usize,
        child_col: usize,
    ) {
        let cell = self.cell_index(row, col);
        let child = below.cell_index(child_row, child_col);
        self.pixel_counts[cell] += below.pixel_counts[child];
        let histogram = cell * self.histogram_size;
        let child_histogram = child * below.histogram_size;
        for k in 0..self.histogram_size {
            self.histograms[histogram + k] += below.histograms[child_histogram + k];
        }
    }
}

/// Histogram pyramid from base blocks (level 1) up to the superpixel grid.
///
/// Grids divide the image evenly, the last row and column of every level absorb
/// the remainder pixels. Block levels stay frozen after the build; only the top
/// level changes as moves transfer mass between superpixels.
pub struct Pyramid {
    pub histogram_size: usize,
    levels: Vec<PyramidLevel>,
}

impl Pyramid {
    pub fn build(bin_map: &BinMap, geometry: &Geometry) -> Self {
        let histogram_size = bin_map.histogram_size;
        let mut levels: Vec<PyramidLevel> = Vec::with_capacity(geometry.levels as usize);

        let mut base = PyramidLevel::zeroed(
            geometry.block_rows(1),
            geometry.block_cols(1),
            histogram_size,
        );
        for i in 0..base.rows {
            let row_end = if i == base.rows - 1 {
                bin_map.bins.height
            } else {
                (i + 1) * geometry.min_block_height
            };
            for j in 0..base.cols {
                let col_end = if j == base.cols - 1 {
                    bin_map.bins.width
                } else {
                    (j + 1) * geometry.min_block_width
                };
                let cell = base.cell_index(i, j);
                let histogram = cell * histogram_size;
                for k in i * geometry.min_block_height..row_end {
                    for l in j * geometry.min_block_width..col_end {
                        base.pixel_counts[cell] += 1;
                        base.histograms[histogram + bin_map.bins[(k, l)] as usize] += 1;
                    }
                }
            }
        }
        levels.push(base);

        for level in 2..=geometry.levels {
            let rows = geometry.block_rows(level);
            let cols = geometry.block_cols(level);
            let mut grid = PyramidLevel::zeroed(rows, cols, histogram_size);
            let below = &levels[(level - 2) as usize];
            for i in 0..rows {
                for j in 0..cols {
                    grid.accumulate_child(below, i, j, 2 * i, 2 * j);
                    grid.accumulate_child(below, i, j, 2 * i + 1, 2 * j);
                    grid.accumulate_child(below, i, j, 2 * i, 2 * j + 1);
                    grid.accumulate_child(below, i, j, 2 * i + 1, 2 * j + 1);
                    // cells in the last row and column also absorb the children
                    // a halved grid leaves over
                    if i == rows - 1 && 2 * i + 2 < below.rows {
                        grid.accumulate_child(below, i, j, 2 * i + 2, 2 * j);
                        grid.accumulate_child(below, i, j, 2 * i + 2, 2 * j + 1);
                    }
                    if j == cols - 1 && 2 * j + 2 < below.cols {
                        grid.accumulate_child(below, i, j, 2 * i, 2 * j + 2);
                        grid.accumulate_child(below, i, j, 2 * i + 1, 2 * j + 2);
                    }
                    if i == rows - 1 && j == cols - 1 && 2 * i + 2 < below.rows && 2 * j + 2 < below.cols
                    {
                        grid.accumulate_child(below, i, j, 2 * i + 2, 2 * j + 2);
                    }
                }
            }
            levels.push(grid);
        }
        Self {
            histogram_size,
            levels,
        }
    }

    /// Grid at `level`, counted from 1 (base blocks) to `number_of_levels()`
    /// (the superpixel grid).
    #[inline(always)]
    pub fn level(&self, level: u32) -> &PyramidLevel {
        debug_assert!(level >= 1 && level as usize <= self.levels.len());
        &self.levels[(level - 1) as usize]
    }

    pub fn number_of_levels(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Transfers the block at `(row, col)` of `level` between two superpixels,
    /// pixel count and histogram both.
    pub(crate) fn move_block(
        &mut self,
        level: u32,
        row: usize,
        col: usize,
        from: (usize, usize),
        to: (usize, usize),
    ) {
        debug_assert!(level >= 1 && (level as usize) < self.levels.len());
        let top = self.levels.len() - 1;
        let (lower, upper) = self.levels.split_at_mut(top);
        let block_level = &lower[(level - 1) as usize];
        let superpixel_level = &mut upper[0];
        let moved = block_level.pixel_counts[block_level.cell_index(row, col)];
        let from_cell = superpixel_level.cell_index(from.0, from.1);
        let to_cell = superpixel_level.cell_index(to.0, to.1);
        debug_assert!(superpixel_level.pixel_counts[from_cell] >= moved);
        superpixel_level.pixel_counts[from_cell] -= moved;
        superpixel_level.pixel_counts[to_cell] += moved;
        let histogram_size = superpixel_level.histogram_size;
        let block_histogram = block_level.cell_index(row, col) * histogram_size;
        let from_histogram = from_cell * histogram_size;
        let to_histogram = to_cell * histogram_size;
        for k in 0..histogram_size {
            let value = block_level.histograms[block_histogram + k];
            superpixel_level.histograms[from_histogram + k] -= value;
            superpixel_level.histograms[to_histogram + k] += value;
        }
        debug_assert_eq!(
            superpixel_level.histogram_sum(from.0, from.1),
            superpixel_level.count(from.0, from.1) as u64
        );
        debug_assert_eq!(
            superpixel_level.histogram_sum(to.0, to.1),
            superpixel_level.count(to.0, to.1) as u64
        );
    }

    /// Transfers a single pixel with bin tag `bin` between two superpixels.
    pub(crate) fn move_pixel(&mut self, bin: u32, from: (usize, usize), to: (usize, usize)) {
        let top = self.levels.len() - 1;
        let superpixel_level = &mut self.levels[top];
        let from_cell = superpixel_level.cell_index(from.0, from.1);
        let to_cell = superpixel_level.cell_index(to.0, to.1);
        debug_assert!(superpixel_level.pixel_counts[from_cell] > 0);
        superpixel_level.pixel_counts[from_cell] -= 1;
        superpixel_level.pixel_counts[to_cell] += 1;
        let histogram_size = superpixel_level.histogram_size;
        debug_assert!((bin as usize) < histogram_size);
        superpixel_level.histograms[from_cell * histogram_size + bin as usize] -= 1;
        superpixel_level.histograms[to_cell * histogram_size + bin as usize] += 1;
    }
}
