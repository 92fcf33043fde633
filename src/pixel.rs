use crate::arrays::{avec_fill_zeros, Array2D, SampleImage, ALIGN};
use crate::common::Config;
use crate::connectivity::{splits_down, splits_left, splits_right, splits_up};
use crate::pyramid::{BinMap, PyramidLevel};
use crate::seeds::Segmentation;
use aligned_vec::{AVec, ConstAlign};
use assume::assume;
use multiversion::multiversion;

/// Running per-superpixel mean state for mean pixel scoring.
///
/// Holds one feature vector per pixel (the color channels, then column, then
/// row) and the per-superpixel feature sums. Means are never materialized,
/// scores divide by the pixel count on the fly so a transfer stays a handful
/// of additions.
pub struct MeanState {
    features: AVec<f32, ConstAlign<ALIGN>>,
    sums: AVec<f32, ConstAlign<ALIGN>>,
    dimensions: usize,
    width: usize,
    superpixel_cols: usize,
    color_normalization: f32,
    spatial_normalization: f32,
}

impl MeanState {
    /// Builds feature vectors and per-superpixel sums from the current pixel
    /// labels.
    pub(crate) fn initialize(
        image: &SampleImage,
        labels: &Array2D<u32>,
        superpixel_rows: usize,
        superpixel_cols: usize,
    ) -> Self {
        let dimensions = image.channels + 2;
        let mut features: AVec<f32, ConstAlign<ALIGN>> =
            avec_fill_zeros(image.width * image.height * dimensions);
        let mut sums: AVec<f32, ConstAlign<ALIGN>> =
            avec_fill_zeros(superpixel_rows * superpixel_cols * dimensions);
        for i in 0..image.height {
            for j in 0..image.width {
                let feature = (i * image.width + j) * dimensions;
                for (k, &sample) in image.get_pixel(i, j).iter().enumerate() {
                    features[feature + k] = sample as f32;
                }
                features[feature + dimensions - 2] = j as f32;
                features[feature + dimensions - 1] = i as f32;
                let label = labels[(i, j)] as usize;
                debug_assert!(label < superpixel_rows * superpixel_cols);
                let sum = label * dimensions;
                for k in 0..dimensions {
                    sums[sum + k] += features[feature + k];
                }
            }
        }
        Self {
            features,
            sums,
            dimensions,
            width: image.width,
            superpixel_cols,
            color_normalization: 255.0 * 255.0 * image.channels as f32,
            spatial_normalization: (image.height * image.height + image.width * image.width)
                as f32,
        }
    }

    /// Normalized squared distance between a pixel and a superpixel mean,
    /// lower is better. `spatial_weight` blends in the distance to the mean
    /// position when it is positive.
    #[inline(always)]
    fn score(
        &self,
        row: usize,
        col: usize,
        count: f32,
        superpixel: (usize, usize),
        spatial_weight: f32,
    ) -> f32 {
        let feature = (row * self.width + col) * self.dimensions;
        let sum = (superpixel.0 * self.superpixel_cols + superpixel.1) * self.dimensions;
        let channels = self.dimensions - 2;
        let mut color = 0.0f32;
        for k in 0..channels {
            let difference = self.sums[sum + k] / count - self.features[feature + k];
            color += difference * difference;
        }
        let color_score = color / self.color_normalization;
        if spatial_weight > 0.0 {
            let difference_col =
                self.sums[sum + channels] / count - self.features[feature + channels];
            let difference_row =
                self.sums[sum + channels + 1] / count - self.features[feature + channels + 1];
            let spatial_score = (difference_col * difference_col
                + difference_row * difference_row)
                / self.spatial_normalization;
            return (1.0 - spatial_weight) * color_score + spatial_weight * spatial_score;
        }
        color_score
    }

    /// Moves one pixel's feature vector between superpixel sums.
    pub(crate) fn transfer(
        &mut self,
        row: usize,
        col: usize,
        from: (usize, usize),
        to: (usize, usize),
    ) {
        let feature = (row * self.width + col) * self.dimensions;
        let sum_from = (from.0 * self.superpixel_cols + from.1) * self.dimensions;
        let sum_to = (to.0 * self.superpixel_cols + to.1) * self.dimensions;
        for k in 0..self.dimensions {
            let value = self.features[feature + k];
            self.sums[sum_from + k] -= value;
            self.sums[sum_to + k] += value;
        }
    }
}

/// Scoring strategy for the pixel passes.
pub enum PixelScorer {
    /// Bin membership probability against the superpixel histogram.
    Histogram,
    /// Distance to the running superpixel means, see [`MeanState`].
    Mean(MeanState),
}

impl PixelScorer {
    #[inline(always)]
    pub(crate) fn score(
        &self,
        bin_map: &BinMap,
        superpixels: &PyramidLevel,
        row: usize,
        col: usize,
        superpixel: (usize, usize),
        spatial_weight: f32,
    ) -> f32 {
        let count = superpixels.count(superpixel.0, superpixel.1);
        match self {
            PixelScorer::Histogram => {
                let histogram = superpixels.histogram(superpixel.0, superpixel.1);
                let bin = bin_map.bins[(row, col)] as usize;
                assume!(unsafe: bin < histogram.len());
                histogram[bin] as f32 / count as f32
            }
            PixelScorer::Mean(means) => {
                means.score(row, col, count as f32, superpixel, spatial_weight)
            }
        }
    }

    /// Signed gain of moving the pixel, positive when the move improves the
    /// segmentation. Histogram scores grow with quality while mean distances
    /// shrink, so the sign and the prior scaling go opposite ways.
    #[inline(always)]
    pub(crate) fn margin(&self, current: f32, proposed: f32, window: Option<(u32, u32)>) -> f32 {
        match self {
            PixelScorer::Histogram => match window {
                Some((from, to)) => proposed * to as f32 - current * from as f32,
                None => proposed - current,
            },
            PixelScorer::Mean(_) => match window {
                Some((from, to)) => current / from as f32 - proposed / to as f32,
                None => current - proposed,
            },
        }
    }
}

/// Counts source and destination labels in the window spanning both ends of
/// the move. Both cells sit inside the window, so neither count is zero.
#[inline(always)]
fn neighborhood_counts(
    labels: &Array2D<u32>,
    size: usize,
    row: usize,
    col: usize,
    to_row: usize,
    to_col: usize,
    label_from: u32,
    label_to: u32,
) -> (u32, u32) {
    let row_start = row.min(to_row).saturating_sub(size);
    let row_end = (row.max(to_row) + size + 1).min(labels.height);
    let col_start = col.min(to_col).saturating_sub(size);
    let col_end = (col.max(to_col) + size + 1).min(labels.width);
    let mut count_from = 0u32;
    let mut count_to = 0u32;
    for i in row_start..row_end {
        for &label in &labels.get_row(i)[col_start..col_end] {
            if label == label_from {
                count_from += 1;
            } else if label == label_to {
                count_to += 1;
            }
        }
    }
    (count_from, count_to)
}

/// One row-major pass over the pixel grid, offering every remembered pixel to
/// its four neighbors.
///
/// Like the block pass, accepted moves are visible to later pixels in the
/// same sweep.
#[multiversion(targets = "simd")]
pub fn pixel_sweep(config: &Config, segmentation: &mut Segmentation) {
    debug_assert!(
        segmentation.level == 0,
        "pixel sweeps run at pixel resolution"
    );
    for row in 0..segmentation.grid_rows {
        for col in 0..segmentation.grid_cols {
            attempt_pixel_move(config, segmentation, row, col);
        }
    }
}

#[inline(always)]
fn attempt_pixel_move(config: &Config, segmentation: &mut Segmentation, row: usize, col: usize) {
    if !segmentation.memory[(row, col)] {
        return;
    }
    segmentation.memory[(row, col)] = false;

    let row_down = (row + 1).min(segmentation.grid_rows - 1);
    let row_up = row.saturating_sub(1);
    let col_right = (col + 1).min(segmentation.grid_cols - 1);
    let col_left = col.saturating_sub(1);

    let label_from = segmentation.labels[(row, col)];
    let label_down = segmentation.labels[(row_down, col)];
    let label_up = segmentation.labels[(row_up, col)];
    let label_right = segmentation.labels[(row, col_right)];
    let label_left = segmentation.labels[(row, col_left)];
    if label_down == label_from
        && label_up == label_from
        && label_right == label_from
        && label_left == label_from
    {
        return;
    }

    let superpixel_from = segmentation.superpixel_position(label_from);
    let superpixels = segmentation.pyramid.level(segmentation.geometry.levels);
    if superpixels.count(superpixel_from.0, superpixel_from.1) <= config.minimum_sublabels {
        return;
    }

    let current_score = segmentation.scorer.score(
        &segmentation.bin_map,
        superpixels,
        row,
        col,
        superpixel_from,
        config.spatial_weight,
    );

    // direction order decides ties, a later candidate must strictly win
    let mut best_margin = 0.0f32;
    let mut best_move: Option<((usize, usize), (usize, usize))> = None;

    if label_down != label_from
        && !splits_down(
            &segmentation.labels,
            row,
            col,
            row_down,
            row_up,
            col_right,
            col_left,
        )
    {
        let superpixel_to = segmentation.superpixel_position(label_down);
        let proposed = segmentation.scorer.score(
            &segmentation.bin_map,
            superpixels,
            row,
            col,
            superpixel_to,
            config.spatial_weight,
        );
        let window = (config.neighborhood_size > 0).then(|| {
            neighborhood_counts(
                &segmentation.labels,
                config.neighborhood_size,
                row,
                col,
                row_down,
                col,
                label_from,
                label_down,
            )
        });
        let margin = segmentation.scorer.margin(current_score, proposed, window);
        if margin > 0.0 && margin > best_margin {
            best_margin = margin;
            best_move = Some(((row_down, col), superpixel_to));
        }
    }
    if label_up != label_from
        && !splits_up(
            &segmentation.labels,
            row,
            col,
            row_down,
            row_up,
            col_right,
            col_left,
        )
    {
        let superpixel_to = segmentation.superpixel_position(label_up);
        let proposed = segmentation.scorer.score(
            &segmentation.bin_map,
            superpixels,
            row,
            col,
            superpixel_to,
            config.spatial_weight,
        );
        let window = (config.neighborhood_size > 0).then(|| {
            neighborhood_counts(
                &segmentation.labels,
                config.neighborhood_size,
                row,
                col,
                row_up,
                col,
                label_from,
                label_up,
            )
        });
        let margin = segmentation.scorer.margin(current_score, proposed, window);
        if margin > 0.0 && margin > best_margin {
            best_margin = margin;
            best_move = Some(((row_up, col), superpixel_to));
        }
    }
    if label_right != label_from
        && !splits_right(
            &segmentation.labels,
            row,
            col,
            row_down,
            row_up,
            col_right,
            col_left,
        )
    {
        let superpixel_to = segmentation.superpixel_position(label_right);
        let proposed = segmentation.scorer.score(
            &segmentation.bin_map,
            superpixels,
            row,
            col,
            superpixel_to,
            config.spatial_weight,
        );
        let window = (config.neighborhood_size > 0).then(|| {
            neighborhood_counts(
                &segmentation.labels,
                config.neighborhood_size,
                row,
                col,
                row,
                col_right,
                label_from,
                label_right,
            )
        });
        let margin = segmentation.scorer.margin(current_score, proposed, window);
        if margin > 0.0 && margin > best_margin {
            best_margin = margin;
            best_move = Some(((row, col_right), superpixel_to));
        }
    }
    if label_left != label_from
        && !splits_left(
            &segmentation.labels,
            row,
            col,
            row_down,
            row_up,
            col_right,
            col_left,
        )
    {
        let superpixel_to = segmentation.superpixel_position(label_left);
        let proposed = segmentation.scorer.score(
            &segmentation.bin_map,
            superpixels,
            row,
            col,
            superpixel_to,
            config.spatial_weight,
        );
        let window = (config.neighborhood_size > 0).then(|| {
            neighborhood_counts(
                &segmentation.labels,
                config.neighborhood_size,
                row,
                col,
                row,
                col_left,
                label_from,
                label_left,
            )
        });
        let margin = segmentation.scorer.margin(current_score, proposed, window);
        if margin > 0.0 && margin > best_margin {
            best_margin = margin;
            best_move = Some(((row, col_left), superpixel_to));
        }
    }

    if let Some((to_cell, superpixel_to)) = best_move {
        let new_label = segmentation.labels[to_cell];
        segmentation.labels[(row, col)] = new_label;
        let bin = segmentation.bin_map.bins[(row, col)];
        segmentation
            .pyramid
            .move_pixel(bin, superpixel_from, superpixel_to);
        if let PixelScorer::Mean(means) = &mut segmentation.scorer {
            means.transfer(row, col, superpixel_from, superpixel_to);
        }
        segmentation.mark_moved(
            config.memory_policy,
            row,
            col,
            row_down,
            row_up,
            col_right,
            col_left,
        );
    }
}
