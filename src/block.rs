use crate::common::Config;
use crate::connectivity::{splits_down, splits_left, splits_right, splits_up};
use crate::pyramid::PyramidLevel;
use crate::seeds::Segmentation;
use multiversion::multiversion;

/// One row-major pass over the current block grid, offering every remembered
/// block to its four neighbors.
///
/// Accepted moves update labels and the superpixel histograms immediately, so
/// later cells in the same pass already see them.
#[multiversion(targets = "simd")]
pub fn block_sweep(config: &Config, segmentation: &mut Segmentation) {
    debug_assert!(
        segmentation.level >= 1,
        "block sweeps run above pixel resolution"
    );
    for row in 0..segmentation.grid_rows {
        for col in 0..segmentation.grid_cols {
            attempt_block_move(config, segmentation, row, col);
        }
    }
}

#[inline(always)]
fn attempt_block_move(config: &Config, segmentation: &mut Segmentation, row: usize, col: usize) {
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
    let block = segmentation.pyramid.level(segmentation.level);
    let superpixels = segmentation.pyramid.level(segmentation.geometry.levels);

    let block_pixels = block.count(row, col);
    let sublabels = superpixels.count(superpixel_from.0, superpixel_from.1) / block_pixels;
    if sublabels <= config.minimum_sublabels {
        return;
    }

    let current_score = score_keeping_block(block, superpixels, row, col, superpixel_from);

    // direction order decides ties, a later candidate must strictly win
    let mut best_score = 0.0f32;
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
        let proposed = score_joining_block(block, superpixels, row, col, superpixel_to);
        if proposed > current_score + config.minimum_confidence && proposed > best_score {
            best_score = proposed;
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
        let proposed = score_joining_block(block, superpixels, row, col, superpixel_to);
        if proposed > current_score + config.minimum_confidence && proposed > best_score {
            best_score = proposed;
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
        let proposed = score_joining_block(block, superpixels, row, col, superpixel_to);
        if proposed > current_score + config.minimum_confidence && proposed > best_score {
            best_score = proposed;
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
        let proposed = score_joining_block(block, superpixels, row, col, superpixel_to);
        if proposed > current_score + config.minimum_confidence && proposed > best_score {
            best_score = proposed;
            best_move = Some(((row, col_left), superpixel_to));
        }
    }

    if let Some((to_cell, superpixel_to)) = best_move {
        let new_label = segmentation.labels[to_cell];
        segmentation.labels[(row, col)] = new_label;
        segmentation.pyramid.move_block(
            segmentation.level,
            row,
            col,
            superpixel_from,
            superpixel_to,
        );
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

/// Intersection of the block histogram with what remains of its own superpixel
/// once the block is taken out.
#[inline(always)]
fn score_keeping_block(
    block: &PyramidLevel,
    superpixels: &PyramidLevel,
    row: usize,
    col: usize,
    superpixel: (usize, usize),
) -> f32 {
    let block_histogram = block.histogram(row, col);
    let superpixel_histogram = superpixels.histogram(superpixel.0, superpixel.1);
    let block_pixels = block.count(row, col) as f32;
    let remainder_pixels =
        (superpixels.count(superpixel.0, superpixel.1) - block.count(row, col)) as f32;
    let mut score = 0.0f32;
    for (&of_block, &of_superpixel) in block_histogram.iter().zip(superpixel_histogram) {
        if of_block > 0 && of_superpixel > of_block {
            let of_remainder = (of_superpixel - of_block) as f32 / remainder_pixels;
            score += of_remainder.min(of_block as f32 / block_pixels);
        }
    }
    score
}

/// Intersection of the block histogram with a neighboring superpixel.
#[inline(always)]
fn score_joining_block(
    block: &PyramidLevel,
    superpixels: &PyramidLevel,
    row: usize,
    col: usize,
    superpixel: (usize, usize),
) -> f32 {
    let block_histogram = block.histogram(row, col);
    let superpixel_histogram = superpixels.histogram(superpixel.0, superpixel.1);
    let block_pixels = block.count(row, col) as f32;
    let superpixel_pixels = superpixels.count(superpixel.0, superpixel.1) as f32;
    let mut score = 0.0f32;
    for (&of_block, &of_superpixel) in block_histogram.iter().zip(superpixel_histogram) {
        if of_block > 0 && of_superpixel > 0 {
            score +=
                (of_superpixel as f32 / superpixel_pixels).min(of_block as f32 / block_pixels);
        }
    }
    score
}
