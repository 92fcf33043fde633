//! Split prevention for label moves.
//!
//! Each predicate looks at the 3x3 window around the cell that wants to change
//! its label and answers whether taking the cell away would cut its current
//! superpixel into disconnected parts. Callers pass the clamped neighbor
//! indices they already computed for scoring. Window cells that fall outside
//! the image are replaced by a sentinel, so they compare unequal to every real
//! label; the border tests use the full dimensions of the label array.

use crate::arrays::Array2D;

const DISABLED: u32 = u32::MAX;

/// Would moving the cell at `(row, col)` to the superpixel below split its
/// current superpixel?
#[inline(always)]
pub fn splits_down(
    labels: &Array2D<u32>,
    row: usize,
    col: usize,
    _row_down: usize,
    row_up: usize,
    col_right: usize,
    col_left: usize,
) -> bool {
    let center = labels[(row, col)];
    let mut above_left = labels[(row_up, col_left)];
    let mut above = labels[(row_up, col)];
    let mut above_right = labels[(row_up, col_right)];
    let mut left = labels[(row, col_left)];
    let mut right = labels[(row, col_right)];
    if row == 0 {
        above_left = DISABLED;
        above = DISABLED;
        above_right = DISABLED;
    }
    if col == 0 {
        above_left = DISABLED;
        left = DISABLED;
    }
    if col == labels.width - 1 {
        above_right = DISABLED;
        right = DISABLED;
    }
    (above != center && left == center && right == center)
        || (above_left != center && above == center && left == center)
        || (above_right != center && above == center && right == center)
}

/// Would moving the cell at `(row, col)` to the superpixel above split its
/// current superpixel?
#[inline(always)]
pub fn splits_up(
    labels: &Array2D<u32>,
    row: usize,
    col: usize,
    row_down: usize,
    _row_up: usize,
    col_right: usize,
    col_left: usize,
) -> bool {
    let center = labels[(row, col)];
    let mut left = labels[(row, col_left)];
    let mut right = labels[(row, col_right)];
    let mut below_left = labels[(row_down, col_left)];
    let mut below = labels[(row_down, col)];
    let mut below_right = labels[(row_down, col_right)];
    if row == labels.height - 1 {
        below_left = DISABLED;
        below = DISABLED;
        below_right = DISABLED;
    }
    if col == 0 {
        left = DISABLED;
        below_left = DISABLED;
    }
    if col == labels.width - 1 {
        right = DISABLED;
        below_right = DISABLED;
    }
    (below != center && left == center && right == center)
        || (below_left != center && left == center && below == center)
        || (below_right != center && below == center && right == center)
}

/// Would moving the cell at `(row, col)` to the superpixel on the right split
/// its current superpixel?
#[inline(always)]
pub fn splits_right(
    labels: &Array2D<u32>,
    row: usize,
    col: usize,
    row_down: usize,
    row_up: usize,
    _col_right: usize,
    col_left: usize,
) -> bool {
    let center = labels[(row, col)];
    let mut above_left = labels[(row_up, col_left)];
    let mut above = labels[(row_up, col)];
    let mut left = labels[(row, col_left)];
    let mut below_left = labels[(row_down, col_left)];
    let mut below = labels[(row_down, col)];
    if row == 0 {
        above_left = DISABLED;
        above = DISABLED;
    }
    if row == labels.height - 1 {
        below_left = DISABLED;
        below = DISABLED;
    }
    if col == 0 {
        above_left = DISABLED;
        left = DISABLED;
        below_left = DISABLED;
    }
    (left != center && above == center && below == center)
        || (above_left != center && above == center && left == center)
        || (below_left != center && left == center && below == center)
}

/// Would moving the cell at `(row, col)` to the superpixel on the left split
/// its current superpixel?
#[inline(always)]
pub fn splits_left(
    labels: &Array2D<u32>,
    row: usize,
    col: usize,
    row_down: usize,
    row_up: usize,
    col_right: usize,
    _col_left: usize,
) -> bool {
    let center = labels[(row, col)];
    let mut above = labels[(row_up, col)];
    let mut above_right = labels[(row_up, col_right)];
    let mut right = labels[(row, col_right)];
    let mut below = labels[(row_down, col)];
    let mut below_right = labels[(row_down, col_right)];
    if row == 0 {
        above = DISABLED;
        above_right = DISABLED;
    }
    if row == labels.height - 1 {
        below = DISABLED;
        below_right = DISABLED;
    }
    if col == labels.width - 1 {
        above_right = DISABLED;
        right = DISABLED;
        below_right = DISABLED;
    }
    (right != center && above == center && below == center)
        || (above_right != center && above == center && right == center)
        || (below_right != center && right == center && below == center)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::Array2D;

    fn grid(labels: &[u32]) -> Array2D<u32> {
        Array2D::from_slice(labels, 3, 3).unwrap()
    }

    #[test]
    fn detects_straight_cuts() {
        // center sits in the middle of a run with foreign labels behind it
        let labels = grid(&[0, 9, 0, 0, 0, 0, 0, 0, 0]);
        assert!(splits_down(&labels, 1, 1, 2, 0, 2, 0));
        let labels = grid(&[0, 0, 0, 0, 0, 0, 0, 9, 0]);
        assert!(splits_up(&labels, 1, 1, 2, 0, 2, 0));
        let labels = grid(&[0, 0, 7, 9, 0, 7, 0, 0, 7]);
        assert!(splits_right(&labels, 1, 1, 2, 0, 2, 0));
        let labels = grid(&[7, 0, 0, 7, 0, 9, 7, 0, 0]);
        assert!(splits_left(&labels, 1, 1, 2, 0, 2, 0));
    }

    #[test]
    fn detects_corner_cuts() {
        let labels = grid(&[9, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(splits_down(&labels, 1, 1, 2, 0, 2, 0));
        let labels = grid(&[0, 0, 9, 0, 0, 0, 0, 0, 0]);
        assert!(splits_down(&labels, 1, 1, 2, 0, 2, 0));
    }

    #[test]
    fn interior_cells_may_leave() {
        // all in-window neighbors share the label, the region stays connected
        let labels = grid(&[0, 0, 0, 0, 0, 0, 9, 9, 9]);
        assert!(!splits_down(&labels, 1, 1, 2, 0, 2, 0));
        let labels = grid(&[9, 9, 9, 0, 0, 0, 0, 0, 0]);
        assert!(!splits_up(&labels, 1, 1, 2, 0, 2, 0));
    }

    #[test]
    fn borders_disable_missing_cells() {
        let labels = Array2D::from_slice(&[0, 0, 0, 5, 5, 5], 3, 2).unwrap();
        // at the top border the disabled row counts as foreign, a cell flanked
        // by its own label may not leave downwards
        assert!(splits_down(&labels, 0, 1, 1, 0, 2, 0));
        // the corner has no same-label flank, it may leave
        assert!(!splits_down(&labels, 0, 0, 1, 0, 1, 0));
    }
}
