use crate::error::DehazeError;
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A dense row-major buffer of `rows * cols` cells.
///
/// Every map produced by the pipeline (dark channel, edge classes,
/// transmission) is a `Grid` underneath.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Grid<T> {
    rows: usize,
    cols: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a `Grid` from row-major `cells`.
    ///
    /// Returns an error if `cells` does not hold exactly `rows * cols` values.
    pub fn from_cells(cells: Vec<T>, rows: usize, cols: usize) -> Result<Self, DehazeError> {
        if cells.len() != rows * cols {
            return Err(DehazeError::input(format!(
                "expected {} cells for a {rows}x{cols} grid but got {}",
                rows * cols,
                cells.len()
            )));
        }

        Ok(Self { rows, cols, cells })
    }

    /// Creates a `Grid` by evaluating `f(row, col)` for every cell in parallel.
    pub fn par_from_fn<F>(rows: usize, cols: usize, f: F) -> Self
    where
        T: Send,
        F: Fn(usize, usize) -> T + Sync + Send,
    {
        let cells = (0..rows * cols)
            .into_par_iter()
            .map(|i| f(i / cols, i % cols))
            .collect();

        Self { rows, cols, cells }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Returns the cell at `(row, col)` or `None` if it is outside the grid.
    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        match row < self.rows && col < self.cols {
            true => self.cells.get(row * self.cols + col),
            false => None,
        }
    }

    /// Returns the cell at a signed offset from `(row, col)`, mirroring
    /// coordinates that fall outside the grid.
    pub fn get_reflected(&self, row: usize, col: usize, d_row: isize, d_col: isize) -> &T {
        let r = reflect(row as isize + d_row, self.rows);
        let c = reflect(col as isize + d_col, self.cols);
        &self.cells[r * self.cols + c]
    }

    pub fn as_slice(&self) -> &[T] {
        self.cells.as_slice()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.cells
    }

    /// Applies `f` to every cell in parallel, keeping the shape.
    pub fn par_map<U, F>(&self, f: F) -> Grid<U>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> U + Sync + Send,
    {
        Grid {
            rows: self.rows,
            cols: self.cols,
            cells: self.cells.par_iter().map(f).collect(),
        }
    }

    /// Combines two grids of the same shape cell by cell.
    pub fn par_zip_with<U, V, F>(&self, other: &Grid<U>, f: F) -> Result<Grid<V>, DehazeError>
    where
        T: Sync,
        U: Sync,
        V: Send,
        F: Fn(&T, &U) -> V + Sync + Send,
    {
        DehazeError::check_shape(self.dims(), other.dims())?;
        Ok(Grid {
            rows: self.rows,
            cols: self.cols,
            cells: self
                .cells
                .par_iter()
                .zip(other.cells.par_iter())
                .map(|(a, b)| f(a, b))
                .collect(),
        })
    }
}

impl<T: Clone> Grid<T> {
    /// Creates a `Grid` with every cell set to `value`.
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            rows,
            cols,
            cells: vec![value; rows * cols],
        }
    }
}

impl Grid<f64> {
    /// Returns the smallest and largest cell, or `None` for an empty grid.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        self.cells.iter().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

/// Maps a possibly out-of-range `index` into `0..len` by mirroring about the
/// first and last sample without repeating them (`dcb|abcd|cba`).
///
/// Offsets larger than `len` fold repeatedly. `len` must be non-zero.
pub fn reflect(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }

    let period = 2 * (len as isize - 1);
    let folded = index.rem_euclid(period);
    match folded < len as isize {
        true => folded as usize,
        false => (period - folded) as usize,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(-1, 5, 1)]
    #[case(-2, 5, 2)]
    #[case(0, 5, 0)]
    #[case(4, 5, 4)]
    #[case(5, 5, 3)]
    #[case(6, 5, 2)]
    #[case(9, 5, 1)]
    #[case(-7, 5, 1)]
    #[case(-3, 1, 0)]
    #[case(2, 2, 0)]
    fn reflect_index(#[case] index: isize, #[case] len: usize, #[case] expected: usize) {
        assert_eq!(reflect(index, len), expected);
    }

    #[test]
    fn rejects_wrong_cell_count() {
        assert!(Grid::from_cells(vec![0.0; 5], 2, 3).is_err());
    }

    #[test]
    fn reflected_neighbor_at_corner() {
        let grid = Grid::from_cells((0..9).collect(), 3, 3).unwrap();
        assert_eq!(*grid.get_reflected(0, 0, -1, -1), 4);
        assert_eq!(*grid.get_reflected(2, 2, 1, 0), 5);
    }

    #[test]
    fn zip_requires_same_shape() {
        let a = Grid::filled(2, 2, 1.0);
        let b = Grid::filled(2, 3, 1.0);
        assert!(a.par_zip_with(&b, |x, y| x + y).is_err());
    }
}
