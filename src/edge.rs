use crate::{error::DehazeError, grid::Grid, image::RgbImage};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The structure of a pixel's 3x3 neighborhood.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum EdgeClass {
    #[default]
    Flat = 0,
    /// A horizontal or vertical edge.
    Orthogonal = 1,
    Diagonal = 2,
}

impl EdgeClass {
    pub const ALL: [EdgeClass; 3] = [Self::Flat, Self::Orthogonal, Self::Diagonal];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// A 3x3 neighborhood of RGB pixels, indexed `[row][col]` with the center at `[1][1]`.
pub type Neighborhood = [[[f64; 3]; 3]; 3];

/// Classify a single neighborhood against the difference `threshold`.
///
/// Four differences are taken between diametrically opposite neighbors, each
/// reduced by the maximum over channels. Diagonal pairs are tested first, so a
/// neighborhood whose diagonal and axis-aligned differences both reach the
/// threshold is `Diagonal`.
pub fn classify_neighborhood(n: &Neighborhood, threshold: f64) -> EdgeClass {
    let diff = |a: [f64; 3], b: [f64; 3]| {
        (0..3)
            .map(|c| (a[c] - b[c]).abs())
            .fold(0.0f64, f64::max)
    };

    let main_diagonal = diff(n[0][0], n[2][2]);
    let anti_diagonal = diff(n[0][2], n[2][0]);
    if main_diagonal >= threshold || anti_diagonal >= threshold {
        return EdgeClass::Diagonal;
    }

    let vertical = diff(n[0][1], n[2][1]);
    let horizontal = diff(n[1][0], n[1][2]);
    if vertical >= threshold || horizontal >= threshold {
        return EdgeClass::Orthogonal;
    }

    EdgeClass::Flat
}

/// Per-pixel edge classes of an image.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EdgeMap {
    map: Grid<EdgeClass>,
}

impl EdgeMap {
    /// Classify every pixel of `image`.
    ///
    /// Pixels on the image border have no full neighborhood and are `Flat`.
    /// Returns an error if `threshold` is negative or not finite.
    pub fn classify(image: &RgbImage, threshold: f64) -> Result<Self, DehazeError> {
        check_threshold(threshold)?;

        let (rows, cols) = image.dims();
        let map = Grid::par_from_fn(rows, cols, |row, col| {
            if row == 0 || col == 0 || row + 1 == rows || col + 1 == cols {
                return EdgeClass::Flat;
            }

            let mut n: Neighborhood = [[[0.0; 3]; 3]; 3];
            for (i, d_row) in (-1..=1).enumerate() {
                for (j, d_col) in (-1..=1).enumerate() {
                    n[i][j] = *image.pixel_reflected(row, col, d_row, d_col);
                }
            }

            classify_neighborhood(&n, threshold)
        });

        let edges = Self { map };
        debug!(histogram = ?edges.histogram(), "classified edges");
        Ok(edges)
    }

    /// Create an `EdgeMap` where every pixel has class `class`.
    pub fn uniform(class: EdgeClass, rows: usize, cols: usize) -> Self {
        Self {
            map: Grid::filled(rows, cols, class),
        }
    }

    pub fn map(&self) -> &Grid<EdgeClass> {
        &self.map
    }

    pub fn class_at(&self, row: usize, col: usize) -> Option<EdgeClass> {
        self.map.get(row, col).copied()
    }

    /// Number of pixels in each class, indexed by [`EdgeClass::index`].
    pub fn histogram(&self) -> [usize; 3] {
        self.map.as_slice().iter().fold([0; 3], |mut acc, class| {
            acc[class.index()] += 1;
            acc
        })
    }
}

pub(crate) fn check_threshold(threshold: f64) -> Result<(), DehazeError> {
    if !(threshold.is_finite() && threshold >= 0.0) {
        return Err(DehazeError::config(
            "edge_threshold",
            format!("expected a finite non-negative value but got {threshold}"),
        ));
    }

    Ok(())
}
