use crate::{error::DehazeError, grid::Grid, image::RgbImage};
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The dark channel of an image.
///
/// Each cell holds the minimum over the three channels, further minimized
/// over a square patch centered on the cell. Hazy regions have a bright dark
/// channel while haze-free regions away from the sky sit near zero.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DarkChannel {
    map: Grid<f64>,
    patch_size: usize,
}

impl DarkChannel {
    /// Compute the dark channel of `image` over a `patch_size` x `patch_size` patch.
    ///
    /// Returns an error if `patch_size` is zero or even.
    pub fn estimate(image: &RgbImage, patch_size: usize) -> Result<Self, DehazeError> {
        check_patch_size(patch_size)?;
        Ok(Self {
            map: erode(&image.channel_min(), patch_size),
            patch_size,
        })
    }

    pub fn patch_size(&self) -> usize {
        self.patch_size
    }

    pub fn map(&self) -> &Grid<f64> {
        &self.map
    }

    pub fn into_map(self) -> Grid<f64> {
        self.map
    }
}

pub(crate) fn check_patch_size(patch_size: usize) -> Result<(), DehazeError> {
    if patch_size == 0 || patch_size % 2 == 0 {
        return Err(DehazeError::config(
            "patch_size",
            format!("expected an odd size of at least 1 but got {patch_size}"),
        ));
    }

    Ok(())
}

/// Morphological erosion of `map` with a square structuring element.
///
/// The square minimum is separable, so it runs as a horizontal pass followed
/// by a vertical pass. Coordinates outside the map are mirrored.
pub fn erode(map: &Grid<f64>, patch_size: usize) -> Grid<f64> {
    let radius = (patch_size / 2) as isize;
    if radius == 0 {
        return map.clone();
    }

    let horizontal = Grid::par_from_fn(map.rows(), map.cols(), |row, col| {
        (-radius..=radius)
            .map(|d| *map.get_reflected(row, col, 0, d))
            .fold(f64::INFINITY, f64::min)
    });

    Grid::par_from_fn(map.rows(), map.cols(), |row, col| {
        (-radius..=radius)
            .map(|d| *horizontal.get_reflected(row, col, d, 0))
            .fold(f64::INFINITY, f64::min)
    })
}

/// Returns the row-major index of the largest dark channel value, preferring
/// the first occurrence on ties.
pub(crate) fn argmax_first(map: &Grid<f64>) -> Option<usize> {
    map.as_slice()
        .par_iter()
        .enumerate()
        .reduce_with(|a, b| match b.1 > a.1 || (b.1 == a.1 && b.0 < a.0) {
            true => b,
            false => a,
        })
        .map(|(i, _)| i)
}
