use crate::{error::DehazeError, grid::Grid};
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Luminance weights used to derive the guidance image (R, G, B).
pub const LUMA_WEIGHTS: [f64; 3] = [0.299, 0.587, 0.114];

/// An RGB image with linear samples normalized to [0, 1].
///
/// Pixels are stored row-major and each pixel holds its channels in R, G, B
/// order. Stages never mutate an `RgbImage`; each one returns a new buffer.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RgbImage {
    rows: usize,
    cols: usize,
    pixels: Vec<[f64; 3]>,
}

impl RgbImage {
    /// Create an image from row-major RGB pixels.
    ///
    /// Returns an error if the image is empty or `pixels` does not hold
    /// exactly `rows * cols` entries. Sample values are not range checked
    /// here, see [`RgbImage::check_range`].
    pub fn from_pixels(pixels: Vec<[f64; 3]>, rows: usize, cols: usize) -> Result<Self, DehazeError> {
        if rows == 0 || cols == 0 {
            return Err(DehazeError::input(format!(
                "image must have at least one pixel but is {rows}x{cols}"
            )));
        }

        if pixels.len() != rows * cols {
            return Err(DehazeError::input(format!(
                "expected {} pixels for a {rows}x{cols} image but got {}",
                rows * cols,
                pixels.len()
            )));
        }

        Ok(Self { rows, cols, pixels })
    }

    /// Create an image from interleaved samples.
    ///
    /// ```text
    /// +----+----+----+----+----+----+-----+
    /// | R0 | G0 | B0 | R1 | G1 | B1 | ... |
    /// +----+----+----+----+----+----+-----+
    /// ```
    ///
    /// Returns an error if `samples` is not a rectangular 3-channel grid.
    pub fn from_interleaved(samples: &[f64], rows: usize, cols: usize) -> Result<Self, DehazeError> {
        if samples.len() % 3 != 0 {
            return Err(DehazeError::input(format!(
                "interleaved buffer of {} samples is not 3-channel",
                samples.len()
            )));
        }

        let pixels = samples
            .chunks_exact(3)
            .map(|px| [px[0], px[1], px[2]])
            .collect();

        Self::from_pixels(pixels, rows, cols)
    }

    /// Create an image from interleaved 8-bit RGB codes.
    ///
    /// This is the only place the 0..255 scale enters the crate.
    pub fn from_rgb8(bytes: &[u8], rows: usize, cols: usize) -> Result<Self, DehazeError> {
        if bytes.len() != rows * cols * 3 {
            return Err(DehazeError::input(format!(
                "expected {} bytes for a {rows}x{cols} RGB image but got {}",
                rows * cols * 3,
                bytes.len()
            )));
        }

        let pixels = bytes
            .par_chunks_exact(3)
            .map(|px| {
                [
                    px[0] as f64 / 255.,
                    px[1] as f64 / 255.,
                    px[2] as f64 / 255.,
                ]
            })
            .collect();

        Self::from_pixels(pixels, rows, cols)
    }

    /// Create an image where every pixel is `color`.
    pub fn uniform(color: [f64; 3], rows: usize, cols: usize) -> Result<Self, DehazeError> {
        Self::from_pixels(vec![color; rows * cols], rows, cols)
    }

    /// Convert to interleaved 8-bit RGB codes, clipping and rounding each sample.
    pub fn to_rgb8(&self) -> Vec<u8> {
        self.pixels
            .par_iter()
            .flat_map_iter(|px| (*px).map(to_code))
            .collect()
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

    pub fn pixel(&self, row: usize, col: usize) -> Option<&[f64; 3]> {
        match row < self.rows && col < self.cols {
            true => self.pixels.get(row * self.cols + col),
            false => None,
        }
    }

    /// Returns the pixel at a signed offset from `(row, col)` using the
    /// crate-wide mirrored border.
    pub fn pixel_reflected(&self, row: usize, col: usize, d_row: isize, d_col: isize) -> &[f64; 3] {
        let r = crate::grid::reflect(row as isize + d_row, self.rows);
        let c = crate::grid::reflect(col as isize + d_col, self.cols);
        &self.pixels[r * self.cols + c]
    }

    pub fn as_slice(&self) -> &[[f64; 3]] {
        self.pixels.as_slice()
    }

    pub fn into_vec(self) -> Vec<[f64; 3]> {
        self.pixels
    }

    /// Returns an error if any sample is non-finite or outside [0, 1].
    pub fn check_range(&self) -> Result<(), DehazeError> {
        match self
            .pixels
            .par_iter()
            .position_first(|px| px.iter().any(|v| !(0.0..=1.0).contains(v)))
        {
            Some(i) => Err(DehazeError::input(format!(
                "pixel ({}, {}) = {:?} is outside [0, 1]",
                i / self.cols,
                i % self.cols,
                self.pixels[i]
            ))),
            None => Ok(()),
        }
    }

    /// Returns a copy with every finite sample clipped into [0, 1] and the
    /// number of samples that had to be clipped.
    ///
    /// Returns an error if any sample is NaN or infinite.
    pub fn clipped(&self) -> Result<(Self, usize), DehazeError> {
        if let Some(i) = self
            .pixels
            .par_iter()
            .position_first(|px| px.iter().any(|v| !v.is_finite()))
        {
            return Err(DehazeError::input(format!(
                "pixel ({}, {}) holds a non-finite sample",
                i / self.cols,
                i % self.cols
            )));
        }

        let clipped: usize = self
            .pixels
            .par_iter()
            .map(|px| px.iter().filter(|v| !(0.0..=1.0).contains(*v)).count())
            .sum();

        let pixels = self
            .pixels
            .par_iter()
            .map(|px| (*px).map(|v| v.clamp(0.0, 1.0)))
            .collect();

        Ok((
            Self {
                rows: self.rows,
                cols: self.cols,
                pixels,
            },
            clipped,
        ))
    }

    /// Compute the grayscale guidance image.
    pub fn luminance(&self) -> Grid<f64> {
        Grid::par_from_fn(self.rows, self.cols, |row, col| {
            let px = &self.pixels[row * self.cols + col];
            px[0] * LUMA_WEIGHTS[0] + px[1] * LUMA_WEIGHTS[1] + px[2] * LUMA_WEIGHTS[2]
        })
    }

    /// Per-pixel minimum over the three channels.
    pub fn channel_min(&self) -> Grid<f64> {
        Grid::par_from_fn(self.rows, self.cols, |row, col| {
            let px = &self.pixels[row * self.cols + col];
            px[0].min(px[1]).min(px[2])
        })
    }

    /// Builds a new image of the same shape by evaluating `f` on every pixel.
    pub(crate) fn par_map<F>(&self, f: F) -> Self
    where
        F: Fn(&[f64; 3]) -> [f64; 3] + Sync + Send,
    {
        Self {
            rows: self.rows,
            cols: self.cols,
            pixels: self.pixels.par_iter().map(f).collect(),
        }
    }

    /// Like [`RgbImage::par_map`] but `f` also receives the row-major index.
    pub(crate) fn par_map_indexed<F>(&self, f: F) -> Self
    where
        F: Fn(usize, &[f64; 3]) -> [f64; 3] + Sync + Send,
    {
        Self {
            rows: self.rows,
            cols: self.cols,
            pixels: self
                .pixels
                .par_iter()
                .enumerate()
                .map(|(i, px)| f(i, px))
                .collect(),
        }
    }
}

/// Convert a normalized sample to an 8-bit code.
fn to_code(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.).round() as u8
}
