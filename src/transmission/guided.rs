use super::edge_aware::check_blend;
use crate::{error::DehazeError, grid::Grid};
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Selects how a raw transmission map is smoothed before the floor is applied.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "policy", rename_all = "snake_case"))]
pub enum RefinementPolicy {
    /// Edge-aware smoothing guided by the luminance of the input image over a
    /// `(2 * radius + 1)` square window.
    GuidedFilter { radius: usize, eps: f64 },

    /// The guided filter followed by an edge-aware blend of its output with a
    /// `window` x `window` Gaussian blur of standard deviation `sigma`.
    ///
    /// See [`edge_aware_blend`](super::edge_aware_blend).
    EdgeAwareBlend {
        radius: usize,
        eps: f64,
        window: usize,
        sigma: f64,
    },

    /// Keep the raw transmission, only applying the floor.
    Disabled,
}

impl RefinementPolicy {
    pub(crate) fn validate(&self) -> Result<(), DehazeError> {
        match *self {
            Self::GuidedFilter { radius, eps } => check_guided(radius, eps),
            Self::EdgeAwareBlend {
                radius,
                eps,
                window,
                sigma,
            } => {
                check_guided(radius, eps)?;
                check_blend(window, sigma)
            }
            Self::Disabled => Ok(()),
        }
    }

    /// Edge-aware blend with a 5x5 Gaussian of unit deviation after the
    /// default guided filter.
    pub fn edge_aware_blend() -> Self {
        Self::EdgeAwareBlend {
            radius: 3,
            eps: 0.003,
            window: 5,
            sigma: 1.0,
        }
    }

    /// Regularization of the guided filter, if the policy runs one.
    pub fn guided_eps(&self) -> Option<f64> {
        match *self {
            Self::GuidedFilter { eps, .. } | Self::EdgeAwareBlend { eps, .. } => Some(eps),
            Self::Disabled => None,
        }
    }
}

impl Default for RefinementPolicy {
    fn default() -> Self {
        Self::GuidedFilter {
            radius: 3,
            eps: 0.003,
        }
    }
}

fn check_guided(radius: usize, eps: f64) -> Result<(), DehazeError> {
    if radius == 0 {
        return Err(DehazeError::config(
            "radius",
            "expected a window radius of at least 1",
        ));
    }

    if !(eps.is_finite() && eps > 0.0) {
        return Err(DehazeError::config(
            "eps",
            format!("expected a finite positive value but got {eps}"),
        ));
    }

    Ok(())
}

/// Summed-area table over `map` padded by `radius` mirrored cells on every side.
struct IntegralImage {
    sums: Vec<f64>,
    stride: usize,
}

impl IntegralImage {
    fn new(map: &Grid<f64>, radius: usize) -> Self {
        let r = radius as isize;
        let rows = map.rows() + 2 * radius;
        let cols = map.cols() + 2 * radius;
        let stride = cols + 1;

        let mut sums = vec![0.0; (rows + 1) * stride];
        sums[stride..]
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(pr, line)| {
                let mut acc = 0.0;
                for pc in 0..cols {
                    acc += *map.get_reflected(0, 0, pr as isize - r, pc as isize - r);
                    line[pc + 1] = acc;
                }
            });

        for pr in 1..=rows {
            for pc in 1..stride {
                let above = sums[(pr - 1) * stride + pc];
                sums[pr * stride + pc] += above;
            }
        }

        Self { sums, stride }
    }

    /// Sum of the `size` x `size` padded window whose top left cell is `(row, col)`.
    fn window(&self, row: usize, col: usize, size: usize) -> f64 {
        let at = |r: usize, c: usize| self.sums[r * self.stride + c];
        at(row + size, col + size) - at(row, col + size) - at(row + size, col) + at(row, col)
    }
}

/// Mean of `map` over the `(2 * radius + 1)` square window centered on each cell.
///
/// Windows that extend past the map are completed by mirroring, so every mean
/// is taken over the full window.
pub fn box_mean(map: &Grid<f64>, radius: usize) -> Grid<f64> {
    let integral = IntegralImage::new(map, radius);
    let size = 2 * radius + 1;
    let area = (size * size) as f64;

    Grid::par_from_fn(map.rows(), map.cols(), |row, col| {
        integral.window(row, col, size) / area
    })
}

/// Edge-preserving smoothing of `input` steered by `guide`.
///
/// Fits `input ≈ a * guide + b` in every window, averages the coefficients of
/// all windows covering a cell and evaluates the averaged model at that cell.
///
/// Returns an error if the maps differ in shape, `radius` is zero or `eps` is
/// not positive.
pub fn guided_filter(
    guide: &Grid<f64>,
    input: &Grid<f64>,
    radius: usize,
    eps: f64,
) -> Result<Grid<f64>, DehazeError> {
    check_guided(radius, eps)?;

    let mean_guide = box_mean(guide, radius);
    let mean_input = box_mean(input, radius);
    let corr_guide_input = box_mean(&guide.par_zip_with(input, |g, p| g * p)?, radius);
    let corr_guide = box_mean(&guide.par_map(|g| g * g), radius);

    let mean_product = mean_guide.par_zip_with(&mean_input, |g, p| g * p)?;
    let cov = corr_guide_input.par_zip_with(&mean_product, |c, m| c - m)?;
    // Cancellation can leave a flat window slightly negative.
    let var = corr_guide.par_zip_with(&mean_guide, |c, m| (c - m * m).max(0.0))?;

    let a = cov.par_zip_with(&var, |c, v| c / (v + eps))?;
    let a_guide = a.par_zip_with(&mean_guide, |a, g| a * g)?;
    let b = mean_input.par_zip_with(&a_guide, |p, ag| p - ag)?;

    let mean_a = box_mean(&a, radius);
    let mean_b = box_mean(&b, radius);

    mean_a
        .par_zip_with(guide, |a, g| a * g)?
        .par_zip_with(&mean_b, |ag, b| ag + b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn brute_box_mean(map: &Grid<f64>, radius: usize) -> Grid<f64> {
        let r = radius as isize;
        Grid::par_from_fn(map.rows(), map.cols(), |row, col| {
            let sum: f64 = (-r..=r)
                .flat_map(|dr| (-r..=r).map(move |dc| (dr, dc)))
                .map(|(dr, dc)| *map.get_reflected(row, col, dr, dc))
                .sum();
            sum / ((2 * radius + 1) * (2 * radius + 1)) as f64
        })
    }

    fn ramp(rows: usize, cols: usize) -> Grid<f64> {
        Grid::par_from_fn(rows, cols, |row, col| ((row * 7 + col * 13) % 17) as f64 / 16.)
    }

    #[test]
    fn box_mean_of_row() {
        let map = Grid::from_cells(vec![0.0, 3.0, 6.0], 1, 3).unwrap();
        let mean = box_mean(&map, 1);
        for (got, expected) in mean.as_slice().iter().zip([2.0, 3.0, 4.0]) {
            assert_relative_eq!(*got, expected, epsilon = 1e-12);
        }
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(6)]
    fn box_mean_matches_brute_force(#[case] radius: usize) {
        let map = ramp(5, 7);
        let fast = box_mean(&map, radius);
        let slow = brute_box_mean(&map, radius);
        for (a, b) in fast.as_slice().iter().zip(slow.as_slice()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn constant_input_is_preserved() {
        let guide = ramp(6, 6);
        let input = Grid::filled(6, 6, 0.6);
        let output = guided_filter(&guide, &input, 2, 0.003).unwrap();
        for v in output.as_slice() {
            assert_relative_eq!(*v, 0.6, epsilon = 1e-9);
        }
    }

    #[test]
    fn follows_guide_with_small_eps() {
        let guide = ramp(8, 8);
        let output = guided_filter(&guide, &guide, 1, 1e-9).unwrap();
        for (a, b) in output.as_slice().iter().zip(guide.as_slice()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-4);
        }
    }

    #[rstest]
    #[case(0.3)]
    #[case(0.1)]
    #[case(0.7)]
    fn flat_guide_with_tiny_eps_stays_finite(#[case] level: f64) {
        let guide = Grid::filled(9, 9, level);
        let input = ramp(9, 9);
        let output = guided_filter(&guide, &input, 2, 1e-20).unwrap();
        assert!(output.as_slice().iter().all(|v| v.is_finite()));
    }

    #[rstest]
    #[case(0, 0.003, "radius")]
    #[case(2, 0.0, "eps")]
    #[case(2, -1.0, "eps")]
    #[case(2, f64::NAN, "eps")]
    fn rejects_bad_parameters(#[case] radius: usize, #[case] eps: f64, #[case] field: &str) {
        let map = Grid::filled(3, 3, 0.5);
        match guided_filter(&map, &map, radius, eps) {
            Err(DehazeError::InvalidConfig { field: got, .. }) => assert_eq!(got, field),
            other => panic!("expected a config error but got {other:?}"),
        }
    }

    #[test]
    fn rejects_mismatched_maps() {
        let guide = Grid::filled(3, 3, 0.5);
        let input = Grid::filled(3, 4, 0.5);
        assert!(matches!(
            guided_filter(&guide, &input, 1, 0.01),
            Err(DehazeError::ShapeMismatch { .. })
        ));
    }
}
