use crate::{error::DehazeError, grid::Grid};

const SOBEL: [[f64; 3]; 3] = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];

pub(crate) fn check_blend(window: usize, sigma: f64) -> Result<(), DehazeError> {
    if window < 3 || window % 2 == 0 {
        return Err(DehazeError::config(
            "window",
            format!("expected an odd window of at least 3 but got {window}"),
        ));
    }

    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(DehazeError::config(
            "sigma",
            format!("expected a finite positive value but got {sigma}"),
        ));
    }

    Ok(())
}

/// Gaussian weights over `window` taps centered on the middle tap, summing to one.
pub fn gaussian_weights(window: usize, sigma: f64) -> Vec<f64> {
    let center = (window / 2) as f64;
    let raw: Vec<f64> = (0..window)
        .map(|i| {
            let d = i as f64 - center;
            (-d * d / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

/// Separable Gaussian blur of `map` with mirrored borders.
pub fn gaussian_blur(map: &Grid<f64>, window: usize, sigma: f64) -> Result<Grid<f64>, DehazeError> {
    check_blend(window, sigma)?;

    let weights = gaussian_weights(window, sigma);
    let half = (window / 2) as isize;
    let convolve = |grid: &Grid<f64>, row: usize, col: usize, horizontal: bool| {
        weights
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let d = i as isize - half;
                match horizontal {
                    true => w * grid.get_reflected(row, col, 0, d),
                    false => w * grid.get_reflected(row, col, d, 0),
                }
            })
            .sum::<f64>()
    };

    let (rows, cols) = map.dims();
    let across = Grid::par_from_fn(rows, cols, |row, col| convolve(map, row, col, true));
    Ok(Grid::par_from_fn(rows, cols, |row, col| {
        convolve(&across, row, col, false)
    }))
}

/// Sobel gradient magnitude of `guide`, divided by its maximum and clipped to [0, 1].
///
/// A flat guide has zero gradient everywhere.
pub fn gradient_weight(guide: &Grid<f64>) -> Grid<f64> {
    let magnitude = Grid::par_from_fn(guide.rows(), guide.cols(), |row, col| {
        let (mut gx, mut gy) = (0.0f64, 0.0f64);
        for (i, d_row) in (-1..=1).enumerate() {
            for (j, d_col) in (-1..=1).enumerate() {
                let v = *guide.get_reflected(row, col, d_row, d_col);
                gx += SOBEL[i][j] * v;
                gy += SOBEL[j][i] * v;
            }
        }
        gx.hypot(gy)
    });

    let max = magnitude.min_max().map_or(0.0, |(_, max)| max);
    magnitude.par_map(|m| (m / (max + 1e-6)).clamp(0.0, 1.0))
}

/// Mix `input` with its Gaussian blur, weighted per cell by the edge strength
/// of `guide`.
///
/// Cells on strong edges of the guide take the blurred value and cells in flat
/// regions keep their own, so halos along depth edges are softened without
/// blurring the rest of the map.
///
/// Returns an error if the maps differ in shape or `window` is not an odd
/// number of at least 3 or `sigma` is not positive.
pub fn edge_aware_blend(
    guide: &Grid<f64>,
    input: &Grid<f64>,
    window: usize,
    sigma: f64,
) -> Result<Grid<f64>, DehazeError> {
    check_blend(window, sigma)?;
    DehazeError::check_shape(input.dims(), guide.dims())?;

    let alpha = gradient_weight(guide);
    let blurred = gaussian_blur(input, window, sigma)?;

    let (a, b, t) = (alpha.as_slice(), blurred.as_slice(), input.as_slice());
    let cols = input.cols();
    Ok(Grid::par_from_fn(input.rows(), cols, |row, col| {
        let i = row * cols + col;
        a[i] * b[i] + (1.0 - a[i]) * t[i]
    }))
}
