use crate::{
    edge::{EdgeClass, EdgeMap},
    error::DehazeError,
    image::RgbImage,
};

/// A 3x3 convolution kernel, indexed `[row][col]` with the center at `[1][1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Kernel3 {
    weights: [[f64; 3]; 3],
}

/// The smoothing kernels, indexed by [`EdgeClass::index`].
pub const KERNELS: [Kernel3; 3] = [
    // Flat
    Kernel3::new([
        [1. / 9., 1. / 9., 1. / 9.],
        [1. / 9., 1. / 9., 1. / 9.],
        [1. / 9., 1. / 9., 1. / 9.],
    ]),
    // Orthogonal
    Kernel3::new([
        [1. / 16., 2. / 16., 1. / 16.],
        [2. / 16., 4. / 16., 2. / 16.],
        [1. / 16., 2. / 16., 1. / 16.],
    ]),
    // Diagonal
    Kernel3::new([
        [2. / 16., 1. / 16., 2. / 16.],
        [1. / 16., 4. / 16., 1. / 16.],
        [2. / 16., 1. / 16., 2. / 16.],
    ]),
];

impl Kernel3 {
    pub const fn new(weights: [[f64; 3]; 3]) -> Self {
        Self { weights }
    }

    /// Returns the kernel used to smooth pixels of class `class`.
    pub fn for_class(class: EdgeClass) -> &'static Kernel3 {
        &KERNELS[class.index()]
    }

    pub fn weights(&self) -> &[[f64; 3]; 3] {
        &self.weights
    }

    /// Convolve every channel of the neighborhood of `(row, col)` in `image`.
    pub fn apply(&self, image: &RgbImage, row: usize, col: usize) -> [f64; 3] {
        let mut acc = [0.0; 3];
        for (i, d_row) in (-1..=1).enumerate() {
            for (j, d_col) in (-1..=1).enumerate() {
                let w = self.weights[i][j];
                let px = image.pixel_reflected(row, col, d_row, d_col);
                for c in 0..3 {
                    acc[c] += w * px[c];
                }
            }
        }

        acc
    }
}

/// Smooth `image` pixel by pixel with the kernel selected by `edges`.
///
/// Returns an error if `edges` does not match the shape of `image`.
pub fn smooth(image: &RgbImage, edges: &EdgeMap) -> Result<RgbImage, DehazeError> {
    DehazeError::check_shape(image.dims(), edges.map().dims())?;

    let cols = image.cols();
    let classes = edges.map().as_slice();
    Ok(image.par_map_indexed(|i, _| {
        Kernel3::for_class(classes[i]).apply(image, i / cols, i % cols)
    }))
}
