mod edge_aware;
mod guided;

pub use edge_aware::{edge_aware_blend, gaussian_blur, gaussian_weights, gradient_weight};
pub use guided::{RefinementPolicy, box_mean, guided_filter};

use crate::{
    atmosphere::AtmosphericLight,
    dark_channel::DarkChannel,
    edge::EdgeMap,
    error::DehazeError,
    grid::Grid,
    image::RgbImage,
    kernel,
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Transmission straight out of an estimator.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Raw;

/// Transmission that has been smoothed and floored, ready for scene recovery.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Refined;

/// Selects how the raw transmission is estimated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TransmissionPolicy {
    /// Smooth each pixel with the 3x3 kernel chosen by its edge class.
    #[default]
    EdgeAdaptive,

    /// Dark channel of the image normalized by the atmospheric light.
    DarkChannel,
}

/// Per-pixel fraction of scene light that reaches the camera.
///
/// `Stage` records whether the map is [`Raw`] or [`Refined`]. Only
/// [`TransmissionMap::refine`] produces a refined map, and it always applies
/// the floor, so a refined map is floored exactly once.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TransmissionMap<Stage> {
    map: Grid<f64>,
    _phan: std::marker::PhantomData<Stage>,
}

impl<Stage> TransmissionMap<Stage> {
    fn from_map(map: Grid<f64>) -> Self {
        Self {
            map,
            _phan: std::marker::PhantomData,
        }
    }

    pub fn map(&self) -> &Grid<f64> {
        &self.map
    }

    pub fn into_map(self) -> Grid<f64> {
        self.map
    }

    pub fn dims(&self) -> (usize, usize) {
        self.map.dims()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.map.get(row, col).copied()
    }
}

impl TransmissionMap<Raw> {
    /// Wrap an externally computed raw transmission `map`.
    pub fn from_grid(map: Grid<f64>) -> Self {
        Self::from_map(map)
    }

    /// Create a raw map where every pixel has transmission `value`.
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self::from_map(Grid::filled(rows, cols, value))
    }

    /// Estimate transmission from edge-adaptive smoothing of `image`.
    ///
    /// Each pixel is smoothed with the kernel of its class in `edges`, divided
    /// channel-wise by `light`, and the smallest ratio scaled by `omega` is
    /// subtracted from one. The result is clamped to [0, 1].
    pub fn edge_adaptive(
        image: &RgbImage,
        edges: &EdgeMap,
        light: &AtmosphericLight,
        omega: f64,
    ) -> Result<Self, DehazeError> {
        check_omega(omega)?;

        let a = light.color();
        let smoothed = kernel::smooth(image, edges)?;
        let pixels = smoothed.as_slice();
        let cols = image.cols();
        let map = Grid::par_from_fn(image.rows(), cols, |row, col| {
            let px = pixels[row * cols + col];
            let ratio = (0..3)
                .map(|c| px[c] / a[c])
                .fold(f64::INFINITY, f64::min);
            (1.0 - omega * ratio).clamp(0.0, 1.0)
        });

        Ok(Self::from_map(map).logged("edge adaptive"))
    }

    /// Estimate transmission from the dark channel of `image / light`.
    pub fn dark_channel(
        image: &RgbImage,
        light: &AtmosphericLight,
        omega: f64,
        patch_size: usize,
    ) -> Result<Self, DehazeError> {
        check_omega(omega)?;

        let a = light.color();
        let normalized = image.par_map(|px| [px[0] / a[0], px[1] / a[1], px[2] / a[2]]);
        let map = DarkChannel::estimate(&normalized, patch_size)?
            .into_map()
            .par_map(|d| (1.0 - omega * d).clamp(0.0, 1.0));

        Ok(Self::from_map(map).logged("dark channel"))
    }

    /// Estimate raw transmission with `policy`.
    ///
    /// `edges` is required by [`TransmissionPolicy::EdgeAdaptive`] and ignored
    /// otherwise.
    pub fn estimate(
        policy: TransmissionPolicy,
        image: &RgbImage,
        edges: Option<&EdgeMap>,
        light: &AtmosphericLight,
        omega: f64,
        patch_size: usize,
    ) -> Result<Self, DehazeError> {
        match (policy, edges) {
            (TransmissionPolicy::EdgeAdaptive, Some(edges)) => {
                Self::edge_adaptive(image, edges, light, omega)
            }
            (TransmissionPolicy::EdgeAdaptive, None) => Err(DehazeError::config(
                "transmission",
                "the edge adaptive policy requires an edge map",
            )),
            (TransmissionPolicy::DarkChannel, _) => {
                Self::dark_channel(image, light, omega, patch_size)
            }
        }
    }

    /// Smooth the map according to `policy` and raise every value to at least `floor`.
    ///
    /// `guide` steers the guided filter and the edge-aware blend and must match
    /// the shape of the map. The floor is applied once, after all smoothing.
    pub fn refine(
        self,
        guide: &Grid<f64>,
        policy: RefinementPolicy,
        floor: f64,
    ) -> Result<TransmissionMap<Refined>, DehazeError> {
        check_floor(floor)?;
        policy.validate()?;

        let smoothed = match policy {
            RefinementPolicy::GuidedFilter { radius, eps } => {
                guided_filter(guide, &self.map, radius, eps)?
            }
            RefinementPolicy::EdgeAwareBlend {
                radius,
                eps,
                window,
                sigma,
            } => {
                let guided = guided_filter(guide, &self.map, radius, eps)?;
                edge_aware_blend(guide, &guided, window, sigma)?
            }
            RefinementPolicy::Disabled => {
                DehazeError::check_shape(self.dims(), guide.dims())?;
                self.map
            }
        };

        let refined = TransmissionMap::<Refined>::from_map(smoothed.par_map(|t| t.max(floor)));
        Ok(refined.logged("refined"))
    }

    /// Apply the floor without smoothing.
    pub fn into_floored(self, floor: f64) -> Result<TransmissionMap<Refined>, DehazeError> {
        check_floor(floor)?;
        Ok(TransmissionMap::from_map(self.map.par_map(|t| t.max(floor))))
    }
}

impl<Stage> TransmissionMap<Stage> {
    fn logged(self, stage: &str) -> Self {
        if let Some((min, max)) = self.map.min_max() {
            debug!(stage, min, max, "estimated transmission");
        }
        self
    }
}

pub(crate) fn check_omega(omega: f64) -> Result<(), DehazeError> {
    if !(0.0..=1.0).contains(&omega) {
        return Err(DehazeError::config(
            "omega",
            format!("expected [0, 1] but got {omega}"),
        ));
    }

    Ok(())
}

pub(crate) fn check_floor(floor: f64) -> Result<(), DehazeError> {
    if !(floor > 0.0 && floor <= 1.0) {
        return Err(DehazeError::config(
            "transmission_floor",
            format!("expected (0, 1] but got {floor}"),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::EdgeClass;
    use approx::assert_relative_eq;
    use quickcheck::quickcheck;
    use rstest::rstest;

    fn image_from_bytes(bytes: &[u8]) -> RgbImage {
        let pixels = (0..20)
            .map(|i| {
                let at = |k: usize| match bytes.is_empty() {
                    true => 0.5,
                    false => bytes[(3 * i + k) % bytes.len()] as f64 / 255.,
                };
                [at(0), at(1), at(2)]
            })
            .collect();
        RgbImage::from_pixels(pixels, 4, 5).unwrap()
    }

    fn raw(
        policy: TransmissionPolicy,
        image: &RgbImage,
        light: &AtmosphericLight,
        omega: f64,
    ) -> Grid<f64> {
        let edges = EdgeMap::classify(image, 80. / 255.).unwrap();
        TransmissionMap::estimate(policy, image, Some(&edges), light, omega, 3)
            .unwrap()
            .into_map()
    }

    quickcheck! {
        fn stronger_omega_never_raises_transmission(bytes: Vec<u8>, w1: u8, w2: u8, dark: bool) -> bool {
            let image = image_from_bytes(&bytes);
            let light = AtmosphericLight::new([0.9, 0.8, 0.7]);
            let (lo, hi) = (w1.min(w2) as f64 / 255., w1.max(w2) as f64 / 255.);
            let policy = match dark {
                true => TransmissionPolicy::DarkChannel,
                false => TransmissionPolicy::EdgeAdaptive,
            };

            let weak = raw(policy, &image, &light, lo);
            let strong = raw(policy, &image, &light, hi);
            strong.as_slice().iter().zip(weak.as_slice()).all(|(s, w)| s <= w)
        }

        fn refined_respects_floor(values: Vec<u8>, floor: u8, guided: bool) -> bool {
            let floor = (floor as f64 + 1.0) / 256.;
            let cells: Vec<f64> = (0..30)
                .map(|i| match values.is_empty() {
                    true => 0.0,
                    false => values[i % values.len()] as f64 / 255.,
                })
                .collect();
            let map = TransmissionMap::from_grid(Grid::from_cells(cells, 5, 6).unwrap());
            let guide = Grid::par_from_fn(5, 6, |row, col| ((row + col) % 3) as f64 / 2.);
            let policy = match (guided, values.len() % 2) {
                (true, 0) => RefinementPolicy::default(),
                (true, _) => RefinementPolicy::edge_aware_blend(),
                (false, _) => RefinementPolicy::Disabled,
            };

            map.refine(&guide, policy, floor)
                .unwrap()
                .map()
                .as_slice()
                .iter()
                .all(|t| *t >= floor)
        }
    }

    #[rstest]
    #[case(TransmissionPolicy::EdgeAdaptive)]
    #[case(TransmissionPolicy::DarkChannel)]
    fn uniform_image(#[case] policy: TransmissionPolicy) {
        let image = RgbImage::uniform([0.5, 0.4, 0.6], 4, 4).unwrap();
        let light = AtmosphericLight::new([1.0, 0.8, 1.0]);
        for t in raw(policy, &image, &light, 0.9375).as_slice() {
            assert_relative_eq!(*t, 1.0 - 0.9375 * 0.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn brighter_than_light_is_opaque() {
        let image = RgbImage::uniform([1.0; 3], 3, 3).unwrap();
        let light = AtmosphericLight::new([0.5; 3]);
        let edges = EdgeMap::uniform(EdgeClass::Flat, 3, 3);
        let map = TransmissionMap::edge_adaptive(&image, &edges, &light, 0.9).unwrap();
        assert!(map.map().as_slice().iter().all(|t| *t == 0.0));
    }

    #[test]
    fn disabled_refinement_only_floors() {
        let cells = Grid::from_cells(vec![0.1, 0.5, 0.9, 0.2], 2, 2).unwrap();
        let map = TransmissionMap::from_grid(cells);
        let guide = Grid::filled(2, 2, 0.5);
        let refined = map.refine(&guide, RefinementPolicy::Disabled, 0.25).unwrap();
        assert_eq!(refined.map().as_slice(), &[0.25, 0.5, 0.9, 0.25]);
    }

    #[test]
    fn edge_aware_blend_floors_after_smoothing() {
        // A flat guide leaves the guided output alone, so only the floor acts.
        let cells = Grid::from_cells(vec![0.05, 0.5, 0.9, 0.2, 0.6, 0.3], 2, 3).unwrap();
        let guide = Grid::filled(2, 3, 0.5);
        let guided = guided_filter(&guide, &cells, 3, 0.003).unwrap();

        let refined = TransmissionMap::from_grid(cells)
            .refine(&guide, RefinementPolicy::edge_aware_blend(), 0.3)
            .unwrap();
        for (got, expected) in refined.map().as_slice().iter().zip(guided.as_slice()) {
            assert_relative_eq!(*got, expected.max(0.3), epsilon = 1e-12);
        }
    }

    #[test]
    fn edge_aware_blend_softens_guide_edges() {
        let guide = Grid::par_from_fn(6, 8, |_, col| match col < 4 {
            true => 0.25,
            false => 0.75,
        });
        let cells = Grid::par_from_fn(6, 8, |row, col| ((row * 3 + col * 5) % 7) as f64 / 6.);
        let floor = 0.01;

        let guided = TransmissionMap::from_grid(cells.clone())
            .refine(&guide, RefinementPolicy::default(), floor)
            .unwrap();
        let blended = TransmissionMap::from_grid(cells)
            .refine(&guide, RefinementPolicy::edge_aware_blend(), floor)
            .unwrap();

        // Away from the step the guide is flat and both policies agree.
        for row in 0..6 {
            assert_eq!(guided.get(row, 0), blended.get(row, 0));
            assert_eq!(guided.get(row, 7), blended.get(row, 7));
        }
        assert_ne!(guided.map(), blended.map());
    }

    #[rstest]
    #[case(RefinementPolicy::EdgeAwareBlend { radius: 3, eps: 0.003, window: 4, sigma: 1.0 }, "window")]
    #[case(RefinementPolicy::EdgeAwareBlend { radius: 3, eps: 0.003, window: 5, sigma: -1.0 }, "sigma")]
    #[case(RefinementPolicy::EdgeAwareBlend { radius: 0, eps: 0.003, window: 5, sigma: 1.0 }, "radius")]
    fn rejects_bad_blend(#[case] policy: RefinementPolicy, #[case] field: &str) {
        let map = TransmissionMap::filled(3, 3, 0.5);
        match map.refine(&Grid::filled(3, 3, 0.5), policy, 0.1) {
            Err(DehazeError::InvalidConfig { field: got, .. }) => assert_eq!(got, field),
            other => panic!("expected a config error but got {other:?}"),
        }
    }

    #[test]
    fn edge_adaptive_requires_edges() {
        let image = RgbImage::uniform([0.5; 3], 3, 3).unwrap();
        let light = AtmosphericLight::new([1.0; 3]);
        let policy = TransmissionPolicy::EdgeAdaptive;
        assert!(TransmissionMap::estimate(policy, &image, None, &light, 0.9, 3).is_err());
    }

    #[rstest]
    #[case(-0.1)]
    #[case(1.5)]
    #[case(f64::NAN)]
    fn rejects_bad_omega(#[case] omega: f64) {
        assert!(check_omega(omega).is_err());
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.01)]
    #[case(f64::NAN)]
    fn rejects_bad_floor(#[case] floor: f64) {
        let map = TransmissionMap::filled(2, 2, 0.5);
        assert!(map.into_floored(floor).is_err());
    }
}
