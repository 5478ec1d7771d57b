use crate::{
    dark_channel::{DarkChannel, argmax_first},
    error::DehazeError,
    image::RgbImage,
};
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Smallest value any atmospheric light component may take.
///
/// Transmission estimation divides by every component, so a black estimate is
/// lifted to this floor.
pub const MIN_ATMOSPHERIC_LIGHT: f64 = 1e-3;

/// Selects how [`AtmosphericLight::estimate`] picks the haze color.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "policy", rename_all = "snake_case"))]
pub enum AtmosphericLightPolicy {
    /// Take the brightest `fraction` of pixels by dark channel value and
    /// maximize each channel independently over that set.
    PercentileMax { fraction: f64 },

    /// Take the color of the single brightest dark channel pixel, scaled by
    /// `sigma` to avoid overestimating the haze brightness.
    ExtremumPixel { sigma: f64 },
}

impl AtmosphericLightPolicy {
    pub(crate) fn validate(&self) -> Result<(), DehazeError> {
        match *self {
            Self::PercentileMax { fraction } if !(fraction > 0.0 && fraction <= 1.0) => Err(
                DehazeError::config("fraction", format!("expected (0, 1] but got {fraction}")),
            ),
            Self::ExtremumPixel { sigma } if !(sigma > 0.0 && sigma <= 1.0) => Err(
                DehazeError::config("sigma", format!("expected (0, 1] but got {sigma}")),
            ),
            _ => Ok(()),
        }
    }
}

impl Default for AtmosphericLightPolicy {
    fn default() -> Self {
        Self::ExtremumPixel { sigma: 0.875 }
    }
}

/// The color of the light scattered by the haze.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AtmosphericLight {
    color: [f64; 3],

    /// Pixel `(row, col)` the color was sampled from, when a single pixel was used.
    source: Option<(usize, usize)>,
}

impl AtmosphericLight {
    /// Create an `AtmosphericLight` from an RGB `color`.
    ///
    /// Every component is clamped into `[MIN_ATMOSPHERIC_LIGHT, 1.0]`.
    pub fn new(color: [f64; 3]) -> Self {
        Self {
            color: color.map(clamp_component),
            source: None,
        }
    }

    /// Estimate the atmospheric light of `image` from its `dark` channel.
    ///
    /// Returns an error if `dark` does not match the shape of `image`.
    pub fn estimate(
        image: &RgbImage,
        dark: &DarkChannel,
        policy: AtmosphericLightPolicy,
    ) -> Result<Self, DehazeError> {
        DehazeError::check_shape(image.dims(), dark.map().dims())?;
        policy.validate()?;

        let light = match policy {
            AtmosphericLightPolicy::PercentileMax { fraction } => {
                Self::percentile_max(image, dark, fraction)
            }
            AtmosphericLightPolicy::ExtremumPixel { sigma } => {
                Self::extremum_pixel(image, dark, sigma)
            }
        };

        debug!(color = ?light.color, source = ?light.source, "estimated atmospheric light");
        Ok(light)
    }

    fn percentile_max(image: &RgbImage, dark: &DarkChannel, fraction: f64) -> Self {
        let values = dark.map().as_slice();
        let total = values.len();
        let count = ((fraction * total as f64).ceil() as usize).clamp(1, total);

        // A stable ascending sort orders equal values by index, so the last
        // `count` entries are the brightest with later pixels winning ties.
        let mut order: Vec<usize> = (0..total).collect();
        order.par_sort_by(|&a, &b| values[a].total_cmp(&values[b]));

        let pixels = image.as_slice();
        let color = order[total - count..]
            .iter()
            .map(|&i| pixels[i])
            .fold([f64::NEG_INFINITY; 3], |acc, px| {
                [acc[0].max(px[0]), acc[1].max(px[1]), acc[2].max(px[2])]
            });

        Self::new(color)
    }

    fn extremum_pixel(image: &RgbImage, dark: &DarkChannel, sigma: f64) -> Self {
        // The image is never empty, so neither is its dark channel.
        let index = argmax_first(dark.map()).unwrap_or(0);
        let px = image.as_slice()[index];

        Self {
            source: Some((index / image.cols(), index % image.cols())),
            ..Self::new(px.map(|v| v * sigma))
        }
    }

    pub fn color(&self) -> [f64; 3] {
        self.color
    }

    pub fn source(&self) -> Option<(usize, usize)> {
        self.source
    }
}

fn clamp_component(v: f64) -> f64 {
    match v.is_nan() {
        true => MIN_ATMOSPHERIC_LIGHT,
        false => v.clamp(MIN_ATMOSPHERIC_LIGHT, 1.0),
    }
}
