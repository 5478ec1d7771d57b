use crate::{
    atmosphere::AtmosphericLight,
    config::DehazeConfig,
    dark_channel::DarkChannel,
    edge::EdgeMap,
    error::DehazeError,
    image::RgbImage,
    recovery::recover_scene,
    saturation,
    transmission::{Raw, Refined, TransmissionMap, TransmissionPolicy},
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, time::Instant};
use tracing::{info, info_span, warn};

/// Wall-clock time spent in each stage, in milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StageTimings {
    pub dark_channel_ms: f64,
    pub atmospheric_light_ms: f64,
    pub edges_ms: f64,
    pub raw_transmission_ms: f64,
    pub refinement_ms: f64,
    pub recovery_ms: f64,
    pub saturation_ms: f64,
    pub total_ms: f64,
}

/// Intermediate results of a [`dehaze`] call, for visualization and tuning.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Diagnostics {
    pub dark_channel: DarkChannel,
    pub atmospheric_light: AtmosphericLight,

    /// Only computed by [`TransmissionPolicy::EdgeAdaptive`].
    pub edges: Option<EdgeMap>,

    pub raw_transmission: TransmissionMap<Raw>,
    pub refined_transmission: TransmissionMap<Refined>,

    /// Scene radiance before saturation correction.
    pub recovered: RgbImage,

    /// Number of input samples clipped into [0, 1] in non-strict mode.
    pub clipped_samples: usize,

    pub timings: StageTimings,
}

/// Remove haze from `image`.
///
/// Runs every stage once, in order, and returns the corrected image along with
/// the intermediate maps. Returns an error if `config` is invalid or `image`
/// holds samples the configured input mode does not accept.
pub fn dehaze(
    image: &RgbImage,
    config: &DehazeConfig,
) -> Result<(RgbImage, Diagnostics), DehazeError> {
    let span = info_span!("dehaze", rows = image.rows(), cols = image.cols());
    let _enter = span.enter();

    let start = Instant::now();
    config.validate()?;

    let (image, clipped_samples) = admit(image, config.strict)?;
    let mut timings = StageTimings::default();

    let dark_channel = timed(&mut timings.dark_channel_ms, || {
        DarkChannel::estimate(&image, config.patch_size)
    })?;

    let atmospheric_light = timed(&mut timings.atmospheric_light_ms, || {
        AtmosphericLight::estimate(&image, &dark_channel, config.atmospheric_light)
    })?;

    let edges = timed(&mut timings.edges_ms, || match config.transmission {
        TransmissionPolicy::EdgeAdaptive => {
            EdgeMap::classify(&image, config.edge_threshold).map(Some)
        }
        TransmissionPolicy::DarkChannel => Ok(None),
    })?;

    let raw_transmission = timed(&mut timings.raw_transmission_ms, || {
        TransmissionMap::estimate(
            config.transmission,
            &image,
            edges.as_ref(),
            &atmospheric_light,
            config.omega,
            config.patch_size,
        )
    })?;

    let refined_transmission = timed(&mut timings.refinement_ms, || {
        raw_transmission.clone().refine(
            &image.luminance(),
            config.refinement,
            config.transmission_floor,
        )
    })?;

    let recovered = timed(&mut timings.recovery_ms, || {
        recover_scene(&image, &atmospheric_light, &refined_transmission)
    })?;

    let corrected = timed(&mut timings.saturation_ms, || {
        saturation::correct(
            &recovered,
            &atmospheric_light,
            config.saturation_beta,
            config.saturation_mode,
        )
    })?;

    timings.total_ms = elapsed_ms(start);
    info!(total_ms = timings.total_ms, "dehazed image");

    Ok((
        corrected,
        Diagnostics {
            dark_channel,
            atmospheric_light,
            edges,
            raw_transmission,
            refined_transmission,
            recovered,
            clipped_samples,
            timings,
        },
    ))
}

/// Remove haze from `image`, discarding the intermediate maps.
pub fn dehaze_image(image: &RgbImage, config: &DehazeConfig) -> Result<RgbImage, DehazeError> {
    dehaze(image, config).map(|(corrected, _)| corrected)
}

/// Apply the input mode to `image`.
///
/// In strict mode any sample outside [0, 1] is an error. Otherwise finite
/// samples are clipped into range and only non-finite samples are rejected.
fn admit(image: &RgbImage, strict: bool) -> Result<(Cow<'_, RgbImage>, usize), DehazeError> {
    match (image.check_range(), strict) {
        (Ok(()), _) => Ok((Cow::Borrowed(image), 0)),
        (Err(err), true) => Err(err),
        (Err(_), false) => {
            let (clipped, count) = image.clipped()?;
            warn!(samples = count, "clipped input samples into [0, 1]");
            Ok((Cow::Owned(clipped), count))
        }
    }
}

fn timed<T>(slot: &mut f64, stage: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = stage();
    *slot = elapsed_ms(start);
    out
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
