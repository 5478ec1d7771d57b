use crate::{
    atmosphere::AtmosphericLightPolicy,
    dark_channel::check_patch_size,
    edge::check_threshold,
    error::DehazeError,
    saturation::{SaturationMode, check_beta},
    transmission::{RefinementPolicy, TransmissionPolicy, check_floor, check_omega},
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Every parameter of the dehazing pipeline.
///
/// `Default` gives the parameters of the reference hardware pipeline. All
/// values are on the normalized [0, 1] intensity scale.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DehazeConfig {
    /// Side of the square dark channel window. Must be odd.
    pub patch_size: usize,

    pub atmospheric_light: AtmosphericLightPolicy,

    /// Haze removal strength.
    pub omega: f64,

    /// Smallest neighbor difference that counts as an edge.
    pub edge_threshold: f64,

    pub transmission: TransmissionPolicy,
    pub refinement: RefinementPolicy,

    /// Lower bound `t0` on the refined transmission.
    pub transmission_floor: f64,

    pub saturation_beta: f64,
    pub saturation_mode: SaturationMode,

    /// Reject samples outside [0, 1] instead of clipping them.
    pub strict: bool,
}

impl Default for DehazeConfig {
    fn default() -> Self {
        Self {
            patch_size: 3,
            atmospheric_light: AtmosphericLightPolicy::default(),
            omega: 0.9375,
            edge_threshold: 80. / 255.,
            transmission: TransmissionPolicy::default(),
            refinement: RefinementPolicy::default(),
            transmission_floor: 0.25,
            saturation_beta: 0.3,
            saturation_mode: SaturationMode::default(),
            strict: false,
        }
    }
}

impl DehazeConfig {
    /// Returns the first invalid parameter as an error.
    pub fn validate(&self) -> Result<(), DehazeError> {
        check_patch_size(self.patch_size)?;
        self.atmospheric_light.validate()?;
        check_omega(self.omega)?;
        check_threshold(self.edge_threshold)?;
        self.refinement.validate()?;
        check_floor(self.transmission_floor)?;
        check_beta(self.saturation_beta)
    }

    pub fn with_patch_size(self, patch_size: usize) -> Self {
        Self { patch_size, ..self }
    }

    pub fn with_atmospheric_light(self, atmospheric_light: AtmosphericLightPolicy) -> Self {
        Self {
            atmospheric_light,
            ..self
        }
    }

    pub fn with_omega(self, omega: f64) -> Self {
        Self { omega, ..self }
    }

    pub fn with_edge_threshold(self, edge_threshold: f64) -> Self {
        Self {
            edge_threshold,
            ..self
        }
    }

    pub fn with_transmission(self, transmission: TransmissionPolicy) -> Self {
        Self {
            transmission,
            ..self
        }
    }

    pub fn with_refinement(self, refinement: RefinementPolicy) -> Self {
        Self { refinement, ..self }
    }

    pub fn with_transmission_floor(self, transmission_floor: f64) -> Self {
        Self {
            transmission_floor,
            ..self
        }
    }

    pub fn with_saturation(self, saturation_beta: f64, saturation_mode: SaturationMode) -> Self {
        Self {
            saturation_beta,
            saturation_mode,
            ..self
        }
    }

    pub fn with_strict(self, strict: bool) -> Self {
        Self { strict, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_is_valid() {
        assert_eq!(DehazeConfig::default().validate(), Ok(()));
    }

    #[rstest]
    #[case(DehazeConfig::default().with_patch_size(2), "patch_size")]
    #[case(DehazeConfig::default().with_omega(1.2), "omega")]
    #[case(DehazeConfig::default().with_edge_threshold(-1.0), "edge_threshold")]
    #[case(DehazeConfig::default().with_transmission_floor(0.0), "transmission_floor")]
    #[case(DehazeConfig::default().with_saturation(2.0, SaturationMode::PowerLaw), "saturation_beta")]
    #[case(
        DehazeConfig::default().with_refinement(RefinementPolicy::GuidedFilter { radius: 3, eps: 0.0 }),
        "eps"
    )]
    #[case(
        DehazeConfig::default().with_refinement(RefinementPolicy::GuidedFilter { radius: 0, eps: 0.01 }),
        "radius"
    )]
    #[case(
        DehazeConfig::default().with_refinement(RefinementPolicy::EdgeAwareBlend {
            radius: 3,
            eps: 0.003,
            window: 6,
            sigma: 1.0,
        }),
        "window"
    )]
    #[case(
        DehazeConfig::default()
            .with_atmospheric_light(AtmosphericLightPolicy::PercentileMax { fraction: 0.0 }),
        "fraction"
    )]
    fn reports_invalid_field(#[case] config: DehazeConfig, #[case] field: &str) {
        match config.validate() {
            Err(DehazeError::InvalidConfig { field: got, .. }) => assert_eq!(got, field),
            other => panic!("expected a config error but got {other:?}"),
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn partial_json_uses_defaults() {
        let config: DehazeConfig = serde_json::from_str(
            r#"{ "omega": 0.8, "saturation_mode": "mean_centered", "refinement": { "policy": "disabled" } }"#,
        )
        .unwrap();

        assert_eq!(config.omega, 0.8);
        assert_eq!(config.saturation_mode, SaturationMode::MeanCentered);
        assert_eq!(config.refinement, RefinementPolicy::Disabled);
        assert_eq!(config.patch_size, 3);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn edge_aware_blend_from_json() {
        let config: DehazeConfig = serde_json::from_str(
            r#"{ "refinement": { "policy": "edge_aware_blend", "radius": 3, "eps": 0.003, "window": 5, "sigma": 1.0 } }"#,
        )
        .unwrap();

        assert_eq!(config.refinement, RefinementPolicy::edge_aware_blend());
    }
}
